//! Registry of named circuit breakers
//!
//! Lazily creates one breaker per resource category, aggregates health
//! across all of them, broadcasts configuration and resets, and evicts
//! entries under capacity pressure. Also owns the periodic sliding-window
//! cleanup sweep for every breaker it holds.

use super::{
    BreakerEvent, BreakerMetricsReport, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    StrategyKind,
};
use crate::error::ConfigError;
use crate::models::now_ms;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Cadence of the sliding-window cleanup sweep
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Configuration applied to newly created breakers
    pub global: CircuitBreakerConfig,
    /// Failure-detection strategy for newly created breakers
    pub strategy: StrategyKind,
    /// Maximum breakers tracked before eviction kicks in
    pub max_breakers: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            global: CircuitBreakerConfig::default(),
            strategy: StrategyKind::default(),
            max_breakers: 64,
        }
    }
}

/// Windowed metrics summed and averaged across all breakers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub breaker_count: usize,
    pub total_requests: usize,
    pub total_failures: usize,
    pub total_successes: usize,
    pub average_failure_rate: f64,
    pub average_response_time_ms: f64,
}

/// Per-breaker entry in the exported registry snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerExport {
    pub name: String,
    pub state: CircuitState,
    pub metrics: BreakerMetricsReport,
}

/// Serializable diagnostic snapshot of the whole registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub global_config: CircuitBreakerConfig,
    pub breakers: Vec<BreakerExport>,
    pub timestamp: i64,
}

/// Owns many named circuit breakers
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    /// Names in creation order, for oldest-first eviction
    insertion_order: Mutex<Vec<String>>,
    config: RwLock<RegistryConfig>,
    event_tx: Option<mpsc::Sender<BreakerEvent>>,
}

impl CircuitBreakerRegistry {
    /// Create a registry, validating the global breaker configuration
    pub fn new(config: RegistryConfig) -> Result<Self, ConfigError> {
        config.global.validate()?;
        Ok(Self {
            breakers: DashMap::new(),
            insertion_order: Mutex::new(Vec::new()),
            config: RwLock::new(config),
            event_tx: None,
        })
    }

    /// Attach a channel receiving events from all owned breakers
    pub fn with_event_sender(mut self, tx: mpsc::Sender<BreakerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Look up a breaker without creating it
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|entry| Arc::clone(&entry))
    }

    /// Look up or lazily create the breaker for a resource category
    ///
    /// When the registry is at capacity, an entry is evicted first.
    pub async fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }

        let config = self.config.read().await.clone();
        if self.breakers.len() >= config.max_breakers {
            self.evict_one().await;
        }

        let mut breaker =
            CircuitBreaker::new(name, config.global.clone(), config.strategy.build());
        if let Some(tx) = &self.event_tx {
            breaker = breaker.with_event_sender(tx.clone());
        }
        let breaker = Arc::new(breaker);

        self.breakers.insert(name.to_string(), Arc::clone(&breaker));
        self.insertion_order.lock().await.push(name.to_string());
        debug!(breaker = %name, "Created circuit breaker");
        breaker
    }

    /// All breakers currently in the given state
    pub async fn find_by_state(&self, state: CircuitState) -> Vec<Arc<CircuitBreaker>> {
        let mut matches = Vec::new();
        for breaker in self.all() {
            if breaker.state().await == state {
                matches.push(breaker);
            }
        }
        matches
    }

    /// Names of breakers that are open, failing heavily, or responding slowly
    pub async fn find_unhealthy(&self) -> Vec<String> {
        let mut unhealthy = Vec::new();
        for breaker in self.all() {
            if !breaker.status().await.healthy {
                unhealthy.push(breaker.name().to_string());
            }
        }
        unhealthy
    }

    /// Sum windowed counters and average rates across all breakers
    pub async fn aggregated_metrics(&self) -> AggregatedMetrics {
        let breakers = self.all();
        let count = breakers.len();

        let mut total_requests = 0;
        let mut total_failures = 0;
        let mut total_successes = 0;
        let mut rate_sum = 0.0;
        let mut response_sum = 0.0;

        for breaker in &breakers {
            let report = breaker.metrics_report().await;
            total_requests += report.windowed_requests;
            total_failures += report.windowed_failures;
            total_successes += report.windowed_successes;
            rate_sum += report.failure_rate;
            response_sum += report.average_response_time_ms;
        }

        let (average_failure_rate, average_response_time_ms) = if count > 0 {
            (rate_sum / count as f64, response_sum / count as f64)
        } else {
            (0.0, 0.0)
        };

        AggregatedMetrics {
            breaker_count: count,
            total_requests,
            total_failures,
            total_successes,
            average_failure_rate,
            average_response_time_ms,
        }
    }

    /// Evict one breaker and return its name
    ///
    /// Preference order: the first closed-and-healthy breaker with no
    /// in-flight calls, then any closed-and-healthy breaker, and only as a
    /// last resort the oldest entry regardless of state. A breaker with
    /// in-flight calls is never chosen while a healthy alternative exists.
    pub async fn evict_one(&self) -> Option<String> {
        let order = self.insertion_order.lock().await.clone();

        let mut candidates = Vec::with_capacity(order.len());
        for name in &order {
            if let Some(breaker) = self.get(name) {
                candidates.push((name.clone(), breaker));
            }
        }

        let mut victim = None;
        for (name, breaker) in &candidates {
            let status = breaker.status().await;
            if status.state == CircuitState::Closed && status.healthy && breaker.in_flight() == 0 {
                victim = Some(name.clone());
                break;
            }
        }
        if victim.is_none() {
            for (name, breaker) in &candidates {
                let status = breaker.status().await;
                if status.state == CircuitState::Closed && status.healthy {
                    victim = Some(name.clone());
                    break;
                }
            }
        }
        if victim.is_none() {
            victim = candidates.first().map(|(name, _)| name.clone());
        }

        let name = victim?;
        let removed = self.breakers.remove(&name);
        self.insertion_order.lock().await.retain(|n| n != &name);

        if let Some((_, breaker)) = removed {
            let state = breaker.state().await;
            info!(breaker = %name, state = ?state, "Evicted circuit breaker");
            if let Some(tx) = &self.event_tx {
                if let Err(e) = tx.try_send(BreakerEvent::Evicted {
                    name: name.clone(),
                    state,
                }) {
                    warn!(breaker = %name, error = %e, "Dropped eviction event");
                }
            }
        }
        Some(name)
    }

    /// Replace the configuration of every breaker and the global default
    pub async fn apply_config_to_all(
        &self,
        config: CircuitBreakerConfig,
    ) -> Result<(), ConfigError> {
        config.validate()?;
        self.config.write().await.global = config.clone();
        for breaker in self.all() {
            breaker.apply_config(config.clone()).await;
        }
        Ok(())
    }

    /// Reset every breaker to closed with zeroed counters
    pub async fn reset_all(&self) {
        for breaker in self.all() {
            breaker.reset().await;
        }
    }

    /// Serializable snapshot of configuration and per-breaker state
    pub async fn export_state(&self) -> RegistrySnapshot {
        let global_config = self.config.read().await.global.clone();
        let order = self.insertion_order.lock().await.clone();

        let mut breakers = Vec::with_capacity(order.len());
        for name in order {
            if let Some(breaker) = self.get(&name) {
                breakers.push(BreakerExport {
                    name,
                    state: breaker.state().await,
                    metrics: breaker.metrics_report().await,
                });
            }
        }

        RegistrySnapshot {
            global_config,
            breakers,
            timestamp: now_ms(),
        }
    }

    /// Periodic sliding-window cleanup for all owned breakers
    ///
    /// Runs until a shutdown signal arrives. Housekeeping never touches the
    /// request path: record operations proceed concurrently with the sweep.
    pub async fn run_cleanup(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = CLEANUP_INTERVAL.as_secs(),
            "Starting breaker window cleanup"
        );
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for breaker in self.all() {
                        breaker.sweep().await;
                    }
                    debug!(breakers = self.len(), "Swept breaker windows");
                }
                _ = shutdown.recv() => {
                    info!("Shutting down breaker window cleanup");
                    break;
                }
            }
        }
    }

    fn all(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(RegistryConfig {
            strategy: StrategyKind::ConsecutiveFailures,
            ..Default::default()
        })
        .unwrap()
    }

    async fn force_open(breaker: &CircuitBreaker) {
        for _ in 0..5 {
            breaker.record_failure(None).await;
        }
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_lazy_creation_reuses_instances() {
        let registry = test_registry();
        let first = registry.get_or_create("chromium").await;
        let second = registry.get_or_create("chromium").await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_global_config_rejected() {
        let config = RegistryConfig {
            global: CircuitBreakerConfig {
                failure_rate_threshold: 150.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(CircuitBreakerRegistry::new(config).is_err());
    }

    #[tokio::test]
    async fn test_find_by_state_and_unhealthy() {
        let registry = test_registry();
        let broken = registry.get_or_create("webkit").await;
        registry.get_or_create("chromium").await;
        force_open(&broken).await;

        let open = registry.find_by_state(CircuitState::Open).await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].name(), "webkit");

        let unhealthy = registry.find_unhealthy().await;
        assert_eq!(unhealthy, vec!["webkit".to_string()]);
    }

    #[tokio::test]
    async fn test_eviction_prefers_closed_healthy() {
        let registry = test_registry();
        let broken = registry.get_or_create("webkit").await;
        registry.get_or_create("chromium").await;
        force_open(&broken).await;

        // The open breaker was inserted first, but the closed healthy one
        // is still chosen.
        let evicted = registry.evict_one().await;
        assert_eq!(evicted.as_deref(), Some("chromium"));
        assert!(registry.get("webkit").is_some());
    }

    #[tokio::test]
    async fn test_eviction_skips_in_flight_breakers() {
        let registry = test_registry();
        let busy = registry.get_or_create("chromium").await;
        registry.get_or_create("firefox").await;
        busy.admit().await.unwrap();

        // Both are closed and healthy, but chromium has an in-flight call
        let evicted = registry.evict_one().await;
        assert_eq!(evicted.as_deref(), Some("firefox"));
    }

    #[tokio::test]
    async fn test_eviction_falls_back_to_oldest() {
        let registry = test_registry();
        let first = registry.get_or_create("webkit").await;
        let second = registry.get_or_create("chromium").await;
        force_open(&first).await;
        force_open(&second).await;

        let evicted = registry.evict_one().await;
        assert_eq!(evicted.as_deref(), Some("webkit"));
    }

    #[tokio::test]
    async fn test_capacity_bound_triggers_eviction() {
        let registry = CircuitBreakerRegistry::new(RegistryConfig {
            max_breakers: 2,
            ..Default::default()
        })
        .unwrap();

        registry.get_or_create("a").await;
        registry.get_or_create("b").await;
        registry.get_or_create("c").await;

        assert_eq!(registry.len(), 2);
        assert!(registry.get("c").is_some());
    }

    #[tokio::test]
    async fn test_aggregated_metrics_sums_windows() {
        let registry = test_registry();
        let a = registry.get_or_create("a").await;
        let b = registry.get_or_create("b").await;

        for _ in 0..4 {
            a.record_request().await;
        }
        a.record_failure(None).await;
        for _ in 0..2 {
            b.record_request().await;
            b.record_success(100.0).await;
        }

        let agg = registry.aggregated_metrics().await;
        assert_eq!(agg.breaker_count, 2);
        assert_eq!(agg.total_requests, 6);
        assert_eq!(agg.total_failures, 1);
        assert_eq!(agg.total_successes, 2);
        // (25% + 0%) / 2
        assert!((agg.average_failure_rate - 12.5).abs() < 1e-9);
        // (0ms + 100ms) / 2
        assert!((agg.average_response_time_ms - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_apply_config_to_all_validates() {
        let registry = test_registry();
        registry.get_or_create("a").await;

        let bad = CircuitBreakerConfig {
            minimum_throughput: 0,
            ..Default::default()
        };
        assert!(registry.apply_config_to_all(bad).await.is_err());

        let good = CircuitBreakerConfig {
            timeout: Duration::from_secs(5),
            ..Default::default()
        };
        registry.apply_config_to_all(good).await.unwrap();
        let report = registry.get("a").unwrap().metrics_report().await;
        assert_eq!(report.current_timeout_ms, 5000);
    }

    #[tokio::test]
    async fn test_reset_all_closes_everything() {
        let registry = test_registry();
        let broken = registry.get_or_create("webkit").await;
        force_open(&broken).await;

        registry.reset_all().await;
        assert_eq!(broken.state().await, CircuitState::Closed);
        assert!(registry.find_unhealthy().await.is_empty());
    }

    #[tokio::test]
    async fn test_export_state_roundtrips_to_json() {
        let registry = test_registry();
        registry.get_or_create("chromium").await;

        let snapshot = registry.export_state().await;
        assert_eq!(snapshot.breakers.len(), 1);
        assert_eq!(snapshot.breakers[0].name, "chromium");
        assert!(snapshot.timestamp > 0);

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: RegistrySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.breakers[0].state, CircuitState::Closed);
    }
}
