//! Per-resource-category circuit breaking
//!
//! A breaker wraps calls to one named resource category and fails fast while
//! the category is unhealthy. State transitions are driven by a pluggable
//! failure-detection strategy over sliding-window metrics:
//! - Closed: normal operation, requests admitted
//! - Open: failing, requests rejected immediately
//! - HalfOpen: probing recovery, limited requests admitted

mod metrics;
mod registry;
mod strategy;

pub use metrics::{WindowMetrics, WindowSnapshot};
pub use registry::{
    AggregatedMetrics, BreakerExport, CircuitBreakerRegistry, RegistryConfig, RegistrySnapshot,
};
pub use strategy::{
    AdaptiveStrategy, ConsecutiveFailuresStrategy, FailureDetectionStrategy, PercentageStrategy,
    StrategyKind,
};

use crate::error::{CircuitOpen, ConfigError};
use crate::models::now_ms;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Failure rate above which a breaker is reported unhealthy
const UNHEALTHY_FAILURE_RATE: f64 = 50.0;

/// Average response time above which a breaker is reported unhealthy
const UNHEALTHY_RESPONSE_TIME_MS: f64 = 5000.0;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    /// Normal operation, requests admitted
    Closed,
    /// Failing, requests rejected immediately
    Open,
    /// Probing recovery, limited requests admitted
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Windowed failure percentage at which the percentage strategy opens
    pub failure_rate_threshold: f64,
    /// Sliding window over which failure statistics are computed
    pub time_window: Duration,
    /// Time spent open before a half-open probe becomes eligible
    pub timeout: Duration,
    /// Minimum windowed requests before failure rates are meaningful
    pub minimum_throughput: u64,
    /// Successes required in half-open to close the circuit
    pub success_threshold: u64,
    /// Failure run length at which the consecutive strategy opens
    pub max_consecutive_failures: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            time_window: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
            minimum_throughput: 10,
            success_threshold: 3,
            max_consecutive_failures: 5,
        }
    }
}

impl CircuitBreakerConfig {
    /// Validate threshold values, rejecting invalid configuration at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.failure_rate_threshold) {
            return Err(ConfigError::InvalidFailureRateThreshold(
                self.failure_rate_threshold,
            ));
        }
        if self.minimum_throughput == 0 {
            return Err(ConfigError::ZeroMinimumThroughput);
        }
        if self.time_window.is_zero() {
            return Err(ConfigError::ZeroTimeWindow);
        }
        Ok(())
    }
}

/// Breaker event pushed to the logging collaborator
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// Circuit transitioned to a new state
    StateTransition {
        name: String,
        from: CircuitState,
        to: CircuitState,
    },
    /// A request was rejected because the circuit is open
    RequestRejected { name: String },
    /// A breaker was evicted from the registry
    Evicted { name: String, state: CircuitState },
}

/// Window-derived metrics plus lifetime transition counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerMetricsReport {
    pub failure_rate: f64,
    pub average_response_time_ms: f64,
    pub windowed_requests: usize,
    pub windowed_failures: usize,
    pub windowed_successes: usize,
    pub open_count: u64,
    pub half_open_count: u64,
    pub closed_count: u64,
    pub current_timeout_ms: u64,
}

/// Current state, metrics, and derived health of a breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub state: CircuitState,
    pub metrics: BreakerMetricsReport,
    pub healthy: bool,
}

/// Per-resource-category circuit breaker
pub struct CircuitBreaker {
    name: String,
    config: RwLock<CircuitBreakerConfig>,
    state: Mutex<CircuitState>,
    state_change_ms: AtomicI64,
    open_count: AtomicU64,
    half_open_count: AtomicU64,
    closed_count: AtomicU64,
    half_open_successes: AtomicU64,
    in_flight: AtomicU64,
    strategy: Arc<dyn FailureDetectionStrategy>,
    metrics: WindowMetrics,
    event_tx: Option<mpsc::Sender<BreakerEvent>>,
}

impl CircuitBreaker {
    /// Create a breaker for one resource category
    ///
    /// The configuration is expected to have been validated already (the
    /// registry and the engine config loader both do so at construction).
    pub fn new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        strategy: Arc<dyn FailureDetectionStrategy>,
    ) -> Self {
        Self {
            name: name.into(),
            config: RwLock::new(config),
            state: Mutex::new(CircuitState::Closed),
            state_change_ms: AtomicI64::new(now_ms()),
            open_count: AtomicU64::new(0),
            half_open_count: AtomicU64::new(0),
            closed_count: AtomicU64::new(0),
            half_open_successes: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            strategy,
            metrics: WindowMetrics::new(),
            event_tx: None,
        }
    }

    /// Attach a channel receiving state-transition and rejection events
    pub fn with_event_sender(mut self, tx: mpsc::Sender<BreakerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.lock().await
    }

    /// Calls admitted but not yet completed
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Admit or reject an operation against this resource category
    ///
    /// An open breaker rejects with [`CircuitOpen`] until its timeout has
    /// elapsed, at which point it transitions to half-open and admits a
    /// probe. Admission records the request in the sliding window.
    pub async fn admit(&self) -> Result<(), CircuitOpen> {
        let now = now_ms();
        let state = *self.state.lock().await;

        match state {
            CircuitState::Closed | CircuitState::HalfOpen => {
                self.record_request().await;
                Ok(())
            }
            CircuitState::Open => {
                let config = self.config.read().await.clone();
                let change = self.state_change_ms.load(Ordering::SeqCst);
                if self
                    .strategy
                    .should_transition_to_half_open(change, now, &config)
                {
                    self.transition_to(CircuitState::HalfOpen).await;
                    self.record_request().await;
                    Ok(())
                } else {
                    let elapsed = now - change;
                    let retry_after_ms =
                        (config.timeout.as_millis() as i64 - elapsed).max(0);
                    self.emit_event(BreakerEvent::RequestRejected {
                        name: self.name.clone(),
                    });
                    Err(CircuitOpen {
                        name: self.name.clone(),
                        retry_after_ms,
                    })
                }
            }
        }
    }

    /// Convenience wrapper over [`admit`](Self::admit)
    pub async fn can_proceed(&self) -> bool {
        self.admit().await.is_ok()
    }

    /// Record an admitted request without going through `admit`
    pub async fn record_request(&self) {
        self.metrics.record_request(now_ms()).await;
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    /// Record a successful operation and its execution time
    pub async fn record_success(&self, execution_time_ms: f64) {
        let now = now_ms();
        self.metrics.record_success(now, execution_time_ms).await;
        self.strategy.on_success();
        self.complete_in_flight();

        let state = *self.state.lock().await;
        let config = self.config.read().await.clone();

        match state {
            CircuitState::HalfOpen => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if self.strategy.should_close(successes, &config) {
                    self.transition_to(CircuitState::Closed).await;
                    info!(
                        breaker = %self.name,
                        successes,
                        "Circuit closed, resource category recovered"
                    );
                }
            }
            CircuitState::Closed => {
                // The strategy is consulted on every outcome: a success can
                // still leave the windowed failure rate above threshold.
                if self.strategy_wants_open(now, &config).await {
                    self.transition_to(CircuitState::Open).await;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed operation
    ///
    /// Failures are never re-thrown by the breaker; they only drive state.
    pub async fn record_failure(&self, reason: Option<&str>) {
        let now = now_ms();
        self.metrics.record_failure(now).await;
        self.strategy.on_failure();
        self.complete_in_flight();

        let state = *self.state.lock().await;

        match state {
            CircuitState::HalfOpen => {
                // A failed probe reopens immediately, regardless of any
                // accumulated successes. This transition is explicit rather
                // than delegated to the strategy's open check.
                self.transition_to(CircuitState::Open).await;
                error!(
                    breaker = %self.name,
                    reason = reason.unwrap_or("unspecified"),
                    "Circuit reopened, recovery probe failed"
                );
            }
            CircuitState::Closed => {
                let config = self.config.read().await.clone();
                if self.strategy_wants_open(now, &config).await {
                    self.transition_to(CircuitState::Open).await;
                    error!(
                        breaker = %self.name,
                        strategy = self.strategy.name(),
                        reason = reason.unwrap_or("unspecified"),
                        "Circuit opened"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Current state, window metrics, and derived health
    pub async fn status(&self) -> BreakerStatus {
        let state = *self.state.lock().await;
        let metrics = self.metrics_report().await;
        let healthy = state != CircuitState::Open
            && metrics.failure_rate <= UNHEALTHY_FAILURE_RATE
            && metrics.average_response_time_ms <= UNHEALTHY_RESPONSE_TIME_MS;

        BreakerStatus {
            state,
            metrics,
            healthy,
        }
    }

    /// Window-filtered metrics plus lifetime transition counters
    pub async fn metrics_report(&self) -> BreakerMetricsReport {
        let config = self.config.read().await.clone();
        let snap = self.metrics.snapshot(config.time_window, now_ms()).await;

        BreakerMetricsReport {
            failure_rate: snap.failure_rate,
            average_response_time_ms: snap.average_response_time_ms,
            windowed_requests: snap.requests,
            windowed_failures: snap.failures,
            windowed_successes: snap.successes,
            open_count: self.open_count.load(Ordering::SeqCst),
            half_open_count: self.half_open_count.load(Ordering::SeqCst),
            closed_count: self.closed_count.load(Ordering::SeqCst),
            current_timeout_ms: config.timeout.as_millis() as u64,
        }
    }

    /// Replace the breaker configuration in place
    pub async fn apply_config(&self, config: CircuitBreakerConfig) {
        *self.config.write().await = config;
    }

    /// Zero all counters and return to closed without destroying the breaker
    pub async fn reset(&self) {
        let old_state = {
            let mut state = self.state.lock().await;
            let old = *state;
            *state = CircuitState::Closed;
            old
        };

        self.state_change_ms.store(now_ms(), Ordering::SeqCst);
        self.open_count.store(0, Ordering::SeqCst);
        self.half_open_count.store(0, Ordering::SeqCst);
        self.closed_count.store(0, Ordering::SeqCst);
        self.half_open_successes.store(0, Ordering::SeqCst);
        self.metrics.clear().await;
        self.strategy.reset();

        if old_state != CircuitState::Closed {
            self.emit_event(BreakerEvent::StateTransition {
                name: self.name.clone(),
                from: old_state,
                to: CircuitState::Closed,
            });
        }
        info!(breaker = %self.name, "Circuit breaker reset");
    }

    /// Run one sweep of the sliding-window housekeeping
    pub(crate) async fn sweep(&self) {
        let window = self.config.read().await.time_window;
        self.metrics.sweep(window, now_ms()).await;
    }

    async fn strategy_wants_open(&self, now: i64, config: &CircuitBreakerConfig) -> bool {
        let failures = self.metrics.failure_timestamps().await;
        let requests = self.metrics.request_timestamps().await;
        self.strategy.should_open(&failures, &requests, now, config)
    }

    async fn transition_to(&self, new_state: CircuitState) {
        let old_state = {
            let mut state = self.state.lock().await;
            if *state == new_state {
                return;
            }
            let old = *state;
            *state = new_state;
            old
        };

        self.state_change_ms.store(now_ms(), Ordering::SeqCst);
        match new_state {
            CircuitState::Open => self.open_count.fetch_add(1, Ordering::SeqCst),
            CircuitState::HalfOpen => {
                self.half_open_successes.store(0, Ordering::SeqCst);
                self.half_open_count.fetch_add(1, Ordering::SeqCst)
            }
            CircuitState::Closed => {
                self.half_open_successes.store(0, Ordering::SeqCst);
                self.closed_count.fetch_add(1, Ordering::SeqCst)
            }
        };

        debug!(
            breaker = %self.name,
            from = ?old_state,
            to = ?new_state,
            "Circuit breaker state transition"
        );

        self.emit_event(BreakerEvent::StateTransition {
            name: self.name.clone(),
            from: old_state,
            to: new_state,
        });
    }

    fn complete_in_flight(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
    }

    fn emit_event(&self, event: BreakerEvent) {
        if let Some(tx) = &self.event_tx {
            if let Err(e) = tx.try_send(event) {
                warn!(breaker = %self.name, error = %e, "Dropped breaker event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker_with(config: CircuitBreakerConfig, kind: StrategyKind) -> CircuitBreaker {
        CircuitBreaker::new("chromium", config, kind.build())
    }

    fn consecutive_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_consecutive_failures: 5,
            timeout: Duration::from_secs(600),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_starts_closed_and_admits() {
        let breaker = breaker_with(Default::default(), StrategyKind::Percentage);
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert!(breaker.admit().await.is_ok());
    }

    #[tokio::test]
    async fn test_opens_on_failure_rate() {
        let breaker = breaker_with(Default::default(), StrategyKind::Percentage);

        // 12 requests, 7 failures: 58% over a 10-request minimum throughput
        for _ in 0..12 {
            breaker.record_request().await;
        }
        for _ in 0..5 {
            breaker.record_success(10.0).await;
        }
        for _ in 0..7 {
            breaker.record_failure(Some("launch failed")).await;
        }

        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_open_rejects_with_retry_hint() {
        let breaker = breaker_with(consecutive_config(), StrategyKind::ConsecutiveFailures);

        for _ in 0..5 {
            breaker.record_request().await;
            breaker.record_failure(None).await;
        }
        assert_eq!(breaker.state().await, CircuitState::Open);

        let err = breaker.admit().await.unwrap_err();
        assert_eq!(err.name, "chromium");
        assert!(err.retry_after_ms > 0);
    }

    #[tokio::test]
    async fn test_half_open_after_timeout() {
        let config = CircuitBreakerConfig {
            timeout: Duration::from_millis(0),
            ..consecutive_config()
        };
        let breaker = breaker_with(config, StrategyKind::ConsecutiveFailures);

        for _ in 0..5 {
            breaker.record_failure(None).await;
        }
        assert_eq!(breaker.state().await, CircuitState::Open);

        // Zero timeout: the next admission probes immediately
        assert!(breaker.admit().await.is_ok());
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_half_open_reopens_on_any_failure() {
        let config = CircuitBreakerConfig {
            timeout: Duration::from_millis(0),
            success_threshold: 5,
            ..consecutive_config()
        };
        let breaker = breaker_with(config, StrategyKind::ConsecutiveFailures);

        for _ in 0..5 {
            breaker.record_failure(None).await;
        }
        breaker.admit().await.unwrap();
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        // Accumulated successes do not protect the probe
        breaker.record_success(5.0).await;
        breaker.record_success(5.0).await;
        breaker.record_failure(Some("probe failed")).await;

        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_closes_after_success_threshold() {
        let config = CircuitBreakerConfig {
            timeout: Duration::from_millis(0),
            success_threshold: 3,
            ..consecutive_config()
        };
        let breaker = breaker_with(config, StrategyKind::ConsecutiveFailures);

        for _ in 0..5 {
            breaker.record_failure(None).await;
        }
        breaker.admit().await.unwrap();

        for _ in 0..3 {
            breaker.record_success(5.0).await;
        }
        assert_eq!(breaker.state().await, CircuitState::Closed);

        let report = breaker.metrics_report().await;
        assert_eq!(report.open_count, 1);
        assert_eq!(report.half_open_count, 1);
        assert_eq!(report.closed_count, 1);
    }

    #[tokio::test]
    async fn test_unhealthy_when_open() {
        let breaker = breaker_with(consecutive_config(), StrategyKind::ConsecutiveFailures);
        for _ in 0..5 {
            breaker.record_failure(None).await;
        }

        let status = breaker.status().await;
        assert_eq!(status.state, CircuitState::Open);
        assert!(!status.healthy);
    }

    #[tokio::test]
    async fn test_unhealthy_on_slow_responses() {
        let breaker = breaker_with(Default::default(), StrategyKind::Percentage);
        breaker.record_request().await;
        breaker.record_success(9000.0).await;

        let status = breaker.status().await;
        assert_eq!(status.state, CircuitState::Closed);
        assert!(!status.healthy);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let breaker = breaker_with(consecutive_config(), StrategyKind::ConsecutiveFailures);
        for _ in 0..5 {
            breaker.record_request().await;
            breaker.record_failure(None).await;
        }

        breaker.reset().await;
        let first = breaker.metrics_report().await;
        breaker.reset().await;
        let second = breaker.metrics_report().await;

        assert_eq!(first, second);
        assert_eq!(first.open_count, 0);
        assert_eq!(first.windowed_requests, 0);
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_in_flight_tracking() {
        let breaker = breaker_with(Default::default(), StrategyKind::Percentage);

        breaker.admit().await.unwrap();
        breaker.admit().await.unwrap();
        assert_eq!(breaker.in_flight(), 2);

        breaker.record_success(5.0).await;
        assert_eq!(breaker.in_flight(), 1);
        breaker.record_failure(None).await;
        assert_eq!(breaker.in_flight(), 0);

        // Completion without admission never underflows
        breaker.record_success(5.0).await;
        assert_eq!(breaker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_transition_events_emitted() {
        let (tx, mut rx) = mpsc::channel(16);
        let breaker = CircuitBreaker::new(
            "firefox",
            consecutive_config(),
            StrategyKind::ConsecutiveFailures.build(),
        )
        .with_event_sender(tx);

        for _ in 0..5 {
            breaker.record_failure(None).await;
        }

        match rx.try_recv().unwrap() {
            BreakerEvent::StateTransition { name, from, to } => {
                assert_eq!(name, "firefox");
                assert_eq!(from, CircuitState::Closed);
                assert_eq!(to, CircuitState::Open);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
