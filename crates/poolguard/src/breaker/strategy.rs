//! Failure detection strategies
//!
//! Pure decision logic over timestamped failure/success/request sequences and
//! the breaker configuration. Strategies hold no breaker identity; the
//! breaker injects the chosen strategy at construction.

use super::CircuitBreakerConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Maximum failure-rate samples retained by the adaptive strategy
const ADAPTIVE_HISTORY_LIMIT: usize = 100;

/// Failure-rate threshold used by the adaptive strategy until it has
/// accumulated enough samples of its own
const ADAPTIVE_BOOTSTRAP_THRESHOLD: f64 = 50.0;

/// Minimum samples before the adaptive strategy trusts its own statistics
const ADAPTIVE_MIN_SAMPLES: usize = 10;

/// Decision logic deciding when a breaker opens, probes, and closes
pub trait FailureDetectionStrategy: Send + Sync {
    /// Strategy name for logging and identification
    fn name(&self) -> &'static str;

    /// Whether the breaker should open, given the recorded failure and
    /// request timestamps (epoch milliseconds)
    fn should_open(
        &self,
        failures: &[i64],
        requests: &[i64],
        now_ms: i64,
        config: &CircuitBreakerConfig,
    ) -> bool;

    /// Whether an open breaker is eligible for a half-open probe
    fn should_transition_to_half_open(
        &self,
        state_change_ms: i64,
        now_ms: i64,
        config: &CircuitBreakerConfig,
    ) -> bool {
        now_ms - state_change_ms >= config.timeout.as_millis() as i64
    }

    /// Whether a half-open breaker has seen enough successes to close
    fn should_close(&self, recent_successes: u64, config: &CircuitBreakerConfig) -> bool {
        recent_successes >= config.success_threshold
    }

    /// Hook invoked on every recorded success
    fn on_success(&self) {}

    /// Hook invoked on every recorded failure
    fn on_failure(&self) {}

    /// Clear any internal strategy state
    fn reset(&self) {}
}

/// Count events with timestamps inside the trailing window
fn count_within_window(events: &[i64], now_ms: i64, window_ms: i64) -> usize {
    let cutoff = now_ms - window_ms;
    events.iter().filter(|ts| **ts >= cutoff).count()
}

/// Opens when the windowed failure percentage crosses a fixed threshold
///
/// Requires `minimum_throughput` recent requests before the rate is
/// considered statistically meaningful.
#[derive(Debug, Default)]
pub struct PercentageStrategy;

impl FailureDetectionStrategy for PercentageStrategy {
    fn name(&self) -> &'static str {
        "percentage"
    }

    fn should_open(
        &self,
        failures: &[i64],
        requests: &[i64],
        now_ms: i64,
        config: &CircuitBreakerConfig,
    ) -> bool {
        let window_ms = config.time_window.as_millis() as i64;
        let recent_requests = count_within_window(requests, now_ms, window_ms);
        if recent_requests < config.minimum_throughput as usize {
            return false;
        }

        let recent_failures = count_within_window(failures, now_ms, window_ms);
        let failure_rate = recent_failures as f64 / recent_requests as f64 * 100.0;
        failure_rate >= config.failure_rate_threshold
    }
}

/// Opens after a run of consecutive failures, regardless of the time window
///
/// The running counter increments per failure and resets to zero per success.
#[derive(Debug, Default)]
pub struct ConsecutiveFailuresStrategy {
    consecutive: AtomicU64,
}

impl ConsecutiveFailuresStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length of the failure run
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive.load(Ordering::SeqCst)
    }
}

impl FailureDetectionStrategy for ConsecutiveFailuresStrategy {
    fn name(&self) -> &'static str {
        "consecutive_failures"
    }

    fn should_open(
        &self,
        _failures: &[i64],
        _requests: &[i64],
        _now_ms: i64,
        config: &CircuitBreakerConfig,
    ) -> bool {
        self.consecutive.load(Ordering::SeqCst) >= config.max_consecutive_failures
    }

    fn on_success(&self) {
        self.consecutive.store(0, Ordering::SeqCst);
    }

    fn on_failure(&self) {
        self.consecutive.fetch_add(1, Ordering::SeqCst);
    }

    fn reset(&self) {
        self.consecutive.store(0, Ordering::SeqCst);
    }
}

/// Learns its open threshold from the breaker's own failure-rate history
///
/// Keeps up to 100 historical failure-rate samples and opens when the
/// current rate exceeds `min(mean + 2 sigma, 90)`. Until 10 samples have
/// accumulated it behaves like a 50% percentage threshold. The close
/// threshold scales with the amount of history collected.
#[derive(Debug, Default)]
pub struct AdaptiveStrategy {
    history: Mutex<VecDeque<f64>>,
}

impl AdaptiveStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_sample(&self, rate: f64) -> usize {
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        history.push_back(rate);
        while history.len() > ADAPTIVE_HISTORY_LIMIT {
            history.pop_front();
        }
        history.len()
    }

    fn threshold(&self) -> f64 {
        let history = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if history.len() < ADAPTIVE_MIN_SAMPLES {
            return ADAPTIVE_BOOTSTRAP_THRESHOLD;
        }

        let n = history.len() as f64;
        let mean: f64 = history.iter().sum::<f64>() / n;
        let variance: f64 = history.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();

        (mean + 2.0 * std_dev).min(90.0)
    }

    fn history_len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl FailureDetectionStrategy for AdaptiveStrategy {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn should_open(
        &self,
        failures: &[i64],
        requests: &[i64],
        now_ms: i64,
        config: &CircuitBreakerConfig,
    ) -> bool {
        let window_ms = config.time_window.as_millis() as i64;
        let recent_requests = count_within_window(requests, now_ms, window_ms);
        if recent_requests < config.minimum_throughput as usize {
            return false;
        }

        let recent_failures = count_within_window(failures, now_ms, window_ms);
        let current_rate = recent_failures as f64 / recent_requests as f64 * 100.0;

        let threshold = self.threshold();
        self.record_sample(current_rate);

        current_rate >= threshold
    }

    fn should_close(&self, recent_successes: u64, config: &CircuitBreakerConfig) -> bool {
        let scaled = (self.history_len() / 10) as u64;
        recent_successes >= config.success_threshold.max(scaled)
    }

    fn reset(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Selectable strategy kind, used by configuration and the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Percentage,
    ConsecutiveFailures,
    Adaptive,
}

impl StrategyKind {
    /// Instantiate a fresh strategy of this kind
    pub fn build(&self) -> std::sync::Arc<dyn FailureDetectionStrategy> {
        match self {
            StrategyKind::Percentage => std::sync::Arc::new(PercentageStrategy),
            StrategyKind::ConsecutiveFailures => {
                std::sync::Arc::new(ConsecutiveFailuresStrategy::new())
            }
            StrategyKind::Adaptive => std::sync::Arc::new(AdaptiveStrategy::new()),
        }
    }

    /// Parse a strategy name as it appears in configuration
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name {
            "percentage" => Ok(StrategyKind::Percentage),
            "consecutive_failures" => Ok(StrategyKind::ConsecutiveFailures),
            "adaptive" => Ok(StrategyKind::Adaptive),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}
