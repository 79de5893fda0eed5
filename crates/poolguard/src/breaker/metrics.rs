//! Sliding-window metrics owned by each circuit breaker
//!
//! Stores raw failure/success/request timestamps plus a capped FIFO history
//! of response times. A periodic sweep discards entries older than twice the
//! configured window; rate and latency figures are always derived over the
//! active window only.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum response-time samples retained (FIFO)
const RESPONSE_TIME_HISTORY_LIMIT: usize = 50;

/// Raw event storage for one breaker
#[derive(Debug, Default)]
pub struct WindowMetrics {
    failures: RwLock<Vec<i64>>,
    successes: RwLock<Vec<i64>>,
    requests: RwLock<Vec<i64>>,
    response_times: RwLock<VecDeque<f64>>,
}

/// Window-filtered view derived from the raw events
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    pub requests: usize,
    pub failures: usize,
    pub successes: usize,
    /// Failures as a percentage of windowed requests (0 when idle)
    pub failure_rate: f64,
    /// Mean over the retained response-time history, milliseconds
    pub average_response_time_ms: f64,
}

impl WindowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_request(&self, now_ms: i64) {
        self.requests.write().await.push(now_ms);
    }

    pub async fn record_success(&self, now_ms: i64, execution_time_ms: f64) {
        self.successes.write().await.push(now_ms);
        let mut times = self.response_times.write().await;
        times.push_back(execution_time_ms);
        while times.len() > RESPONSE_TIME_HISTORY_LIMIT {
            times.pop_front();
        }
    }

    pub async fn record_failure(&self, now_ms: i64) {
        self.failures.write().await.push(now_ms);
    }

    /// Cloned failure timestamps, for the failure-detection strategy
    pub async fn failure_timestamps(&self) -> Vec<i64> {
        self.failures.read().await.clone()
    }

    /// Cloned request timestamps, for the failure-detection strategy
    pub async fn request_timestamps(&self) -> Vec<i64> {
        self.requests.read().await.clone()
    }

    /// Derive windowed counts and rates
    pub async fn snapshot(&self, window: Duration, now_ms: i64) -> WindowSnapshot {
        let cutoff = now_ms - window.as_millis() as i64;
        let count_recent =
            |events: &Vec<i64>| events.iter().filter(|ts| **ts >= cutoff).count();

        let requests = count_recent(&*self.requests.read().await);
        let failures = count_recent(&*self.failures.read().await);
        let successes = count_recent(&*self.successes.read().await);

        let failure_rate = if requests > 0 {
            failures as f64 / requests as f64 * 100.0
        } else {
            0.0
        };

        let times = self.response_times.read().await;
        let average_response_time_ms = if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<f64>() / times.len() as f64
        };

        WindowSnapshot {
            requests,
            failures,
            successes,
            failure_rate,
            average_response_time_ms,
        }
    }

    /// Discard events older than twice the window
    ///
    /// Keeping a full extra window of slack means a sweep interleaved with
    /// concurrent record operations can never remove events that still count
    /// toward the active window.
    pub async fn sweep(&self, window: Duration, now_ms: i64) {
        let cutoff = now_ms - 2 * window.as_millis() as i64;
        self.failures.write().await.retain(|ts| *ts >= cutoff);
        self.successes.write().await.retain(|ts| *ts >= cutoff);
        self.requests.write().await.retain(|ts| *ts >= cutoff);
    }

    /// Drop all recorded events and response times
    pub async fn clear(&self) {
        self.failures.write().await.clear();
        self.successes.write().await.clear();
        self.requests.write().await.clear();
        self.response_times.write().await.clear();
    }
}
