//! Core data models for the resilience engine

use serde::{Deserialize, Serialize};

/// Raw counters pulled from the worker pool and host on each evaluation tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSample {
    pub current_size: u32,
    pub target_size: u32,
    /// Pool utilization as a percentage (0-100)
    pub utilization: f64,
    pub queue_length: u32,
    pub total_requests: u64,
    pub total_errors: u64,
    pub avg_response_time_ms: f64,
    pub heap_used_bytes: u64,
    pub heap_total_bytes: u64,
    /// Host CPU usage as a percentage
    pub cpu_usage: f64,
}

/// Classified load trend over the recent snapshot history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadTrend {
    Stable,
    Increasing,
    Decreasing,
    Volatile,
}

/// Derived metrics snapshot used for scaling decisions
///
/// Produced fresh on every evaluation; a bounded history of the last 10
/// snapshots is retained only for trend classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingMetrics {
    pub current_size: u32,
    pub target_size: u32,
    pub utilization: f64,
    pub queue_length: u32,
    /// Errors as a percentage of total requests
    pub error_rate: f64,
    pub response_time_ms: f64,
    pub memory_usage_bytes: u64,
    pub cpu_usage: f64,
    /// heap_used / heap_total as a percentage (0-100)
    pub memory_pressure: f64,
    /// CPU usage clamped to 0-100
    pub cpu_pressure: f64,
    pub trend: LoadTrend,
    pub timestamp: i64,
}

/// The kind of action the decision maker settled on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingDecision {
    Maintain,
    ScaleUp,
    ScaleDown,
    EmergencyScaleUp,
    ForceScaleDown,
}

impl ScalingDecision {
    /// True for any decision that changes the pool size
    pub fn is_actionable(&self) -> bool {
        !matches!(self, ScalingDecision::Maintain)
    }
}

/// Outcome of one scaling evaluation, consumed immediately by the pool owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingDecisionResult {
    pub decision: ScalingDecision,
    pub target_size: u32,
    pub reason: String,
    /// Confidence in the decision, 0-100
    pub confidence: u8,
}

/// Ledger entry recorded for every non-maintain decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingEvent {
    pub timestamp: i64,
    pub decision: ScalingDecision,
    pub previous_size: u32,
    pub new_size: u32,
    pub metrics: ScalingMetrics,
    pub reason: String,
    pub confidence: u8,
}

/// Current wall-clock time in epoch milliseconds
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
