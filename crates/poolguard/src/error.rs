//! Error types for the resilience engine
//!
//! Configuration errors are surfaced at construction time and are the only
//! errors that propagate to the caller. Transient resource failures are
//! recorded through the circuit breaker, never re-thrown by it.

use thiserror::Error;

/// Invalid configuration, rejected at construction
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("failure rate threshold must be within 0-100, got {0}")]
    InvalidFailureRateThreshold(f64),

    #[error("minimum throughput must be at least 1")]
    ZeroMinimumThroughput,

    #[error("time window must be non-zero")]
    ZeroTimeWindow,

    #[error("min_size {min} must not exceed max_size {max}")]
    InvalidSizeBounds { min: u32, max: u32 },

    #[error("target utilization must be within 1-100, got {0}")]
    InvalidTargetUtilization(f64),

    #[error("scale_down_threshold {down} must be below scale_up_threshold {up}")]
    InvertedScaleThresholds { down: f64, up: f64 },

    #[error("max scale step must be at least 1")]
    ZeroScaleStep,

    #[error("unknown strategy preset '{0}'")]
    UnknownPreset(String),

    #[error("unknown failure detection strategy '{0}'")]
    UnknownStrategy(String),

    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Fast-fail rejection returned when a breaker is open
///
/// This is a distinct signal from a resource failure: the caller should not
/// attempt the expensive operation at all.
#[derive(Debug, Error)]
#[error("circuit breaker '{name}' is open, retry in {retry_after_ms}ms")]
pub struct CircuitOpen {
    /// Name of the rejecting breaker (resource category)
    pub name: String,
    /// Milliseconds until the breaker becomes eligible for a half-open probe
    pub retry_after_ms: i64,
}
