//! Poolguard: resource resilience and autoscaling engine
//!
//! Protects expensive resource pools (connections, workers, sessions) with
//! per-category circuit breakers and keeps their size matched to load with
//! an autoscaling decision engine. A performance monitor tracks metric
//! trends over time and flags system-wide stress.
//!
//! The main entry points are:
//! - [`breaker::CircuitBreakerRegistry`]: named circuit breakers with
//!   pluggable failure-detection strategies
//! - [`scaling::AutoScaler`]: periodic pool-sizing decisions driven by a
//!   [`scaling::PoolStatsSource`]
//! - [`monitor::PerformanceMonitor`]: time-series ingestion, linear trend
//!   analysis, and stress detection
//!
//! Components communicate over channels and run their periodic loops under
//! a shared broadcast shutdown signal, so they compose into a host
//! application without blocking each other.

pub mod breaker;
pub mod config;
pub mod error;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod scaling;

pub use breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, RegistryConfig,
    StrategyKind,
};
pub use config::EngineConfig;
pub use error::{CircuitOpen, ConfigError};
pub use models::{
    LoadTrend, PoolSample, ScalingDecision, ScalingDecisionResult, ScalingMetrics,
};
pub use monitor::{MetricType, PerformanceMonitor, TrendAssessment};
pub use scaling::{AutoScaler, PoolStatsSource, ScalingStrategy};
