//! Engine configuration
//!
//! Flat, environment-friendly settings deserialized from `POOLGUARD_*`
//! variables, converted into the typed configuration structs the engine
//! components take at construction. All values are validated before any
//! component is built.

use crate::breaker::{CircuitBreakerConfig, RegistryConfig, StrategyKind};
use crate::error::ConfigError;
use crate::monitor::TrendAnalyzerConfig;
use crate::scaling::ScalingStrategy;
use serde::Deserialize;
use std::time::Duration;

/// Engine configuration as read from the environment
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Name used in structured log events
    #[serde(default = "default_engine_name")]
    pub engine_name: String,

    /// Windowed failure percentage at which breakers open
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,

    /// Sliding window for breaker statistics, seconds
    #[serde(default = "default_time_window")]
    pub time_window_secs: u64,

    /// Open-state duration before half-open probing, seconds
    #[serde(default = "default_breaker_timeout")]
    pub breaker_timeout_secs: u64,

    /// Minimum windowed requests before failure rates apply
    #[serde(default = "default_minimum_throughput")]
    pub minimum_throughput: u64,

    /// Half-open successes required to close a breaker
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u64,

    /// Failure run length for the consecutive-failures strategy
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u64,

    /// Failure-detection strategy: percentage, consecutive_failures, adaptive
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Maximum breakers held before registry eviction
    #[serde(default = "default_max_breakers")]
    pub max_breakers: usize,

    /// Scaling preset: conservative, balanced, aggressive
    #[serde(default = "default_scaling_preset")]
    pub scaling_preset: String,

    /// Cadence of autoscaler evaluations, seconds
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_secs: u64,

    /// Trailing window for trend analysis, seconds
    #[serde(default = "default_analysis_window")]
    pub analysis_window_secs: u64,

    /// Whether trend analysis produces forecasts
    #[serde(default = "default_predictive")]
    pub predictive: bool,
}

fn default_engine_name() -> String {
    "poolguard".to_string()
}

fn default_failure_rate_threshold() -> f64 {
    50.0
}

fn default_time_window() -> u64 {
    60
}

fn default_breaker_timeout() -> u64 {
    30
}

fn default_minimum_throughput() -> u64 {
    10
}

fn default_success_threshold() -> u64 {
    3
}

fn default_max_consecutive_failures() -> u64 {
    5
}

fn default_strategy() -> String {
    "percentage".to_string()
}

fn default_max_breakers() -> usize {
    64
}

fn default_scaling_preset() -> String {
    "balanced".to_string()
}

fn default_evaluation_interval() -> u64 {
    30
}

fn default_analysis_window() -> u64 {
    600
}

fn default_predictive() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_name: default_engine_name(),
            failure_rate_threshold: default_failure_rate_threshold(),
            time_window_secs: default_time_window(),
            breaker_timeout_secs: default_breaker_timeout(),
            minimum_throughput: default_minimum_throughput(),
            success_threshold: default_success_threshold(),
            max_consecutive_failures: default_max_consecutive_failures(),
            strategy: default_strategy(),
            max_breakers: default_max_breakers(),
            scaling_preset: default_scaling_preset(),
            evaluation_interval_secs: default_evaluation_interval(),
            analysis_window_secs: default_analysis_window(),
            predictive: default_predictive(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `POOLGUARD_*` environment variables
    ///
    /// A malformed value is a startup error, not a fallback to defaults:
    /// silently dropping it would also discard every other valid override
    /// in the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("POOLGUARD").try_parsing(true))
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Typed breaker configuration, validated
    pub fn breaker_config(&self) -> Result<CircuitBreakerConfig, ConfigError> {
        let config = CircuitBreakerConfig {
            failure_rate_threshold: self.failure_rate_threshold,
            time_window: Duration::from_secs(self.time_window_secs),
            timeout: Duration::from_secs(self.breaker_timeout_secs),
            minimum_throughput: self.minimum_throughput,
            success_threshold: self.success_threshold,
            max_consecutive_failures: self.max_consecutive_failures,
        };
        config.validate()?;
        Ok(config)
    }

    /// Typed registry configuration, validated
    pub fn registry_config(&self) -> Result<RegistryConfig, ConfigError> {
        Ok(RegistryConfig {
            global: self.breaker_config()?,
            strategy: StrategyKind::parse(&self.strategy)?,
            max_breakers: self.max_breakers,
        })
    }

    /// Scaling strategy from the configured preset, validated
    pub fn scaling_strategy(&self) -> Result<ScalingStrategy, ConfigError> {
        ScalingStrategy::preset(&self.scaling_preset)?.validated()
    }

    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }

    /// Trend analyzer configuration
    pub fn analyzer_config(&self) -> TrendAnalyzerConfig {
        TrendAnalyzerConfig {
            analysis_window: Duration::from_secs(self.analysis_window_secs),
            predictive: self.predictive,
        }
    }
}
