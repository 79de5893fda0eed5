//! Scaling strategy configuration
//!
//! A strategy bundles the sizing bounds, thresholds, and cooldown that the
//! decision maker and ideal-size calculator operate under. Three named
//! presets cover common deployments; fully custom strategies are validated
//! at construction.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration bundle for the autoscaling engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingStrategy {
    pub min_size: u32,
    pub max_size: u32,
    /// Utilization percentage the pool should settle around
    pub target_utilization: f64,
    /// Utilization above which the pool grows
    pub scale_up_threshold: f64,
    /// Utilization below which the pool may shrink
    pub scale_down_threshold: f64,
    /// Largest single-step size change
    pub max_scale_step: u32,
    /// Minimum elapsed time between two scaling actions
    pub cooldown_period: Duration,
    /// Memory pressure above which the ideal size shrinks
    pub memory_threshold: f64,
    /// CPU pressure above which the ideal size shrinks
    pub cpu_threshold: f64,
    /// Scale up in proportional steps instead of one at a time
    pub aggressive_scaling: bool,
}

impl Default for ScalingStrategy {
    fn default() -> Self {
        Self::balanced()
    }
}

impl ScalingStrategy {
    /// Small pool, slow to grow, long cooldown
    pub fn conservative() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            target_utilization: 60.0,
            scale_up_threshold: 75.0,
            scale_down_threshold: 25.0,
            max_scale_step: 1,
            cooldown_period: Duration::from_secs(120),
            memory_threshold: 80.0,
            cpu_threshold: 80.0,
            aggressive_scaling: false,
        }
    }

    /// Reasonable middle ground for most pools
    pub fn balanced() -> Self {
        Self {
            min_size: 1,
            max_size: 20,
            target_utilization: 70.0,
            scale_up_threshold: 80.0,
            scale_down_threshold: 30.0,
            max_scale_step: 2,
            cooldown_period: Duration::from_secs(60),
            memory_threshold: 85.0,
            cpu_threshold: 85.0,
            aggressive_scaling: false,
        }
    }

    /// Large pool ceiling, proportional steps, short cooldown
    pub fn aggressive() -> Self {
        Self {
            min_size: 2,
            max_size: 50,
            target_utilization: 75.0,
            scale_up_threshold: 85.0,
            scale_down_threshold: 20.0,
            max_scale_step: 5,
            cooldown_period: Duration::from_secs(30),
            memory_threshold: 90.0,
            cpu_threshold: 90.0,
            aggressive_scaling: true,
        }
    }

    /// Look up a preset by its configuration name
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "conservative" => Ok(Self::conservative()),
            "balanced" => Ok(Self::balanced()),
            "aggressive" => Ok(Self::aggressive()),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }

    /// Validate a custom strategy, rejecting inconsistent bounds at startup
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.min_size > self.max_size {
            return Err(ConfigError::InvalidSizeBounds {
                min: self.min_size,
                max: self.max_size,
            });
        }
        if !(1.0..=100.0).contains(&self.target_utilization) {
            return Err(ConfigError::InvalidTargetUtilization(
                self.target_utilization,
            ));
        }
        if self.scale_down_threshold >= self.scale_up_threshold {
            return Err(ConfigError::InvertedScaleThresholds {
                down: self.scale_down_threshold,
                up: self.scale_up_threshold,
            });
        }
        if self.max_scale_step == 0 {
            return Err(ConfigError::ZeroScaleStep);
        }
        Ok(self)
    }
}
