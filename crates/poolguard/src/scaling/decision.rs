//! Scaling decision logic
//!
//! Evaluates a metrics snapshot against the strategy in strict priority
//! order: emergency conditions, resource pressure, the cooldown gate, then
//! normal threshold-driven scaling. Emergency and pressure checks bypass
//! the cooldown entirely.

use super::ScalingStrategy;
use crate::models::{LoadTrend, ScalingDecision, ScalingDecisionResult, ScalingMetrics};

/// Queue length above which a saturated pool is an emergency
const EMERGENCY_QUEUE_LENGTH: u32 = 10;

/// Utilization above which a long queue is an emergency
const EMERGENCY_UTILIZATION: f64 = 95.0;

/// Error rate that, combined with high utilization, is an emergency
const EMERGENCY_ERROR_RATE: f64 = 20.0;

/// Utilization above which a high error rate is an emergency
const EMERGENCY_ERROR_UTILIZATION: f64 = 90.0;

/// Memory or CPU pressure that forces the pool to shed capacity
const CRITICAL_PRESSURE: f64 = 95.0;

/// Pure decision maker over a single metrics snapshot
#[derive(Debug, Default)]
pub struct DecisionMaker;

impl DecisionMaker {
    /// Decide whether to grow, shrink, or hold the pool
    ///
    /// `in_cooldown` reflects whether the cooldown period since the last
    /// scaling action is still running; only the normal scaling path is
    /// gated by it.
    pub fn decide(
        metrics: &ScalingMetrics,
        strategy: &ScalingStrategy,
        in_cooldown: bool,
    ) -> ScalingDecisionResult {
        let current = metrics.current_size;

        // 1. Emergency scale up, ignoring cooldown
        if metrics.queue_length > EMERGENCY_QUEUE_LENGTH
            && metrics.utilization > EMERGENCY_UTILIZATION
        {
            return ScalingDecisionResult {
                decision: ScalingDecision::EmergencyScaleUp,
                target_size: (current + strategy.max_scale_step).min(strategy.max_size),
                reason: format!(
                    "queue length {} with {:.0}% utilization",
                    metrics.queue_length, metrics.utilization
                ),
                confidence: 95,
            };
        }
        if metrics.error_rate > EMERGENCY_ERROR_RATE
            && metrics.utilization > EMERGENCY_ERROR_UTILIZATION
        {
            return ScalingDecisionResult {
                decision: ScalingDecision::EmergencyScaleUp,
                target_size: (current + 2).min(strategy.max_size),
                reason: format!(
                    "error rate {:.1}% with {:.0}% utilization",
                    metrics.error_rate, metrics.utilization
                ),
                confidence: 90,
            };
        }

        // 2. Critical host pressure forces a shrink, ignoring cooldown
        if metrics.memory_pressure > CRITICAL_PRESSURE || metrics.cpu_pressure > CRITICAL_PRESSURE {
            return ScalingDecisionResult {
                decision: ScalingDecision::ForceScaleDown,
                target_size: current.saturating_sub(1).max(strategy.min_size),
                reason: format!(
                    "critical resource pressure (memory {:.0}%, cpu {:.0}%)",
                    metrics.memory_pressure, metrics.cpu_pressure
                ),
                confidence: 85,
            };
        }

        // 3. Cooldown gate for the normal path
        if in_cooldown {
            return ScalingDecisionResult {
                decision: ScalingDecision::Maintain,
                target_size: current,
                reason: "cooldown period active".to_string(),
                confidence: 100,
            };
        }

        // 4. Normal threshold-driven scaling
        let wants_up = metrics.utilization > strategy.scale_up_threshold
            || (metrics.trend == LoadTrend::Increasing
                && metrics.utilization > strategy.target_utilization);
        if wants_up && current < strategy.max_size {
            let step = if strategy.aggressive_scaling {
                let overshoot = (metrics.utilization - strategy.target_utilization) / 20.0;
                (overshoot.ceil().max(1.0) as u32).min(strategy.max_scale_step)
            } else {
                1
            };
            return ScalingDecisionResult {
                decision: ScalingDecision::ScaleUp,
                target_size: (current + step).min(strategy.max_size),
                reason: format!(
                    "utilization {:.0}% above scale-up threshold {:.0}%",
                    metrics.utilization, strategy.scale_up_threshold
                ),
                confidence: 80,
            };
        }

        let wants_down = metrics.utilization < strategy.scale_down_threshold
            && metrics.queue_length == 0
            && metrics.trend != LoadTrend::Increasing
            && current > strategy.min_size;
        if wants_down {
            return ScalingDecisionResult {
                decision: ScalingDecision::ScaleDown,
                target_size: current.saturating_sub(1).max(strategy.min_size),
                reason: format!(
                    "utilization {:.0}% below scale-down threshold {:.0}%",
                    metrics.utilization, strategy.scale_down_threshold
                ),
                confidence: 75,
            };
        }

        ScalingDecisionResult {
            decision: ScalingDecision::Maintain,
            target_size: current,
            reason: "pool within target operating range".to_string(),
            confidence: 70,
        }
    }
}
