//! Ideal pool size calculation
//!
//! Independent of the decision maker: derives the size the pool would settle
//! at given current load, for planning and dashboards. The calculation
//! chains multiplicative and additive factors and clamps to the strategy's
//! size bounds.

use super::ScalingStrategy;
use crate::models::{LoadTrend, ScalingMetrics};

/// Response time above which extra capacity is added, milliseconds
const SLOW_RESPONSE_MS: f64 = 5000.0;

/// Multi-factor ideal-size heuristic
#[derive(Debug, Default)]
pub struct IdealSizeCalculator;

impl IdealSizeCalculator {
    /// Compute the ideal size for the given snapshot
    pub fn calculate(metrics: &ScalingMetrics, strategy: &ScalingStrategy) -> u32 {
        let current = metrics.current_size as f64;

        // Utilization factor; sub-1% utilization is treated as balanced to
        // avoid amplifying noise near zero
        let utilization_factor = if metrics.utilization < 1.0 {
            1.0
        } else {
            metrics.utilization / strategy.target_utilization
        };
        let mut size = (current * utilization_factor).ceil();

        // Queue pressure adds up to one scale step
        let queue_boost = (metrics.queue_length as f64 / 2.0)
            .min(strategy.max_scale_step as f64)
            .ceil();
        size += queue_boost;

        // Slow responses add up to two workers
        if metrics.response_time_ms > SLOW_RESPONSE_MS {
            let severity = ((metrics.response_time_ms - SLOW_RESPONSE_MS) / SLOW_RESPONSE_MS)
                .min(1.0);
            size += (severity * 2.0).ceil();
        }

        // Trend adjustment
        size = match metrics.trend {
            LoadTrend::Increasing => size + (2.0f64).min(strategy.max_scale_step as f64),
            LoadTrend::Decreasing => (size - 1.0).max(current - 1.0),
            LoadTrend::Volatile => size.max(current),
            LoadTrend::Stable => size,
        };

        // Shed capacity proportionally under host pressure
        if metrics.memory_pressure > strategy.memory_threshold {
            size = (size * (100.0 - metrics.memory_pressure) / 100.0).floor();
        }
        if metrics.cpu_pressure > strategy.cpu_threshold {
            size = (size * (100.0 - metrics.cpu_pressure) / 100.0).floor();
        }

        (size.max(0.0) as u32).clamp(strategy.min_size, strategy.max_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::now_ms;

    fn metrics(current_size: u32, utilization: f64) -> ScalingMetrics {
        ScalingMetrics {
            current_size,
            target_size: current_size,
            utilization,
            queue_length: 0,
            error_rate: 0.0,
            response_time_ms: 200.0,
            memory_usage_bytes: 0,
            cpu_usage: 40.0,
            memory_pressure: 40.0,
            cpu_pressure: 40.0,
            trend: LoadTrend::Stable,
            timestamp: now_ms(),
        }
    }

    #[test]
    fn test_utilization_factor_deterministic() {
        // 5 workers at 80% utilization against a 70% target: ceil(5 * 80/70) = 6
        let m = metrics(5, 80.0);
        let ideal = IdealSizeCalculator::calculate(&m, &ScalingStrategy::balanced());
        assert_eq!(ideal, 6);
    }

    #[test]
    fn test_near_zero_utilization_holds_size() {
        let m = metrics(5, 0.5);
        let strategy = ScalingStrategy::balanced();
        assert_eq!(IdealSizeCalculator::calculate(&m, &strategy), 5);
    }

    #[test]
    fn test_queue_pressure_adds_capacity() {
        let mut m = metrics(5, 70.0);
        m.queue_length = 4;
        let strategy = ScalingStrategy::balanced(); // max_scale_step 2

        // factor 1.0, queue adds min(4/2, 2) = 2
        assert_eq!(IdealSizeCalculator::calculate(&m, &strategy), 7);
    }

    #[test]
    fn test_queue_boost_capped_by_step() {
        let mut m = metrics(5, 70.0);
        m.queue_length = 40;
        let strategy = ScalingStrategy::balanced();
        assert_eq!(IdealSizeCalculator::calculate(&m, &strategy), 7);
    }

    #[test]
    fn test_slow_responses_add_capacity() {
        let mut m = metrics(5, 70.0);
        m.response_time_ms = 10_000.0; // severity 1.0 => +2
        let strategy = ScalingStrategy::balanced();
        assert_eq!(IdealSizeCalculator::calculate(&m, &strategy), 7);
    }

    #[test]
    fn test_increasing_trend_boost() {
        let mut m = metrics(5, 70.0);
        m.trend = LoadTrend::Increasing;
        let strategy = ScalingStrategy::balanced();
        assert_eq!(IdealSizeCalculator::calculate(&m, &strategy), 7);
    }

    #[test]
    fn test_decreasing_trend_floors_at_one_below_current() {
        let mut m = metrics(5, 20.0);
        m.trend = LoadTrend::Decreasing;
        let strategy = ScalingStrategy::balanced();

        // factor 20/70 => ceil(1.43) = 2, then max(2-1, 5-1) = 4
        assert_eq!(IdealSizeCalculator::calculate(&m, &strategy), 4);
    }

    #[test]
    fn test_volatile_trend_never_shrinks_below_current() {
        let mut m = metrics(5, 20.0);
        m.trend = LoadTrend::Volatile;
        let strategy = ScalingStrategy::balanced();
        assert_eq!(IdealSizeCalculator::calculate(&m, &strategy), 5);
    }

    #[test]
    fn test_memory_pressure_shrinks_proportionally() {
        let mut m = metrics(10, 70.0);
        m.memory_pressure = 90.0; // above the 85% balanced threshold
        let strategy = ScalingStrategy::balanced();

        // floor(10 * 0.10) = 1
        assert_eq!(IdealSizeCalculator::calculate(&m, &strategy), 1);
    }

    #[test]
    fn test_clamped_to_strategy_bounds() {
        let m = metrics(18, 100.0);
        let strategy = ScalingStrategy::balanced(); // max_size 20
        assert_eq!(IdealSizeCalculator::calculate(&m, &strategy), 20);
    }
}
