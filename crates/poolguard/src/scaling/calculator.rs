//! Scaling metrics calculation and trend classification
//!
//! Turns raw pool counters into a [`ScalingMetrics`] snapshot with derived
//! pressure figures, and classifies the load trend over a bounded history
//! of recent snapshots.

use crate::models::{now_ms, LoadTrend, PoolSample, ScalingMetrics};
use std::collections::VecDeque;

/// Snapshots retained for trend classification
const TREND_HISTORY_LIMIT: usize = 10;

/// Utilization variance above which the trend is volatile
const VOLATILITY_VARIANCE: f64 = 400.0;

/// Mean utilization shift between window halves that marks a directional trend
const TREND_SHIFT: f64 = 10.0;

/// Derives scaling metrics from raw pool samples
#[derive(Debug, Default)]
pub struct MetricsCalculator {
    history: VecDeque<ScalingMetrics>,
}

impl MetricsCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute a fresh snapshot and fold it into the trend history
    pub fn compute(&mut self, sample: &PoolSample) -> ScalingMetrics {
        let memory_pressure = if sample.heap_total_bytes > 0 {
            sample.heap_used_bytes as f64 / sample.heap_total_bytes as f64 * 100.0
        } else {
            0.0
        };
        let cpu_pressure = sample.cpu_usage.min(100.0);
        let error_rate = if sample.total_requests > 0 {
            sample.total_errors as f64 / sample.total_requests as f64 * 100.0
        } else {
            0.0
        };

        let trend = self.classify_trend(sample.utilization);

        let metrics = ScalingMetrics {
            current_size: sample.current_size,
            target_size: sample.target_size,
            utilization: sample.utilization,
            queue_length: sample.queue_length,
            error_rate,
            response_time_ms: sample.avg_response_time_ms,
            memory_usage_bytes: sample.heap_used_bytes,
            cpu_usage: sample.cpu_usage,
            memory_pressure,
            cpu_pressure,
            trend,
            timestamp: now_ms(),
        };

        self.history.push_back(metrics.clone());
        while self.history.len() > TREND_HISTORY_LIMIT {
            self.history.pop_front();
        }

        metrics
    }

    /// Recent snapshots, oldest first
    pub fn history(&self) -> impl Iterator<Item = &ScalingMetrics> {
        self.history.iter()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Classify the utilization trend over the retained history plus the
    /// incoming value
    ///
    /// High variance wins over direction; otherwise the mean of the second
    /// half of the window is compared against the first half.
    fn classify_trend(&self, current_utilization: f64) -> LoadTrend {
        // At most 10 samples including the incoming value: a full history
        // contributes only its most recent 9 snapshots.
        let skip = (self.history.len() + 1).saturating_sub(TREND_HISTORY_LIMIT);
        let mut utilizations: Vec<f64> = self
            .history
            .iter()
            .skip(skip)
            .map(|m| m.utilization)
            .collect();
        utilizations.push(current_utilization);

        let n = utilizations.len();
        if n < 2 {
            return LoadTrend::Stable;
        }

        let mean = utilizations.iter().sum::<f64>() / n as f64;
        let variance = utilizations
            .iter()
            .map(|u| (u - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        if variance > VOLATILITY_VARIANCE {
            return LoadTrend::Volatile;
        }

        let mid = n / 2;
        let first_mean = utilizations[..mid].iter().sum::<f64>() / mid as f64;
        let second_mean =
            utilizations[mid..].iter().sum::<f64>() / (n - mid) as f64;
        let shift = second_mean - first_mean;

        if shift > TREND_SHIFT {
            LoadTrend::Increasing
        } else if shift < -TREND_SHIFT {
            LoadTrend::Decreasing
        } else {
            LoadTrend::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(utilization: f64) -> PoolSample {
        PoolSample {
            current_size: 5,
            target_size: 5,
            utilization,
            queue_length: 0,
            total_requests: 100,
            total_errors: 5,
            avg_response_time_ms: 200.0,
            heap_used_bytes: 512 * 1024 * 1024,
            heap_total_bytes: 1024 * 1024 * 1024,
            cpu_usage: 40.0,
        }
    }

    #[test]
    fn test_derived_pressures() {
        let mut calc = MetricsCalculator::new();
        let metrics = calc.compute(&sample(50.0));

        assert!((metrics.memory_pressure - 50.0).abs() < 1e-9);
        assert!((metrics.cpu_pressure - 40.0).abs() < 1e-9);
        assert!((metrics.error_rate - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_pressure_clamped() {
        let mut calc = MetricsCalculator::new();
        let mut s = sample(50.0);
        s.cpu_usage = 180.0;
        assert!((calc.compute(&s).cpu_pressure - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_totals_degrade_to_zero_rates() {
        let mut calc = MetricsCalculator::new();
        let mut s = sample(50.0);
        s.total_requests = 0;
        s.total_errors = 0;
        s.heap_total_bytes = 0;

        let metrics = calc.compute(&s);
        assert_eq!(metrics.error_rate, 0.0);
        assert_eq!(metrics.memory_pressure, 0.0);
    }

    #[test]
    fn test_single_snapshot_is_stable() {
        let mut calc = MetricsCalculator::new();
        assert_eq!(calc.compute(&sample(50.0)).trend, LoadTrend::Stable);
    }

    #[test]
    fn test_increasing_trend() {
        let mut calc = MetricsCalculator::new();
        let mut last = LoadTrend::Stable;
        for u in [40.0, 42.0, 44.0, 58.0, 60.0, 62.0] {
            last = calc.compute(&sample(u)).trend;
        }
        assert_eq!(last, LoadTrend::Increasing);
    }

    #[test]
    fn test_decreasing_trend() {
        let mut calc = MetricsCalculator::new();
        let mut last = LoadTrend::Stable;
        for u in [62.0, 60.0, 58.0, 44.0, 42.0, 40.0] {
            last = calc.compute(&sample(u)).trend;
        }
        assert_eq!(last, LoadTrend::Decreasing);
    }

    #[test]
    fn test_volatile_trend_wins() {
        let mut calc = MetricsCalculator::new();
        let mut last = LoadTrend::Stable;
        for u in [10.0, 90.0, 15.0, 85.0, 5.0, 95.0] {
            last = calc.compute(&sample(u)).trend;
        }
        assert_eq!(last, LoadTrend::Volatile);
    }

    #[test]
    fn test_trend_window_excludes_oldest_snapshot() {
        let mut calc = MetricsCalculator::new();
        // An old outlier followed by a full window of steady load: the
        // outlier is the 11th-most-recent sample by the final compute and
        // must not drag the classification toward increasing.
        calc.compute(&sample(0.0));
        let mut last = LoadTrend::Stable;
        for _ in 0..10 {
            last = calc.compute(&sample(60.0)).trend;
        }
        assert_eq!(last, LoadTrend::Stable);
    }

    #[test]
    fn test_history_bounded_to_ten() {
        let mut calc = MetricsCalculator::new();
        for _ in 0..25 {
            calc.compute(&sample(50.0));
        }
        assert_eq!(calc.history().count(), 10);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut calc = MetricsCalculator::new();
        for _ in 0..5 {
            calc.compute(&sample(50.0));
        }
        calc.reset();
        assert_eq!(calc.history().count(), 0);
    }
}
