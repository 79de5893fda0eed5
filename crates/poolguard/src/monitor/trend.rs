//! Linear-regression trend analysis
//!
//! Fits an ordinary-least-squares line over a metric's recent data points
//! and reduces it to a direction, a confidence (R²), and optionally a
//! short/medium/long-term forecast.

use super::collector::PerformanceDataPoint;
use super::MetricType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum data points before a trend is reported
const MIN_DATA_POINTS: usize = 10;

/// Slope magnitude below which a series is considered flat
const FLAT_SLOPE: f64 = 0.1;

/// Confidence required before forecasting is attempted
const FORECAST_CONFIDENCE: f64 = 0.5;

/// Forecast horizons, in analysis steps ahead
const FORECAST_STEPS: (f64, f64, f64) = (5.0, 20.0, 50.0);

/// Direction of a fitted trend line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Projected values along the fitted line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendForecast {
    pub short_term: f64,
    pub medium_term: f64,
    pub long_term: f64,
}

/// Result of one analysis pass over a metric's series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceTrend {
    pub metric_type: MetricType,
    pub direction: TrendDirection,
    pub slope: f64,
    /// R² of the fit, 0-1
    pub confidence: f64,
    pub data_points: usize,
    /// Elapsed time covered by the analyzed points, milliseconds
    pub timespan_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<TrendForecast>,
}

impl PerformanceTrend {
    /// Zero-confidence default when a series has too little data
    fn insufficient(metric_type: MetricType, data_points: usize) -> Self {
        Self {
            metric_type,
            direction: TrendDirection::Stable,
            slope: 0.0,
            confidence: 0.0,
            data_points,
            timespan_ms: 0,
            forecast: None,
        }
    }
}

/// Configuration for the trend analyzer
#[derive(Debug, Clone)]
pub struct TrendAnalyzerConfig {
    /// Only points within this trailing window are analyzed
    pub analysis_window: Duration,
    /// Whether forecasts are produced for confident fits
    pub predictive: bool,
}

impl Default for TrendAnalyzerConfig {
    fn default() -> Self {
        Self {
            analysis_window: Duration::from_secs(600),
            predictive: true,
        }
    }
}

/// Fits and classifies trends over metric series
#[derive(Debug, Default)]
pub struct TrendAnalyzer {
    config: TrendAnalyzerConfig,
}

impl TrendAnalyzer {
    pub fn new(config: TrendAnalyzerConfig) -> Self {
        Self { config }
    }

    /// Analyze one metric's points (assumed sorted by timestamp)
    pub fn analyze(
        &self,
        metric_type: MetricType,
        points: &[PerformanceDataPoint],
        now_ms: i64,
    ) -> PerformanceTrend {
        let cutoff = now_ms - self.config.analysis_window.as_millis() as i64;
        let window: Vec<&PerformanceDataPoint> =
            points.iter().filter(|p| p.timestamp >= cutoff).collect();

        if window.len() < MIN_DATA_POINTS {
            return PerformanceTrend::insufficient(metric_type, window.len());
        }

        let n = window.len() as f64;
        // Regress over point index rather than wall time: series arrive on a
        // roughly fixed cadence and index keeps the slope scale-free.
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_xx = 0.0;
        for (i, point) in window.iter().enumerate() {
            let x = i as f64;
            sum_x += x;
            sum_y += point.value;
            sum_xy += x * point.value;
            sum_xx += x * x;
        }

        let denominator = n * sum_xx - sum_x * sum_x;
        let slope = if denominator.abs() < f64::EPSILON {
            0.0
        } else {
            (n * sum_xy - sum_x * sum_y) / denominator
        };
        let intercept = (sum_y - slope * sum_x) / n;

        let mean_y = sum_y / n;
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (i, point) in window.iter().enumerate() {
            let predicted = intercept + slope * i as f64;
            ss_res += (point.value - predicted).powi(2);
            ss_tot += (point.value - mean_y).powi(2);
        }
        let confidence = if ss_tot.abs() < f64::EPSILON {
            0.0
        } else {
            1.0 - ss_res / ss_tot
        };

        let direction = if slope > FLAT_SLOPE {
            TrendDirection::Increasing
        } else if slope < -FLAT_SLOPE {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };

        let forecast = if self.config.predictive && confidence > FORECAST_CONFIDENCE {
            let last_index = n - 1.0;
            let project =
                |steps: f64| (intercept + slope * (last_index + steps)).max(0.0);
            Some(TrendForecast {
                short_term: project(FORECAST_STEPS.0),
                medium_term: project(FORECAST_STEPS.1),
                long_term: project(FORECAST_STEPS.2),
            })
        } else {
            None
        };

        let timespan_ms = window
            .last()
            .map(|last| last.timestamp - window[0].timestamp)
            .unwrap_or(0);

        PerformanceTrend {
            metric_type,
            direction,
            slope,
            confidence,
            data_points: window.len(),
            timespan_ms,
            forecast,
        }
    }
}
