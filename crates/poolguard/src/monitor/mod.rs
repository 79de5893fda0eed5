//! Performance and trend monitoring
//!
//! Ingests arbitrary named metrics into capped time-series buffers, reduces
//! them to slope/confidence/forecast trends on each analysis pass, and
//! detects system-wide stress from the combination of degrading health
//! metrics.

mod collector;
mod trend;

pub use collector::{PerformanceCollector, PerformanceDataPoint};
pub use trend::{
    PerformanceTrend, TrendAnalyzer, TrendAnalyzerConfig, TrendDirection, TrendForecast,
};

use crate::models::now_ms;
use crate::observability::EngineMetrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Confidence a degrading trend needs before it counts toward stress
const STRESS_CONFIDENCE: f64 = 0.6;

/// Degrading health metrics required to declare system stress
const STRESS_METRIC_COUNT: usize = 2;

/// Health metrics consulted for stress detection
const STRESS_METRICS: [MetricType; 3] = [
    MetricType::ErrorRate,
    MetricType::Latency,
    MetricType::ResponseTime,
];

/// Default cadence of the periodic analysis loop
const DEFAULT_ANALYSIS_INTERVAL: Duration = Duration::from_secs(60);

/// Kinds of metrics the monitor tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Latency,
    Throughput,
    ErrorRate,
    ResponseTime,
    Availability,
    Utilization,
    QueueDepth,
    MemoryUsage,
    CpuUsage,
}

impl MetricType {
    /// Whether a rising value of this metric is good news
    ///
    /// Throughput and availability improve as they increase; every other
    /// tracked metric degrades as it increases.
    fn higher_is_better(&self) -> bool {
        matches!(self, MetricType::Throughput | MetricType::Availability)
    }
}

/// Semantic judgment of a raw trend direction for a given metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendAssessment {
    Improving,
    Degrading,
    Stable,
}

/// Time-series ingestion plus periodic trend analysis and stress detection
pub struct PerformanceMonitor {
    collector: RwLock<PerformanceCollector>,
    analyzer: TrendAnalyzer,
    trends: RwLock<HashMap<MetricType, PerformanceTrend>>,
    analysis_interval: Duration,
    engine_metrics: EngineMetrics,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(TrendAnalyzerConfig::default())
    }
}

impl PerformanceMonitor {
    pub fn new(analyzer_config: TrendAnalyzerConfig) -> Self {
        Self {
            collector: RwLock::new(PerformanceCollector::new()),
            analyzer: TrendAnalyzer::new(analyzer_config),
            trends: RwLock::new(HashMap::new()),
            analysis_interval: DEFAULT_ANALYSIS_INTERVAL,
            engine_metrics: EngineMetrics::new(),
        }
    }

    /// Override the periodic analysis cadence
    pub fn with_analysis_interval(mut self, interval: Duration) -> Self {
        self.analysis_interval = interval;
        self
    }

    /// Ingest one data point
    pub async fn record(&self, point: PerformanceDataPoint) {
        self.collector.write().await.record(point);
    }

    /// Ingest a bare observation stamped with the current time
    pub async fn record_value(&self, metric_type: MetricType, value: f64) {
        self.collector.write().await.record_value(metric_type, value);
    }

    /// Points filtered by type and/or timestamp range
    pub async fn points(
        &self,
        metric_type: Option<MetricType>,
        time_range: Option<(i64, i64)>,
    ) -> Vec<PerformanceDataPoint> {
        self.collector.read().await.points(metric_type, time_range)
    }

    /// Rough memory footprint of the retained series
    pub async fn estimated_memory_bytes(&self) -> usize {
        self.collector.read().await.estimated_memory_bytes()
    }

    /// Drop points older than the retention period
    pub async fn cleanup_old_data(&self, retention: Duration) -> usize {
        let removed = self.collector.write().await.cleanup_old_data(retention);
        if removed > 0 {
            debug!(removed, "Dropped expired performance data points");
        }
        removed
    }

    /// Re-analyze every tracked metric and cache the resulting trends
    pub async fn analyze_all(&self) -> HashMap<MetricType, PerformanceTrend> {
        let now = now_ms();
        let collector = self.collector.read().await;

        let mut fresh = HashMap::new();
        for metric_type in [
            MetricType::Latency,
            MetricType::Throughput,
            MetricType::ErrorRate,
            MetricType::ResponseTime,
            MetricType::Availability,
            MetricType::Utilization,
            MetricType::QueueDepth,
            MetricType::MemoryUsage,
            MetricType::CpuUsage,
        ] {
            if collector.point_count(metric_type) == 0 {
                continue;
            }
            let points = collector.points(Some(metric_type), None);
            fresh.insert(metric_type, self.analyzer.analyze(metric_type, &points, now));
        }
        drop(collector);

        *self.trends.write().await = fresh.clone();
        fresh
    }

    /// Last analyzed trend for a metric, if any
    pub async fn trend(&self, metric_type: MetricType) -> Option<PerformanceTrend> {
        self.trends.read().await.get(&metric_type).cloned()
    }

    /// Map a metric's raw direction to improving/degrading/stable
    pub async fn assess(&self, metric_type: MetricType) -> TrendAssessment {
        let Some(trend) = self.trend(metric_type).await else {
            return TrendAssessment::Stable;
        };
        assess_direction(metric_type, trend.direction)
    }

    /// True when at least two health metrics are confidently degrading
    pub async fn indicates_system_stress(&self) -> bool {
        let trends = self.trends.read().await;
        let degrading = STRESS_METRICS
            .iter()
            .filter(|metric_type| {
                trends.get(metric_type).is_some_and(|trend| {
                    trend.confidence > STRESS_CONFIDENCE
                        && assess_direction(**metric_type, trend.direction)
                            == TrendAssessment::Degrading
                })
            })
            .count();
        degrading >= STRESS_METRIC_COUNT
    }

    /// Periodic analysis loop: re-analyzes on the configured cadence and
    /// raises a structured warning whenever system stress is detected
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.analysis_interval.as_secs(),
            "Starting performance monitor"
        );
        let mut ticker = tokio::time::interval(self.analysis_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let trends = self.analyze_all().await;
                    if self.indicates_system_stress().await {
                        self.engine_metrics.inc_stress_detected();
                        warn!(
                            event = "system_stress_detected",
                            analyzed_metrics = trends.len(),
                            "Multiple health metrics degrading"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down performance monitor");
                    break;
                }
            }
        }
    }
}

fn assess_direction(metric_type: MetricType, direction: TrendDirection) -> TrendAssessment {
    match direction {
        TrendDirection::Stable => TrendAssessment::Stable,
        TrendDirection::Increasing => {
            if metric_type.higher_is_better() {
                TrendAssessment::Improving
            } else {
                TrendAssessment::Degrading
            }
        }
        TrendDirection::Decreasing => {
            if metric_type.higher_is_better() {
                TrendAssessment::Degrading
            } else {
                TrendAssessment::Improving
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn feed_series(monitor: &PerformanceMonitor, metric_type: MetricType, values: &[f64]) {
        let now = now_ms();
        let n = values.len() as i64;
        for (i, value) in values.iter().enumerate() {
            monitor
                .record(PerformanceDataPoint {
                    timestamp: now - (n - i as i64 - 1) * 1000,
                    ..PerformanceDataPoint::new(metric_type, *value)
                })
                .await;
        }
    }

    fn rising() -> Vec<f64> {
        (1..=20).map(|i| i as f64).collect()
    }

    #[tokio::test]
    async fn test_analyze_all_covers_fed_metrics() {
        let monitor = PerformanceMonitor::default();
        feed_series(&monitor, MetricType::Latency, &rising()).await;
        feed_series(&monitor, MetricType::Throughput, &rising()).await;

        let trends = monitor.analyze_all().await;
        assert_eq!(trends.len(), 2);
        assert_eq!(
            trends[&MetricType::Latency].direction,
            TrendDirection::Increasing
        );
    }

    #[tokio::test]
    async fn test_assessment_depends_on_metric_semantics() {
        let monitor = PerformanceMonitor::default();
        feed_series(&monitor, MetricType::Latency, &rising()).await;
        feed_series(&monitor, MetricType::Throughput, &rising()).await;
        monitor.analyze_all().await;

        // Rising latency degrades; rising throughput improves
        assert_eq!(monitor.assess(MetricType::Latency).await, TrendAssessment::Degrading);
        assert_eq!(
            monitor.assess(MetricType::Throughput).await,
            TrendAssessment::Improving
        );
    }

    #[tokio::test]
    async fn test_unseen_metric_assesses_stable() {
        let monitor = PerformanceMonitor::default();
        assert_eq!(
            monitor.assess(MetricType::CpuUsage).await,
            TrendAssessment::Stable
        );
    }

    #[tokio::test]
    async fn test_stress_requires_two_degrading_metrics() {
        let monitor = PerformanceMonitor::default();
        feed_series(&monitor, MetricType::ErrorRate, &rising()).await;
        monitor.analyze_all().await;
        assert!(!monitor.indicates_system_stress().await);

        feed_series(&monitor, MetricType::Latency, &rising()).await;
        monitor.analyze_all().await;
        assert!(monitor.indicates_system_stress().await);
    }

    #[tokio::test]
    async fn test_improving_health_is_not_stress() {
        let monitor = PerformanceMonitor::default();
        let falling: Vec<f64> = (1..=20).map(|i| 100.0 - i as f64).collect();
        feed_series(&monitor, MetricType::ErrorRate, &falling).await;
        feed_series(&monitor, MetricType::Latency, &falling).await;
        feed_series(&monitor, MetricType::ResponseTime, &falling).await;
        monitor.analyze_all().await;

        assert!(!monitor.indicates_system_stress().await);
    }

    #[tokio::test]
    async fn test_low_confidence_does_not_count_toward_stress() {
        let monitor = PerformanceMonitor::default();
        // Noisy series: direction may wobble but the fit is poor
        let noisy: Vec<f64> = (0..20)
            .map(|i| if i % 2 == 0 { 10.0 } else { 90.0 })
            .collect();
        feed_series(&monitor, MetricType::ErrorRate, &noisy).await;
        feed_series(&monitor, MetricType::Latency, &noisy).await;
        monitor.analyze_all().await;

        assert!(!monitor.indicates_system_stress().await);
    }

    #[tokio::test]
    async fn test_cleanup_and_memory_estimate() {
        let monitor = PerformanceMonitor::default();
        feed_series(&monitor, MetricType::Latency, &rising()).await;

        assert_eq!(monitor.estimated_memory_bytes().await, 20 * 200);
        let removed = monitor.cleanup_old_data(Duration::from_secs(5)).await;
        assert!(removed > 0);
    }
}
