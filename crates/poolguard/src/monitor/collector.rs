//! General-purpose performance time series storage
//!
//! Append-only per-metric-type buffers, distinct from the circuit breaker's
//! window metrics. Buffers are capped and support type/time-range filtered
//! reads plus retention-based cleanup.

use super::MetricType;
use crate::models::now_ms;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Data points retained per metric type (oldest dropped)
const POINTS_PER_TYPE_LIMIT: usize = 10_000;

/// Rough per-point memory footprint for the usage estimate
const BYTES_PER_POINT: usize = 200;

/// One observation of a named metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceDataPoint {
    pub timestamp: i64,
    pub metric_type: MetricType,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl PerformanceDataPoint {
    /// Bare observation stamped with the current time
    pub fn new(metric_type: MetricType, value: f64) -> Self {
        Self {
            timestamp: now_ms(),
            metric_type,
            value,
            metadata: None,
            tags: None,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Capped per-type time series buffers
#[derive(Debug, Default)]
pub struct PerformanceCollector {
    buffers: HashMap<MetricType, VecDeque<PerformanceDataPoint>>,
}

impl PerformanceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a data point, evicting the oldest at capacity
    pub fn record(&mut self, point: PerformanceDataPoint) {
        let buffer = self.buffers.entry(point.metric_type).or_default();
        buffer.push_back(point);
        while buffer.len() > POINTS_PER_TYPE_LIMIT {
            buffer.pop_front();
        }
    }

    /// Append a bare observation stamped with the current time
    pub fn record_value(&mut self, metric_type: MetricType, value: f64) {
        self.record(PerformanceDataPoint::new(metric_type, value));
    }

    /// Points filtered by type and/or inclusive timestamp range
    pub fn points(
        &self,
        metric_type: Option<MetricType>,
        time_range: Option<(i64, i64)>,
    ) -> Vec<PerformanceDataPoint> {
        let in_range = |p: &PerformanceDataPoint| {
            time_range
                .map(|(start, end)| p.timestamp >= start && p.timestamp <= end)
                .unwrap_or(true)
        };

        match metric_type {
            Some(t) => self
                .buffers
                .get(&t)
                .map(|buf| buf.iter().filter(|p| in_range(p)).cloned().collect())
                .unwrap_or_default(),
            None => self
                .buffers
                .values()
                .flatten()
                .filter(|p| in_range(p))
                .cloned()
                .collect(),
        }
    }

    /// Drop points older than the retention period, returning the count removed
    pub fn cleanup_old_data(&mut self, retention: Duration) -> usize {
        let cutoff = now_ms() - retention.as_millis() as i64;
        let mut removed = 0;
        for buffer in self.buffers.values_mut() {
            while let Some(front) = buffer.front() {
                if front.timestamp < cutoff {
                    buffer.pop_front();
                    removed += 1;
                } else {
                    break;
                }
            }
        }
        removed
    }

    pub fn point_count(&self, metric_type: MetricType) -> usize {
        self.buffers.get(&metric_type).map_or(0, VecDeque::len)
    }

    pub fn total_points(&self) -> usize {
        self.buffers.values().map(VecDeque::len).sum()
    }

    /// Rough in-memory footprint of the retained series
    pub fn estimated_memory_bytes(&self) -> usize {
        self.total_points() * BYTES_PER_POINT
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
