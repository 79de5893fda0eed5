//! Observability infrastructure for the resilience engine
//!
//! Provides:
//! - Prometheus metrics (breaker states, rejections, scaling decisions, stress)
//! - Structured JSON logging with tracing
//! - A background consumer that turns breaker events into log lines

use crate::breaker::{BreakerEvent, CircuitState};
use crate::models::{ScalingDecision, ScalingDecisionResult};
use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct EngineMetricsInner {
    breakers_registered: IntGauge,
    breakers_open: IntGauge,
    state_transitions: IntCounter,
    requests_rejected: IntCounter,
    breakers_evicted: IntCounter,
    scale_up_decisions: IntCounter,
    scale_down_decisions: IntCounter,
    emergency_decisions: IntCounter,
    stress_detections: IntCounter,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            breakers_registered: register_int_gauge!(
                "poolguard_breakers_registered",
                "Number of circuit breakers currently registered"
            )
            .expect("Failed to register breakers_registered"),

            breakers_open: register_int_gauge!(
                "poolguard_breakers_open",
                "Number of circuit breakers currently in the open state"
            )
            .expect("Failed to register breakers_open"),

            state_transitions: register_int_counter!(
                "poolguard_state_transitions_total",
                "Total number of circuit breaker state transitions"
            )
            .expect("Failed to register state_transitions"),

            requests_rejected: register_int_counter!(
                "poolguard_requests_rejected_total",
                "Total number of requests rejected by open breakers"
            )
            .expect("Failed to register requests_rejected"),

            breakers_evicted: register_int_counter!(
                "poolguard_breakers_evicted_total",
                "Total number of breakers evicted from the registry"
            )
            .expect("Failed to register breakers_evicted"),

            scale_up_decisions: register_int_counter!(
                "poolguard_scale_up_decisions_total",
                "Total number of scale-up decisions issued"
            )
            .expect("Failed to register scale_up_decisions"),

            scale_down_decisions: register_int_counter!(
                "poolguard_scale_down_decisions_total",
                "Total number of scale-down decisions issued"
            )
            .expect("Failed to register scale_down_decisions"),

            emergency_decisions: register_int_counter!(
                "poolguard_emergency_decisions_total",
                "Total number of emergency scaling decisions issued"
            )
            .expect("Failed to register emergency_decisions"),

            stress_detections: register_int_counter!(
                "poolguard_stress_detections_total",
                "Total number of system stress detections"
            )
            .expect("Failed to register stress_detections"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Update registry population gauges
    pub fn set_breaker_counts(&self, registered: i64, open: i64) {
        self.inner().breakers_registered.set(registered);
        self.inner().breakers_open.set(open);
    }

    /// Increment the state transition counter
    pub fn inc_state_transitions(&self) {
        self.inner().state_transitions.inc();
    }

    /// Increment the rejected request counter
    pub fn inc_requests_rejected(&self) {
        self.inner().requests_rejected.inc();
    }

    /// Increment the eviction counter
    pub fn inc_breakers_evicted(&self) {
        self.inner().breakers_evicted.inc();
    }

    /// Count an actionable scaling decision by kind
    pub fn record_decision(&self, decision: ScalingDecision) {
        match decision {
            ScalingDecision::ScaleUp => self.inner().scale_up_decisions.inc(),
            ScalingDecision::ScaleDown | ScalingDecision::ForceScaleDown => {
                self.inner().scale_down_decisions.inc()
            }
            ScalingDecision::EmergencyScaleUp => {
                self.inner().scale_up_decisions.inc();
                self.inner().emergency_decisions.inc();
            }
            ScalingDecision::Maintain => {}
        }
    }

    /// Increment the stress detection counter
    pub fn inc_stress_detected(&self) {
        self.inner().stress_detections.inc();
    }
}

/// Structured logger for engine events
///
/// Provides consistent JSON-formatted logging for breaker transitions,
/// scaling decisions, and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    engine_name: String,
}

impl StructuredLogger {
    pub fn new(engine_name: impl Into<String>) -> Self {
        Self {
            engine_name: engine_name.into(),
        }
    }

    /// Log a circuit breaker state transition
    pub fn log_state_transition(&self, breaker: &str, from: CircuitState, to: CircuitState) {
        if to == CircuitState::Open {
            warn!(
                event = "breaker_state_transition",
                engine = %self.engine_name,
                breaker = %breaker,
                from = ?from,
                to = ?to,
                "Circuit breaker opened"
            );
        } else {
            info!(
                event = "breaker_state_transition",
                engine = %self.engine_name,
                breaker = %breaker,
                from = ?from,
                to = ?to,
                "Circuit breaker state changed"
            );
        }
    }

    /// Log a rejected request
    pub fn log_request_rejected(&self, breaker: &str) {
        info!(
            event = "request_rejected",
            engine = %self.engine_name,
            breaker = %breaker,
            "Request rejected by open circuit breaker"
        );
    }

    /// Log a registry eviction
    pub fn log_eviction(&self, breaker: &str, state: CircuitState) {
        info!(
            event = "breaker_evicted",
            engine = %self.engine_name,
            breaker = %breaker,
            state = ?state,
            "Circuit breaker evicted from registry"
        );
    }

    /// Log a scaling decision
    pub fn log_scaling_decision(&self, result: &ScalingDecisionResult) {
        info!(
            event = "scaling_decision",
            engine = %self.engine_name,
            decision = ?result.decision,
            target_size = result.target_size,
            confidence = result.confidence,
            reason = %result.reason,
            "Scaling decision issued"
        );
    }

    /// Log engine startup
    pub fn log_startup(&self, version: &str) {
        info!(
            event = "engine_started",
            engine = %self.engine_name,
            version = %version,
            "Resilience engine started"
        );
    }

    /// Log engine shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            engine = %self.engine_name,
            reason = %reason,
            "Resilience engine shutting down"
        );
    }
}

/// Drain breaker events into structured logs and Prometheus counters
///
/// Runs until the sending side of the channel is dropped.
pub async fn consume_breaker_events(
    mut events: mpsc::Receiver<BreakerEvent>,
    logger: StructuredLogger,
) {
    let metrics = EngineMetrics::new();
    while let Some(event) = events.recv().await {
        match event {
            BreakerEvent::StateTransition { name, from, to } => {
                metrics.inc_state_transitions();
                logger.log_state_transition(&name, from, to);
            }
            BreakerEvent::RequestRejected { name } => {
                metrics.inc_requests_rejected();
                logger.log_request_rejected(&name);
            }
            BreakerEvent::Evicted { name, state } => {
                metrics.inc_breakers_evicted();
                logger.log_eviction(&name, state);
            }
        }
    }
}
