//! Adaptive pool autoscaling
//!
//! The autoscaler pulls raw counters from the pool on each evaluation tick,
//! derives a [`ScalingMetrics`] snapshot, and decides whether to grow,
//! shrink, or hold. Non-maintain decisions are recorded in a bounded event
//! ledger and reset the cooldown clock. Evaluation never fails: a missing
//! pool sample degrades to a low-confidence maintain.

mod calculator;
mod decision;
mod ideal;
mod strategy;

pub use calculator::MetricsCalculator;
pub use decision::DecisionMaker;
pub use ideal::IdealSizeCalculator;
pub use strategy::ScalingStrategy;

use crate::error::ConfigError;
use crate::models::{
    now_ms, PoolSample, ScalingDecision, ScalingDecisionResult, ScalingEvent, ScalingMetrics,
};
use crate::observability::EngineMetrics;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

/// Scaling events retained in the ledger
const EVENT_LEDGER_LIMIT: usize = 100;

/// Default cadence of the evaluation loop
const DEFAULT_EVALUATION_INTERVAL: Duration = Duration::from_secs(30);

/// Confidence reported when pool metrics could not be sampled
const DEGRADED_CONFIDENCE: u8 = 10;

/// Supplies raw pool and host counters on demand
#[async_trait]
pub trait PoolStatsSource: Send + Sync {
    /// Sample the pool's current counters
    async fn sample(&self) -> Result<PoolSample>;
}

/// Cooldown clock and event ledger, sequenced behind one lock since they
/// gate subsequent decisions
#[derive(Debug, Default)]
struct ScalerState {
    last_scaling_ms: Option<i64>,
    events: VecDeque<ScalingEvent>,
}

/// Continuously recomputes the ideal pool size and emits scaling decisions
pub struct AutoScaler {
    source: Arc<dyn PoolStatsSource>,
    strategy: ScalingStrategy,
    calculator: Mutex<MetricsCalculator>,
    state: Mutex<ScalerState>,
    last_metrics: Mutex<Option<ScalingMetrics>>,
    decision_tx: mpsc::Sender<ScalingDecisionResult>,
    evaluation_interval: Duration,
    engine_metrics: EngineMetrics,
}

impl AutoScaler {
    /// Create an autoscaler over a pool stats source
    ///
    /// Returns the scaler and the channel on which the pool owner receives
    /// decisions from the evaluation loop. The strategy is validated here;
    /// invalid configuration never reaches the evaluation path.
    pub fn new(
        source: Arc<dyn PoolStatsSource>,
        strategy: ScalingStrategy,
    ) -> Result<(Self, mpsc::Receiver<ScalingDecisionResult>), ConfigError> {
        let strategy = strategy.validated()?;
        let (tx, rx) = mpsc::channel(16);
        let scaler = Self {
            source,
            strategy,
            calculator: Mutex::new(MetricsCalculator::new()),
            state: Mutex::new(ScalerState::default()),
            last_metrics: Mutex::new(None),
            decision_tx: tx,
            evaluation_interval: DEFAULT_EVALUATION_INTERVAL,
            engine_metrics: EngineMetrics::new(),
        };
        Ok((scaler, rx))
    }

    /// Override the evaluation loop cadence
    pub fn with_evaluation_interval(mut self, interval: Duration) -> Self {
        self.evaluation_interval = interval;
        self
    }

    pub fn strategy(&self) -> &ScalingStrategy {
        &self.strategy
    }

    /// Run one evaluation and return the decision
    ///
    /// Never fails: a sampling error degrades to a low-confidence maintain
    /// so the evaluation cycle always completes within its tick.
    pub async fn evaluate(&self) -> ScalingDecisionResult {
        let sample = match self.source.sample().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "Pool sample unavailable, maintaining size");
                let current = self
                    .last_metrics
                    .lock()
                    .await
                    .as_ref()
                    .map(|m| m.current_size)
                    .unwrap_or(0);
                return ScalingDecisionResult {
                    decision: ScalingDecision::Maintain,
                    target_size: current,
                    reason: "pool metrics unavailable".to_string(),
                    confidence: DEGRADED_CONFIDENCE,
                };
            }
        };

        let metrics = self.calculator.lock().await.compute(&sample);
        *self.last_metrics.lock().await = Some(metrics.clone());

        let now = now_ms();
        let mut state = self.state.lock().await;
        let in_cooldown = state
            .last_scaling_ms
            .map(|last| now - last < self.strategy.cooldown_period.as_millis() as i64)
            .unwrap_or(false);

        let result = DecisionMaker::decide(&metrics, &self.strategy, in_cooldown);

        if result.decision.is_actionable() {
            state.last_scaling_ms = Some(now);
            state.events.push_back(ScalingEvent {
                timestamp: now,
                decision: result.decision,
                previous_size: metrics.current_size,
                new_size: result.target_size,
                metrics: metrics.clone(),
                reason: result.reason.clone(),
                confidence: result.confidence,
            });
            while state.events.len() > EVENT_LEDGER_LIMIT {
                state.events.pop_front();
            }
            drop(state);

            self.engine_metrics.record_decision(result.decision);
            info!(
                decision = ?result.decision,
                previous_size = metrics.current_size,
                target_size = result.target_size,
                confidence = result.confidence,
                reason = %result.reason,
                "Scaling decision"
            );
        } else {
            debug!(
                target_size = result.target_size,
                reason = %result.reason,
                "Holding pool size"
            );
        }

        result
    }

    /// Ideal pool size derived from the most recent snapshot
    ///
    /// Independent of the decision path; intended for planning and
    /// dashboards. `None` until the first successful evaluation.
    pub async fn ideal_size(&self) -> Option<u32> {
        let metrics = self.last_metrics.lock().await.clone()?;
        Some(IdealSizeCalculator::calculate(&metrics, &self.strategy))
    }

    /// The most recent metrics snapshot
    pub async fn last_metrics(&self) -> Option<ScalingMetrics> {
        self.last_metrics.lock().await.clone()
    }

    /// Scaling events, oldest first
    pub async fn history(&self) -> Vec<ScalingEvent> {
        self.state.lock().await.events.iter().cloned().collect()
    }

    /// Clear snapshot history, the event ledger, and the cooldown clock
    pub async fn reset(&self) {
        self.calculator.lock().await.reset();
        let mut state = self.state.lock().await;
        state.last_scaling_ms = None;
        state.events.clear();
        drop(state);
        *self.last_metrics.lock().await = None;
        info!("Autoscaler reset");
    }

    /// Evaluation loop: ticks on the configured cadence and forwards each
    /// decision to the pool owner until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.evaluation_interval.as_secs(),
            "Starting scaling evaluator"
        );
        let mut ticker = tokio::time::interval(self.evaluation_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = self.evaluate().await;
                    // The pool owner may lag behind a tick; decisions are
                    // droppable, the next tick recomputes from scratch.
                    if let Err(e) = self.decision_tx.try_send(result) {
                        debug!(error = %e, "Decision channel full, dropping result");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scaling evaluator");
                    break;
                }
            }
        }
    }
}
