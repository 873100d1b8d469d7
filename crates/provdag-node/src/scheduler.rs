//! Periodic tier aggregation.
//!
//! Pending data blocks are folded once `data_block_threshold` of them have
//! accumulated, or once `window` has passed with at least one pending.
//! Pending aggregation blocks are checkpointed at `checkpoint_threshold`.

use std::sync::Arc;
use std::time::Duration;

use provdag_types::Digest;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::error::NodeResult;
use crate::node::Node;

/// What one scheduler step did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub aggregated: Option<Digest>,
    pub checkpointed: Option<Digest>,
}

/// Drives aggregation for one node.
pub struct AggregationScheduler {
    node: Arc<Node>,
    last_fold: Instant,
    tick: Duration,
}

impl AggregationScheduler {
    pub fn new(node: Arc<Node>) -> Self {
        let window = node.config().aggregation.window();
        Self {
            node,
            last_fold: Instant::now(),
            tick: (window / 4).clamp(Duration::from_millis(10), Duration::from_secs(1)),
        }
    }

    /// Override the polling interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    /// Run one round of threshold and window checks as of `now`.
    pub fn step(&mut self, now: Instant) -> NodeResult<StepOutcome> {
        let policy = &self.node.config().aggregation;
        let mut outcome = StepOutcome::default();

        let pending = self.node.store().pending_data_count();
        let window_elapsed = now.saturating_duration_since(self.last_fold) >= policy.window();
        if pending > 0 && (pending >= policy.data_block_threshold || window_elapsed) {
            let agg = self.node.aggregate_pending()?;
            outcome.aggregated = Some(agg.hash);
            self.last_fold = now;
        }

        let pending_aggs = self.node.store().pending_aggregations()?.len();
        if pending_aggs > 0 && pending_aggs >= policy.checkpoint_threshold {
            let ckpt = self.node.checkpoint_pending()?;
            outcome.checkpointed = Some(ckpt.hash);
        }
        Ok(outcome)
    }

    /// Run on the tokio runtime until the handle is shut down.
    pub fn spawn(mut self) -> SchedulerHandle {
        let (shutdown, mut stop) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut interval = time::interval(self.tick);
            info!(tick = ?self.tick, "aggregation scheduler started");
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    now = interval.tick() => match self.step(now) {
                        Ok(outcome) if outcome != StepOutcome::default() => {
                            debug!(?outcome, "aggregation step");
                        }
                        Ok(_) => {}
                        Err(e) if e.is_no_input() => {}
                        Err(e) => warn!(error = %e, "aggregation step failed"),
                    },
                }
            }
            info!("aggregation scheduler stopped");
        });
        SchedulerHandle { shutdown, task }
    }
}

/// Handle to a running scheduler task.
pub struct SchedulerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "aggregation scheduler task panicked");
        }
    }
}
