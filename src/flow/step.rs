//! Driver for a step that suspends on a checkpoint until an operator decides.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::checkpoint::{observe, CheckpointFeed, WatchTarget};
use crate::error::FlowError;
use crate::flow::FlowBackend;
use crate::types::{DualOutcome, EventBody, EventId, SessionId};

/// Shown to the visitor when the operator rejects their input
pub const REJECTED_MESSAGE: &str = "That didn't match. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Approved; the step index moved to `new_index`
    Advanced { new_index: u32 },
    /// Rejected; clear the inputs and let the visitor retry
    Rejected { message: String },
    /// The wait was cleared as stale before a decision arrived
    Stale,
    /// The step was abandoned while waiting
    Cancelled,
    /// Offline session: nothing is persisted, the flow continues locally
    Unpersisted,
}

/// One mounted checkpointed step for a (session, resolution) pair.
///
/// `mount` clears any wait left behind by an earlier load. `unmount` cancels
/// an outstanding wait and clears the checkpoint this step opened.
pub struct CheckpointedStep<B: FlowBackend + 'static> {
    backend: Arc<B>,
    session: SessionId,
    resolution: String,
    poll_interval: Duration,
    cancel: CancellationToken,
    opened: Mutex<Option<EventId>>,
}

impl<B: FlowBackend + 'static> CheckpointedStep<B> {
    pub fn new(
        backend: Arc<B>,
        session: SessionId,
        resolution: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            session,
            resolution: resolution.into(),
            poll_interval,
            cancel: CancellationToken::new(),
            opened: Mutex::new(None),
        }
    }

    pub fn resolution(&self) -> &str {
        &self.resolution
    }

    fn set_opened(&self, value: Option<EventId>) {
        *self.opened.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    fn take_opened(&self) -> Option<EventId> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Clear an abandoned wait from a previous load of this step
    pub async fn mount(&self) -> Result<(), FlowError> {
        if self.session.is_offline() {
            return Ok(());
        }
        let status = self
            .backend
            .clear_stale(&self.session, &self.resolution)
            .await?;
        if !status.is_missing() {
            tracing::info!(session_id = %self.session, resolution = %self.resolution, "cleared stale checkpoint on mount");
        }
        Ok(())
    }

    /// Record the visitor's inputs, open the checkpoint and wait for the decision
    pub async fn submit(&self, inputs: Vec<EventBody>) -> Result<StepOutcome, FlowError> {
        if self.session.is_offline() {
            tracing::debug!(resolution = %self.resolution, "offline session, skipping checkpoint");
            return Ok(StepOutcome::Unpersisted);
        }
        if self.cancel.is_cancelled() {
            return Ok(StepOutcome::Cancelled);
        }

        for body in inputs {
            self.backend.record_event(&self.session, body).await?;
        }
        let opened = self
            .backend
            .open_checkpoint(&self.session, &self.resolution)
            .await?;
        self.set_opened(Some(opened.event.id));

        let target = WatchTarget::new(self.session.clone(), self.resolution.clone())
            .for_cycle(opened.event.id);
        let feed: Arc<dyn CheckpointFeed> = self.backend.clone();
        let Some(resolved) =
            observe(feed, target, self.poll_interval, self.cancel.child_token()).await
        else {
            return Ok(StepOutcome::Cancelled);
        };
        self.set_opened(None);

        match resolved.outcome {
            DualOutcome::Good => {
                let new_index = self.backend.increment_step(&self.session).await?;
                if new_index == 0 {
                    tracing::warn!(session_id = %self.session, "approved checkpoint did not advance the step");
                }
                Ok(StepOutcome::Advanced { new_index })
            }
            DualOutcome::Bad => Ok(StepOutcome::Rejected {
                message: REJECTED_MESSAGE.to_string(),
            }),
            DualOutcome::Stale => Ok(StepOutcome::Stale),
        }
    }

    /// Tear down: cancel any wait and clear the checkpoint this step opened
    pub async fn unmount(&self) -> Result<(), FlowError> {
        self.cancel.cancel();
        if self.take_opened().is_some() {
            self.backend
                .clear_stale(&self.session, &self.resolution)
                .await?;
            tracing::debug!(session_id = %self.session, resolution = %self.resolution, "cleared own checkpoint on unmount");
        }
        Ok(())
    }
}
