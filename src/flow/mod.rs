//! Flow runtime seam: what a client-side step driver needs from the core.
//!
//! [`LocalBackend`] calls the services in-process; [`HttpBackend`] talks to
//! a running server over the REST + SSE surface. Both feed the same
//! [`CheckpointedStep`] driver.

use async_trait::async_trait;

use crate::checkpoint::{CheckpointFeed, OpenOutcome, ResolveStatus};
use crate::error::FlowError;
use crate::identity::SessionCreator;
use crate::types::{Event, EventBody, SessionId};

pub mod http;
pub mod local;
pub mod step;

pub use http::HttpBackend;
pub use local::LocalBackend;
pub use step::{CheckpointedStep, StepOutcome, REJECTED_MESSAGE};

#[async_trait]
pub trait FlowBackend: CheckpointFeed + SessionCreator {
    async fn checkpoint_waiting(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<bool, FlowError>;

    async fn open_checkpoint(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<OpenOutcome, FlowError>;

    async fn clear_stale(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<ResolveStatus, FlowError>;

    /// Advance by one; 0 means nothing advanced
    async fn increment_step(&self, session: &SessionId) -> Result<u32, FlowError>;

    async fn record_event(&self, session: &SessionId, body: EventBody) -> Result<Event, FlowError>;
}
