//! Record store boundary.
//!
//! The durable store is an external collaborator; this trait is the seam the
//! gateway talks through. [`MemoryStore`] is the bundled implementation,
//! optionally persisting a JSON snapshot before each mutation is committed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::steps::{GameplanEdit, GameplanEdited};
use crate::types::{
    DualOutcome, Event, EventBody, EventId, Gameplan, Page, Session, SessionId, SessionOrigin,
    SessionStatus, StepState,
};

mod memory;

#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session '{0}' not found")]
    SessionNotFound(SessionId),

    /// A waiting checkpoint already exists for the (session, resolution) pair
    #[error("checkpoint {} is already waiting for session '{}'", .existing.id, .existing.session_id)]
    DuplicateWaiting { existing: Box<Event> },

    #[error("session cannot move from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl StoreError {
    /// True for errors that indicate the store could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Io(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of [`RecordStore::create_or_reuse_for_address`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCreation {
    Created {
        session: Session,
        step_state: StepState,
        gameplan: Gameplan,
    },
    /// A non-terminal session from the same address already existed
    Reused(Session),
}

/// Durable storage for sessions, step state, gameplans and event records.
///
/// Every method is a single logical operation; implementations must make
/// each one atomic with respect to the others.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a session together with its step state (index 0) and gameplan.
    async fn create_session(
        &self,
        origin: SessionOrigin,
        status: SessionStatus,
        pages: Vec<Page>,
    ) -> StoreResult<(Session, StepState, Gameplan)>;

    /// Reuse the most recent non-terminal session created from the origin's
    /// address, or create one. The check and the insert are one operation.
    /// Origins without an address always create.
    async fn create_or_reuse_for_address(
        &self,
        origin: SessionOrigin,
        status: SessionStatus,
        pages: Vec<Page>,
    ) -> StoreResult<SessionCreation>;

    async fn session(&self, id: &SessionId) -> StoreResult<Option<Session>>;

    /// Sessions with `status`, newest first
    async fn sessions_by_status(&self, status: SessionStatus) -> StoreResult<Vec<Session>>;

    /// Change the status if the stored status allows the transition,
    /// otherwise fail with [`StoreError::InvalidTransition`].
    async fn update_session_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
        operator_id: Option<String>,
    ) -> StoreResult<Session>;

    async fn step_state(&self, id: &SessionId) -> StoreResult<Option<StepState>>;

    /// Atomically add one to the step index. `None` when no row exists.
    async fn increment_step(&self, id: &SessionId) -> StoreResult<Option<StepState>>;

    async fn set_step(&self, id: &SessionId, step: u32) -> StoreResult<StepState>;

    async fn set_force_wait(&self, id: &SessionId, force_wait: bool) -> StoreResult<StepState>;

    async fn gameplan(&self, id: &SessionId) -> StoreResult<Option<Gameplan>>;

    /// Apply an edit to the gameplan and step state of one session together
    async fn edit_gameplan(&self, id: &SessionId, edit: GameplanEdit)
        -> StoreResult<GameplanEdited>;

    /// Events for a session in insertion order
    async fn events(&self, id: &SessionId) -> StoreResult<Vec<Event>>;

    /// Append an event. A waiting checkpoint is rejected with
    /// [`StoreError::DuplicateWaiting`] when one already exists for the pair.
    async fn insert_event(&self, id: &SessionId, body: EventBody) -> StoreResult<Event>;

    /// Most recent checkpoint record for the pair, in any status
    async fn latest_checkpoint(&self, id: &SessionId, resolution: &str)
        -> StoreResult<Option<Event>>;

    /// The waiting checkpoint record for the pair, if any
    async fn waiting_checkpoint(
        &self,
        id: &SessionId,
        resolution: &str,
    ) -> StoreResult<Option<Event>>;

    /// All waiting checkpoints for a session, newest first
    async fn waiting_checkpoints(&self, id: &SessionId) -> StoreResult<Vec<Event>>;

    /// Transition the most recent waiting record for the pair to resolved.
    /// `None` when nothing is waiting.
    async fn resolve_waiting(
        &self,
        id: &SessionId,
        resolution: &str,
        outcome: DualOutcome,
    ) -> StoreResult<Option<Event>>;

    /// Resolve one specific record, only while it is still waiting.
    /// `None` when it is unknown or already resolved.
    async fn resolve_event(
        &self,
        event_id: &EventId,
        outcome: DualOutcome,
    ) -> StoreResult<Option<Event>>;

    /// Waiting checkpoints across all sessions created before `cutoff`
    async fn waiting_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Event>>;
}
