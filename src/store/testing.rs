//! Store doubles for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{RecordStore, SessionCreation, StoreError, StoreResult};
use crate::steps::{GameplanEdit, GameplanEdited};
use crate::types::{
    DualOutcome, Event, EventBody, EventId, Gameplan, Page, Session, SessionId, SessionOrigin,
    SessionStatus, StepState,
};

/// A store whose every call fails as unreachable
pub(crate) struct DownStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl RecordStore for DownStore {
    async fn create_session(
        &self,
        _origin: SessionOrigin,
        _status: SessionStatus,
        _pages: Vec<Page>,
    ) -> StoreResult<(Session, StepState, Gameplan)> {
        down()
    }

    async fn create_or_reuse_for_address(
        &self,
        _origin: SessionOrigin,
        _status: SessionStatus,
        _pages: Vec<Page>,
    ) -> StoreResult<SessionCreation> {
        down()
    }

    async fn session(&self, _id: &SessionId) -> StoreResult<Option<Session>> {
        down()
    }

    async fn sessions_by_status(&self, _status: SessionStatus) -> StoreResult<Vec<Session>> {
        down()
    }

    async fn update_session_status(
        &self,
        _id: &SessionId,
        _status: SessionStatus,
        _operator_id: Option<String>,
    ) -> StoreResult<Session> {
        down()
    }

    async fn step_state(&self, _id: &SessionId) -> StoreResult<Option<StepState>> {
        down()
    }

    async fn increment_step(&self, _id: &SessionId) -> StoreResult<Option<StepState>> {
        down()
    }

    async fn set_step(&self, _id: &SessionId, _step: u32) -> StoreResult<StepState> {
        down()
    }

    async fn set_force_wait(&self, _id: &SessionId, _force_wait: bool) -> StoreResult<StepState> {
        down()
    }

    async fn gameplan(&self, _id: &SessionId) -> StoreResult<Option<Gameplan>> {
        down()
    }

    async fn edit_gameplan(
        &self,
        _id: &SessionId,
        _edit: GameplanEdit,
    ) -> StoreResult<GameplanEdited> {
        down()
    }

    async fn events(&self, _id: &SessionId) -> StoreResult<Vec<Event>> {
        down()
    }

    async fn insert_event(&self, _id: &SessionId, _body: EventBody) -> StoreResult<Event> {
        down()
    }

    async fn latest_checkpoint(
        &self,
        _id: &SessionId,
        _resolution: &str,
    ) -> StoreResult<Option<Event>> {
        down()
    }

    async fn waiting_checkpoint(
        &self,
        _id: &SessionId,
        _resolution: &str,
    ) -> StoreResult<Option<Event>> {
        down()
    }

    async fn waiting_checkpoints(&self, _id: &SessionId) -> StoreResult<Vec<Event>> {
        down()
    }

    async fn resolve_waiting(
        &self,
        _id: &SessionId,
        _resolution: &str,
        _outcome: DualOutcome,
    ) -> StoreResult<Option<Event>> {
        down()
    }

    async fn resolve_event(
        &self,
        _event_id: &EventId,
        _outcome: DualOutcome,
    ) -> StoreResult<Option<Event>> {
        down()
    }

    async fn waiting_created_before(&self, _cutoff: DateTime<Utc>) -> StoreResult<Vec<Event>> {
        down()
    }
}
