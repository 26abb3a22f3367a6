//! Subscription gateway: record-store mutations paired with bus publication.
//!
//! Every mutating call that commits publishes exactly one payload per
//! affected topic before it returns. A subscriber attached before the call
//! therefore always observes it; one attached after the call returns may not.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};

use crate::bus::{Change, Channel, EventBus, Payload, Subscription, Topic, TopicStream};
use crate::steps::{GameplanEdit, GameplanEdited};
use crate::store::{RecordStore, SessionCreation, StoreResult};
use crate::types::{
    DualOutcome, Event, EventBody, EventId, Gameplan, Page, Session, SessionId, SessionOrigin,
    SessionStatus, StepState,
};

#[derive(Clone)]
pub struct Gateway {
    store: Arc<dyn RecordStore>,
    bus: EventBus,
}

impl Gateway {
    pub fn new(store: Arc<dyn RecordStore>, bus: EventBus) -> Self {
        Self { store, bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn publish(&self, session_id: &SessionId, payload: Payload) {
        let topic = Topic::new(session_id, payload.channel());
        self.bus.publish(&topic, &payload);
    }

    // --- sessions ---

    pub async fn create_session(
        &self,
        origin: SessionOrigin,
        status: SessionStatus,
        pages: Vec<Page>,
    ) -> StoreResult<Session> {
        let (session, step_state, gameplan) =
            self.store.create_session(origin, status, pages).await?;
        self.publish_created(&session, step_state, gameplan);
        Ok(session)
    }

    /// Returns the session and whether it was newly created. Only a new
    /// session is published.
    pub async fn create_or_reuse_for_address(
        &self,
        origin: SessionOrigin,
        status: SessionStatus,
        pages: Vec<Page>,
    ) -> StoreResult<(Session, bool)> {
        match self
            .store
            .create_or_reuse_for_address(origin, status, pages)
            .await?
        {
            SessionCreation::Created {
                session,
                step_state,
                gameplan,
            } => {
                self.publish_created(&session, step_state, gameplan);
                Ok((session, true))
            }
            SessionCreation::Reused(session) => Ok((session, false)),
        }
    }

    fn publish_created(&self, session: &Session, step_state: StepState, gameplan: Gameplan) {
        tracing::debug!(session_id = %session.id, status = %session.status, "session created");
        let id = &session.id;
        self.publish(id, Payload::Session(Change::Init { row: session.clone() }));
        self.publish(id, Payload::StepState(Change::Init { row: step_state }));
        self.publish(id, Payload::Gameplan(Change::Init { row: gameplan }));
    }

    pub async fn session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        self.store.session(id).await
    }

    pub async fn sessions_by_status(&self, status: SessionStatus) -> StoreResult<Vec<Session>> {
        self.store.sessions_by_status(status).await
    }

    pub async fn update_session_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
        operator_id: Option<String>,
    ) -> StoreResult<Session> {
        let session = self
            .store
            .update_session_status(id, status, operator_id)
            .await?;
        tracing::debug!(session_id = %id, %status, "session status updated");
        self.publish(id, Payload::Session(Change::Update { row: session.clone() }));
        Ok(session)
    }

    // --- step state ---

    pub async fn step_state(&self, id: &SessionId) -> StoreResult<Option<StepState>> {
        self.store.step_state(id).await
    }

    pub async fn increment_step(&self, id: &SessionId) -> StoreResult<Option<StepState>> {
        let updated = self.store.increment_step(id).await?;
        if let Some(row) = &updated {
            tracing::debug!(session_id = %id, step = row.step, "step incremented");
            self.publish(id, Payload::StepState(Change::Update { row: row.clone() }));
        }
        Ok(updated)
    }

    pub async fn set_step(&self, id: &SessionId, step: u32) -> StoreResult<StepState> {
        let row = self.store.set_step(id, step).await?;
        tracing::debug!(session_id = %id, step, "step set");
        self.publish(id, Payload::StepState(Change::Update { row: row.clone() }));
        Ok(row)
    }

    pub async fn set_force_wait(&self, id: &SessionId, force_wait: bool) -> StoreResult<StepState> {
        let row = self.store.set_force_wait(id, force_wait).await?;
        tracing::debug!(session_id = %id, force_wait, "force-wait set");
        self.publish(id, Payload::StepState(Change::Update { row: row.clone() }));
        Ok(row)
    }

    // --- gameplan ---

    pub async fn gameplan(&self, id: &SessionId) -> StoreResult<Option<Gameplan>> {
        self.store.gameplan(id).await
    }

    /// Apply an edit and publish each row it changed, gameplan first
    pub async fn edit_gameplan(
        &self,
        id: &SessionId,
        edit: GameplanEdit,
    ) -> StoreResult<GameplanEdited> {
        let edited = self.store.edit_gameplan(id, edit).await?;
        let effect = edited.effect;
        tracing::debug!(
            session_id = %id,
            pages = edited.gameplan.len(),
            step = edited.step_state.step,
            gameplan_changed = effect.gameplan_changed,
            step_changed = effect.step_changed,
            "gameplan edited"
        );
        if effect.gameplan_changed {
            self.publish(
                id,
                Payload::Gameplan(Change::Update {
                    row: edited.gameplan.clone(),
                }),
            );
        }
        if effect.step_changed {
            self.publish(
                id,
                Payload::StepState(Change::Update {
                    row: edited.step_state.clone(),
                }),
            );
        }
        Ok(edited)
    }

    // --- events and checkpoints ---

    pub async fn events(&self, id: &SessionId) -> StoreResult<Vec<Event>> {
        self.store.events(id).await
    }

    pub async fn insert_event(&self, id: &SessionId, body: EventBody) -> StoreResult<Event> {
        let row = self.store.insert_event(id, body).await?;
        tracing::debug!(session_id = %id, event_id = %row.id, "event inserted");
        self.publish(id, Payload::Events(Change::Insert { row: row.clone() }));
        Ok(row)
    }

    pub async fn latest_checkpoint(
        &self,
        id: &SessionId,
        resolution: &str,
    ) -> StoreResult<Option<Event>> {
        self.store.latest_checkpoint(id, resolution).await
    }

    pub async fn waiting_checkpoint(
        &self,
        id: &SessionId,
        resolution: &str,
    ) -> StoreResult<Option<Event>> {
        self.store.waiting_checkpoint(id, resolution).await
    }

    pub async fn waiting_checkpoints(&self, id: &SessionId) -> StoreResult<Vec<Event>> {
        self.store.waiting_checkpoints(id).await
    }

    pub async fn waiting_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Event>> {
        self.store.waiting_created_before(cutoff).await
    }

    pub async fn resolve_waiting(
        &self,
        id: &SessionId,
        resolution: &str,
        outcome: DualOutcome,
    ) -> StoreResult<Option<Event>> {
        let updated = self.store.resolve_waiting(id, resolution, outcome).await?;
        if let Some(row) = &updated {
            tracing::debug!(session_id = %id, resolution, %outcome, "checkpoint resolved");
            self.publish(id, Payload::Events(Change::Update { row: row.clone() }));
        }
        Ok(updated)
    }

    pub async fn resolve_event(
        &self,
        event_id: &EventId,
        outcome: DualOutcome,
    ) -> StoreResult<Option<Event>> {
        let updated = self.store.resolve_event(event_id, outcome).await?;
        if let Some(row) = &updated {
            tracing::debug!(session_id = %row.session_id, %event_id, %outcome, "checkpoint record resolved");
            self.publish(
                &row.session_id,
                Payload::Events(Change::Update { row: row.clone() }),
            );
        }
        Ok(updated)
    }

    // --- observation ---

    pub fn subscribe<F>(&self, id: &SessionId, channel: Channel, handler: F) -> Subscription
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.bus.subscribe(Topic::new(id, channel), handler)
    }

    pub fn watch(&self, id: &SessionId, channel: Channel) -> TopicStream {
        self.bus.stream(Topic::new(id, channel))
    }

    /// Resolved checkpoint records for one resolution, as they are published
    pub fn watch_resolution(
        &self,
        id: &SessionId,
        resolution: &str,
    ) -> impl Stream<Item = Change<Event>> + Send + 'static {
        let resolution = resolution.to_string();
        self.watch(id, Channel::Events).filter_map(move |payload| {
            let hit = match payload {
                Payload::Events(change) if change.row().resolved_outcome(&resolution).is_some() => {
                    Some(change)
                }
                _ => None,
            };
            async move { hit }
        })
    }
}
