//! In-memory record store with optional JSON snapshot persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

use super::{RecordStore, SessionCreation, StoreError, StoreResult};
use crate::steps::{GameplanEdit, GameplanEdited};
use crate::types::{
    CheckpointStatus, DualOutcome, Event, EventBody, EventId, Gameplan, Page, Session, SessionId,
    SessionOrigin, SessionStatus, StepState,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    sessions: HashMap<SessionId, Session>,
    step_states: HashMap<SessionId, StepState>,
    gameplans: HashMap<SessionId, Gameplan>,
    events: Vec<Event>,
    next_seq: u64,
}

impl Tables {
    fn require_session(&self, id: &SessionId) -> StoreResult<()> {
        if self.sessions.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::SessionNotFound(id.clone()))
        }
    }

    fn waiting_index(&self, id: &SessionId, resolution: &str) -> Option<usize> {
        self.events
            .iter()
            .rposition(|e| &e.session_id == id && e.is_waiting_for(resolution))
    }

    fn open_session_for(&self, address: &str) -> Option<&Session> {
        self.sessions
            .values()
            .filter(|s| !s.status.is_terminal() && s.address.as_deref() == Some(address))
            .max_by_key(|s| s.created_at)
    }

    fn insert_session(
        &mut self,
        origin: SessionOrigin,
        status: SessionStatus,
        pages: Vec<Page>,
    ) -> (Session, StepState, Gameplan) {
        let now = Utc::now();
        let id = SessionId::new();
        let session = Session {
            id: id.clone(),
            status,
            address: origin.address,
            client_signature: origin.client_signature,
            operator_id: None,
            created_at: now,
        };
        let step_state = StepState {
            session_id: id.clone(),
            step: 0,
            force_wait: false,
            updated_at: now,
        };
        let gameplan = Gameplan {
            session_id: id.clone(),
            pages,
            updated_at: now,
        };
        self.sessions.insert(id.clone(), session.clone());
        self.step_states.insert(id.clone(), step_state.clone());
        self.gameplans.insert(id, gameplan.clone());
        (session, step_state, gameplan)
    }

    fn step_state_mut(&mut self, id: &SessionId) -> StoreResult<&mut StepState> {
        self.step_states
            .get_mut(id)
            .ok_or_else(|| StoreError::SessionNotFound(id.clone()))
    }
}

/// Record store held in process memory
pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            snapshot_path: None,
        }
    }

    /// Open a store backed by a JSON snapshot file, loading it if present.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let tables = if fs::try_exists(&path).await? {
            let raw = fs::read_to_string(&path).await?;
            serde_json::from_str::<Tables>(&raw)?
        } else {
            Tables::default()
        };
        tracing::info!(
            path = %path.display(),
            sessions = tables.sessions.len(),
            events = tables.events.len(),
            "Loaded record store snapshot"
        );
        Ok(Self {
            tables: RwLock::new(tables),
            snapshot_path: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Run one mutation under the write lock.
    ///
    /// With a snapshot configured the mutation is applied to a copy, which
    /// only replaces the live tables once the snapshot write succeeded. A
    /// mutation that returns an error must leave the tables untouched.
    async fn commit<T, F>(&self, mutate: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Tables) -> StoreResult<T> + Send,
        T: Send,
    {
        let mut tables = self.tables.write().await;
        let Some(path) = &self.snapshot_path else {
            return mutate(&mut *tables);
        };
        let mut candidate = tables.clone();
        let result = mutate(&mut candidate)?;
        if let Err(e) = write_snapshot(path, &candidate).await {
            tracing::error!(path = %path.display(), error = %e, "snapshot write failed, mutation discarded");
            return Err(e);
        }
        *tables = candidate;
        Ok(result)
    }
}

async fn write_snapshot(path: &Path, tables: &Tables) -> StoreResult<()> {
    let contents = serde_json::to_string_pretty(tables)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_session(
        &self,
        origin: SessionOrigin,
        status: SessionStatus,
        pages: Vec<Page>,
    ) -> StoreResult<(Session, StepState, Gameplan)> {
        self.commit(move |tables| Ok(tables.insert_session(origin, status, pages)))
            .await
    }

    async fn create_or_reuse_for_address(
        &self,
        origin: SessionOrigin,
        status: SessionStatus,
        pages: Vec<Page>,
    ) -> StoreResult<SessionCreation> {
        self.commit(move |tables| {
            if let Some(address) = origin.address.as_deref() {
                if let Some(existing) = tables.open_session_for(address) {
                    return Ok(SessionCreation::Reused(existing.clone()));
                }
            }
            let (session, step_state, gameplan) = tables.insert_session(origin, status, pages);
            Ok(SessionCreation::Created {
                session,
                step_state,
                gameplan,
            })
        })
        .await
    }

    async fn session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        Ok(self.tables.read().await.sessions.get(id).cloned())
    }

    async fn sessions_by_status(&self, status: SessionStatus) -> StoreResult<Vec<Session>> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<Session> = tables
            .sessions
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn update_session_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
        operator_id: Option<String>,
    ) -> StoreResult<Session> {
        self.commit(move |tables| {
            let session = tables
                .sessions
                .get_mut(id)
                .ok_or_else(|| StoreError::SessionNotFound(id.clone()))?;
            if !session.status.can_transition_to(status) {
                return Err(StoreError::InvalidTransition {
                    from: session.status,
                    to: status,
                });
            }
            session.status = status;
            if operator_id.is_some() {
                session.operator_id = operator_id;
            }
            Ok(session.clone())
        })
        .await
    }

    async fn step_state(&self, id: &SessionId) -> StoreResult<Option<StepState>> {
        Ok(self.tables.read().await.step_states.get(id).cloned())
    }

    async fn increment_step(&self, id: &SessionId) -> StoreResult<Option<StepState>> {
        self.commit(move |tables| {
            let Some(state) = tables.step_states.get_mut(id) else {
                return Ok(None);
            };
            state.step = state.step.saturating_add(1);
            state.updated_at = Utc::now();
            Ok(Some(state.clone()))
        })
        .await
    }

    async fn set_step(&self, id: &SessionId, step: u32) -> StoreResult<StepState> {
        self.commit(move |tables| {
            let state = tables.step_state_mut(id)?;
            state.step = step;
            state.updated_at = Utc::now();
            Ok(state.clone())
        })
        .await
    }

    async fn set_force_wait(&self, id: &SessionId, force_wait: bool) -> StoreResult<StepState> {
        self.commit(move |tables| {
            let state = tables.step_state_mut(id)?;
            state.force_wait = force_wait;
            state.updated_at = Utc::now();
            Ok(state.clone())
        })
        .await
    }

    async fn gameplan(&self, id: &SessionId) -> StoreResult<Option<Gameplan>> {
        Ok(self.tables.read().await.gameplans.get(id).cloned())
    }

    async fn edit_gameplan(
        &self,
        id: &SessionId,
        edit: GameplanEdit,
    ) -> StoreResult<GameplanEdited> {
        self.commit(move |tables| {
            let Tables {
                gameplans,
                step_states,
                ..
            } = tables;
            let (Some(gameplan), Some(state)) = (gameplans.get_mut(id), step_states.get_mut(id))
            else {
                return Err(StoreError::SessionNotFound(id.clone()));
            };
            let effect = edit.apply(&mut gameplan.pages, &mut state.step);
            let now = Utc::now();
            if effect.gameplan_changed {
                gameplan.updated_at = now;
            }
            if effect.step_changed {
                state.updated_at = now;
            }
            Ok(GameplanEdited {
                gameplan: gameplan.clone(),
                step_state: state.clone(),
                effect,
            })
        })
        .await
    }

    async fn events(&self, id: &SessionId) -> StoreResult<Vec<Event>> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| &e.session_id == id)
            .cloned()
            .collect())
    }

    async fn insert_event(&self, id: &SessionId, body: EventBody) -> StoreResult<Event> {
        self.commit(move |tables| {
            tables.require_session(id)?;

            if let EventBody::Checkpoint {
                resolution,
                status: CheckpointStatus::Waiting,
                ..
            } = &body
            {
                if let Some(idx) = tables.waiting_index(id, resolution) {
                    return Err(StoreError::DuplicateWaiting {
                        existing: Box::new(tables.events[idx].clone()),
                    });
                }
            }

            tables.next_seq += 1;
            let event = Event {
                id: EventId::new(),
                session_id: id.clone(),
                seq: tables.next_seq,
                created_at: Utc::now(),
                body,
            };
            tables.events.push(event.clone());
            Ok(event)
        })
        .await
    }

    async fn latest_checkpoint(
        &self,
        id: &SessionId,
        resolution: &str,
    ) -> StoreResult<Option<Event>> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .rev()
            .find(|e| {
                &e.session_id == id && e.checkpoint().is_some_and(|c| c.resolution == resolution)
            })
            .cloned())
    }

    async fn waiting_checkpoint(
        &self,
        id: &SessionId,
        resolution: &str,
    ) -> StoreResult<Option<Event>> {
        let tables = self.tables.read().await;
        Ok(tables
            .waiting_index(id, resolution)
            .map(|idx| tables.events[idx].clone()))
    }

    async fn waiting_checkpoints(&self, id: &SessionId) -> StoreResult<Vec<Event>> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .rev()
            .filter(|e| {
                &e.session_id == id
                    && e
                        .checkpoint()
                        .is_some_and(|c| c.status == CheckpointStatus::Waiting)
            })
            .cloned()
            .collect())
    }

    async fn resolve_waiting(
        &self,
        id: &SessionId,
        resolution: &str,
        outcome: DualOutcome,
    ) -> StoreResult<Option<Event>> {
        self.commit(move |tables| {
            let Some(idx) = tables.waiting_index(id, resolution) else {
                return Ok(None);
            };
            Ok(Some(resolve_at(tables, idx, outcome)))
        })
        .await
    }

    async fn resolve_event(
        &self,
        event_id: &EventId,
        outcome: DualOutcome,
    ) -> StoreResult<Option<Event>> {
        self.commit(move |tables| {
            let idx = tables.events.iter().position(|e| {
                &e.id == event_id
                    && e
                        .checkpoint()
                        .is_some_and(|c| c.status == CheckpointStatus::Waiting)
            });
            Ok(idx.map(|idx| resolve_at(tables, idx, outcome)))
        })
        .await
    }

    async fn waiting_created_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Event>> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .filter(|e| {
                e.created_at < cutoff
                    && e
                        .checkpoint()
                        .is_some_and(|c| c.status == CheckpointStatus::Waiting)
            })
            .cloned()
            .collect())
    }
}

fn resolve_at(tables: &mut Tables, idx: usize, outcome: DualOutcome) -> Event {
    let event = &mut tables.events[idx];
    if let EventBody::Checkpoint {
        status, outcome: o, ..
    } = &mut event.body
    {
        *status = CheckpointStatus::Resolved;
        *o = Some(outcome);
    }
    event.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pages() -> Vec<Page> {
        vec![Page::new("Welcome"), Page::new("Details"), Page::new("Done")]
    }

    async fn seeded() -> (MemoryStore, SessionId) {
        let store = MemoryStore::new();
        let (session, _, _) = store
            .create_session(SessionOrigin::default(), SessionStatus::Pending, pages())
            .await
            .unwrap();
        (store, session.id)
    }

    #[tokio::test]
    async fn test_create_session_creates_step_and_gameplan() {
        let (store, id) = seeded().await;
        let step = store.step_state(&id).await.unwrap().unwrap();
        assert_eq!(step.step, 0);
        let plan = store.gameplan(&id).await.unwrap().unwrap();
        assert_eq!(plan.len(), 3);
    }

    #[tokio::test]
    async fn test_increment_missing_row_returns_none() {
        let store = MemoryStore::new();
        let result = store.increment_step(&SessionId::from("nope")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_waiting_rejected() {
        let (store, id) = seeded().await;
        let first = store
            .insert_event(&id, EventBody::waiting("Code check"))
            .await
            .unwrap();
        match store.insert_event(&id, EventBody::waiting("Code check")).await {
            Err(StoreError::DuplicateWaiting { existing }) => assert_eq!(existing.id, first.id),
            other => panic!("expected duplicate, got {other:?}"),
        }
        // A different resolution is independent
        store
            .insert_event(&id, EventBody::waiting("Other check"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_waiting_transitions_latest() {
        let (store, id) = seeded().await;
        store
            .insert_event(&id, EventBody::waiting("A"))
            .await
            .unwrap();
        let resolved = store
            .resolve_waiting(&id, "A", DualOutcome::Good)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.resolved_outcome("A"), Some(DualOutcome::Good));
        assert!(store.waiting_checkpoint(&id, "A").await.unwrap().is_none());
        assert!(store
            .resolve_waiting(&id, "A", DualOutcome::Bad)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_create_or_reuse_skips_terminal() {
        let store = MemoryStore::new();
        let origin = SessionOrigin {
            address: Some("10.0.0.1".to_string()),
            client_signature: None,
        };
        let first = match store
            .create_or_reuse_for_address(origin.clone(), SessionStatus::Pending, pages())
            .await
            .unwrap()
        {
            SessionCreation::Created { session, .. } => session,
            other => panic!("expected a new session, got {other:?}"),
        };
        let again = store
            .create_or_reuse_for_address(origin.clone(), SessionStatus::Pending, pages())
            .await
            .unwrap();
        assert_eq!(again, SessionCreation::Reused(first.clone()));

        store
            .update_session_status(&first.id, SessionStatus::Ended, None)
            .await
            .unwrap();
        let after_end = store
            .create_or_reuse_for_address(origin, SessionStatus::Pending, pages())
            .await
            .unwrap();
        assert!(matches!(after_end, SessionCreation::Created { ref session, .. } if session.id != first.id));
    }

    #[tokio::test]
    async fn test_status_update_checks_transition() {
        let (store, id) = seeded().await;
        store
            .update_session_status(&id, SessionStatus::Banned, None)
            .await
            .unwrap();
        match store
            .update_session_status(&id, SessionStatus::Active, Some("op".to_string()))
            .await
        {
            Err(StoreError::InvalidTransition { from, to }) => {
                assert_eq!(from, SessionStatus::Banned);
                assert_eq!(to, SessionStatus::Active);
            }
            other => panic!("expected invalid transition, got {other:?}"),
        }
        let session = store.session(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Banned);
        assert!(session.operator_id.is_none());
    }

    #[tokio::test]
    async fn test_resolve_event_only_while_waiting() {
        let (store, id) = seeded().await;
        let first = store
            .insert_event(&id, EventBody::waiting("A"))
            .await
            .unwrap();
        store
            .resolve_waiting(&id, "A", DualOutcome::Good)
            .await
            .unwrap();
        let second = store
            .insert_event(&id, EventBody::waiting("A"))
            .await
            .unwrap();

        // The first cycle is already resolved; the new wait is untouched
        assert!(store
            .resolve_event(&first.id, DualOutcome::Stale)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store.waiting_checkpoint(&id, "A").await.unwrap().map(|e| e.id),
            Some(second.id)
        );

        let stale = store
            .resolve_event(&second.id, DualOutcome::Stale)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stale.resolved_outcome("A"), Some(DualOutcome::Stale));
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_discards_mutation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.json");
        let store = MemoryStore::open(&path).await.unwrap();
        let (session, _, _) = store
            .create_session(SessionOrigin::default(), SessionStatus::Active, pages())
            .await
            .unwrap();

        // A directory where the temp file goes makes every write fail
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();

        assert!(store
            .insert_event(&session.id, EventBody::waiting("R"))
            .await
            .is_err());
        assert!(store.events(&session.id).await.unwrap().is_empty());
        assert!(store.waiting_checkpoint(&session.id, "R").await.unwrap().is_none());

        assert!(store.increment_step(&session.id).await.is_err());
        assert_eq!(store.step_state(&session.id).await.unwrap().unwrap().step, 0);

        assert!(store
            .edit_gameplan(&session.id, GameplanEdit::Append(Page::new("Extra")))
            .await
            .is_err());
        assert_eq!(store.gameplan(&session.id).await.unwrap().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_edit_gameplan_unknown_session() {
        let store = MemoryStore::new();
        let result = store
            .edit_gameplan(&SessionId::from("ghost"), GameplanEdit::Append(Page::new("A")))
            .await;
        assert!(matches!(result, Err(StoreError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store").join("records.json");

        let id = {
            let store = MemoryStore::open(&path).await.unwrap();
            let (session, _, _) = store
                .create_session(SessionOrigin::default(), SessionStatus::Active, pages())
                .await
                .unwrap();
            store.increment_step(&session.id).await.unwrap();
            store
                .insert_event(&session.id, EventBody::interaction("Loaded page"))
                .await
                .unwrap();
            session.id
        };

        let reopened = MemoryStore::open(&path).await.unwrap();
        assert_eq!(reopened.step_state(&id).await.unwrap().unwrap().step, 1);
        assert_eq!(reopened.events(&id).await.unwrap().len(), 1);
        assert_eq!(reopened.snapshot_path(), Some(path.as_path()));
    }
}
