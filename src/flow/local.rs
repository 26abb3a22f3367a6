//! In-process flow backend over [`Services`]

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::bus::Change;
use crate::checkpoint::{CheckpointFeed, OpenOutcome, ResolveStatus};
use crate::error::{FlowError, WaypointError};
use crate::flow::FlowBackend;
use crate::identity::{Identity, SessionCreator};
use crate::services::Services;
use crate::sessions::CreateOutcome;
use crate::types::{Event, EventBody, SessionId, SessionOrigin};

#[derive(Clone)]
pub struct LocalBackend {
    services: Arc<Services>,
}

impl LocalBackend {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl CheckpointFeed for LocalBackend {
    async fn resolutions(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<BoxStream<'static, Event>, FlowError> {
        Ok(self
            .services
            .gateway
            .watch_resolution(session, resolution)
            .map(Change::into_row)
            .boxed())
    }

    async fn latest(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<Option<Event>, FlowError> {
        Ok(self.services.checkpoints.latest(session, resolution).await?)
    }
}

#[async_trait]
impl SessionCreator for LocalBackend {
    async fn create_session(&self, origin: &SessionOrigin) -> Result<Identity, FlowError> {
        let identity = match self.services.sessions.create(origin.clone()).await? {
            CreateOutcome::Created(id) | CreateOutcome::Reused(id) => Identity::Session(id),
            CreateOutcome::Closed => Identity::Closed,
            CreateOutcome::Offline => Identity::offline(),
        };
        Ok(identity)
    }
}

#[async_trait]
impl FlowBackend for LocalBackend {
    async fn checkpoint_waiting(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<bool, FlowError> {
        Ok(self.services.checkpoints.exists(session, resolution).await?)
    }

    async fn open_checkpoint(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<OpenOutcome, FlowError> {
        Ok(self.services.checkpoints.open(session, resolution).await?)
    }

    async fn clear_stale(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<ResolveStatus, FlowError> {
        Ok(self
            .services
            .checkpoints
            .clear_if_stale(session, resolution)
            .await?)
    }

    async fn increment_step(&self, session: &SessionId) -> Result<u32, FlowError> {
        Ok(self.services.steps.increment_step(session).await?)
    }

    async fn record_event(&self, session: &SessionId, body: EventBody) -> Result<Event, FlowError> {
        self.services
            .gateway
            .insert_event(session, body)
            .await
            .map_err(|e| FlowError::Core(WaypointError::from_store(e)))
    }
}
