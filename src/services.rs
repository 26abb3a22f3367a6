//! The core services wired over one record store and one event bus.

use std::sync::Arc;

use crate::bus::EventBus;
use crate::checkpoint::{CheckpointProtocol, StaleSweeper};
use crate::config::Config;
use crate::gateway::Gateway;
use crate::sessions::SessionService;
use crate::steps::StepController;
use crate::store::{MemoryStore, RecordStore, StoreResult};

pub struct Services {
    pub gateway: Gateway,
    pub sessions: SessionService,
    pub steps: StepController,
    pub checkpoints: CheckpointProtocol,
}

impl Services {
    pub fn new(store: Arc<dyn RecordStore>, config: &Config) -> Self {
        let gateway = Gateway::new(store, EventBus::new());
        Self {
            sessions: SessionService::new(gateway.clone(), &config.sessions),
            steps: StepController::new(gateway.clone()),
            checkpoints: CheckpointProtocol::new(gateway.clone()),
            gateway,
        }
    }

    /// Services over a fresh in-memory store
    pub fn in_memory(config: &Config) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Services over the store the configuration names
    pub async fn open(config: &Config) -> StoreResult<Self> {
        let store = match &config.store.snapshot_path {
            Some(path) => MemoryStore::open(path).await?,
            None => MemoryStore::new(),
        };
        Ok(Self::new(Arc::new(store), config))
    }

    /// Staleness sweep, when enabled
    pub fn sweeper(&self, config: &Config) -> Option<StaleSweeper> {
        let stale_after = config.checkpoint.stale_after()?;
        Some(
            StaleSweeper::new(self.checkpoints.clone(), stale_after)
                .with_interval(config.checkpoint.sweep_interval()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SessionOrigin, SessionStatus};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_services_share_one_store() {
        let services = Services::in_memory(&Config::default());
        let outcome = services.sessions.create(SessionOrigin::default()).await.unwrap();
        let id = outcome.id().unwrap();
        assert_eq!(services.steps.increment_step(id).await.unwrap(), 1);
        assert!(services.checkpoints.open(id, "R").await.unwrap().created);
        let session = services.sessions.get(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
    }

    #[tokio::test]
    async fn test_sweeper_disabled_by_default() {
        let config = Config::default();
        let services = Services::in_memory(&config);
        assert!(services.sweeper(&config).is_none());

        let mut config = config;
        config.checkpoint.stale_after_secs = 60;
        assert!(services.sweeper(&config).is_some());
    }

    #[tokio::test]
    async fn test_open_with_snapshot_persists() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.store.snapshot_path = Some(dir.path().join("store.json"));

        let id = {
            let services = Services::open(&config).await.unwrap();
            let outcome = services.sessions.create(SessionOrigin::default()).await.unwrap();
            outcome.id().unwrap().clone()
        };
        let services = Services::open(&config).await.unwrap();
        assert!(services.sessions.get(&id).await.is_ok());
    }
}
