//! API state management for the REST server.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::services::Services;

/// Shared state for the REST API
#[derive(Clone)]
pub struct ApiState {
    pub services: Arc<Services>,
    pub config: Arc<Config>,
}

impl ApiState {
    pub fn new(services: Arc<Services>, config: Config) -> Self {
        Self {
            services,
            config: Arc::new(config),
        }
    }

    /// State over a fresh in-memory store
    pub fn in_memory(config: Config) -> Self {
        let services = Arc::new(Services::in_memory(&config));
        Self::new(services, config)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.config.server.sse_keep_alive_secs.max(1))
    }
}
