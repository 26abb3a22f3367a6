//! REST API server lifecycle management.
//!
//! Binds the listener, runs the router with graceful shutdown and owns the
//! staleness sweep task for as long as the server runs.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::rest::{build_router, ApiState};

/// Open SSE connections keep graceful shutdown from completing on its own
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Status of the REST API server
#[derive(Debug, Clone, PartialEq)]
pub enum RestApiStatus {
    Stopped,
    Starting,
    Stopping,
    Running { port: u16 },
    Error(String),
}

impl RestApiStatus {
    /// Returns true if the server is running
    pub fn is_running(&self) -> bool {
        matches!(self, RestApiStatus::Running { .. })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// REST API server handle for lifecycle management
pub struct RestApiServer {
    state: ApiState,
    addr: String,
    status: Arc<Mutex<RestApiStatus>>,
    shutdown: Mutex<Option<CancellationToken>>,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl RestApiServer {
    /// Server bound to the configured `server.host:server.port`
    pub fn new(state: ApiState) -> Self {
        let addr = state.config.bind_addr();
        Self::with_addr(state, addr)
    }

    pub fn with_addr(state: ApiState, addr: impl Into<String>) -> Self {
        Self {
            state,
            addr: addr.into(),
            status: Arc::new(Mutex::new(RestApiStatus::Stopped)),
            shutdown: Mutex::new(None),
            task_handle: Mutex::new(None),
        }
    }

    /// Get current server status
    pub fn status(&self) -> RestApiStatus {
        lock(&self.status).clone()
    }

    /// Check if server is running
    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    fn set_status(&self, status: RestApiStatus) {
        *lock(&self.status) = status;
    }

    /// Bind and start serving. Returns the bound address, which differs
    /// from the configured one when port 0 was requested.
    pub async fn start(&self) -> Result<SocketAddr> {
        if let RestApiStatus::Running { port } = self.status() {
            bail!("REST API already running on port {port}");
        }
        self.set_status(RestApiStatus::Starting);

        let listener = match tokio::net::TcpListener::bind(&self.addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.set_status(RestApiStatus::Error(e.to_string()));
                tracing::error!(addr = %self.addr, error = %e, "Failed to start REST API");
                return Err(e).with_context(|| format!("Failed to bind {}", self.addr));
            }
        };
        let local = listener
            .local_addr()
            .context("Failed to read bound address")?;

        let cancel = CancellationToken::new();
        if let Some(sweeper) = self.state.services.sweeper(&self.state.config) {
            tokio::spawn(sweeper.run(cancel.clone()));
        }

        let router = build_router(self.state.clone());
        let status = Arc::clone(&self.status);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(token.clone().cancelled_owned())
                .await;
            token.cancel();
            *lock(&status) = match result {
                Ok(()) => RestApiStatus::Stopped,
                Err(e) => {
                    tracing::error!(error = %e, "REST API server failed");
                    RestApiStatus::Error(e.to_string())
                }
            };
        });

        self.set_status(RestApiStatus::Running { port: local.port() });
        *lock(&self.shutdown) = Some(cancel);
        *lock(&self.task_handle) = Some(handle);
        tracing::info!("REST API listening on http://{}", local);
        Ok(local)
    }

    /// Stop the REST API server and the sweep task
    pub async fn stop(&self) {
        self.set_status(RestApiStatus::Stopping);

        if let Some(cancel) = lock(&self.shutdown).take() {
            cancel.cancel();
        }
        let handle = lock(&self.task_handle).take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                tracing::warn!("connections still open after grace period, aborting");
                handle.abort();
            }
        }

        self.set_status(RestApiStatus::Stopped);
        tracing::info!("REST API server stopped");
    }
}

impl Drop for RestApiServer {
    fn drop(&mut self) {
        if let Some(cancel) = lock(&self.shutdown).take() {
            cancel.cancel();
        }
    }
}
