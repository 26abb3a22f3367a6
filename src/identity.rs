//! Client-side session identity with single-flight creation.
//!
//! An [`IdentityResolver`] is owned by one client context. Concurrent
//! `resolve` calls share a single in-flight creation; once it finishes the
//! shared result keeps answering callers for a short grace window before the
//! guard is cleared. Issued ids are cached for the resolver's lifetime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tokio::task::JoinHandle;

use crate::error::FlowError;
use crate::types::{SessionId, SessionOrigin};

/// Result of identity resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Session(SessionId),
    /// New sessions are administratively closed
    Closed,
    /// The server side could not persist. Carries the local-only sentinel
    /// id ([`SessionId::offline`]); flows under it skip persistence.
    Offline(SessionId),
}

impl Identity {
    /// Degraded identity used when creation fails or is abandoned
    pub fn offline() -> Self {
        Identity::Offline(SessionId::offline())
    }

    /// The id to run the flow under; the sentinel when offline
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Identity::Session(id) | Identity::Offline(id) => Some(id),
            Identity::Closed => None,
        }
    }
}

/// Whatever actually creates sessions (in-process service or remote API)
#[async_trait]
pub trait SessionCreator: Send + Sync {
    async fn create_session(&self, origin: &SessionOrigin) -> Result<Identity, FlowError>;
}

type Flight = Shared<BoxFuture<'static, Identity>>;

#[derive(Default)]
struct ResolverState {
    cached: Option<SessionId>,
    in_flight: Option<Flight>,
    /// Bumped per flight and on dispose so late completions are ignored
    generation: u64,
    worker: Option<JoinHandle<()>>,
    clear_timer: Option<JoinHandle<()>>,
}

fn lock(state: &Mutex<ResolverState>) -> MutexGuard<'_, ResolverState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct IdentityResolver {
    creator: Arc<dyn SessionCreator>,
    origin: SessionOrigin,
    grace: Duration,
    state: Arc<Mutex<ResolverState>>,
}

impl IdentityResolver {
    pub fn new(creator: Arc<dyn SessionCreator>, origin: SessionOrigin, grace: Duration) -> Self {
        Self {
            creator,
            origin,
            grace,
            state: Arc::new(Mutex::new(ResolverState::default())),
        }
    }

    /// Start with an id the client already holds
    pub fn with_cached(
        creator: Arc<dyn SessionCreator>,
        origin: SessionOrigin,
        grace: Duration,
        id: SessionId,
    ) -> Self {
        let resolver = Self::new(creator, origin, grace);
        lock(&resolver.state).cached = Some(id);
        resolver
    }

    pub fn cached(&self) -> Option<SessionId> {
        lock(&self.state).cached.clone()
    }

    pub async fn resolve(&self) -> Identity {
        let flight = {
            let mut state = lock(&self.state);
            if let Some(id) = &state.cached {
                return Identity::Session(id.clone());
            }
            match &state.in_flight {
                Some(flight) => flight.clone(),
                None => self.start_flight(&mut state),
            }
        };
        flight.await
    }

    fn start_flight(&self, state: &mut ResolverState) -> Flight {
        state.generation += 1;
        let generation = state.generation;
        let creator = Arc::clone(&self.creator);
        let origin = self.origin.clone();
        let grace = self.grace;
        let shared_state = Arc::clone(&self.state);
        let (tx, rx) = tokio::sync::oneshot::channel();

        let worker = tokio::spawn(async move {
            let identity = match creator.create_session(&origin).await {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::warn!(error = %e, "session creation failed, continuing offline");
                    Identity::offline()
                }
            };

            let mut state = lock(&shared_state);
            if state.generation == generation {
                if let Identity::Session(id) = &identity {
                    state.cached = Some(id.clone());
                }
                let timer_state = Arc::clone(&shared_state);
                state.clear_timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    let mut state = lock(&timer_state);
                    if state.generation == generation {
                        state.in_flight = None;
                    }
                }));
            }
            drop(state);
            let _ = tx.send(identity);
        });

        let flight = async move {
            rx.await.unwrap_or_else(|_| {
                tracing::warn!("session creation abandoned, continuing offline");
                Identity::offline()
            })
        }
        .boxed()
        .shared();

        state.worker = Some(worker);
        state.in_flight = Some(flight.clone());
        flight
    }

    /// Drop cached identity, in-flight creation and pending timers
    pub fn dispose(&self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.cached = None;
        state.in_flight = None;
        if let Some(worker) = state.worker.take() {
            worker.abort();
        }
        if let Some(timer) = state.clear_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for IdentityResolver {
    fn drop(&mut self) {
        self.dispose();
    }
}
