//! Checkpoint delivery scenarios against the in-process services.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;

use waypoint::checkpoint::{
    CheckpointFeed, CheckpointWatch, Delivery, ResolvedCheckpoint, WatchTarget,
};
use waypoint::config::Config;
use waypoint::error::FlowError;
use waypoint::flow::LocalBackend;
use waypoint::identity::{Identity, IdentityResolver, SessionCreator};
use waypoint::services::Services;
use waypoint::types::{DualOutcome, Event, SessionId, SessionOrigin};

const RESOLUTION: &str = "Valid login confirmation";

async fn setup() -> (Arc<Services>, Arc<LocalBackend>, SessionId) {
    let services = Arc::new(Services::in_memory(&Config::default()));
    let id = services
        .sessions
        .create(SessionOrigin::default())
        .await
        .unwrap()
        .id()
        .unwrap()
        .clone();
    let backend = Arc::new(LocalBackend::new(Arc::clone(&services)));
    (services, backend, id)
}

fn spawn_watch(
    feed: Arc<dyn CheckpointFeed>,
    target: WatchTarget,
) -> (CheckpointWatch, mpsc::UnboundedReceiver<ResolvedCheckpoint>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let watch = CheckpointWatch::spawn(feed, target, Duration::from_millis(1500), move |resolved| {
        let _ = tx.send(resolved);
    });
    (watch, rx)
}

#[tokio::test(start_paused = true)]
async fn test_bad_resolution_fires_handler_once() {
    let (services, backend, id) = setup().await;
    let opened = services.checkpoints.open(&id, RESOLUTION).await.unwrap();

    let target = WatchTarget::new(id.clone(), RESOLUTION).for_cycle(opened.event.id);
    let (watch, mut rx) = spawn_watch(backend, target);
    tokio::task::yield_now().await;

    let status = services
        .checkpoints
        .resolve(&id, RESOLUTION, DualOutcome::Bad)
        .await
        .unwrap();
    assert!(!status.is_missing());

    let resolved = rx.recv().await.unwrap();
    assert_eq!(resolved.outcome, DualOutcome::Bad);
    assert_eq!(resolved.event.id, opened.event.id);

    watch.finished().await;
    // The handler is gone with the task; no second delivery is possible
    assert!(rx.recv().await.is_none());

    assert_eq!(services.steps.step_state(&id).await.unwrap().step, 0);
    assert!(services
        .checkpoints
        .resolve(&id, RESOLUTION, DualOutcome::Good)
        .await
        .unwrap()
        .is_missing());
}

/// Push channel that is never available, so only polling can deliver
struct PollOnlyFeed {
    inner: Arc<LocalBackend>,
    polls: AtomicUsize,
}

#[async_trait]
impl CheckpointFeed for PollOnlyFeed {
    async fn resolutions(
        &self,
        _session: &SessionId,
        _resolution: &str,
    ) -> Result<BoxStream<'static, Event>, FlowError> {
        Err(FlowError::Rejected {
            status: 503,
            message: "push disabled".to_string(),
        })
    }

    async fn latest(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<Option<Event>, FlowError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        self.inner.latest(session, resolution).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_poll_delivers_when_push_is_down() {
    let (services, backend, id) = setup().await;
    let opened = services.checkpoints.open(&id, RESOLUTION).await.unwrap();

    let feed = Arc::new(PollOnlyFeed {
        inner: backend,
        polls: AtomicUsize::new(0),
    });
    let target = WatchTarget::new(id.clone(), RESOLUTION).for_cycle(opened.event.id);
    let (_watch, mut rx) = spawn_watch(feed.clone(), target);

    // Let a few empty polls go by before the operator decides
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(feed.polls.load(Ordering::SeqCst) >= 2);

    services
        .checkpoints
        .resolve(&id, RESOLUTION, DualOutcome::Good)
        .await
        .unwrap();

    let resolved = rx.recv().await.unwrap();
    assert_eq!(resolved.via, Delivery::Poll);
    assert_eq!(resolved.outcome, DualOutcome::Good);
}

#[tokio::test(start_paused = true)]
async fn test_previous_cycle_is_ignored() {
    let (services, backend, id) = setup().await;

    let first = services.checkpoints.open(&id, RESOLUTION).await.unwrap();
    services
        .checkpoints
        .resolve(&id, RESOLUTION, DualOutcome::Good)
        .await
        .unwrap();
    let second = services.checkpoints.open(&id, RESOLUTION).await.unwrap();
    assert_ne!(first.event.id, second.event.id);

    let target = WatchTarget::new(id.clone(), RESOLUTION).for_cycle(second.event.id);
    let (_watch, mut rx) = spawn_watch(backend, target);

    // Polls see the new waiting record, never the old approval
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(rx.try_recv().is_err());

    services
        .checkpoints
        .resolve(&id, RESOLUTION, DualOutcome::Bad)
        .await
        .unwrap();
    let resolved = rx.recv().await.unwrap();
    assert_eq!(resolved.event.id, second.event.id);
    assert_eq!(resolved.outcome, DualOutcome::Bad);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_watch_never_fires() {
    let (services, backend, id) = setup().await;
    services.checkpoints.open(&id, RESOLUTION).await.unwrap();

    let (watch, mut rx) = spawn_watch(backend, WatchTarget::new(id.clone(), RESOLUTION));
    watch.cancel();
    watch.finished().await;

    services
        .checkpoints
        .resolve(&id, RESOLUTION, DualOutcome::Good)
        .await
        .unwrap();
    assert!(rx.recv().await.is_none());
}

/// Counts creations while delegating to the in-process services
struct CountingCreator {
    inner: Arc<LocalBackend>,
    calls: AtomicUsize,
}

#[async_trait]
impl SessionCreator for CountingCreator {
    async fn create_session(&self, origin: &SessionOrigin) -> Result<Identity, FlowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.inner.create_session(origin).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_resolves_create_one_session() {
    let (services, backend, _) = setup().await;
    let creator = Arc::new(CountingCreator {
        inner: backend,
        calls: AtomicUsize::new(0),
    });
    let resolver = IdentityResolver::new(
        creator.clone(),
        SessionOrigin::default(),
        Duration::from_millis(500),
    );

    let results =
        futures_util::future::join_all((0..16).map(|_| resolver.resolve())).await;
    let first = results[0].session_id().unwrap().clone();
    assert!(results.iter().all(|r| r.session_id() == Some(&first)));
    assert_eq!(creator.calls.load(Ordering::SeqCst), 1);

    // One from setup plus the resolver's
    assert_eq!(services.sessions.counts().await.unwrap().pending, 2);
}
