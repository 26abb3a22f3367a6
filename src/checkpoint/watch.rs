//! Dual-channel observation of a checkpoint's resolution.
//!
//! Push delivery is lossy: a resolution published before the observer
//! subscribed is never replayed. A fixed-interval point query runs alongside
//! it, and whichever channel sees the resolved record first wins. The other
//! channel is torn down with it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::race::first_some;
use crate::error::FlowError;
use crate::types::{DualOutcome, Event, EventId, SessionId};

/// Default interval between point queries
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Source of checkpoint records for an observer
#[async_trait]
pub trait CheckpointFeed: Send + Sync {
    /// Resolved records for the pair, as they are published
    async fn resolutions(
        &self,
        session: &SessionId,
        resolution: &str,
    ) -> Result<BoxStream<'static, Event>, FlowError>;

    /// Most recent record for the pair, in any status
    async fn latest(&self, session: &SessionId, resolution: &str)
        -> Result<Option<Event>, FlowError>;
}

/// Which channel delivered a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Push,
    Poll,
}

/// What an observer is waiting for
#[derive(Debug, Clone, PartialEq)]
pub struct WatchTarget {
    pub session: SessionId,
    pub resolution: String,
    /// The waiting record this cycle opened. When set, records from other
    /// cycles of the same pair are ignored.
    pub cycle: Option<EventId>,
}

impl WatchTarget {
    pub fn new(session: SessionId, resolution: impl Into<String>) -> Self {
        Self {
            session,
            resolution: resolution.into(),
            cycle: None,
        }
    }

    pub fn for_cycle(mut self, event: EventId) -> Self {
        self.cycle = Some(event);
        self
    }

    fn accept(&self, event: Event, via: Delivery) -> Option<ResolvedCheckpoint> {
        if self.cycle.is_some_and(|cycle| cycle != event.id) {
            return None;
        }
        let outcome = event.resolved_outcome(&self.resolution)?;
        Some(ResolvedCheckpoint {
            event,
            outcome,
            via,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCheckpoint {
    pub event: Event,
    pub outcome: DualOutcome,
    pub via: Delivery,
}

/// Wait for the target to resolve through push or poll, whichever is first.
///
/// Returns `None` when cancelled.
pub async fn observe(
    feed: Arc<dyn CheckpointFeed>,
    target: WatchTarget,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> Option<ResolvedCheckpoint> {
    let push = push_channel(Arc::clone(&feed), &target);
    let poll = poll_channel(feed, &target, poll_interval);

    tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!(session_id = %target.session, resolution = %target.resolution, "checkpoint watch cancelled");
            None
        }
        resolved = first_some(push, poll) => {
            if let Some(r) = &resolved {
                tracing::debug!(
                    session_id = %target.session,
                    resolution = %target.resolution,
                    outcome = %r.outcome,
                    via = ?r.via,
                    "checkpoint resolution observed"
                );
            }
            resolved
        }
    }
}

async fn push_channel(
    feed: Arc<dyn CheckpointFeed>,
    target: &WatchTarget,
) -> Option<ResolvedCheckpoint> {
    let mut stream = match feed.resolutions(&target.session, &target.resolution).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(session_id = %target.session, error = %e, "push channel unavailable, relying on poll");
            return None;
        }
    };
    while let Some(event) = stream.next().await {
        if let Some(resolved) = target.accept(event, Delivery::Push) {
            return Some(resolved);
        }
    }
    None
}

async fn poll_channel(
    feed: Arc<dyn CheckpointFeed>,
    target: &WatchTarget,
    poll_interval: Duration,
) -> Option<ResolvedCheckpoint> {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match feed.latest(&target.session, &target.resolution).await {
            Ok(Some(event)) => {
                if let Some(resolved) = target.accept(event, Delivery::Poll) {
                    return Some(resolved);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(session_id = %target.session, error = %e, "checkpoint poll failed");
            }
        }
    }
}

/// A running observation whose handler fires at most once.
///
/// Cancelling or dropping the watch tears down both channels; the handler is
/// then never called.
pub struct CheckpointWatch {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CheckpointWatch {
    pub fn spawn<F>(
        feed: Arc<dyn CheckpointFeed>,
        target: WatchTarget,
        poll_interval: Duration,
        handler: F,
    ) -> Self
    where
        F: FnOnce(ResolvedCheckpoint) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            if let Some(resolved) = observe(feed, target, poll_interval, token).await {
                handler(resolved);
            }
        });
        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the observation to end, by resolution or cancellation
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "checkpoint watch task failed");
            }
        }
    }
}

impl Drop for CheckpointWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::checkpoint::CheckpointProtocol;
    use crate::gateway::Gateway;
    use crate::store::MemoryStore;
    use crate::types::{Page, SessionOrigin, SessionStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Feed over a gateway, with the push channel optionally suppressed
    struct GatewayFeed {
        gateway: Gateway,
        push: bool,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl CheckpointFeed for GatewayFeed {
        async fn resolutions(
            &self,
            session: &SessionId,
            resolution: &str,
        ) -> Result<BoxStream<'static, Event>, FlowError> {
            if !self.push {
                return Ok(futures_util::stream::pending().boxed());
            }
            Ok(self
                .gateway
                .watch_resolution(session, resolution)
                .map(crate::bus::Change::into_row)
                .boxed())
        }

        async fn latest(
            &self,
            session: &SessionId,
            resolution: &str,
        ) -> Result<Option<Event>, FlowError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            self.gateway
                .latest_checkpoint(session, resolution)
                .await
                .map_err(|e| FlowError::Core(e.into()))
        }
    }

    async fn setup(push: bool) -> (Arc<GatewayFeed>, CheckpointProtocol, SessionId) {
        let gateway = Gateway::new(Arc::new(MemoryStore::new()), EventBus::new());
        let id = gateway
            .create_session(
                SessionOrigin::default(),
                SessionStatus::Active,
                vec![Page::new("Welcome")],
            )
            .await
            .unwrap()
            .id;
        let feed = Arc::new(GatewayFeed {
            gateway: gateway.clone(),
            push,
            polls: AtomicUsize::new(0),
        });
        (feed, CheckpointProtocol::new(gateway), id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_delivers_before_first_poll_interval() {
        let (feed, cp, id) = setup(true).await;
        let opened = cp.open(&id, "R").await.unwrap();
        let target = WatchTarget::new(id.clone(), "R").for_cycle(opened.event.id);

        let observer = tokio::spawn(observe(
            feed.clone(),
            target,
            Duration::from_secs(60),
            CancellationToken::new(),
        ));
        // Let the observer subscribe and take its immediate first poll
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(feed.polls.load(Ordering::SeqCst), 1);

        cp.resolve(&id, "R", DualOutcome::Good).await.unwrap();
        let resolved = observer.await.unwrap().unwrap();
        assert_eq!(resolved.outcome, DualOutcome::Good);
        assert_eq!(resolved.via, Delivery::Push);
        assert_eq!(feed.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_only_observes_within_one_interval() {
        let (feed, cp, id) = setup(false).await;
        let opened = cp.open(&id, "R").await.unwrap();
        let target = WatchTarget::new(id.clone(), "R").for_cycle(opened.event.id);
        let interval = Duration::from_millis(1500);

        let observer = tokio::spawn(observe(
            feed.clone(),
            target,
            interval,
            CancellationToken::new(),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cp.resolve(&id, "R", DualOutcome::Bad).await.unwrap();
        let resolved_at = tokio::time::Instant::now();

        let resolved = observer.await.unwrap().unwrap();
        assert_eq!(resolved.outcome, DualOutcome::Bad);
        assert_eq!(resolved.via, Delivery::Poll);
        assert!(tokio::time::Instant::now() - resolved_at <= interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_before_subscribe_is_caught_by_poll() {
        let (feed, cp, id) = setup(true).await;
        let opened = cp.open(&id, "R").await.unwrap();
        cp.resolve(&id, "R", DualOutcome::Good).await.unwrap();

        let target = WatchTarget::new(id, "R").for_cycle(opened.event.id);
        let resolved = observe(feed, target, DEFAULT_POLL_INTERVAL, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolved.via, Delivery::Poll);
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_cycle_is_ignored() {
        let (feed, cp, id) = setup(false).await;
        cp.open(&id, "R").await.unwrap();
        cp.resolve(&id, "R", DualOutcome::Bad).await.unwrap();

        let reopened = cp.open(&id, "R").await.unwrap();
        let target = WatchTarget::new(id.clone(), "R").for_cycle(reopened.event.id);
        let cancel = CancellationToken::new();
        let observer = tokio::spawn(observe(
            feed.clone(),
            target,
            DEFAULT_POLL_INTERVAL,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!observer.is_finished());
        cancel.cancel();
        assert!(observer.await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_fires_exactly_once() {
        let (feed, cp, id) = setup(true).await;
        let opened = cp.open(&id, "R").await.unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&calls);

        let watch = CheckpointWatch::spawn(
            feed.clone(),
            WatchTarget::new(id.clone(), "R").for_cycle(opened.event.id),
            Duration::from_millis(200),
            move |resolved| c.lock().unwrap().push(resolved.outcome),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        cp.resolve(&id, "R", DualOutcome::Good).await.unwrap();
        watch.finished().await;

        // Later polls would also see the resolved record; nothing is left running
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*calls.lock().unwrap(), vec![DualOutcome::Good]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let (feed, cp, id) = setup(false).await;
        cp.open(&id, "R").await.unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);

        let watch = CheckpointWatch::spawn(
            feed.clone(),
            WatchTarget::new(id.clone(), "R"),
            Duration::from_millis(100),
            move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            },
        );
        tokio::time::sleep(Duration::from_millis(350)).await;
        drop(watch);
        tokio::task::yield_now().await;
        let polls = feed.polls.load(Ordering::SeqCst);

        cp.resolve(&id, "R", DualOutcome::Good).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(feed.polls.load(Ordering::SeqCst), polls);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
