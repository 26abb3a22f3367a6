//! In-process publish/subscribe keyed by `(session, channel)` topics.
//!
//! Delivery is synchronous and best-effort: `publish` calls every handler
//! registered on the exact topic at the moment of the call, in registration
//! order. There is no replay for late subscribers and no backpressure.

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{Event, Gameplan, Session, SessionId, StepState};

/// Channel half of a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    Session,
    StepState,
    Gameplan,
    Events,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Session => "session",
            Channel::StepState => "step-state",
            Channel::Gameplan => "gameplan",
            Channel::Events => "events",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    pub session_id: SessionId,
    pub channel: Channel,
}

impl Topic {
    pub fn new(session_id: &SessionId, channel: Channel) -> Self {
        Self {
            session_id: session_id.clone(),
            channel,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}:{}", self.session_id, self.channel)
    }
}

/// A row change as seen by observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Change<T> {
    Init { row: T },
    Update { row: T },
    Insert { row: T },
}

impl<T> Change<T> {
    pub fn row(&self) -> &T {
        match self {
            Change::Init { row } | Change::Update { row } | Change::Insert { row } => row,
        }
    }

    pub fn into_row(self) -> T {
        match self {
            Change::Init { row } | Change::Update { row } | Change::Insert { row } => row,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Change::Init { .. } => "init",
            Change::Update { .. } => "update",
            Change::Insert { .. } => "insert",
        }
    }
}

/// Payload published on a topic. The variant always matches the topic's channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Session(Change<Session>),
    StepState(Change<StepState>),
    Gameplan(Change<Gameplan>),
    Events(Change<Event>),
}

impl Payload {
    pub fn channel(&self) -> Channel {
        match self {
            Payload::Session(_) => Channel::Session,
            Payload::StepState(_) => Channel::StepState,
            Payload::Gameplan(_) => Channel::Gameplan,
            Payload::Events(_) => Channel::Events,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Session(c) => c.kind(),
            Payload::StepState(c) => c.kind(),
            Payload::Gameplan(c) => c.kind(),
            Payload::Events(c) => c.kind(),
        }
    }
}

type Handler = Arc<dyn Fn(&Payload) + Send + Sync>;

#[derive(Default)]
struct Registry {
    topics: HashMap<Topic, Vec<(u64, Handler)>>,
}

struct Inner {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, topic: &Topic, id: u64) {
        let mut registry = self.lock();
        if let Some(handlers) = registry.topics.get_mut(topic) {
            handlers.retain(|(hid, _)| *hid != id);
            if handlers.is_empty() {
                registry.topics.remove(topic);
            }
        }
    }
}

/// Process-wide fan-out bus. Cloning shares the registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Deliver `payload` to every current subscriber of `topic`.
    ///
    /// Handlers run outside the registry lock, so a handler may subscribe or
    /// unsubscribe without deadlocking.
    pub fn publish(&self, topic: &Topic, payload: &Payload) {
        let handlers: Vec<Handler> = {
            let registry = self.inner.lock();
            match registry.topics.get(topic) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };
        tracing::trace!(%topic, kind = payload.kind(), subscribers = handlers.len(), "publish");
        for handler in handlers {
            handler(payload);
        }
    }

    /// Register `handler` on `topic`. The handler stays registered until the
    /// returned [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lock()
            .topics
            .entry(topic.clone())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
            active: true,
        }
    }

    /// Subscribe and receive payloads as an async stream.
    pub fn stream(&self, topic: Topic) -> TopicStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(topic, move |payload| {
            let _ = tx.send(payload.clone());
        });
        TopicStream {
            rx,
            _subscription: subscription,
        }
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.inner.lock().topics.get(topic).map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration handle. Dropping it unsubscribes.
pub struct Subscription {
    bus: Weak<Inner>,
    topic: Topic,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(inner) = self.bus.upgrade() {
            inner.remove(&self.topic, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

/// Stream of payloads for one topic; unsubscribes when dropped.
pub struct TopicStream {
    rx: mpsc::UnboundedReceiver<Payload>,
    _subscription: Subscription,
}

impl Stream for TopicStream {
    type Item = Payload;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
