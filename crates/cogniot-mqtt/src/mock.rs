//! Mock transport for testing without a real broker.
//!
//! Records credential updates, subscription batches and publishes for
//! assertion in tests, and lets tests inject connection events.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;

use cogniot_protocol::{Credentials, InboundMessage, TransportEvent};

use crate::error::{TransportError, TransportResult};
use crate::transport::Transport;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A recorded publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct Failures {
    subscribe: Option<String>,
    unsubscribe: Option<String>,
    publish: Option<String>,
}

/// Mock implementation of the `Transport` trait.
///
/// Every operation succeeds unless a failure was configured. Empty batches
/// are accepted and recorded like any other.
pub struct MockTransport {
    credential_updates: Mutex<Vec<Credentials>>,
    subscriptions: Mutex<Vec<Vec<String>>>,
    unsubscriptions: Mutex<Vec<Vec<String>>>,
    published: Mutex<Vec<PublishedMessage>>,
    end_calls: AtomicUsize,
    ended: AtomicBool,
    failures: Mutex<Failures>,
    auto_handshake: AtomicBool,
    events: broadcast::Sender<TransportEvent>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            credential_updates: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            unsubscriptions: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            end_calls: AtomicUsize::new(0),
            ended: AtomicBool::new(false),
            failures: Mutex::new(Failures::default()),
            auto_handshake: AtomicBool::new(false),
            events,
        }
    }

    /// Emit `Connect` whenever credentials are injected, like a broker that
    /// accepts every handshake.
    pub fn with_auto_handshake(self) -> Self {
        self.auto_handshake.store(true, Ordering::SeqCst);
        self
    }

    // ── Recorded calls ────────────────────────────────────────

    /// All credential sets injected so far.
    pub fn credential_updates(&self) -> Vec<Credentials> {
        lock(&self.credential_updates).clone()
    }

    /// The most recently injected credentials.
    pub fn last_credentials(&self) -> Option<Credentials> {
        lock(&self.credential_updates).last().cloned()
    }

    /// All subscribe batches, in call order.
    pub fn subscriptions(&self) -> Vec<Vec<String>> {
        lock(&self.subscriptions).clone()
    }

    /// All unsubscribe batches, in call order.
    pub fn unsubscriptions(&self) -> Vec<Vec<String>> {
        lock(&self.unsubscriptions).clone()
    }

    /// Check whether any subscribe batch included `topic`.
    pub fn is_subscribed_to(&self, topic: &str) -> bool {
        lock(&self.subscriptions)
            .iter()
            .flatten()
            .any(|t| t == topic)
    }

    /// All published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.published).clone()
    }

    /// Published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        lock(&self.published)
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Whether `end` has been called. Like `WssTransport`, an ended mock
    /// records later credentials but refuses them.
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Number of `end` calls.
    pub fn end_calls(&self) -> usize {
        self.end_calls.load(Ordering::SeqCst)
    }

    // ── Failure injection ─────────────────────────────────────

    pub fn fail_subscribe(&self, reason: impl Into<String>) {
        lock(&self.failures).subscribe = Some(reason.into());
    }

    pub fn fail_unsubscribe(&self, reason: impl Into<String>) {
        lock(&self.failures).unsubscribe = Some(reason.into());
    }

    pub fn fail_publish(&self, reason: impl Into<String>) {
        lock(&self.failures).publish = Some(reason.into());
    }

    pub fn clear_failures(&self) {
        *lock(&self.failures) = Failures::default();
    }

    // ── Event injection ───────────────────────────────────────

    /// Emit an event to all listeners. Returns how many received it.
    pub fn emit(&self, event: TransportEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Emit an inbound message.
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> usize {
        self.emit(TransportEvent::Message(InboundMessage::new(topic, payload)))
    }

    /// Clear all recorded state.
    pub fn reset(&self) {
        lock(&self.credential_updates).clear();
        lock(&self.subscriptions).clear();
        lock(&self.unsubscriptions).clear();
        lock(&self.published).clear();
        self.end_calls.store(0, Ordering::SeqCst);
        self.ended.store(false, Ordering::SeqCst);
        self.clear_failures();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn update_websocket_credentials(&self, credentials: &Credentials) -> bool {
        lock(&self.credential_updates).push(credentials.clone());
        if self.is_ended() {
            return false;
        }
        if self.auto_handshake.load(Ordering::SeqCst) {
            self.emit(TransportEvent::Connect);
        }
        true
    }

    async fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
        self.end_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn subscribe(&self, topics: &[String]) -> TransportResult<()> {
        lock(&self.subscriptions).push(topics.to_vec());
        match &lock(&self.failures).subscribe {
            Some(reason) => Err(TransportError::Subscribe(reason.clone())),
            None => Ok(()),
        }
    }

    async fn unsubscribe(&self, topics: &[String]) -> TransportResult<()> {
        lock(&self.unsubscriptions).push(topics.to_vec());
        match &lock(&self.failures).unsubscribe {
            Some(reason) => Err(TransportError::Unsubscribe(reason.clone())),
            None => Ok(()),
        }
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        lock(&self.published).push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
        match &lock(&self.failures).publish {
            Some(reason) => Err(TransportError::Publish(reason.clone())),
            None => Ok(()),
        }
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
