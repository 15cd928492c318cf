//! Correlation of client requests with broker acknowledgements.
//!
//! `rumqttc::AsyncClient` returns as soon as a request is queued. To settle
//! an operation when the broker answers, each request registers a ticket
//! before it is queued. The driver binds the oldest ticket of a kind to the
//! packet id reported by the matching `Outgoing` event, then settles it on
//! the SUBACK/UNSUBACK/PUBACK for that id.
//!
//! Tickets must be registered in the same order the requests are queued.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::{TransportError, TransportResult};

/// Request kinds that expect a broker acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckKind {
    Subscribe,
    Unsubscribe,
    Publish,
}

impl AckKind {
    fn error(self, reason: String) -> TransportError {
        match self {
            AckKind::Subscribe => TransportError::Subscribe(reason),
            AckKind::Unsubscribe => TransportError::Unsubscribe(reason),
            AckKind::Publish => TransportError::Publish(reason),
        }
    }
}

type AckSender = oneshot::Sender<TransportResult<()>>;

/// Receiving half of a registered ticket. Settles exactly once; a dropped
/// ticket reads as `TransportError::Closed`.
pub type AckReceiver = oneshot::Receiver<TransportResult<()>>;

#[derive(Default)]
struct Inner {
    next_ticket: u64,
    queued: VecDeque<(u64, AckKind, AckSender)>,
    in_flight: HashMap<(AckKind, u16), AckSender>,
    closed: bool,
}

/// Pending acknowledgement bookkeeping shared by the client side and the
/// event-loop driver.
#[derive(Default)]
pub struct AckTracker {
    inner: Mutex<Inner>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a ticket for a request about to be queued.
    ///
    /// After `close` the returned receiver resolves to `Closed` at once.
    pub fn register(&self, kind: AckKind) -> (u64, AckReceiver) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock();
        let ticket = inner.next_ticket;
        inner.next_ticket += 1;
        if !inner.closed {
            inner.queued.push_back((ticket, kind, tx));
        }
        (ticket, rx)
    }

    /// Drop a ticket whose request never made it into the client queue.
    pub fn cancel(&self, ticket: u64) {
        self.lock().queued.retain(|(t, _, _)| *t != ticket);
    }

    /// A request of `kind` left the client as packet `pkid`.
    pub fn on_sent(&self, kind: AckKind, pkid: u16) {
        let mut inner = self.lock();

        // Retransmission of a QoS 1 publish that is already bound.
        if inner.in_flight.contains_key(&(kind, pkid)) {
            return;
        }

        let Some(pos) = inner.queued.iter().position(|(_, k, _)| *k == kind) else {
            tracing::trace!(?kind, pkid, "outgoing packet without a registered ticket");
            return;
        };
        let Some((_, _, tx)) = inner.queued.remove(pos) else {
            return;
        };

        // QoS 0 publishes carry pkid 0 and are never acknowledged.
        if pkid == 0 {
            let _ = tx.send(Ok(()));
        } else {
            inner.in_flight.insert((kind, pkid), tx);
        }
    }

    /// The broker answered packet `pkid`.
    pub fn on_ack(&self, kind: AckKind, pkid: u16, result: Result<(), String>) {
        let Some(tx) = self.lock().in_flight.remove(&(kind, pkid)) else {
            tracing::trace!(?kind, pkid, "acknowledgement for unknown packet id");
            return;
        };
        let _ = tx.send(result.map_err(|reason| kind.error(reason)));
    }

    /// The connection dropped.
    ///
    /// Subscribe and unsubscribe requests already on the wire are not
    /// replayed by the client after a reconnect, so they fail now. QoS 1
    /// publishes stay pending because the client retransmits them.
    pub fn fail_in_flight(&self, reason: &str) {
        let mut inner = self.lock();
        let lost: Vec<(AckKind, u16)> = inner
            .in_flight
            .keys()
            .filter(|(kind, _)| *kind != AckKind::Publish)
            .copied()
            .collect();
        for key in lost {
            if let Some(tx) = inner.in_flight.remove(&key) {
                let _ = tx.send(Err(TransportError::Connection(reason.to_string())));
            }
        }
    }

    /// Drop every pending ticket and refuse new ones.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.queued.clear();
        inner.in_flight.clear();
    }

    /// Tickets still waiting, queued or in flight.
    pub fn pending(&self) -> usize {
        let inner = self.lock();
        inner.queued.len() + inner.in_flight.len()
    }
}

/// Wait for a ticket to settle.
pub async fn settle(ack: AckReceiver) -> TransportResult<()> {
    ack.await.unwrap_or(Err(TransportError::Closed))
}
