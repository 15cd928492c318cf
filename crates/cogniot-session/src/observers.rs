//! Observer registry and the task that feeds it transport events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use cogniot_protocol::TransportEvent;

use crate::logger::Logger;

pub(crate) type ConnectionObserver = Arc<dyn Fn() + Send + Sync>;
pub(crate) type MessageObserver = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Registered callbacks, grouped by event type. Registrations only ever
/// accumulate.
#[derive(Default)]
pub(crate) struct Observers {
    connect: Mutex<Vec<ConnectionObserver>>,
    reconnect: Mutex<Vec<ConnectionObserver>>,
    message: Mutex<Vec<MessageObserver>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Observers {
    pub(crate) fn add_connect(&self, observer: ConnectionObserver) {
        lock(&self.connect).push(observer);
    }

    pub(crate) fn add_reconnect(&self, observer: ConnectionObserver) {
        lock(&self.reconnect).push(observer);
    }

    pub(crate) fn add_message(&self, observer: MessageObserver) {
        lock(&self.message).push(observer);
    }

    /// Invoke the observers for `event` in registration order.
    ///
    /// The list is snapshotted first so an observer may register another
    /// without deadlocking; the new one fires from the next event.
    pub(crate) fn notify(&self, event: &TransportEvent, logger: &dyn Logger) {
        match event {
            TransportEvent::Connect => {
                let observers = lock(&self.connect).clone();
                for observer in observers {
                    observer();
                }
            }
            TransportEvent::Reconnect => {
                let observers = lock(&self.reconnect).clone();
                for observer in observers {
                    observer();
                }
            }
            TransportEvent::Offline { reason } => {
                logger.warn(&format!("connection lost ({reason})"));
            }
            TransportEvent::Message(message) => {
                let payload = message.payload_str();
                let payload: &str = &payload;
                logger.debug(&format!(
                    "received message on topic \"{}\" ({payload})",
                    message.topic
                ));
                let observers = lock(&self.message).clone();
                for observer in observers {
                    observer(message.topic.as_str(), payload);
                }
            }
        }
    }
}

/// Forward transport events to observers until the transport goes away.
pub(crate) async fn dispatch_events(
    mut events: broadcast::Receiver<TransportEvent>,
    observers: Arc<Observers>,
    logger: Arc<dyn Logger>,
) {
    loop {
        match events.recv().await {
            Ok(event) => observers.notify(&event, logger.as_ref()),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "observers fell behind, transport events dropped");
            }
            Err(RecvError::Closed) => {
                tracing::debug!("transport event stream closed");
                break;
            }
        }
    }
}
