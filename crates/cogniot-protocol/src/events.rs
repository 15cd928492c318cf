//! Notifications emitted by a transport as its connection changes state.

use std::borrow::Cow;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text. Invalid UTF-8 is replaced, never rejected.
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Transport lifecycle and delivery events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker accepted a connection handshake (CONNACK).
    Connect,
    /// The transport is starting an automatic reconnect attempt.
    Reconnect,
    /// The connection dropped; a reconnect will follow unless the transport ended.
    Offline { reason: String },
    /// A publish arrived on a subscribed topic.
    Message(InboundMessage),
}
