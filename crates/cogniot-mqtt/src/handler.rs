//! Event classification for the MQTT event loop.
//!
//! Reduces raw `rumqttc` events to the handful of actions the transport
//! driver cares about, so the driver loop stays a flat match.

use rumqttc::{Event, Outgoing, Packet, SubscribeReasonCode};

use cogniot_protocol::InboundMessage;

use crate::acks::AckKind;

/// What the driver should do with one event-loop event.
#[derive(Debug, PartialEq, Eq)]
pub enum DriverAction {
    /// CONNACK received; the connection is up.
    Connected,
    /// Inbound publish on a subscribed topic.
    Message(InboundMessage),
    /// A request left the client with this packet id.
    Sent(AckKind, u16),
    /// The broker acknowledged a packet id, possibly refusing it.
    Acked(AckKind, u16, Result<(), String>),
    /// Our DISCONNECT went out; the connection is finished.
    Disconnected,
    /// Pings, QoS 2 handshakes and anything else the driver ignores.
    Ignore,
}

/// Classify a raw event-loop event.
pub fn classify(event: &Event) -> DriverAction {
    match event {
        Event::Incoming(packet) => classify_incoming(packet),
        Event::Outgoing(outgoing) => classify_outgoing(outgoing),
    }
}

fn classify_incoming(packet: &Packet) -> DriverAction {
    match packet {
        Packet::ConnAck(_) => DriverAction::Connected,
        Packet::Publish(publish) => DriverAction::Message(InboundMessage::new(
            publish.topic.clone(),
            publish.payload.to_vec(),
        )),
        Packet::SubAck(suback) => {
            let refused = suback
                .return_codes
                .iter()
                .filter(|code| matches!(code, SubscribeReasonCode::Failure))
                .count();
            let result = if refused == 0 {
                Ok(())
            } else {
                Err(format!(
                    "broker refused {refused} of {} topic filters",
                    suback.return_codes.len()
                ))
            };
            DriverAction::Acked(AckKind::Subscribe, suback.pkid, result)
        }
        Packet::UnsubAck(unsuback) => {
            DriverAction::Acked(AckKind::Unsubscribe, unsuback.pkid, Ok(()))
        }
        Packet::PubAck(puback) => DriverAction::Acked(AckKind::Publish, puback.pkid, Ok(())),
        _ => DriverAction::Ignore,
    }
}

fn classify_outgoing(outgoing: &Outgoing) -> DriverAction {
    match outgoing {
        Outgoing::Subscribe(pkid) => DriverAction::Sent(AckKind::Subscribe, *pkid),
        Outgoing::Unsubscribe(pkid) => DriverAction::Sent(AckKind::Unsubscribe, *pkid),
        Outgoing::Publish(pkid) => DriverAction::Sent(AckKind::Publish, *pkid),
        Outgoing::Disconnect => DriverAction::Disconnected,
        _ => DriverAction::Ignore,
    }
}
