//! MQTT transport: `rumqttc` over a SigV4-presigned secure WebSocket.
//!
//! The `AsyncClient`/`EventLoop` pair is created up front without
//! credentials. Injecting credentials starts a driver task that signs the
//! broker URL, polls the event loop, settles acknowledgements and fans
//! connection events out on a broadcast channel. Before every reconnect
//! attempt the URL is re-signed with the most recently injected credentials.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, EventLoop, MqttOptions, QoS, SubscribeFilter};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use cogniot_protocol::{Credentials, TransportEvent};

use crate::acks::{AckKind, AckTracker, settle};
use crate::backoff::Backoff;
use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::handler::{DriverAction, classify};
use crate::presign::presign_url;

/// Maximum MQTT packet size in bytes.
/// AWS IoT Core accepts 128 KB payloads; the rest is headroom for the
/// fixed header and topic.
const MAX_PACKET_SIZE: usize = 128 * 1024 + 4 * 1024;

/// Requests buffered between the client and the event loop.
const REQUEST_CAPACITY: usize = 64;

/// Events buffered per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

// ── Transport trait ───────────────────────────────────────────

/// Abstraction over the broker connection owned by a session.
///
/// Enables mocking in tests without a real broker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Store credentials for the WebSocket handshake. The first call opens
    /// the connection; later calls apply from the next reconnect attempt.
    ///
    /// Returns `false` when the transport has ended and will not use them.
    fn update_websocket_credentials(&self, credentials: &Credentials) -> bool;

    /// Close the connection. Resolves once the transport has stopped.
    async fn end(&self);

    /// Subscribe to a batch of topic filters, settled by one SUBACK.
    async fn subscribe(&self, topics: &[String]) -> TransportResult<()>;

    /// Unsubscribe from a batch of topic filters.
    async fn unsubscribe(&self, topics: &[String]) -> TransportResult<()>;

    /// Publish a raw payload to a topic.
    async fn publish(&self, topic: &str, payload: &[u8]) -> TransportResult<()>;

    /// Subscribe to connection and message events.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;
}

// ── WssTransport ──────────────────────────────────────────────

/// State shared between the transport handle and its driver task.
struct Shared {
    config: TransportConfig,
    credentials: RwLock<Option<Credentials>>,
    acks: AckTracker,
    events: broadcast::Sender<TransportEvent>,
    started: AtomicBool,
    ending: AtomicBool,
}

impl Shared {
    fn emit(&self, event: TransportEvent) {
        // No receivers is fine; nobody is listening yet.
        let _ = self.events.send(event);
    }

    /// Options for the next connection attempt, signed now.
    fn signed_options(&self) -> TransportResult<MqttOptions> {
        let credentials = self
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TransportError::NotStarted)?;

        let url = presign_url(
            &self.config.authority(),
            &self.config.region,
            &credentials,
            chrono::Utc::now(),
        )?;
        Ok(mqtt_options(&self.config, url))
    }
}

/// MQTT connection to AWS IoT Core over secure WebSocket.
pub struct WssTransport {
    client: AsyncClient,
    shared: Arc<Shared>,
    eventloop: Mutex<Option<EventLoop>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    send_lock: tokio::sync::Mutex<()>,
}

impl WssTransport {
    /// Create the transport. No network I/O happens until credentials are
    /// injected, so this never fails.
    pub fn new(config: TransportConfig) -> Self {
        let options = mqtt_options(&config, config.broker_url());
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            client,
            shared: Arc::new(Shared {
                config,
                credentials: RwLock::new(None),
                acks: AckTracker::new(),
                events,
                started: AtomicBool::new(false),
                ending: AtomicBool::new(false),
            }),
            eventloop: Mutex::new(Some(eventloop)),
            driver: Mutex::new(None),
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.shared.config
    }

    fn ensure_running(&self) -> TransportResult<()> {
        if self.shared.ending.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !self.shared.started.load(Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Packet sizes ──────────────────────────────────────────────

/// Full encoded size of a packet with `remaining` bytes after the fixed
/// header's first byte.
fn packet_size(remaining: usize) -> usize {
    let length_bytes = match remaining {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    };
    1 + length_bytes + remaining
}

/// QoS 1 PUBLISH: topic, packet id, payload.
fn publish_packet_size(topic: &str, payload_len: usize) -> usize {
    packet_size(2 + topic.len() + 2 + payload_len)
}

/// SUBSCRIBE: packet id, then each filter with its QoS byte.
fn subscribe_packet_size(topics: &[String]) -> usize {
    packet_size(2 + topics.iter().map(|t| 2 + t.len() + 1).sum::<usize>())
}

/// UNSUBSCRIBE of a single filter.
fn unsubscribe_packet_size(topic: &str) -> usize {
    packet_size(2 + 2 + topic.len())
}

fn mqtt_options(config: &TransportConfig, url: String) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, url, config.broker_port);
    options.set_keep_alive(config.keepalive());
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
    options.set_transport(rumqttc::Transport::wss_with_default_config());
    options
}

#[async_trait]
impl Transport for WssTransport {
    fn update_websocket_credentials(&self, credentials: &Credentials) -> bool {
        *self
            .shared
            .credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());

        if self.shared.ending.load(Ordering::SeqCst) {
            tracing::warn!(
                client_id = %self.shared.config.client_id,
                "credentials updated after transport ended; not reconnecting"
            );
            return false;
        }

        let Some(eventloop) = lock(&self.eventloop).take() else {
            tracing::debug!(
                client_id = %self.shared.config.client_id,
                "credentials updated; used from the next reconnect"
            );
            return true;
        };

        self.shared.started.store(true, Ordering::SeqCst);
        tracing::info!(
            client_id = %self.shared.config.client_id,
            broker = %self.shared.config.authority(),
            "starting MQTT connection"
        );
        let handle = tokio::spawn(drive(eventloop, self.shared.clone()));
        *lock(&self.driver) = Some(handle);
        true
    }

    async fn end(&self) {
        self.shared.ending.store(true, Ordering::SeqCst);

        let Some(mut handle) = lock(&self.driver).take() else {
            tracing::debug!(
                client_id = %self.shared.config.client_id,
                "end requested before connection started"
            );
            lock(&self.eventloop).take();
            self.shared.acks.close();
            return;
        };

        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(error = %e, "could not queue MQTT disconnect");
        }

        let timeout = self.shared.config.end_timeout();
        if tokio::time::timeout(timeout, &mut handle).await.is_err() {
            tracing::warn!(
                timeout_ms = self.shared.config.end_timeout_ms,
                "broker did not confirm disconnect, dropping connection"
            );
            handle.abort();
            self.shared.acks.close();
        }
    }

    async fn subscribe(&self, topics: &[String]) -> TransportResult<()> {
        self.ensure_running()?;
        if topics.is_empty() {
            return Err(TransportError::Subscribe(
                "MQTT SUBSCRIBE needs at least one topic filter".into(),
            ));
        }
        let size = subscribe_packet_size(topics);
        if size > MAX_PACKET_SIZE {
            return Err(TransportError::Subscribe(format!(
                "SUBSCRIBE packet of {size} bytes exceeds the {MAX_PACKET_SIZE} byte limit"
            )));
        }

        let filters: Vec<SubscribeFilter> = topics
            .iter()
            .map(|t| SubscribeFilter::new(t.clone(), QoS::AtLeastOnce))
            .collect();

        let ack = {
            let _guard = self.send_lock.lock().await;
            let (ticket, ack) = self.shared.acks.register(AckKind::Subscribe);
            if let Err(e) = self.client.subscribe_many(filters).await {
                self.shared.acks.cancel(ticket);
                return Err(TransportError::Subscribe(e.to_string()));
            }
            ack
        };
        settle(ack).await
    }

    async fn unsubscribe(&self, topics: &[String]) -> TransportResult<()> {
        self.ensure_running()?;
        if topics.is_empty() {
            return Err(TransportError::Unsubscribe(
                "MQTT UNSUBSCRIBE needs at least one topic filter".into(),
            ));
        }
        if let Some(size) = topics
            .iter()
            .map(|t| unsubscribe_packet_size(t))
            .find(|size| *size > MAX_PACKET_SIZE)
        {
            return Err(TransportError::Unsubscribe(format!(
                "UNSUBSCRIBE packet of {size} bytes exceeds the {MAX_PACKET_SIZE} byte limit"
            )));
        }

        // rumqttc has no batched unsubscribe; one packet per filter, one
        // result for the batch.
        let mut acks = Vec::with_capacity(topics.len());
        {
            let _guard = self.send_lock.lock().await;
            for topic in topics {
                let (ticket, ack) = self.shared.acks.register(AckKind::Unsubscribe);
                if let Err(e) = self.client.unsubscribe(topic.as_str()).await {
                    self.shared.acks.cancel(ticket);
                    return Err(TransportError::Unsubscribe(e.to_string()));
                }
                acks.push(ack);
            }
        }

        for ack in acks {
            settle(ack).await?;
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> TransportResult<()> {
        self.ensure_running()?;

        // The event loop drops oversized packets without an `Outgoing`
        // event, which would leave their ticket unbound.
        let size = publish_packet_size(topic, payload.len());
        if size > MAX_PACKET_SIZE {
            return Err(TransportError::Publish(format!(
                "PUBLISH packet of {size} bytes exceeds the {MAX_PACKET_SIZE} byte limit"
            )));
        }

        let ack = {
            let _guard = self.send_lock.lock().await;
            let (ticket, ack) = self.shared.acks.register(AckKind::Publish);
            if let Err(e) = self
                .client
                .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
                .await
            {
                self.shared.acks.cancel(ticket);
                return Err(TransportError::Publish(e.to_string()));
            }
            ack
        };
        settle(ack).await
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.shared.events.subscribe()
    }
}

impl Drop for WssTransport {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.driver).take() {
            handle.abort();
        }
    }
}

// ── Driver ────────────────────────────────────────────────────

/// Drive the event loop until the transport ends.
///
/// Connection errors never stop the driver; it waits out the backoff,
/// re-signs the URL and lets the next poll reconnect.
async fn drive(mut eventloop: EventLoop, shared: Arc<Shared>) {
    let config = &shared.config;
    let mut backoff = Backoff::from_millis(
        config.base_reconnect_delay_ms,
        config.max_reconnect_delay_ms,
    );
    let mut needs_signing = true;

    loop {
        if needs_signing {
            match shared.signed_options() {
                Ok(options) => {
                    eventloop.mqtt_options = options;
                    needs_signing = false;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to sign broker URL");
                    tokio::time::sleep(backoff.next_delay()).await;
                    continue;
                }
            }
        }

        match eventloop.poll().await {
            Ok(event) => match classify(&event) {
                DriverAction::Connected => {
                    backoff.reset();
                    tracing::info!(client_id = %config.client_id, "connected to broker");
                    shared.emit(TransportEvent::Connect);
                }
                DriverAction::Message(message) => {
                    tracing::trace!(
                        topic = %message.topic,
                        bytes = message.payload.len(),
                        "inbound publish"
                    );
                    shared.emit(TransportEvent::Message(message));
                }
                DriverAction::Sent(kind, pkid) => shared.acks.on_sent(kind, pkid),
                DriverAction::Acked(kind, pkid, result) => {
                    shared.acks.on_ack(kind, pkid, result)
                }
                DriverAction::Disconnected => {
                    tracing::info!(client_id = %config.client_id, "disconnected from broker");
                    break;
                }
                DriverAction::Ignore => {}
            },
            Err(ConnectionError::RequestsDone) => {
                tracing::debug!("client handle dropped, stopping driver");
                break;
            }
            Err(e) => {
                if shared.ending.load(Ordering::SeqCst) {
                    tracing::debug!(error = %e, "connection closed while ending");
                    break;
                }

                let reason = e.to_string();
                shared.acks.fail_in_flight(&reason);
                shared.emit(TransportEvent::Offline { reason });

                let delay = backoff.next_delay();
                tracing::warn!(
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "MQTT connection lost, reconnecting"
                );
                tokio::time::sleep(delay).await;

                needs_signing = true;
                shared.emit(TransportEvent::Reconnect);
            }
        }
    }

    shared.acks.close();
}
