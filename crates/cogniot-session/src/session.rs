//! The session façade: credential bootstrap, connection lifecycle, pub/sub
//! and event observation over one owned transport.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;

use cogniot_identity::{CognitoCredentialProvider, CredentialProvider};
use cogniot_mqtt::{Transport, WssTransport};

use crate::config::{ResolvedConfig, SessionConfig};
use crate::error::{SessionError, SessionResult};
use crate::observers::{Observers, dispatch_events};

/// Lifecycle of a session as seen by its owner.
///
/// Transport-level reconnects do not leave `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Constructed,
    Authenticating,
    Connected,
    Disconnecting,
    Disconnected,
}

/// State reachable from both the session handle and its auto-connect task.
struct Inner {
    config: ResolvedConfig,
    provider: Arc<dyn CredentialProvider>,
    transport: Arc<dyn Transport>,
    state: Mutex<SessionState>,
}

impl Inner {
    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect(&self) -> SessionResult<()> {
        let logger = &self.config.logger;
        self.set_state(SessionState::Authenticating);

        let credentials = match self.provider.fetch().await {
            Ok(credentials) => credentials,
            Err(e) => {
                let err = SessionError::from(e);
                logger.error(&format!("failed to connect: {err}"));
                self.set_state(SessionState::Disconnected);
                return Err(err);
            }
        };

        if let Some(expiration) = credentials.expiration {
            tracing::debug!(
                client_id = %self.config.client_id,
                expires_at = %expiration,
                "temporary credentials issued"
            );
        }
        if credentials.is_expired_at(Utc::now()) {
            logger.warn("issued credentials are already expired");
        }

        if !self.transport.update_websocket_credentials(&credentials) {
            // Ended transports never reopen; the session stays down.
            logger.warn("transport is closed; credentials not applied");
            self.set_state(SessionState::Disconnected);
            return Ok(());
        }
        self.set_state(SessionState::Connected);
        logger.info("connected");
        Ok(())
    }
}

/// A single broker session authorized by identity-pool credentials.
///
/// Must be created inside a Tokio runtime: construction spawns the event
/// dispatcher and, unless disabled, the initial connection attempt.
pub struct Session {
    inner: Arc<Inner>,
    observers: Arc<Observers>,
    dispatcher: JoinHandle<()>,
}

impl Session {
    /// Create a session backed by Cognito and a secure WebSocket transport.
    pub fn new(config: SessionConfig) -> Self {
        let provider = Arc::new(CognitoCredentialProvider::new(
            config.region.clone(),
            config.identity_pool_id.clone(),
        ));
        let transport = Arc::new(WssTransport::new(config.transport_config()));
        Self::with_collaborators(config, provider, transport)
    }

    /// Create a session over the given credential provider and transport.
    pub fn with_collaborators(
        config: SessionConfig,
        provider: Arc<dyn CredentialProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let config = ResolvedConfig::from(config);
        let observers = Arc::new(Observers::default());

        // Subscribe before anything can connect so no event is missed.
        let dispatcher = tokio::spawn(dispatch_events(
            transport.events(),
            observers.clone(),
            config.logger.clone(),
        ));

        let auto_connect = config.auto_connect;
        let inner = Arc::new(Inner {
            config,
            provider,
            transport,
            state: Mutex::new(SessionState::Constructed),
        });

        if auto_connect {
            let inner = inner.clone();
            tokio::spawn(async move {
                // Failure is already logged by connect.
                let _ = inner.connect().await;
            });
        }

        Self {
            inner,
            observers,
            dispatcher,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state()
    }

    // ── Connection lifecycle ──────────────────────────────────

    /// Exchange the identity for fresh credentials and hand them to the
    /// transport.
    ///
    /// Settles once credentials are injected; the broker handshake is
    /// reported through `on_connect`.
    pub async fn connect(&self) -> SessionResult<()> {
        self.inner.connect().await
    }

    /// Close the connection. Never fails, and works before `connect`.
    pub async fn disconnect(&self) {
        let logger = &self.inner.config.logger;
        logger.info("disconnecting");
        self.inner.set_state(SessionState::Disconnecting);

        self.inner.transport.end().await;

        self.inner.set_state(SessionState::Disconnected);
        logger.info("disconnected");
    }

    // ── Pub/sub ───────────────────────────────────────────────

    /// Subscribe to a batch of topic filters. Succeeds only if the broker
    /// accepts the whole batch.
    pub async fn subscribe<S: AsRef<str>>(&self, topics: &[S]) -> SessionResult<()> {
        let logger = &self.inner.config.logger;
        let topics = to_owned_topics(topics);
        let joined = topics.join(", ");
        logger.info(&format!("subscribing to {} topics ({joined})", topics.len()));

        self.inner.transport.subscribe(&topics).await.map_err(|e| {
            logger.error(&format!(
                "failed to subscribe to {} topics ({joined}): {e}",
                topics.len()
            ));
            SessionError::Subscription(e.to_string())
        })
    }

    /// Unsubscribe from a batch of topic filters.
    pub async fn unsubscribe<S: AsRef<str>>(&self, topics: &[S]) -> SessionResult<()> {
        let logger = &self.inner.config.logger;
        let topics = to_owned_topics(topics);
        let joined = topics.join(", ");
        logger.info(&format!(
            "unsubscribing from {} topics ({joined})",
            topics.len()
        ));

        self.inner.transport.unsubscribe(&topics).await.map_err(|e| {
            logger.error(&format!(
                "failed to unsubscribe from {} topics ({joined}): {e}",
                topics.len()
            ));
            SessionError::Unsubscription(e.to_string())
        })
    }

    /// Publish `payload` as JSON to `topic` with at-least-once delivery.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        payload: &T,
    ) -> SessionResult<()> {
        let logger = &self.inner.config.logger;

        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                logger.error(&format!(
                    "failed to publish event to topic \"{topic}\": payload is not serializable ({e})"
                ));
                return Err(SessionError::Publish(e.to_string()));
            }
        };

        logger.debug(&format!("publishing to topic \"{topic}\" ({body})"));

        self.inner
            .transport
            .publish(topic, body.as_bytes())
            .await
            .map_err(|e| {
                logger.error(&format!(
                    "failed to publish event to topic \"{topic}\" ({body}): {e}"
                ));
                SessionError::Publish(e.to_string())
            })
    }

    // ── Observers ─────────────────────────────────────────────

    /// Call `observer` every time the broker accepts a connection.
    pub fn on_connect(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.observers.add_connect(Arc::new(observer));
    }

    /// Call `observer` on every automatic reconnect attempt.
    pub fn on_reconnect(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.observers.add_reconnect(Arc::new(observer));
    }

    /// Call `observer` with `(topic, payload)` for every inbound message.
    pub fn on_message(&self, observer: impl Fn(&str, &str) + Send + Sync + 'static) {
        self.observers.add_message(Arc::new(observer));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

fn to_owned_topics<S: AsRef<str>>(topics: &[S]) -> Vec<String> {
    topics.iter().map(|t| t.as_ref().to_string()).collect()
}
