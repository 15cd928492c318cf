//! Session configuration, loadable from TOML or built in code.

use std::sync::Arc;

use serde::Deserialize;

use cogniot_mqtt::TransportConfig;

use crate::logger::{Logger, NullLogger};

/// Settings supplied when a session is created.
#[derive(Clone, Deserialize)]
pub struct SessionConfig {
    /// AWS region of both the identity pool and the IoT endpoint.
    pub region: String,
    /// Cognito identity pool id (e.g., `us-east-1:1234abcd-...`).
    pub identity_pool_id: String,
    /// AWS IoT data endpoint host.
    pub broker_endpoint: String,
    /// MQTT client ID (should be unique per device).
    pub client_id: String,
    /// Start connecting as soon as the session is created. Defaults to true.
    #[serde(default)]
    pub auto_connect: Option<bool>,
    /// Broker port (default 443).
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    #[serde(default = "default_base_reconnect_delay")]
    pub base_reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,
    /// Upper bound on how long `disconnect` waits for the broker.
    #[serde(default = "default_end_timeout")]
    pub end_timeout_ms: u64,
    /// Log sink. Not loadable from files; unset means silent.
    #[serde(skip)]
    pub logger: Option<Arc<dyn Logger>>,
}

fn default_port() -> u16 {
    443
}

fn default_keepalive() -> u16 {
    30
}

fn default_base_reconnect_delay() -> u64 {
    1000
}

fn default_max_reconnect_delay() -> u64 {
    5000
}

fn default_end_timeout() -> u64 {
    5000
}

impl SessionConfig {
    pub fn new(
        region: impl Into<String>,
        identity_pool_id: impl Into<String>,
        broker_endpoint: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            identity_pool_id: identity_pool_id.into(),
            broker_endpoint: broker_endpoint.into(),
            client_id: client_id.into(),
            auto_connect: None,
            broker_port: default_port(),
            keepalive_secs: default_keepalive(),
            base_reconnect_delay_ms: default_base_reconnect_delay(),
            max_reconnect_delay_ms: default_max_reconnect_delay(),
            end_timeout_ms: default_end_timeout(),
            logger: None,
        }
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = Some(auto_connect);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every mandatory field is non-empty.
    pub fn validate(&self) -> anyhow::Result<()> {
        let required = [
            ("region", &self.region),
            ("identity_pool_id", &self.identity_pool_id),
            ("broker_endpoint", &self.broker_endpoint),
            ("client_id", &self.client_id),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                anyhow::bail!("session config field `{name}` must not be empty");
            }
        }
        Ok(())
    }

    /// Transport settings derived from this config.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            region: self.region.clone(),
            broker_host: self.broker_endpoint.clone(),
            broker_port: self.broker_port,
            client_id: self.client_id.clone(),
            keepalive_secs: self.keepalive_secs,
            base_reconnect_delay_ms: self.base_reconnect_delay_ms,
            max_reconnect_delay_ms: self.max_reconnect_delay_ms,
            end_timeout_ms: self.end_timeout_ms,
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("region", &self.region)
            .field("identity_pool_id", &self.identity_pool_id)
            .field("broker_endpoint", &self.broker_endpoint)
            .field("client_id", &self.client_id)
            .field("auto_connect", &self.auto_connect)
            .field("broker_port", &self.broker_port)
            .field("keepalive_secs", &self.keepalive_secs)
            .field("base_reconnect_delay_ms", &self.base_reconnect_delay_ms)
            .field("max_reconnect_delay_ms", &self.max_reconnect_delay_ms)
            .field("end_timeout_ms", &self.end_timeout_ms)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// Session config with every optional resolved. Owned by the session and
/// never mutated.
#[derive(Clone)]
pub struct ResolvedConfig {
    pub region: String,
    pub identity_pool_id: String,
    pub broker_endpoint: String,
    pub client_id: String,
    pub auto_connect: bool,
    pub transport: TransportConfig,
    pub logger: Arc<dyn Logger>,
}

impl From<SessionConfig> for ResolvedConfig {
    fn from(config: SessionConfig) -> Self {
        let transport = config.transport_config();
        Self {
            auto_connect: config.auto_connect.unwrap_or(true),
            logger: config.logger.unwrap_or_else(|| Arc::new(NullLogger)),
            region: config.region,
            identity_pool_id: config.identity_pool_id,
            broker_endpoint: config.broker_endpoint,
            client_id: config.client_id,
            transport,
        }
    }
}

impl std::fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("region", &self.region)
            .field("identity_pool_id", &self.identity_pool_id)
            .field("broker_endpoint", &self.broker_endpoint)
            .field("client_id", &self.client_id)
            .field("auto_connect", &self.auto_connect)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}
