use std::time::Duration;

use serde::Deserialize;

/// Transport configuration for an AWS IoT WebSocket endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// AWS region the endpoint lives in (part of the SigV4 scope).
    pub region: String,
    /// Broker hostname (e.g., `xxxx-ats.iot.us-east-1.amazonaws.com`).
    pub broker_host: String,
    /// Broker port (default 443 for WebSocket over TLS).
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// MQTT client ID (should be unique per device).
    pub client_id: String,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    /// First reconnect delay; doubles per failed attempt.
    #[serde(default = "default_base_reconnect_delay")]
    pub base_reconnect_delay_ms: u64,
    /// Upper bound on the reconnect delay.
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,
    /// How long `end` waits for the broker to take the DISCONNECT.
    #[serde(default = "default_end_timeout")]
    pub end_timeout_ms: u64,
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

impl TransportConfig {
    pub fn new(
        region: impl Into<String>,
        broker_host: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            broker_host: broker_host.into(),
            broker_port: default_port(),
            client_id: client_id.into(),
            keepalive_secs: default_keepalive(),
            base_reconnect_delay_ms: default_base_reconnect_delay(),
            max_reconnect_delay_ms: default_max_reconnect_delay(),
            end_timeout_ms: default_end_timeout(),
        }
    }

    /// `host` or `host:port`, exactly as it appears in the URL and the
    /// signed `host` header.
    pub fn authority(&self) -> String {
        if self.broker_port == default_port() {
            self.broker_host.clone()
        } else {
            format!("{}:{}", self.broker_host, self.broker_port)
        }
    }

    /// Unsigned WebSocket URL of the broker's MQTT endpoint.
    pub fn broker_url(&self) -> String {
        format!("wss://{}/mqtt", self.authority())
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.into())
    }

    pub fn end_timeout(&self) -> Duration {
        Duration::from_millis(self.end_timeout_ms)
    }
}
