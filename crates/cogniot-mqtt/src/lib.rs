//! MQTT over secure WebSocket transport for AWS IoT Core.
//!
//! Provides the connection object a session drives:
//! - `Transport` trait for subscribe/publish/end plus an event stream (mockable in tests)
//! - `WssTransport` on `rumqttc` with SigV4-presigned WebSocket URLs
//! - `MockTransport` for testing without a broker
//! - `AckTracker` correlating requests with broker acknowledgements

pub mod acks;
pub mod backoff;
pub mod config;
pub mod error;
pub mod handler;
pub mod mock;
pub mod presign;
pub mod transport;

// Re-exports for convenience.
pub use acks::{AckKind, AckTracker};
pub use backoff::Backoff;
pub use config::TransportConfig;
pub use error::{TransportError, TransportResult};
pub use handler::{DriverAction, classify};
pub use mock::{MockTransport, PublishedMessage};
pub use transport::{Transport, WssTransport};
