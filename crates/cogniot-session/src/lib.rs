//! Credential-bootstrapped MQTT session for AWS IoT Core.
//!
//! `Session` owns one transport and one resolved configuration. `connect`
//! exchanges an anonymous Cognito identity for temporary credentials and
//! hands them to the transport; pub/sub calls settle once the broker
//! answers; connection events and inbound messages reach registered
//! observers in registration order.
//!
//! ```ignore
//! let session = Session::new(
//!     SessionConfig::new("us-east-1", "us-east-1:pool-id", "xxxx-ats.iot.us-east-1.amazonaws.com", "dev-1"),
//! );
//! session.on_message(|topic, payload| println!("{topic}: {payload}"));
//! session.subscribe(&["devices/dev-1/commands"]).await?;
//! session.publish("devices/dev-1/state", &serde_json::json!({"on": true})).await?;
//! ```

pub mod config;
pub mod error;
pub mod logger;
mod observers;
pub mod session;

pub use config::{ResolvedConfig, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use logger::{LogEntry, Logger, NullLogger, RecordingLogger, TracingLogger};
pub use session::{Session, SessionState};
