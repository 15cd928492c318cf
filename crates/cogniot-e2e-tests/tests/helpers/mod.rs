//! Shared test harness for E2E integration tests.
//!
//! Wires a real `Session` to the mock credential provider and mock
//! transport, so every test exercises the session, identity and transport
//! crates together without AWS or a broker.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use cogniot_identity::{IdentityError, MockCredentialProvider};
use cogniot_mqtt::MockTransport;
use cogniot_protocol::Credentials;
use cogniot_session::{RecordingLogger, Session, SessionConfig};

pub const REGION: &str = "us-east-1";
pub const POOL_ID: &str = "pool-1";
pub const ENDPOINT: &str = "iot.example.com";
pub const CLIENT_ID: &str = "dev-1";

/// End-to-end test harness: one session over mock collaborators.
pub struct TestHarness {
    pub session: Session,
    /// Shared with the session; records credential injections and pub/sub.
    pub transport: Arc<MockTransport>,
    /// Shared with the session; counts credential exchanges.
    pub provider: Arc<MockCredentialProvider>,
    /// Every line the session logged.
    pub logger: Arc<RecordingLogger>,
}

impl TestHarness {
    /// Session with auto-connect disabled and a provider returning
    /// `(AK, SK, TOK)`.
    pub fn new() -> Self {
        Self::build(MockCredentialProvider::default(), MockTransport::new(), Some(false))
    }

    /// Session whose credential exchange fails with `error`.
    pub fn failing(error: IdentityError) -> Self {
        Self::build(
            MockCredentialProvider::failing(error),
            MockTransport::new(),
            Some(false),
        )
    }

    /// Session with the given auto-connect setting (`None` leaves it unset).
    pub fn with_auto_connect(auto_connect: Option<bool>) -> Self {
        Self::build(MockCredentialProvider::default(), MockTransport::new(), auto_connect)
    }

    /// Session over a transport that accepts every handshake as soon as
    /// credentials arrive.
    pub fn with_handshake() -> Self {
        Self::build(
            MockCredentialProvider::default(),
            MockTransport::new().with_auto_handshake(),
            Some(false),
        )
    }

    pub fn build(
        provider: MockCredentialProvider,
        transport: MockTransport,
        auto_connect: Option<bool>,
    ) -> Self {
        init_tracing();

        let provider = Arc::new(provider);
        let transport = Arc::new(transport);
        let logger = Arc::new(RecordingLogger::new());

        let mut config =
            SessionConfig::new(REGION, POOL_ID, ENDPOINT, CLIENT_ID).with_logger(logger.clone());
        config.auto_connect = auto_connect;

        let session = Session::with_collaborators(config, provider.clone(), transport.clone());
        Self {
            session,
            transport,
            provider,
            logger,
        }
    }

    /// The credentials the default provider hands out.
    pub fn issued_credentials() -> Credentials {
        Credentials::new("AK", "SK", "TOK")
    }
}

/// Route `tracing` output through the test harness. Filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Yield to spawned tasks until `condition` holds. Panics after one second.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not met within 1s");
}

/// Give spawned tasks a chance to run.
pub async fn settle_tasks() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
