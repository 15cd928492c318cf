//! E2E tests for credential bootstrap, auto-connect and disconnect.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tracing::Level;

use cogniot_identity::IdentityError;
use cogniot_protocol::TransportEvent;
use cogniot_session::{SessionError, SessionState};

use helpers::{TestHarness, settle_tasks, wait_until};

/// Explicit connect exchanges the identity and injects exactly the issued
/// credentials.
#[tokio::test]
async fn e2e_connect_injects_issued_credentials() {
    let h = TestHarness::new();

    h.session.connect().await.unwrap();

    assert_eq!(h.provider.attempts(), 1);
    assert_eq!(
        h.transport.credential_updates(),
        vec![TestHarness::issued_credentials()]
    );
    assert_eq!(h.session.state(), SessionState::Connected);
    assert!(h.logger.messages_at(Level::INFO).contains(&"connected".to_string()));
}

/// A denied exchange surfaces the exchanger's error and never touches the
/// transport.
#[tokio::test]
async fn e2e_denied_exchange_fails_connect() {
    let h = TestHarness::failing(IdentityError::Exchange("denied".into()));

    let err = h.session.connect().await.unwrap_err();

    assert_eq!(err, SessionError::CredentialExchange("denied".into()));
    assert!(h.transport.credential_updates().is_empty());
    assert_eq!(h.session.state(), SessionState::Disconnected);

    let errors = h.logger.messages_at(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("denied"));
}

/// Identity resolution failures keep their own error kind.
#[tokio::test]
async fn e2e_resolution_failure_fails_connect() {
    let h = TestHarness::failing(IdentityError::Resolution("unknown pool".into()));

    let err = h.session.connect().await.unwrap_err();

    assert_eq!(err, SessionError::IdentityResolution("unknown pool".into()));
    assert!(h.transport.credential_updates().is_empty());
}

/// A failed connect can be retried once the identity pool recovers.
#[tokio::test]
async fn e2e_connect_retry_after_failure() {
    let h = TestHarness::failing(IdentityError::Exchange("throttled".into()));
    assert!(h.session.connect().await.is_err());

    h.provider.set_outcome(Ok(TestHarness::issued_credentials()));
    h.session.connect().await.unwrap();

    assert_eq!(h.provider.attempts(), 2);
    assert_eq!(h.transport.credential_updates().len(), 1);
    assert_eq!(h.session.state(), SessionState::Connected);
}

/// Unset auto-connect starts exactly one exchange without a `connect` call.
#[tokio::test]
async fn e2e_auto_connect_when_unset() {
    let h = TestHarness::with_auto_connect(None);

    wait_until(|| h.transport.credential_updates().len() == 1).await;
    settle_tasks().await;

    assert_eq!(h.provider.attempts(), 1);
}

/// Explicit `auto_connect = true` behaves like unset.
#[tokio::test]
async fn e2e_auto_connect_when_enabled() {
    let h = TestHarness::with_auto_connect(Some(true));

    wait_until(|| h.provider.attempts() == 1).await;
    settle_tasks().await;

    assert_eq!(h.provider.attempts(), 1);
    assert_eq!(h.transport.credential_updates().len(), 1);
}

/// Disabled auto-connect makes no attempt until asked.
#[tokio::test]
async fn e2e_no_auto_connect_when_disabled() {
    let h = TestHarness::with_auto_connect(Some(false));

    settle_tasks().await;
    assert_eq!(h.provider.attempts(), 0);
    assert_eq!(h.session.state(), SessionState::Constructed);

    h.session.connect().await.unwrap();
    assert_eq!(h.provider.attempts(), 1);
}

/// `on_connect` observers fire once the transport reports the handshake.
#[tokio::test]
async fn e2e_on_connect_fires_after_handshake() {
    let h = TestHarness::with_handshake();
    let (tx, mut rx) = mpsc::unbounded_channel();
    for id in 1..=2 {
        let tx = tx.clone();
        h.session.on_connect(move || {
            let _ = tx.send(id);
        });
    }

    h.session.connect().await.unwrap();

    assert_eq!(rx.recv().await, Some(1));
    assert_eq!(rx.recv().await, Some(2));
}

/// Reconnect observers fire on every automatic reconnect; connect observers
/// fire on every successful handshake.
#[tokio::test]
async fn e2e_reconnect_cycle_reaches_observers() {
    let h = TestHarness::new();
    let connects = Arc::new(AtomicUsize::new(0));
    let reconnects = Arc::new(AtomicUsize::new(0));
    {
        let connects = connects.clone();
        h.session.on_connect(move || {
            connects.fetch_add(1, Ordering::SeqCst);
        });
        let reconnects = reconnects.clone();
        h.session.on_reconnect(move || {
            reconnects.fetch_add(1, Ordering::SeqCst);
        });
    }

    h.session.connect().await.unwrap();
    h.transport.emit(TransportEvent::Connect);
    h.transport.emit(TransportEvent::Offline {
        reason: "connection reset by peer".into(),
    });
    h.transport.emit(TransportEvent::Reconnect);
    h.transport.emit(TransportEvent::Connect);

    wait_until(|| connects.load(Ordering::SeqCst) == 2).await;
    assert_eq!(reconnects.load(Ordering::SeqCst), 1);

    // Transport-level reconnects are invisible to the session state.
    assert_eq!(h.session.state(), SessionState::Connected);
    assert_eq!(
        h.logger.messages_at(Level::WARN),
        vec!["connection lost (connection reset by peer)"]
    );
}

/// Disconnect before any connect still ends the transport and settles.
#[tokio::test]
async fn e2e_disconnect_before_connect() {
    let h = TestHarness::new();

    h.session.disconnect().await;

    assert_eq!(h.transport.end_calls(), 1);
    assert_eq!(h.provider.attempts(), 0);
    assert_eq!(h.session.state(), SessionState::Disconnected);
}

/// Full lifecycle: connect, disconnect, with the expected log trail.
#[tokio::test]
async fn e2e_connect_then_disconnect() {
    let h = TestHarness::new();

    h.session.connect().await.unwrap();
    h.session.disconnect().await;

    assert_eq!(h.transport.end_calls(), 1);
    assert_eq!(
        h.logger.messages_at(Level::INFO),
        vec!["connected", "disconnecting", "disconnected"]
    );
}

/// A closed session cannot be reopened: connect still exchanges the identity
/// but the ended transport refuses the credentials.
#[tokio::test]
async fn e2e_connect_after_disconnect_stays_closed() {
    let h = TestHarness::with_handshake();
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    h.session.on_connect(move || {
        let _ = tx.send(());
    });

    h.session.disconnect().await;
    h.session.connect().await.unwrap();
    settle_tasks().await;

    assert_eq!(h.provider.attempts(), 1);
    assert_eq!(h.session.state(), SessionState::Disconnected);
    assert!(rx.try_recv().is_err());
    assert_eq!(
        h.logger.messages_at(Level::INFO),
        vec!["disconnecting", "disconnected"]
    );
}
