//! E2E tests for subscribe, unsubscribe, publish and inbound messages.

mod helpers;

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::Level;

use cogniot_session::SessionError;

use helpers::TestHarness;

#[derive(Serialize)]
struct Telemetry {
    device_id: &'static str,
    temperature_c: f64,
}

/// Subscribe issues one batch and logs the count and joined names.
#[tokio::test]
async fn e2e_subscribe_batch() {
    let h = TestHarness::new();
    h.session.connect().await.unwrap();

    h.session
        .subscribe(&["devices/dev-1/commands", "fleet/broadcast"])
        .await
        .unwrap();

    assert_eq!(
        h.transport.subscriptions(),
        vec![vec!["devices/dev-1/commands", "fleet/broadcast"]]
    );
    let expected = "subscribing to 2 topics (devices/dev-1/commands, fleet/broadcast)";
    assert!(h.logger.messages_at(Level::INFO).contains(&expected.to_string()));
}

/// Empty topic lists go to the transport as zero-length batches.
#[tokio::test]
async fn e2e_empty_batches() {
    let h = TestHarness::new();
    let none: Vec<String> = Vec::new();

    h.session.subscribe(&none).await.unwrap();
    h.session.unsubscribe(&none).await.unwrap();

    assert_eq!(h.transport.subscriptions(), vec![Vec::<String>::new()]);
    assert_eq!(h.transport.unsubscriptions(), vec![Vec::<String>::new()]);
    assert!(
        h.logger
            .messages_at(Level::INFO)
            .contains(&"subscribing to 0 topics ()".to_string())
    );
}

/// A refused batch fails as a whole.
#[tokio::test]
async fn e2e_subscribe_refused() {
    let h = TestHarness::new();
    h.transport
        .fail_subscribe("broker refused 1 of 2 topic filters");

    let err = h.session.subscribe(&["ok/topic", "$aws/forbidden"]).await.unwrap_err();

    match err {
        SessionError::Subscription(cause) => assert!(cause.contains("refused 1 of 2")),
        other => panic!("expected subscription error, got {other:?}"),
    }
    assert_eq!(h.logger.messages_at(Level::ERROR).len(), 1);
}

/// Unsubscribe mirrors subscribe.
#[tokio::test]
async fn e2e_unsubscribe() {
    let h = TestHarness::new();
    h.session.subscribe(&["a", "b"]).await.unwrap();
    h.session.unsubscribe(&["a"]).await.unwrap();
    assert_eq!(h.transport.unsubscriptions(), vec![vec!["a"]]);

    h.transport.fail_unsubscribe("connection lost");
    let err = h.session.unsubscribe(&["b"]).await.unwrap_err();
    assert!(matches!(err, SessionError::Unsubscription(_)));
}

/// A successful publish writes JSON and logs exactly one debug line.
#[tokio::test]
async fn e2e_publish_struct_payload() {
    let h = TestHarness::new();
    h.session.connect().await.unwrap();

    let payload = Telemetry {
        device_id: "dev-1",
        temperature_c: 21.5,
    };
    h.session.publish("devices/dev-1/telemetry", &payload).await.unwrap();

    let published = h.transport.published_to("devices/dev-1/telemetry");
    assert_eq!(published.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
    assert_eq!(body, json!({"device_id": "dev-1", "temperature_c": 21.5}));

    let debug = h.logger.messages_at(Level::DEBUG);
    assert_eq!(debug.len(), 1);
    assert!(debug[0].starts_with("publishing to topic \"devices/dev-1/telemetry\""));
    assert!(h.logger.messages_at(Level::ERROR).is_empty());
}

/// A failed publish logs exactly one error naming the topic and payload.
#[tokio::test]
async fn e2e_publish_failure() {
    let h = TestHarness::new();
    h.transport.fail_publish("not authorized");

    let err = h
        .session
        .publish("devices/dev-1/state", &json!({"on": false}))
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::Publish(_)));
    let errors = h.logger.messages_at(Level::ERROR);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("devices/dev-1/state"));
    assert!(errors[0].contains(r#"{"on":false}"#));
}

/// Concurrent publishes each settle on their own.
#[tokio::test]
async fn e2e_concurrent_publishes() {
    let h = TestHarness::new();

    let (a, b) = tokio::join!(
        h.session.publish("t/a", &1),
        h.session.publish("t/b", &2),
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(h.transport.published().len(), 2);
}

/// Two message observers see one inbound message, in registration order,
/// with identical arguments.
#[tokio::test]
async fn e2e_message_observers_in_order() {
    let h = TestHarness::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    for name in ["first", "second"] {
        let tx = tx.clone();
        h.session.on_message(move |topic, payload| {
            let _ = tx.send((name, topic.to_string(), payload.to_string()));
        });
    }
    drop(tx);

    h.session.subscribe(&["devices/dev-1/commands"]).await.unwrap();
    h.transport
        .deliver("devices/dev-1/commands", br#"{"action":"reboot"}"#);

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.0, "first");
    assert_eq!(second.0, "second");
    assert_eq!((first.1.as_str(), first.2.as_str()), (second.1.as_str(), second.2.as_str()));
    assert_eq!(first.1, "devices/dev-1/commands");
    assert_eq!(first.2, r#"{"action":"reboot"}"#);

    // Logged once before the observers ran.
    let debug = h.logger.messages_at(Level::DEBUG);
    assert_eq!(debug.len(), 1);
    assert!(debug[0].contains("devices/dev-1/commands"));
}

/// An observer can answer an inbound command by publishing.
#[tokio::test]
async fn e2e_observer_replies_to_command() {
    let h = TestHarness::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    h.session.on_message(move |_, payload| {
        let _ = tx.send(payload.to_string());
    });

    h.transport.deliver("devices/dev-1/commands", b"ping");
    let command = rx.recv().await.unwrap();
    assert_eq!(command, "ping");

    h.session
        .publish("devices/dev-1/responses", &json!({"reply": "pong"}))
        .await
        .unwrap();
    assert_eq!(h.transport.published_to("devices/dev-1/responses").len(), 1);
}
