//! Unit tests for the scripted in-memory transport.

use std::time::Duration;

use serde_json::json;

use acp_harness::acp::memory::MemoryTransport;
use acp_harness::acp::transport::{AgentTransport, Inbound, ShutdownOutcome};
use acp_harness::AppError;

const TICK: Duration = Duration::from_millis(5);

#[tokio::test]
async fn queued_lines_are_served_in_order() {
    let mut transport = MemoryTransport::new().with_lines(["first", "second"]);

    assert_eq!(transport.receive(TICK).await, Inbound::Line("first".into()));
    assert_eq!(transport.receive(TICK).await, Inbound::Line("second".into()));
    assert_eq!(transport.receive(TICK).await, Inbound::TimedOut);
}

#[tokio::test]
async fn scripted_reply_is_released_by_matching_request() {
    let mut transport = MemoryTransport::new().reply_to("session/new", ["reply"]);

    assert_eq!(transport.receive(TICK).await, Inbound::TimedOut);

    transport
        .send(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
        .await
        .unwrap();
    assert_eq!(
        transport.receive(TICK).await,
        Inbound::TimedOut,
        "a different method must not release the script"
    );

    transport
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "session/new", "params": {}}))
        .await
        .unwrap();
    assert_eq!(transport.receive(TICK).await, Inbound::Line("reply".into()));
    assert_eq!(transport.sent_methods(), vec!["initialize", "session/new"]);
}

#[tokio::test]
async fn scripts_fire_once() {
    let mut transport = MemoryTransport::new().reply_to("initialize", ["only once"]);
    let frame = json!({"id": 1, "method": "initialize"});

    transport.send(frame.clone()).await.unwrap();
    transport.send(frame).await.unwrap();

    assert_eq!(transport.receive(TICK).await, Inbound::Line("only once".into()));
    assert_eq!(transport.receive(TICK).await, Inbound::TimedOut);
}

#[tokio::test]
async fn close_when_empty_reports_end_of_stream() {
    let mut transport = MemoryTransport::new().close_when_empty();
    assert_eq!(transport.receive(TICK).await, Inbound::Closed);
}

#[tokio::test]
async fn line_slower_than_timeout_is_not_delivered_yet() {
    let mut transport = MemoryTransport::new()
        .with_lines(["late"])
        .with_line_delay(Duration::from_millis(50));

    assert_eq!(transport.receive(TICK).await, Inbound::TimedOut);
    assert_eq!(
        transport.receive(Duration::from_millis(100)).await,
        Inbound::Line("late".into())
    );
}

#[tokio::test]
async fn send_after_shutdown_fails() {
    let mut transport = MemoryTransport::new();

    let outcome = transport.shutdown(TICK).await.unwrap();
    assert_eq!(outcome, ShutdownOutcome::Exited { code: Some(0) });
    assert!(transport.is_shut_down());

    let err = transport.send(json!({"id": 1})).await.unwrap_err();
    assert!(matches!(err, AppError::Io(_)));
    assert_eq!(transport.receive(TICK).await, Inbound::Closed);
}
