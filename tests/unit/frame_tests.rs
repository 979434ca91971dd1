//! Unit tests for frame classification, request builders, and chunk
//! extraction.

use serde_json::json;

use acp_harness::acp::frame::{AgentInfo, Frame, Request, JSONRPC_VERSION};
use acp_harness::config::ClientInfoConfig;
use acp_harness::AppError;

const CHUNK: &str = r#"{"jsonrpc":"2.0","method":"session/update","params":{"update":{"sessionUpdate":"agent_message_chunk","content":{"type":"text","text":"Hello World!"}}}}"#;

// ── Classification ───────────────────────────────────────────────────────────

#[test]
fn frame_with_id_is_response() {
    let frame = Frame::parse(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
    assert!(!frame.is_notification());
    assert_eq!(frame.id(), Some(&json!(1)));
}

#[test]
fn frame_without_id_is_notification() {
    let frame = Frame::parse(CHUNK).unwrap();
    assert!(frame.is_notification());
    assert!(frame.id().is_none());
}

#[test]
fn id_alone_decides_classification() {
    // A `method` does not make a frame a notification, and a missing
    // `result` does not make it one either.
    let with_method = Frame::parse(r#"{"id":7,"method":"session/update","params":{}}"#).unwrap();
    let bare_id = Frame::parse(r#"{"id":8}"#).unwrap();
    let null_id = Frame::parse(r#"{"id":null,"result":{}}"#).unwrap();
    let no_id = Frame::parse(r#"{"result":{}}"#).unwrap();

    assert!(matches!(with_method, Frame::Response(_)));
    assert!(matches!(bare_id, Frame::Response(_)));
    assert!(matches!(null_id, Frame::Response(_)));
    assert!(matches!(no_id, Frame::Notification(_)));
}

#[test]
fn invalid_json_is_malformed() {
    match Frame::parse("not valid json") {
        Err(AppError::Acp(msg)) => assert!(msg.contains("malformed json"), "got: {msg}"),
        other => panic!("expected malformed json error, got: {other:?}"),
    }
}

#[test]
fn non_object_json_is_rejected() {
    for line in ["[1,2,3]", "42", "\"text\"", "null"] {
        assert!(
            matches!(Frame::parse(line), Err(AppError::Acp(_))),
            "{line} must not decode as a frame"
        );
    }
}

#[test]
fn wrongly_typed_method_is_malformed_frame() {
    match Frame::parse(r#"{"method":42}"#) {
        Err(AppError::Acp(msg)) => assert!(msg.contains("malformed frame"), "got: {msg}"),
        other => panic!("expected malformed frame error, got: {other:?}"),
    }
}

// ── Responses ────────────────────────────────────────────────────────────────

#[test]
fn response_answers_only_its_numeric_id() {
    let Frame::Response(response) = Frame::parse(r#"{"id":3,"result":{}}"#).unwrap() else {
        panic!("expected response");
    };
    assert!(response.answers(3));
    assert!(!response.answers(2));

    let Frame::Response(string_id) = Frame::parse(r#"{"id":"3","result":{}}"#).unwrap() else {
        panic!("expected response");
    };
    assert!(!string_id.answers(3), "string ids never match numeric requests");
}

#[test]
fn session_id_must_be_non_empty_string() {
    let parse = |line: &str| match Frame::parse(line).unwrap() {
        Frame::Response(r) => r,
        Frame::Notification(_) => panic!("expected response"),
    };

    assert_eq!(
        parse(r#"{"id":2,"result":{"sessionId":"sess-abc"}}"#).session_id(),
        Some("sess-abc")
    );
    assert_eq!(parse(r#"{"id":2,"result":{"sessionId":""}}"#).session_id(), None);
    assert_eq!(parse(r#"{"id":2,"result":{}}"#).session_id(), None);
    assert_eq!(parse(r#"{"id":2,"result":{"sessionId":5}}"#).session_id(), None);
}

#[test]
fn error_message_renders_code_and_message() {
    let Frame::Response(response) =
        Frame::parse(r#"{"id":1,"error":{"code":-32601,"message":"Method not found"}}"#).unwrap()
    else {
        panic!("expected response");
    };

    assert!(response.is_error());
    assert_eq!(
        response.error_message().as_deref(),
        Some("Method not found (code -32601)")
    );
}

#[test]
fn stop_reason_is_opaque_string() {
    let Frame::Response(response) =
        Frame::parse(r#"{"id":3,"result":{"stopReason":"end_turn"}}"#).unwrap()
    else {
        panic!("expected response");
    };
    assert_eq!(response.stop_reason().as_deref(), Some("end_turn"));
}

// ── Notifications ────────────────────────────────────────────────────────────

#[test]
fn agent_message_chunk_text_is_extracted() {
    let Frame::Notification(notification) = Frame::parse(CHUNK).unwrap() else {
        panic!("expected notification");
    };
    assert!(notification.is_session_update());
    assert_eq!(notification.agent_message_text(), Some("Hello World!"));
}

#[test]
fn other_updates_yield_no_text() {
    let lines = [
        // Different update kind.
        r#"{"method":"session/update","params":{"update":{"sessionUpdate":"tool_call","content":{"type":"text","text":"x"}}}}"#,
        // Non-text content block.
        r#"{"method":"session/update","params":{"update":{"sessionUpdate":"agent_message_chunk","content":{"type":"image","data":"..."}}}}"#,
        // Not a session/update at all.
        r#"{"method":"session/other","params":{"update":{"sessionUpdate":"agent_message_chunk","content":{"type":"text","text":"x"}}}}"#,
        // No params.
        r#"{"method":"session/update"}"#,
    ];

    for line in lines {
        let Frame::Notification(notification) = Frame::parse(line).unwrap() else {
            panic!("expected notification for {line}");
        };
        assert_eq!(notification.agent_message_text(), None, "{line}");
    }
}

#[test]
fn text_block_without_text_yields_empty_chunk() {
    let Frame::Notification(notification) = Frame::parse(
        r#"{"method":"session/update","params":{"update":{"sessionUpdate":"agent_message_chunk","content":{"type":"text"}}}}"#,
    )
    .unwrap() else {
        panic!("expected notification");
    };
    assert_eq!(notification.agent_message_text(), Some(""));
}

// ── Requests ─────────────────────────────────────────────────────────────────

#[test]
fn initialize_request_shape() {
    let client = ClientInfoConfig::default();
    let value = Request::initialize(1, &client).to_value().unwrap();

    assert_eq!(
        value,
        json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "1",
                "clientInfo": { "name": "test-client", "version": "1.0.0" }
            }
        })
    );
}

#[test]
fn session_new_request_has_empty_params() {
    let value = Request::session_new(2).to_value().unwrap();
    assert_eq!(value["method"], "session/new");
    assert_eq!(value["params"], json!({}));
}

#[test]
fn prompt_request_carries_one_text_block() {
    let value = Request::session_prompt(3, "sess-abc", "Hello!")
        .to_value()
        .unwrap();

    assert_eq!(value["method"], "session/prompt");
    assert_eq!(value["id"], 3);
    assert_eq!(value["params"]["sessionId"], "sess-abc");
    assert_eq!(
        value["params"]["prompt"],
        json!([{ "type": "text", "text": "Hello!" }])
    );
}

// ── Agent info ───────────────────────────────────────────────────────────────

#[test]
fn agent_info_reads_initialize_result() {
    let result = json!({
        "protocolVersion": 1,
        "agentCapabilities": {},
        "agentInfo": { "name": "grok-cli", "version": "0.9.1" }
    });

    let info = AgentInfo::from_initialize_result(Some(&result));

    assert_eq!(info.protocol_version.as_deref(), Some("1"));
    assert_eq!(info.name.as_deref(), Some("grok-cli"));
    assert_eq!(info.version.as_deref(), Some("0.9.1"));
}

#[test]
fn agent_info_defaults_for_empty_result() {
    assert_eq!(
        AgentInfo::from_initialize_result(Some(&json!({}))),
        AgentInfo::default()
    );
    assert_eq!(AgentInfo::from_initialize_result(None), AgentInfo::default());
}
