//! Sessions against the fixture server binary.

use std::sync::Arc;
use std::time::Duration;

use mcp::{
    CallFailure, CallPolicy, ConnectionError, Error, ServerDescriptor, Session, SessionOptions,
    SessionState,
};
use serde_json::{Map, Value, json};

fn fixture() -> ServerDescriptor {
    ServerDescriptor::new(env!("CARGO_BIN_EXE_mcp-fixture-server"))
}

fn args(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("arguments must be an object"),
    }
}

fn text_of(result: &Value) -> &str {
    result["content"][0]["text"].as_str().unwrap()
}

async fn ready(options: SessionOptions) -> Session {
    let mut session = Session::new(options);
    session.connect(Arc::new(fixture())).await.unwrap();
    session
}

#[tokio::test]
async fn handshake_fetches_catalog() {
    let mut session = ready(SessionOptions::default()).await;
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.server_info().unwrap().name, "fixture");

    let catalog = session.list_tools().unwrap();
    assert_eq!(catalog.names()[..2], ["add", "echo"]);
    let add = catalog.get("add").unwrap();
    assert_eq!(add.required().collect::<Vec<_>>(), ["a", "b"]);

    session.disconnect().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.list_tools().is_err());
    session.disconnect().await;
}

#[tokio::test]
async fn call_tool_returns_result() {
    let session = ready(SessionOptions::default()).await;
    let result = session.call_tool("add", args(json!({"a": 2, "b": 3}))).await.unwrap();
    assert_eq!(text_of(&result), "5");
}

#[tokio::test]
async fn env_overlay_is_applied() {
    let mut session = Session::default();
    session
        .connect(Arc::new(fixture().env("FIXTURE_GREETING", "ahoy")))
        .await
        .unwrap();
    let result = session
        .call_tool("env", args(json!({"name": "FIXTURE_GREETING"})))
        .await
        .unwrap();
    assert_eq!(text_of(&result), "ahoy");

    // Inherited variables pass through untouched.
    let result = session.call_tool("env", args(json!({"name": "PATH"}))).await.unwrap();
    assert!(!text_of(&result).is_empty());
}

#[tokio::test]
async fn tool_error_payload_is_tool_call_error() {
    let session = ready(SessionOptions::default()).await;

    let err = session.call_tool("fail", Map::new()).await.unwrap_err();
    let Error::ToolCall(err) = err else { panic!("expected tool call error") };
    assert_eq!(err.name, "fail");
    assert!(matches!(&err.cause, CallFailure::Remote { message } if message == "boom"));

    let err = session.call_tool("rpc_error", Map::new()).await.unwrap_err();
    let Error::ToolCall(err) = err else { panic!("expected tool call error") };
    assert!(matches!(&err.cause, CallFailure::Remote { message } if message == "backend unavailable"));

    // Errors are data; the session keeps working.
    assert_eq!(session.state(), SessionState::Ready);
    let result = session.call_tool("echo", args(json!({"text": "still here"}))).await.unwrap();
    assert_eq!(text_of(&result), "still here");
}

#[tokio::test]
async fn notifications_and_server_requests_are_skipped() {
    let session = ready(SessionOptions::default()).await;
    let result = session.call_tool("chatty", Map::new()).await.unwrap();
    assert_eq!(text_of(&result), "done talking");
    let result = session.call_tool("echo", args(json!({"text": "after"}))).await.unwrap();
    assert_eq!(text_of(&result), "after");
}

#[tokio::test]
async fn timeout_keeps_session_ready_and_discards_late_answer() {
    let options = SessionOptions::default().call_timeout(Duration::from_millis(100));
    let session = ready(options).await;

    let err = session.call_tool("slow", args(json!({"ms": 400}))).await.unwrap_err();
    let Error::ToolCall(err) = err else { panic!("expected tool call error") };
    assert!(err.is_timeout());
    assert_eq!(session.state(), SessionState::Ready);

    // Give the late answer time to land before the next call.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let result = session.call_tool("echo", args(json!({"text": "fresh"}))).await.unwrap();
    assert_eq!(text_of(&result), "fresh");
}

#[tokio::test]
async fn timeout_mid_line_leaves_stream_in_step() {
    let options = SessionOptions::default().call_timeout(Duration::from_millis(400));
    let session = ready(options).await;

    let err = session.call_tool("split", args(json!({"ms": 600}))).await.unwrap_err();
    let Error::ToolCall(err) = err else { panic!("expected tool call error") };
    assert!(err.is_timeout());
    assert_eq!(session.state(), SessionState::Ready);

    // The tail of the late answer completes the buffered half and is discarded.
    let result = session.call_tool("echo", args(json!({"text": "next"}))).await.unwrap();
    assert_eq!(text_of(&result), "next");
}

#[tokio::test]
async fn plain_text_output_is_skipped() {
    let mut session = Session::default();
    session
        .connect(Arc::new(fixture().env("FIXTURE_MODE", "banner")))
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Ready);

    let result = session.call_tool("echo", args(json!({"text": "hi"}))).await.unwrap();
    assert_eq!(text_of(&result), "hi");
}

#[tokio::test]
async fn server_exit_mid_call_fails_session() {
    let session = ready(SessionOptions::default()).await;
    let err = session.call_tool("exit", Map::new()).await.unwrap_err();
    let Error::ToolCall(err) = err else { panic!("expected tool call error") };
    assert!(matches!(err.cause, CallFailure::ProcessExited));
    assert_eq!(session.state(), SessionState::Failed);

    let err = session.call_tool("echo", Map::new()).await.unwrap_err();
    let Error::ToolCall(err) = err else { panic!("expected tool call error") };
    assert!(matches!(err.cause, CallFailure::NotReady(SessionState::Failed)));
}

#[tokio::test]
async fn queued_calls_get_their_own_responses() {
    let session = Arc::new(ready(SessionOptions::default()).await);

    let slow = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.call_tool("slow", args(json!({"ms": 200}))).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let fast = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.call_tool("echo", args(json!({"text": "second"}))).await })
    };

    let slow = slow.await.unwrap().unwrap();
    let fast = fast.await.unwrap().unwrap();
    assert_eq!(text_of(&slow), "slept 200ms");
    assert_eq!(text_of(&fast), "second");
}

#[tokio::test]
async fn reject_policy_reports_busy() {
    let options = SessionOptions::default().policy(CallPolicy::Reject);
    let session = Arc::new(ready(options).await);

    let slow = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.call_tool("slow", args(json!({"ms": 300}))).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = session.call_tool("echo", args(json!({"text": "x"}))).await.unwrap_err();
    let Error::SessionBusy(busy) = err else { panic!("expected busy error") };
    assert_eq!(busy.in_flight, "slow");

    let slow = slow.await.unwrap().unwrap();
    assert_eq!(text_of(&slow), "slept 300ms");
}

#[tokio::test]
async fn reconnect_retires_previous_connection() {
    let mut session = ready(SessionOptions::default()).await;
    session.connect(Arc::new(fixture().env("FIXTURE_TAG", "second"))).await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    let result = session.call_tool("env", args(json!({"name": "FIXTURE_TAG"}))).await.unwrap();
    assert_eq!(text_of(&result), "second");
}

#[tokio::test]
async fn missing_executable_is_spawn_error() {
    let mut session = Session::default();
    let err = session
        .connect(Arc::new(ServerDescriptor::new("/no/such/mcp-server")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Spawn(_)));
    assert_ne!(session.state(), SessionState::Ready);
}

async fn handshake_error(mode: &str, options: SessionOptions) -> ConnectionError {
    let mut session = Session::new(options);
    let err = session
        .connect(Arc::new(fixture().env("FIXTURE_MODE", mode)))
        .await
        .unwrap_err();
    assert_eq!(session.state(), SessionState::Failed);
    match err {
        Error::Connection(e) => e,
        other => panic!("expected connection error, got {other}"),
    }
}

#[tokio::test]
async fn handshake_failures_are_connection_errors() {
    let options = SessionOptions::default().handshake_timeout(Duration::from_millis(300));

    assert!(matches!(
        handshake_error("exit", options).await,
        ConnectionError::ProcessExited
    ));
    assert!(matches!(
        handshake_error("garbage", options).await,
        ConnectionError::Malformed(_)
    ));
    assert!(matches!(
        handshake_error("silent", options).await,
        ConnectionError::Timeout(_)
    ));
    assert!(matches!(
        handshake_error("reject", options).await,
        ConnectionError::Rejected(_)
    ));
}
