//! MCP sessions driven frame by frame against the real registry and engine.

use super::helpers::{Platform, initialize, mixed_spec, next_response, platform};
use meshgate::protocol::domain::codes;
use meshgate::tool_registry::domain::ToolsetEnablement;
use rstest::rstest;
use serde_json::{Value, json};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn calls_before_initialized_are_rejected_and_never_executed(platform: Platform) {
    platform.tool_with_repos("repos").await;
    let (mut connection, _outbound) = platform.connect(ToolsetEnablement::all());

    let response = connection
        .handle_frame(r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"repos.github.repos.get","arguments":{"owner":"octo","repo":"hello"}}}"#)
        .await
        .expect("sequencing errors are answered immediately");

    assert_eq!(response.error_code(), Some(codes::SEQUENCING_ERROR));
    assert_eq!(platform.adapter.call_count(), 0);
    assert_eq!(connection.in_flight(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn listed_tools_follow_the_session_enablement(platform: Platform) {
    let tool = platform.register_tool("reports").await;
    platform.discover(tool.id(), &mixed_spec(3, 2)).await;
    let (mut connection, _outbound) = platform.connect(ToolsetEnablement::read_only());
    initialize(&mut connection).await;

    let response = connection
        .handle_frame(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
        .await
        .expect("list should be answered");

    let result = response.result.expect("list should succeed");
    let names: Vec<&str> = result
        .get("tools")
        .and_then(Value::as_array)
        .expect("tools array")
        .iter()
        .filter_map(|entry| entry.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names.iter().all(|name| name.starts_with("reports.github.")));
    assert!(names.iter().all(|name| !name.contains("purge")));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tool_calls_round_trip_through_the_engine(platform: Platform) {
    platform.tool_with_repos("repos").await;
    let (mut connection, mut outbound) = platform.connect(ToolsetEnablement::all());
    initialize(&mut connection).await;

    let immediate = connection
        .handle_frame(r#"{"jsonrpc":"2.0","id":"call-1","method":"tools/call","params":{"name":"repos.github.repos.get","arguments":{"owner":"octo","repo":"hello"}}}"#)
        .await;
    let response = next_response(&mut outbound).await;

    assert!(immediate.is_none());
    assert!(response.error.is_none(), "call failed: {response:?}");
    assert_eq!(platform.adapter.call_count(), 1);
    let result = response.result.expect("call should succeed");
    assert_eq!(result.get("isError"), Some(&json!(false)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_tools_fail_with_invalid_params(platform: Platform) {
    platform.tool_with_repos("repos").await;
    let (mut connection, mut outbound) = platform.connect(ToolsetEnablement::all());
    initialize(&mut connection).await;

    let immediate = connection
        .handle_frame(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"missing.github.repos.get"}}"#)
        .await;
    let response = match immediate {
        Some(response) => response,
        None => next_response(&mut outbound).await,
    };

    assert_eq!(response.error_code(), Some(codes::INVALID_PARAMS));
    assert_eq!(platform.adapter.call_count(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn closing_a_session_rejects_later_frames(platform: Platform) {
    let (mut connection, _outbound) = platform.connect(ToolsetEnablement::all());
    initialize(&mut connection).await;

    connection.close();
    let response = connection
        .handle_frame(r#"{"jsonrpc":"2.0","id":4,"method":"ping"}"#)
        .await
        .expect("closed sessions still answer requests");

    assert_eq!(response.error_code(), Some(codes::SEQUENCING_ERROR));
}
