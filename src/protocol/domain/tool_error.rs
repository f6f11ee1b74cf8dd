//! Mapping of execution failures onto JSON-RPC errors.

use super::{JsonRpcError, codes};
use crate::tool_registry::services::ExecutionError;
use serde_json::{Map, Value, json};

/// Builds the `-32001` error for a failed tool call.
///
/// `data.kind` carries the failure class. Circuit rejections add
/// `retryAfterMs`, validation failures add `violations`, and provider
/// failures add `providerClass`.
#[must_use]
pub fn tool_execution_error(err: &ExecutionError) -> JsonRpcError {
    let mut data = Map::new();
    data.insert("kind".to_owned(), json!(err.kind()));
    if let Some(retry_after) = err.retry_after() {
        data.insert(
            "retryAfterMs".to_owned(),
            json!(u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX)),
        );
    }
    if let Some(violations) = err.violations() {
        data.insert("violations".to_owned(), json!(violations));
    }
    if let Some(class) = err.provider_class() {
        data.insert("providerClass".to_owned(), json!(class));
    }
    JsonRpcError::new(codes::TOOL_EXECUTION_ERROR, err.to_string()).with_data(Value::Object(data))
}
