//! JSON-RPC 2.0 framing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value, json};
use std::fmt;

/// JSON-RPC protocol version marker.
pub const JSONRPC_VERSION: &str = "2.0";

/// Fixed error codes used on the wire.
pub mod codes {
    /// The frame is not valid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// The frame is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// The parameters are invalid.
    pub const INVALID_PARAMS: i32 = -32602;
    /// The server failed unexpectedly.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// The request is not allowed in the session's current state.
    pub const SEQUENCING_ERROR: i32 = -32002;
    /// The tool call reached the execution engine and failed.
    pub const TOOL_EXECUTION_ERROR: i32 = -32001;
}

/// Caller-supplied request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    /// String identifier.
    String(String),
    /// Numeric identifier.
    Number(Number),
    /// Explicit `null` identifier.
    Null,
}

impl JsonRpcId {
    /// Reads an identifier from a JSON value.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self::String(text.clone())),
            Value::Number(number) => Some(Self::Number(number.clone())),
            Value::Null => Some(Self::Null),
            _ => None,
        }
    }
}

impl fmt::Display for JsonRpcId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(text) => write!(formatter, "\"{text}\""),
            Self::Number(number) => write!(formatter, "{number}"),
            Self::Null => formatter.write_str("null"),
        }
    }
}

impl From<i64> for JsonRpcId {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<&str> for JsonRpcId {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// An inbound request or notification.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    /// Identifier; `None` marks a notification.
    pub id: Option<JsonRpcId>,
    /// Method name.
    pub method: String,
    /// Parameters, defaulting to an empty object.
    pub params: Value,
}

impl JsonRpcRequest {
    /// Parses one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error response: [`codes::PARSE_ERROR`] for malformed JSON
    /// and [`codes::INVALID_REQUEST`] for a structurally invalid request.
    pub fn parse(text: &str) -> Result<Self, Box<JsonRpcResponse>> {
        let value: Value = serde_json::from_str(text).map_err(|err| {
            Box::new(JsonRpcResponse::error(
                JsonRpcId::Null,
                JsonRpcError::new(codes::PARSE_ERROR, format!("parse error: {err}")),
            ))
        })?;
        Self::from_value(value)
    }

    /// Validates a decoded frame.
    ///
    /// # Errors
    ///
    /// Returns an [`codes::INVALID_REQUEST`] error response when the frame is
    /// not a JSON-RPC 2.0 request object.
    pub fn from_value(value: Value) -> Result<Self, Box<JsonRpcResponse>> {
        let Value::Object(mut object) = value else {
            return Err(invalid_request(JsonRpcId::Null, "request must be an object"));
        };

        let id = match object.remove("id") {
            None => None,
            Some(raw) => match JsonRpcId::from_value(&raw) {
                Some(id) => Some(id),
                None => {
                    return Err(invalid_request(
                        JsonRpcId::Null,
                        "id must be a string, number or null",
                    ));
                }
            },
        };
        let reply_id = id.clone().unwrap_or(JsonRpcId::Null);

        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(invalid_request(reply_id, "jsonrpc must be \"2.0\""));
        }
        let Some(Value::String(method)) = object.remove("method") else {
            return Err(invalid_request(reply_id, "method must be a string"));
        };
        let params = match object.remove("params") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(params @ (Value::Object(_) | Value::Array(_))) => params,
            Some(_) => {
                return Err(invalid_request(reply_id, "params must be an object or array"));
            }
        };

        Ok(Self { id, method, params })
    }

    /// Returns whether the frame is a notification.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

fn invalid_request(id: JsonRpcId, message: &str) -> Box<JsonRpcResponse> {
    Box::new(JsonRpcResponse::error(
        id,
        JsonRpcError::new(codes::INVALID_REQUEST, message),
    ))
}

/// Structured error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Machine-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Creates an error without detail.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches machine-readable detail.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Creates a sequencing error for `method` in `state`.
    #[must_use]
    pub fn sequencing(method: &str, state: impl fmt::Display) -> Self {
        Self::new(
            codes::SEQUENCING_ERROR,
            format!("'{method}' is not allowed while the session is {state}"),
        )
        .with_data(json!({ "state": state.to_string() }))
    }
}

/// Outbound response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Identifier copied from the request.
    pub id: JsonRpcId,
    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Creates a success response.
    #[must_use]
    pub fn success(id: JsonRpcId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    #[must_use]
    pub fn error(id: JsonRpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Returns the error code, when this is an error response.
    #[must_use]
    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|error| error.code)
    }

    /// Serializes the response as one text frame.
    #[must_use]
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            format!(
                r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"serialization failed: {}"}}}}"#,
                codes::INTERNAL_ERROR,
                err.to_string().replace('"', "'")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn requests_and_notifications_are_distinguished() {
        let request = JsonRpcRequest::parse(r#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#)
            .expect("request should parse");
        let notification =
            JsonRpcRequest::parse(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .expect("notification should parse");

        assert_eq!(request.id, Some(JsonRpcId::from(7)));
        assert_eq!(request.params, json!({}));
        assert!(notification.is_notification());
    }

    #[test]
    fn explicit_null_ids_are_requests() {
        let request = JsonRpcRequest::parse(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#)
            .expect("request should parse");
        assert_eq!(request.id, Some(JsonRpcId::Null));
    }

    #[rstest]
    #[case("{not json", codes::PARSE_ERROR)]
    #[case("[1, 2]", codes::INVALID_REQUEST)]
    #[case(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#, codes::INVALID_REQUEST)]
    #[case(r#"{"jsonrpc":"2.0","id":1}"#, codes::INVALID_REQUEST)]
    #[case(r#"{"jsonrpc":"2.0","id":{"a":1},"method":"ping"}"#, codes::INVALID_REQUEST)]
    #[case(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":3}"#, codes::INVALID_REQUEST)]
    fn malformed_frames_are_rejected(#[case] frame: &str, #[case] code: i32) {
        let response = JsonRpcRequest::parse(frame).expect_err("frame should be rejected");
        assert_eq!(response.error_code(), Some(code));
    }

    #[test]
    fn error_responses_omit_result() {
        let frame = JsonRpcResponse::error(
            JsonRpcId::from("a"),
            JsonRpcError::new(codes::METHOD_NOT_FOUND, "nope"),
        )
        .to_frame();
        let value: Value = serde_json::from_str(&frame).expect("frame is JSON");

        assert_eq!(value["id"], json!("a"));
        assert_eq!(value["error"]["code"], json!(-32601));
        assert!(value.get("result").is_none());
    }
}
