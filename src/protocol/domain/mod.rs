//! Domain model for MCP sessions and JSON-RPC framing.
//!
//! Framing, client classification, schema shaping and the session state
//! machine are pure. Transport and catalog access stay behind the protocol
//! ports.

mod client;
mod error;
mod jsonrpc;
mod session;
mod tool_error;
mod wire;

pub use client::{
    AGENT_ID_HEADER, AGENT_TYPE_HEADER, CLAUDE_CODE_VERSION_HEADER, ClientClass,
    HandshakeMetadata, IDE_NAME_HEADER, ShapingProfile, detect_client_class,
};
pub use error::{ParseClientClassError, ProtocolDomainError};
pub use jsonrpc::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse, codes,
};
pub use session::{
    LATEST_PROTOCOL_VERSION, McpSession, McpSessionId, SUPPORTED_PROTOCOL_VERSIONS, SessionState,
    methods, negotiate_version,
};
pub use tool_error::tool_execution_error;
pub use wire::WireToolName;
