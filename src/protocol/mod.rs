//! MCP protocol session layer.
//!
//! Agents connect over a long-lived WebSocket and speak JSON-RPC 2.0. Each
//! connection owns one [`domain::McpSession`] that walks the handshake
//! (`Connected`, `Initializing`, `Ready`, `Closed`) and rejects requests that
//! arrive out of order. Tool listings come from the tenant's catalogs,
//! shaped for the detected client class; calls go to the execution engine.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Session services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
