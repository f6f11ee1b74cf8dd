//! Session services for the MCP protocol layer.

mod connection;

pub use connection::{McpConnection, SERVER_NAME};
