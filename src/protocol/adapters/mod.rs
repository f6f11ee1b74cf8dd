//! Adapter implementations for the protocol session layer.

pub mod registry;
pub mod websocket;

pub use registry::RegistryToolGateway;
pub use websocket::{
    GITHUB_TOKEN_HEADER, GITLAB_TOKEN_HEADER, PASSTHROUGH_AUTH_HEADER, handshake_metadata,
    passthrough_from_headers, serve_socket,
};
