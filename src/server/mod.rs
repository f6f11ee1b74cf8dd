//! HTTP surface of the gateway.
//!
//! The server exposes the MCP WebSocket endpoint, tool administration
//! routes and webhook intake on one router. [`GatewayStack`] selects the
//! adapter behind each port; [`Gateway`] wires services over a stack.

pub mod app;
pub mod routes;
pub mod stack;
pub mod tenants;


pub use app::{
    BootstrapError, Gateway, HealthConsumers, in_memory_gateway, postgres_gateway,
    seed_credentials,
};
pub use routes::{ApiError, AppState, router};
pub use stack::{GatewayStack, InMemoryStack, PostgresStack, StackParts};
pub use tenants::{API_KEY_HEADER, TenantContext, TenantDirectory, presented_key};
