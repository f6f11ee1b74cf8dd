//! Port contracts for the protocol session layer.

mod gateway;

#[cfg(test)]
pub use gateway::MockToolGateway;
pub use gateway::{GatewayError, GatewayResult, ToolCall, ToolDescriptor, ToolGateway};
