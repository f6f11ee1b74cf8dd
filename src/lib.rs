//! Meshgate: a multi-tenant MCP gateway for provider APIs.
//!
//! The gateway discovers operations from provider API specifications,
//! publishes them as MCP tools over JSON-RPC on WebSocket, executes calls
//! against the providers with per-tool circuit breakers, and feeds tool
//! health from provider webhooks.
//!
//! # Architecture
//!
//! Each feature area follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (database, HTTP, memory)
//! - **Services**: Orchestration over ports
//!
//! # Modules
//!
//! - [`provider`]: Provider adapters, credentials and outbound requests
//! - [`discovery`]: Specification parsing and operation catalogs
//! - [`tool_registry`]: Tool configurations and the execution engine
//! - [`protocol`]: MCP sessions over JSON-RPC
//! - [`ingestion`]: Webhook intake, the event stream and consumers
//! - [`server`]: HTTP routes and wiring
//! - [`config`] and [`telemetry`]: Process settings and logging

pub mod config;
pub mod discovery;
pub mod ingestion;
pub mod protocol;
pub mod provider;
pub mod server;
pub mod telemetry;
pub mod tool_registry;
