//! Tool registry and execution engine.
//!
//! Holds tenant-scoped tool configurations and their versioned operation
//! catalogs, and routes every invocation through credential selection, a
//! per-tenant bulkhead and a per-tool circuit breaker. The module follows
//! hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
