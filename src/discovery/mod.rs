//! Discovery engine.
//!
//! Turns a provider's OpenAPI or Swagger specification into a minimized,
//! classified operation catalog and publishes it as a new catalog version.
//! Discovery is single-flight per tool, and a failed run never disturbs the
//! catalog that is already serving. The module follows hexagonal
//! architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
