//! Provider adapters for the external systems a gateway tool fronts.
//!
//! A provider is one external HTTP system (a source host, a CI platform, an
//! artifact registry). Every provider is reached through the
//! [`ports::ProviderAdapter`] contract, so adding a provider never touches the
//! execution engine.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Adapter lookup in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
