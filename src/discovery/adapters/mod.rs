//! Adapter implementations for discovery ports.

pub mod http;
pub mod memory;

pub use http::{HttpSpecFetcher, WELL_KNOWN_SPEC_PATHS};
