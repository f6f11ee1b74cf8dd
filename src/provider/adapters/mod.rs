//! Adapter implementations of the provider port.

mod http;
mod memory;

pub use http::{HttpProviderAdapter, ProviderPreset, build_url};
pub use memory::{InMemoryProviderAdapter, RecordedProviderCall};
