//! Port contracts implemented by provider adapters.

mod adapter;

pub use adapter::ProviderAdapter;

#[cfg(test)]
pub use adapter::MockProviderAdapter;
