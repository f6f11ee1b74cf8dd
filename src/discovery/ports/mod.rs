//! Port contracts for specification fetching and session persistence.

mod fetcher;
mod sessions;

pub use fetcher::{FetchedSpec, SpecFetchError, SpecFetchResult, SpecFetcher, SpecLocation};
pub use sessions::{DiscoverySessionError, DiscoverySessionRepository, DiscoverySessionResult};
