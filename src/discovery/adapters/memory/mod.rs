//! In-memory adapters for discovery ports.

mod fetcher;
mod sessions;

pub use fetcher::StaticSpecFetcher;
pub use sessions::InMemoryDiscoverySessionRepository;
