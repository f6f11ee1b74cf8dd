//! Application services for running discovery.

mod discovery;

pub use discovery::{
    DiscoveryError, DiscoveryReport, DiscoveryResult, DiscoveryService, DiscoverySettings,
    DiscoverySource,
};
