//! Provider lookup used by the execution engine and protocol layer.

mod directory;

pub use directory::ProviderDirectory;
