//! Domain model for turning API specifications into operation catalogs.
//!
//! Parsing, schema minimization, key generation and classification are pure
//! functions over an [`ApiDocument`]. Fetching and persistence stay behind
//! the discovery ports.

mod builder;
mod classify;
mod document;
mod error;
mod keys;
mod minimize;
mod session;

pub use builder::{DiscoveredCatalog, MAX_DESCRIPTION_CHARS, OperationFootprint, build_catalog};
pub use classify::{classify, words};
pub use document::{
    ApiDocument, CandidateBody, CandidateLocation, CandidateOperation, CandidateParameter,
    reference_of,
};
pub use error::{DiscoveryDomainError, ParseDiscoveryStateError};
pub use keys::{OperationKeyBuilder, resource_of, snake_case};
pub use minimize::{
    BODY_ARGUMENT, DEFAULT_DEPTH_LIMIT, MinimizedOperation, SchemaMinimizer, condense,
};
pub use session::{
    DiscoverySession, DiscoverySessionId, DiscoveryState, PersistedDiscoverySession,
};
