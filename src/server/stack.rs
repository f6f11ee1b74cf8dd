//! Adapter selections for one running gateway.

use crate::discovery::{
    adapters::{HttpSpecFetcher, memory::InMemoryDiscoverySessionRepository},
    ports::{DiscoverySessionRepository, SpecFetcher},
};
use crate::ingestion::{
    adapters::{
        memory::{InMemoryDeadLetterStore, InMemoryEventStream},
        postgres::{PostgresDeadLetterStore, PostgresEventStream},
    },
    ports::{DeadLetterStore, EventStream},
};
use crate::tool_registry::{
    adapters::{
        memory::{InMemoryCredentialStore, InMemoryExecutionRecordStore, InMemoryToolRepository},
        postgres::PostgresToolRepository,
    },
    ports::{CredentialStore, ExecutionRecordStore, ToolRepository},
};
use mockable::{Clock, DefaultClock};
use std::sync::Arc;

/// Names the adapter behind every port the gateway uses.
pub trait GatewayStack: Send + Sync + 'static {
    /// Tool configurations and catalogs.
    type Tools: ToolRepository + 'static;
    /// Stored credentials.
    type Credentials: CredentialStore + 'static;
    /// Execution records.
    type Records: ExecutionRecordStore + 'static;
    /// Discovery sessions.
    type Sessions: DiscoverySessionRepository + 'static;
    /// Specification source.
    type Fetcher: SpecFetcher + 'static;
    /// Webhook event stream.
    type Stream: EventStream + 'static;
    /// Dead-letter store.
    type DeadLetters: DeadLetterStore + 'static;
    /// Time source.
    type Clock: Clock + Send + Sync + 'static;
}

/// Adapter instances for a [`GatewayStack`].
pub struct StackParts<K: GatewayStack> {
    /// Tool repository.
    pub tools: Arc<K::Tools>,
    /// Credential store.
    pub credentials: Arc<K::Credentials>,
    /// Execution record store.
    pub records: Arc<K::Records>,
    /// Discovery session repository.
    pub sessions: Arc<K::Sessions>,
    /// Specification fetcher.
    pub fetcher: Arc<K::Fetcher>,
    /// Event stream.
    pub stream: Arc<K::Stream>,
    /// Dead-letter store.
    pub dead_letters: Arc<K::DeadLetters>,
    /// Clock.
    pub clock: Arc<K::Clock>,
}

/// Process-local state with HTTP specification fetching.
#[derive(Debug, Clone, Copy)]
pub struct InMemoryStack;

impl GatewayStack for InMemoryStack {
    type Tools = InMemoryToolRepository;
    type Credentials = InMemoryCredentialStore;
    type Records = InMemoryExecutionRecordStore;
    type Sessions = InMemoryDiscoverySessionRepository;
    type Fetcher = HttpSpecFetcher;
    type Stream = InMemoryEventStream<DefaultClock>;
    type DeadLetters = InMemoryDeadLetterStore;
    type Clock = DefaultClock;
}

/// Tool configurations, the webhook stream and dead letters in
/// `PostgreSQL`; everything else as [`InMemoryStack`].
#[derive(Debug, Clone, Copy)]
pub struct PostgresStack;

impl GatewayStack for PostgresStack {
    type Tools = PostgresToolRepository;
    type Credentials = InMemoryCredentialStore;
    type Records = InMemoryExecutionRecordStore;
    type Sessions = InMemoryDiscoverySessionRepository;
    type Fetcher = HttpSpecFetcher;
    type Stream = PostgresEventStream<DefaultClock>;
    type DeadLetters = PostgresDeadLetterStore;
    type Clock = DefaultClock;
}
