//! Shared test helpers for `PostgreSQL` integration tests.
//!
//! Every migration is applied once to a template database; each test then
//! clones the template into its own database and drops it afterwards.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use meshgate::ingestion::adapters::postgres::{PostgresDeadLetterStore, PostgresEventStream};
use meshgate::provider::domain::ProviderName;
use meshgate::tool_registry::{
    adapters::postgres::PostgresToolRepository,
    domain::{AuthDescriptor, TenantId, ToolConfiguration, ToolDefinition, ToolName},
};
use mockable::DefaultClock;
use pg_embedded_setup_unpriv::TestCluster;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Boxed error used by the fixtures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Migrations in the order they apply.
const MIGRATIONS: [&str; 2] = [
    include_str!("../../migrations/2026-01-01-000000_create_tool_registry/up.sql"),
    include_str!("../../migrations/2026-01-02-000000_create_webhook_events/up.sql"),
];

/// Template database name for the pre-migrated schema.
const TEMPLATE_DB: &str = "meshgate_test_template";

/// Creates a runtime for driving the async adapters from sync tests.
///
/// # Panics
///
/// Panics when the runtime cannot be built.
#[must_use]
pub fn test_runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to create test runtime")
}

fn ensure_template(cluster: &TestCluster) -> Result<(), BoxError> {
    cluster
        .ensure_template_exists(TEMPLATE_DB, |db_name| {
            let url = cluster.connection().database_url(db_name);
            let mut conn = PgConnection::establish(&url).map_err(|e| eyre::eyre!("{e}"))?;
            for migration in MIGRATIONS {
                conn.batch_execute(migration)
                    .map_err(|e| eyre::eyre!("migration failed: {e}"))?;
            }
            Ok(())
        })
        .map_err(|e| Box::new(e) as BoxError)?;
    Ok(())
}

/// A database cloned from the template, dropped when the value is.
pub struct TestDatabase {
    cluster: &'static TestCluster,
    name: String,
    url: String,
}

impl TestDatabase {
    /// Clones the migrated template into a fresh database.
    ///
    /// # Errors
    ///
    /// Returns an error when template setup or database creation fails.
    pub fn create(cluster: &'static TestCluster) -> Result<Self, BoxError> {
        ensure_template(cluster)?;
        let name = format!("test_{}", uuid::Uuid::new_v4().simple());
        cluster
            .create_database_from_template(name.as_str(), TEMPLATE_DB)
            .map_err(|e| Box::new(e) as BoxError)?;
        let url = cluster.connection().database_url(&name);
        Ok(Self { cluster, name, url })
    }

    /// Builds a small pool over this database.
    ///
    /// # Errors
    ///
    /// Returns an error when the pool cannot connect.
    pub fn pool(&self, size: u32) -> Result<Pool<ConnectionManager<PgConnection>>, BoxError> {
        Pool::builder()
            .max_size(size)
            .build(ConnectionManager::<PgConnection>::new(&self.url))
            .map_err(|e| Box::new(e) as BoxError)
    }

    /// Builds a tool repository over this database.
    ///
    /// # Errors
    ///
    /// Returns an error when the pool cannot connect.
    pub fn tools(&self) -> Result<PostgresToolRepository, BoxError> {
        Ok(PostgresToolRepository::new(self.pool(2)?))
    }

    /// Builds an event stream over this database.
    ///
    /// # Errors
    ///
    /// Returns an error when the pool cannot connect.
    pub fn stream(&self) -> Result<PostgresEventStream<DefaultClock>, BoxError> {
        Ok(PostgresEventStream::new(self.pool(2)?, Arc::new(DefaultClock)))
    }

    /// Builds a dead-letter store over this database.
    ///
    /// # Errors
    ///
    /// Returns an error when the pool cannot connect.
    pub fn dead_letters(&self) -> Result<PostgresDeadLetterStore, BoxError> {
        Ok(PostgresDeadLetterStore::new(self.pool(1)?))
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        if let Err(err) = self.cluster.drop_database(self.name.as_str()) {
            tracing::warn!(database = %self.name, error = %err, "failed to drop test database");
        }
    }
}

/// Builds a valid tool for `tenant` named `name`.
///
/// # Panics
///
/// Panics when the fixed identifiers fail validation.
#[must_use]
pub fn tool(tenant: &str, name: &str) -> ToolConfiguration {
    ToolConfiguration::new(
        ToolDefinition {
            tenant: TenantId::new(tenant).expect("valid tenant"),
            name: ToolName::new(name).expect("valid name"),
            provider: ProviderName::new("github").expect("valid provider"),
            base_url: "https://api.github.test".to_owned(),
            auth: AuthDescriptor::none(),
            spec_url: None,
            discovery_hints: vec!["/internal/openapi.json".to_owned()],
        },
        &DefaultClock,
    )
    .expect("valid tool")
}
