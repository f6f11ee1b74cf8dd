//! Repository port for tool configurations and their catalogs.

use crate::tool_registry::domain::{
    CatalogDraft, HealthSnapshot, OperationCatalog, TenantId, ToolConfiguration, ToolId, ToolName,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for tool repository operations.
pub type ToolRepositoryResult<T> = Result<T, ToolRepositoryError>;

/// Persistence contract for tool configurations and catalog versions.
#[async_trait]
pub trait ToolRepository: Send + Sync {
    /// Stores a new tool configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRepositoryError::DuplicateTool`] when the ID already
    /// exists or [`ToolRepositoryError::DuplicateToolName`] when the tenant
    /// already has a tool with the same name.
    async fn register(&self, tool: &ToolConfiguration) -> ToolRepositoryResult<()>;

    /// Persists updates to an existing tool configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRepositoryError::NotFound`] when the tool does not exist.
    async fn update(&self, tool: &ToolConfiguration) -> ToolRepositoryResult<()>;

    /// Sets only the active flag and update timestamp of a tool.
    ///
    /// Other columns keep whatever value a concurrent writer stored. The
    /// tool as stored after the write is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRepositoryError::NotFound`] when the tool does not exist.
    async fn set_active(
        &self,
        tool_id: ToolId,
        active: bool,
        updated_at: DateTime<Utc>,
    ) -> ToolRepositoryResult<ToolConfiguration>;

    /// Replaces only the health snapshot and update timestamp of a tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRepositoryError::NotFound`] when the tool does not exist.
    async fn set_health(
        &self,
        tool_id: ToolId,
        health: &HealthSnapshot,
        updated_at: DateTime<Utc>,
    ) -> ToolRepositoryResult<ToolConfiguration>;

    /// Finds a tool by identifier, regardless of tenant.
    async fn find_by_id(&self, tool_id: ToolId) -> ToolRepositoryResult<Option<ToolConfiguration>>;

    /// Finds a tool by tenant-unique name.
    async fn find_by_name(
        &self,
        tenant: &TenantId,
        name: &ToolName,
    ) -> ToolRepositoryResult<Option<ToolConfiguration>>;

    /// Returns every tool owned by `tenant`, active or not.
    async fn list_for_tenant(&self, tenant: &TenantId)
    -> ToolRepositoryResult<Vec<ToolConfiguration>>;

    /// Publishes `draft` as the next catalog version for a tool.
    ///
    /// Earlier versions are retained; the published catalog is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRepositoryError::NotFound`] when the tool does not exist.
    async fn publish_catalog(
        &self,
        tool_id: ToolId,
        draft: CatalogDraft,
        published_at: DateTime<Utc>,
    ) -> ToolRepositoryResult<OperationCatalog>;

    /// Returns the latest catalog version for a tool.
    async fn current_catalog(&self, tool_id: ToolId)
    -> ToolRepositoryResult<Option<OperationCatalog>>;
}

/// Errors returned by tool repository implementations.
#[derive(Debug, Clone, Error)]
pub enum ToolRepositoryError {
    /// A tool with the same identifier already exists.
    #[error("duplicate tool identifier: {0}")]
    DuplicateTool(ToolId),

    /// The tenant already has a tool with the same name.
    #[error("duplicate tool name '{name}' for tenant '{tenant}'")]
    DuplicateToolName {
        /// Owning tenant.
        tenant: TenantId,
        /// Conflicting name.
        name: ToolName,
    },

    /// The tool was not found.
    #[error("tool not found: {0}")]
    NotFound(ToolId),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted tool data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl ToolRepositoryError {
    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
