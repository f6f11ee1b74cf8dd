//! In-memory repository for tool configurations and catalogs.

use crate::tool_registry::{
    domain::{
        CatalogDraft, HealthSnapshot, OperationCatalog, TenantId, ToolConfiguration, ToolId,
        ToolName,
    },
    ports::{ToolRepository, ToolRepositoryError, ToolRepositoryResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory tool repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryToolRepository {
    state: Arc<RwLock<InMemoryToolState>>,
}

#[derive(Debug, Default)]
struct InMemoryToolState {
    tools: HashMap<ToolId, ToolConfiguration>,
    name_index: HashMap<(TenantId, ToolName), ToolId>,
    catalogs: HashMap<ToolId, Vec<OperationCatalog>>,
}

impl InMemoryToolRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored catalog version for a tool, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRepositoryError::Persistence`] when the lock is poisoned.
    pub fn catalog_history(&self, tool_id: ToolId) -> ToolRepositoryResult<Vec<OperationCatalog>> {
        let state = self.state.read().map_err(|err| {
            ToolRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state.catalogs.get(&tool_id).cloned().unwrap_or_default())
    }
}

fn index_key(tool: &ToolConfiguration) -> (TenantId, ToolName) {
    (tool.tenant().clone(), tool.name().clone())
}

#[async_trait]
impl ToolRepository for InMemoryToolRepository {
    async fn register(&self, tool: &ToolConfiguration) -> ToolRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| {
            ToolRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;

        if state.tools.contains_key(&tool.id()) {
            return Err(ToolRepositoryError::DuplicateTool(tool.id()));
        }

        let key = index_key(tool);
        if state.name_index.contains_key(&key) {
            return Err(ToolRepositoryError::DuplicateToolName {
                tenant: key.0,
                name: key.1,
            });
        }

        state.name_index.insert(key, tool.id());
        state.tools.insert(tool.id(), tool.clone());
        Ok(())
    }

    async fn update(&self, tool: &ToolConfiguration) -> ToolRepositoryResult<()> {
        let mut state = self.state.write().map_err(|err| {
            ToolRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;

        let stored_key = index_key(
            state
                .tools
                .get(&tool.id())
                .ok_or(ToolRepositoryError::NotFound(tool.id()))?,
        );

        let key = index_key(tool);
        if key != stored_key {
            if let Some(&indexed_id) = state.name_index.get(&key)
                && indexed_id != tool.id()
            {
                return Err(ToolRepositoryError::DuplicateToolName {
                    tenant: key.0,
                    name: key.1,
                });
            }

            state.name_index.remove(&stored_key);
            state.name_index.insert(key, tool.id());
        }

        state.tools.insert(tool.id(), tool.clone());
        Ok(())
    }

    async fn set_active(
        &self,
        tool_id: ToolId,
        active: bool,
        updated_at: DateTime<Utc>,
    ) -> ToolRepositoryResult<ToolConfiguration> {
        let mut state = self.state.write().map_err(|err| {
            ToolRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let tool = state
            .tools
            .get_mut(&tool_id)
            .ok_or(ToolRepositoryError::NotFound(tool_id))?;
        tool.set_active(active, updated_at);
        Ok(tool.clone())
    }

    async fn set_health(
        &self,
        tool_id: ToolId,
        health: &HealthSnapshot,
        updated_at: DateTime<Utc>,
    ) -> ToolRepositoryResult<ToolConfiguration> {
        let mut state = self.state.write().map_err(|err| {
            ToolRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let tool = state
            .tools
            .get_mut(&tool_id)
            .ok_or(ToolRepositoryError::NotFound(tool_id))?;
        tool.replace_health(health.clone(), updated_at);
        Ok(tool.clone())
    }

    async fn find_by_id(&self, tool_id: ToolId) -> ToolRepositoryResult<Option<ToolConfiguration>> {
        let state = self.state.read().map_err(|err| {
            ToolRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state.tools.get(&tool_id).cloned())
    }

    async fn find_by_name(
        &self,
        tenant: &TenantId,
        name: &ToolName,
    ) -> ToolRepositoryResult<Option<ToolConfiguration>> {
        let state = self.state.read().map_err(|err| {
            ToolRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let tool = state
            .name_index
            .get(&(tenant.clone(), name.clone()))
            .and_then(|id| state.tools.get(id))
            .cloned();
        Ok(tool)
    }

    async fn list_for_tenant(
        &self,
        tenant: &TenantId,
    ) -> ToolRepositoryResult<Vec<ToolConfiguration>> {
        let state = self.state.read().map_err(|err| {
            ToolRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        let mut tools: Vec<_> = state
            .tools
            .values()
            .filter(|tool| tool.belongs_to(tenant))
            .cloned()
            .collect();
        tools.sort_by(|left, right| left.name().as_str().cmp(right.name().as_str()));
        Ok(tools)
    }

    async fn publish_catalog(
        &self,
        tool_id: ToolId,
        draft: CatalogDraft,
        published_at: DateTime<Utc>,
    ) -> ToolRepositoryResult<OperationCatalog> {
        let mut state = self.state.write().map_err(|err| {
            ToolRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;

        if !state.tools.contains_key(&tool_id) {
            return Err(ToolRepositoryError::NotFound(tool_id));
        }

        let versions = state.catalogs.entry(tool_id).or_default();
        let next_version = versions
            .last()
            .map_or(1, |catalog| catalog.version().saturating_add(1));
        let catalog = OperationCatalog::publish(tool_id, next_version, draft, published_at);
        versions.push(catalog.clone());
        Ok(catalog)
    }

    async fn current_catalog(
        &self,
        tool_id: ToolId,
    ) -> ToolRepositoryResult<Option<OperationCatalog>> {
        let state = self.state.read().map_err(|err| {
            ToolRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })?;
        Ok(state
            .catalogs
            .get(&tool_id)
            .and_then(|versions| versions.last())
            .cloned())
    }
}
