//! Versioned operation catalogs.

use super::{Operation, OperationClass, OperationKey, ToolId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Unpublished catalog content produced by discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDraft {
    /// Operations in discovery order.
    pub operations: Vec<Operation>,
    /// Full schemas for `$expand` placeholders, keyed by placeholder name.
    pub expansions: BTreeMap<String, Value>,
}

/// One published, immutable catalog version for a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCatalog {
    tool_id: ToolId,
    version: u32,
    operations: Vec<Operation>,
    expansions: BTreeMap<String, Value>,
    published_at: DateTime<Utc>,
}

impl OperationCatalog {
    /// Publishes `draft` as `version` of the catalog for `tool_id`.
    #[must_use]
    pub fn publish(
        tool_id: ToolId,
        version: u32,
        draft: CatalogDraft,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tool_id,
            version,
            operations: draft.operations,
            expansions: draft.expansions,
            published_at,
        }
    }

    /// Returns the owning tool.
    #[must_use]
    pub const fn tool_id(&self) -> ToolId {
        self.tool_id
    }

    /// Returns the catalog version, starting at 1.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Returns the publication timestamp.
    #[must_use]
    pub const fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// Returns all operations.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns whether the catalog has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Finds an operation by key.
    #[must_use]
    pub fn operation(&self, key: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|operation| operation.key().as_str() == key)
    }

    /// Returns whether the catalog contains `key`.
    #[must_use]
    pub fn contains(&self, key: &OperationKey) -> bool {
        self.operation(key.as_str()).is_some()
    }

    /// Counts operations with the given classification.
    #[must_use]
    pub fn count_by_class(&self, classification: OperationClass) -> usize {
        self.operations
            .iter()
            .filter(|operation| operation.classification() == classification)
            .count()
    }

    /// Returns the full schema behind an `$expand` placeholder.
    #[must_use]
    pub fn expand(&self, name: &str) -> Option<&Value> {
        self.expansions.get(name)
    }

    /// Returns every expansion name.
    #[must_use]
    pub fn expansion_names(&self) -> Vec<&str> {
        self.expansions.keys().map(String::as_str).collect()
    }
}
