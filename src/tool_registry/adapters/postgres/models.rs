//! Diesel row models for tool registry persistence.

use super::schema::{operation_catalogs, tools};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result and insert row for tool configuration records.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = tools)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ToolRow {
    /// Internal tool identifier.
    pub id: uuid::Uuid,
    /// Owning tenant.
    pub tenant_id: String,
    /// Tenant-unique tool name.
    pub name: String,
    /// Provider type.
    pub provider: String,
    /// Provider API base URL.
    pub base_url: String,
    /// Authentication kind.
    pub auth_kind: String,
    /// Secret reference.
    pub secret_ref: Option<String>,
    /// Explicit API specification URL.
    pub spec_url: Option<String>,
    /// Extra specification paths or URLs for discovery.
    pub discovery_hints: Vec<String>,
    /// Soft-deactivation flag.
    pub active: bool,
    /// Health status.
    pub health_status: String,
    /// Optional health message.
    pub health_message: Option<String>,
    /// Timestamp of the last health check.
    pub health_checked_at: DateTime<Utc>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Query result and insert row for catalog versions.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = operation_catalogs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CatalogRow {
    /// Owning tool.
    pub tool_id: uuid::Uuid,
    /// Catalog version.
    pub version: i32,
    /// Operations payload.
    pub operations: Value,
    /// Expansion table payload.
    pub expansions: Value,
    /// Publication timestamp.
    pub published_at: DateTime<Utc>,
}
