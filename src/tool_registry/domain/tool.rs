//! Tool configuration aggregate root.

use super::{AuthDescriptor, HealthSnapshot, TenantId, ToolId, ToolName, ToolRegistryDomainError};
use crate::provider::domain::ProviderName;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use url::Url;

/// Validated inputs for a new tool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDefinition {
    /// Owning tenant.
    pub tenant: TenantId,
    /// Tenant-unique tool name.
    pub name: ToolName,
    /// Provider type.
    pub provider: ProviderName,
    /// Base URL of the provider API.
    pub base_url: String,
    /// Authentication descriptor.
    pub auth: AuthDescriptor,
    /// Explicit location of the API specification.
    pub spec_url: Option<String>,
    /// Extra paths or URLs to try when the well-known paths miss.
    pub discovery_hints: Vec<String>,
}

/// A third-party API configured for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfiguration {
    id: ToolId,
    tenant: TenantId,
    name: ToolName,
    provider: ProviderName,
    base_url: String,
    auth: AuthDescriptor,
    spec_url: Option<String>,
    #[serde(default)]
    discovery_hints: Vec<String>,
    active: bool,
    health: HealthSnapshot,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing persisted tool state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedToolData {
    /// Persisted tool identifier.
    pub id: ToolId,
    /// Persisted definition.
    pub definition: ToolDefinition,
    /// Persisted active flag.
    pub active: bool,
    /// Persisted health snapshot.
    pub health: HealthSnapshot,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ToolConfiguration {
    /// Creates a new, active tool configuration with unknown health.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidBaseUrl`] when the base URL
    /// or the specification URL is not an absolute `http(s)` URL, and
    /// [`ToolRegistryDomainError::InvalidDiscoveryHint`] for a malformed hint.
    pub fn new(
        definition: ToolDefinition,
        clock: &impl Clock,
    ) -> Result<Self, ToolRegistryDomainError> {
        let base_url = normalize_http_url(&definition.base_url)?;
        let spec_url = definition
            .spec_url
            .as_deref()
            .map(normalize_http_url)
            .transpose()?;
        let discovery_hints = definition
            .discovery_hints
            .iter()
            .map(String::as_str)
            .map(normalize_hint)
            .collect::<Result<Vec<_>, _>>()?;
        let timestamp = clock.utc();

        Ok(Self {
            id: ToolId::new(),
            tenant: definition.tenant,
            name: definition.name,
            provider: definition.provider,
            base_url,
            auth: definition.auth,
            spec_url,
            discovery_hints,
            active: true,
            health: HealthSnapshot::unknown(timestamp),
            created_at: timestamp,
            updated_at: timestamp,
        })
    }

    /// Reconstructs a tool configuration from persistence.
    #[must_use]
    pub fn from_persisted(data: PersistedToolData) -> Self {
        Self {
            id: data.id,
            tenant: data.definition.tenant,
            name: data.definition.name,
            provider: data.definition.provider,
            base_url: data.definition.base_url,
            auth: data.definition.auth,
            spec_url: data.definition.spec_url,
            discovery_hints: data.definition.discovery_hints,
            active: data.active,
            health: data.health,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the tool identifier.
    #[must_use]
    pub const fn id(&self) -> ToolId {
        self.id
    }

    /// Returns the owning tenant.
    #[must_use]
    pub const fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Returns the tool name.
    #[must_use]
    pub const fn name(&self) -> &ToolName {
        &self.name
    }

    /// Returns the provider type.
    #[must_use]
    pub const fn provider(&self) -> &ProviderName {
        &self.provider
    }

    /// Returns the normalized base URL, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the authentication descriptor.
    #[must_use]
    pub const fn auth(&self) -> &AuthDescriptor {
        &self.auth
    }

    /// Returns the explicit specification URL.
    #[must_use]
    pub fn spec_url(&self) -> Option<&str> {
        self.spec_url.as_deref()
    }

    /// Returns the extra discovery paths and URLs.
    #[must_use]
    pub fn discovery_hints(&self) -> &[String] {
        &self.discovery_hints
    }

    /// Returns whether the tool accepts executions.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the latest health snapshot.
    #[must_use]
    pub const fn health(&self) -> &HealthSnapshot {
        &self.health
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns whether the tool belongs to `tenant`.
    #[must_use]
    pub fn belongs_to(&self, tenant: &TenantId) -> bool {
        &self.tenant == tenant
    }

    /// Validates that the tool accepts executions.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::ToolInactive`] when the tool has
    /// been deactivated.
    pub fn ensure_active(&self) -> Result<(), ToolRegistryDomainError> {
        if self.active {
            Ok(())
        } else {
            Err(ToolRegistryDomainError::ToolInactive(self.id))
        }
    }

    /// Soft-deactivates the tool. Its catalog and records are retained.
    pub fn deactivate(&mut self, clock: &impl Clock) {
        self.set_active(false, clock.utc());
    }

    /// Reactivates a deactivated tool.
    pub fn activate(&mut self, clock: &impl Clock) {
        self.set_active(true, clock.utc());
    }

    /// Sets the active flag as of `at`.
    pub const fn set_active(&mut self, active: bool, at: DateTime<Utc>) {
        self.active = active;
        self.updated_at = at;
    }

    /// Replaces the health snapshot as of `at`.
    pub fn replace_health(&mut self, snapshot: HealthSnapshot, at: DateTime<Utc>) {
        self.health = snapshot;
        self.updated_at = at;
    }
}

fn normalize_http_url(raw: &str) -> Result<String, ToolRegistryDomainError> {
    let trimmed = raw.trim();
    let parsed =
        Url::parse(trimmed).map_err(|_| ToolRegistryDomainError::InvalidBaseUrl(trimmed.to_owned()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ToolRegistryDomainError::InvalidBaseUrl(trimmed.to_owned()));
    }
    Ok(trimmed.trim_end_matches('/').to_owned())
}

fn normalize_hint(raw: &str) -> Result<String, ToolRegistryDomainError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('/') && !trimmed.starts_with("//") {
        return Ok(trimmed.to_owned());
    }
    normalize_http_url(trimmed)
        .map_err(|_| ToolRegistryDomainError::InvalidDiscoveryHint(trimmed.to_owned()))
}
