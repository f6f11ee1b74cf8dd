//! API-key authentication of tenants.

use crate::config::{ConfigResult, TenantConfig};
use crate::tool_registry::domain::{TenantId, ToolsetEnablement};
use axum::http::{HeaderMap, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// Header carrying an API key as an alternative to a bearer token.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    /// Authenticated tenant.
    pub tenant: TenantId,
    /// Operations the tenant may see.
    pub enablement: ToolsetEnablement,
}

#[derive(Debug)]
struct TenantKey {
    key: SecretString,
    context: TenantContext,
}

/// Maps API keys to tenants.
#[derive(Debug, Default)]
pub struct TenantDirectory {
    keys: Vec<TenantKey>,
}

impl TenantDirectory {
    /// Creates an empty directory; every key is rejected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the directory from the `[[tenants]]` configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid tenant id or provider.
    pub fn from_config(tenants: &[TenantConfig]) -> ConfigResult<Self> {
        let mut directory = Self::new();
        for tenant in tenants {
            let context = TenantContext {
                tenant: tenant.tenant_id()?,
                enablement: tenant.enablement()?,
            };
            for key in &tenant.api_keys {
                directory = directory.with_key(key.clone(), context.clone());
            }
        }
        Ok(directory)
    }

    /// Adds a key for `context`.
    #[must_use]
    pub fn with_key(mut self, key: SecretString, context: TenantContext) -> Self {
        self.keys.push(TenantKey { key, context });
        self
    }

    /// Resolves a presented key.
    ///
    /// Every configured key is compared in constant time, so the time taken
    /// does not reveal which key matched.
    #[must_use]
    pub fn authenticate(&self, presented: &str) -> Option<&TenantContext> {
        let presented_bytes = presented.as_bytes();
        self.keys.iter().fold(None, |found, entry| {
            let matches: bool = entry
                .key
                .expose_secret()
                .as_bytes()
                .ct_eq(presented_bytes)
                .into();
            if matches { Some(&entry.context) } else { found }
        })
    }

    /// Authenticates the API key carried by `headers`.
    #[must_use]
    pub fn authenticate_headers(&self, headers: &HeaderMap) -> Option<&TenantContext> {
        presented_key(headers).and_then(|key| self.authenticate(key))
    }
}

/// Extracts the API key from `Authorization: Bearer` or `X-API-Key`.
#[must_use]
pub fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        });
    bearer
        .or_else(|| {
            headers
                .get(API_KEY_HEADER)
                .and_then(|value| value.to_str().ok())
        })
        .map(str::trim)
        .filter(|key| !key.is_empty())
}
