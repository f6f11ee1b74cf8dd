//! Gateway configuration.
//!
//! Configuration is read from a TOML file in which every section and field
//! is optional, then `MESHGATE_*` environment variables override selected
//! values. Durations are integer `*_ms` or `*_secs` fields converted by the
//! accessor methods.

use crate::discovery::{adapters::WELL_KNOWN_SPEC_PATHS, services::DiscoverySettings};
use crate::ingestion::{
    domain::{RetryPolicy, WebhookScheme, WebhookVerifier},
    services::ConsumerSettings,
};
use crate::provider::domain::{Credential, ProviderName};
use crate::tool_registry::{
    domain::{CircuitBreakerPolicy, TenantId, ToolsetEnablement},
    services::ExecutionSettings,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`GatewayConfig`].
    #[error("invalid configuration: {0}")]
    Parse(#[source] Box<toml::de::Error>),

    /// An environment override could not be parsed.
    #[error("environment variable {var} has invalid value '{value}'")]
    InvalidOverride {
        /// Variable name.
        var: &'static str,
        /// Rejected value.
        value: String,
    },

    /// A value parsed but is not acceptable.
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// HTTP listener.
    pub server: ServerConfig,
    /// Log output.
    pub log: LogConfig,
    /// Tool persistence.
    pub storage: StorageConfig,
    /// Execution engine limits.
    pub execution: ExecutionConfig,
    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Discovery retries and minimization.
    pub discovery: DiscoveryConfig,
    /// Event consumer group.
    pub ingestion: IngestionConfig,
    /// Webhook endpoints keyed by provider name.
    pub webhooks: BTreeMap<String, WebhookConfig>,
    /// Tenants admitted by API key.
    pub tenants: Vec<TenantConfig>,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    /// Path of the MCP WebSocket endpoint.
    pub mcp_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_owned(),
            mcp_path: "/mcp".to_owned(),
        }
    }
}

impl ServerConfig {
    /// Parses the listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when `bind` is not a socket
    /// address.
    pub fn bind_addr(&self) -> ConfigResult<SocketAddr> {
        self.bind
            .parse()
            .map_err(|err| ConfigError::invalid("server.bind", err))
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of plain text.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// `PostgreSQL` URL for tool configurations. Tools live in memory when
    /// unset.
    pub database_url: Option<String>,
    /// Pool size for the `PostgreSQL` adapter.
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
        }
    }
}

/// `[execution]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Upper bound for one provider call.
    pub timeout_ms: u64,
    /// Concurrent executions admitted per tenant.
    pub max_concurrency_per_tenant: usize,
    /// Providers that get a dedicated HTTP adapter. Others use the generic
    /// adapter.
    pub providers: Vec<String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_concurrency_per_tenant: 16,
            providers: vec!["github".to_owned(), "gitlab".to_owned()],
        }
    }
}

impl ExecutionConfig {
    /// Parses the provider list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an invalid provider name.
    pub fn provider_names(&self) -> ConfigResult<Vec<ProviderName>> {
        self.providers
            .iter()
            .map(|name| {
                ProviderName::new(name.as_str())
                    .map_err(|err| ConfigError::invalid("execution.providers", err))
            })
            .collect()
    }
}

/// `[circuit_breaker]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a circuit.
    pub failure_threshold: u32,
    /// Window in which failures count.
    pub rolling_window_secs: u64,
    /// Cool-down after the first trip.
    pub cooldown_secs: u64,
    /// Upper bound for repeated cool-downs.
    pub max_cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            rolling_window_secs: 60,
            cooldown_secs: 30,
            max_cooldown_secs: 300,
        }
    }
}

impl CircuitBreakerConfig {
    /// Converts the section into a breaker policy.
    #[must_use]
    pub const fn policy(&self) -> CircuitBreakerPolicy {
        CircuitBreakerPolicy {
            failure_threshold: self.failure_threshold,
            rolling_window: Duration::from_secs(self.rolling_window_secs),
            cooldown: Duration::from_secs(self.cooldown_secs),
            max_cooldown: Duration::from_secs(self.max_cooldown_secs),
        }
    }
}

/// `[discovery]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Fetch attempts for a transient failure.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub base_backoff_ms: u64,
    /// Upper bound on any backoff.
    pub max_backoff_ms: u64,
    /// Nesting depth below which named schemas are inlined.
    pub depth_limit: usize,
    /// Timeout for one specification fetch.
    pub fetch_timeout_ms: u64,
    /// Paths probed when a tool has no explicit specification URL.
    pub well_known_paths: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let settings = DiscoverySettings::default();
        Self {
            max_attempts: settings.max_attempts,
            base_backoff_ms: 200,
            max_backoff_ms: 2_000,
            depth_limit: settings.depth_limit,
            fetch_timeout_ms: 10_000,
            well_known_paths: WELL_KNOWN_SPEC_PATHS
                .iter()
                .map(|path| (*path).to_owned())
                .collect(),
        }
    }
}

impl DiscoveryConfig {
    /// Converts the section into discovery settings.
    #[must_use]
    pub const fn settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            depth_limit: self.depth_limit,
        }
    }

    /// Returns the fetch timeout.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// `[ingestion]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestionConfig {
    /// Failed attempts before an event is dead-lettered.
    pub max_attempts: u32,
    /// Consumer worker tasks.
    pub workers: usize,
    /// Entries claimed per poll.
    pub batch_size: usize,
    /// Lease length for claimed entries.
    pub visibility_timeout_secs: u64,
    /// Backoff before the first retry.
    pub base_backoff_ms: u64,
    /// Upper bound on any retry backoff.
    pub max_backoff_secs: u64,
    /// Sleep between polls of an empty stream.
    pub poll_interval_ms: u64,
    /// Remembered deliveries for duplicate suppression.
    pub dedup_capacity: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            workers: 5,
            batch_size: 10,
            visibility_timeout_secs: 30,
            base_backoff_ms: 1_000,
            max_backoff_secs: 60,
            poll_interval_ms: 500,
            dedup_capacity: 10_000,
        }
    }
}

impl IngestionConfig {
    /// Returns the retry budget and backoff.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }

    /// Returns consumer group settings.
    #[must_use]
    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            workers: self.workers,
            batch_size: self.batch_size,
            visibility: Duration::from_secs(self.visibility_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            retry: self.retry_policy(),
            ..ConsumerSettings::default()
        }
    }

    /// Returns the deduplication capacity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the capacity is zero.
    pub fn dedup_capacity(&self) -> ConfigResult<NonZeroUsize> {
        NonZeroUsize::new(self.dedup_capacity)
            .ok_or_else(|| ConfigError::invalid("ingestion.dedup_capacity", "must be positive"))
    }
}

/// One `[webhooks.<provider>]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Shared secret or signing key.
    pub secret: SecretString,
    /// `hmac_sha256` or `shared_token`. Defaults to `shared_token` for
    /// GitLab and `hmac_sha256` otherwise.
    #[serde(default)]
    pub scheme: Option<String>,
}

/// One `[[tenants]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantConfig {
    /// Tenant identifier.
    pub id: String,
    /// API keys that authenticate as this tenant.
    pub api_keys: Vec<SecretString>,
    /// Expose destructive operations.
    #[serde(default)]
    pub include_destructive: bool,
    /// Restrict exposure to these providers.
    #[serde(default)]
    pub providers: Option<Vec<String>>,
    /// Stored credentials keyed by secret reference.
    #[serde(default)]
    pub credentials: BTreeMap<String, Credential>,
}

impl TenantConfig {
    /// Parses the tenant identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the identifier is invalid.
    pub fn tenant_id(&self) -> ConfigResult<TenantId> {
        TenantId::new(self.id.as_str()).map_err(|err| ConfigError::invalid("tenants.id", err))
    }

    /// Builds the tenant's toolset enablement.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an invalid provider name.
    pub fn enablement(&self) -> ConfigResult<ToolsetEnablement> {
        let base = ToolsetEnablement::read_only().with_destructive(self.include_destructive);
        let Some(providers) = &self.providers else {
            return Ok(base);
        };
        let names = providers
            .iter()
            .map(|name| {
                ProviderName::new(name.as_str())
                    .map_err(|err| ConfigError::invalid("tenants.providers", err))
            })
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(base.with_providers(names))
    }
}

impl GatewayConfig {
    /// Parses configuration from TOML text without applying overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input.
    pub fn from_toml(text: &str) -> ConfigResult<Self> {
        toml::from_str(text).map_err(|err| ConfigError::Parse(Box::new(err)))
    }

    /// Loads configuration from `path` when given, applies environment
    /// overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, an
    /// override is malformed or validation fails.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(file) => {
                let text = std::fs::read_to_string(file).map_err(|source| ConfigError::Read {
                    path: file.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `MESHGATE_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] for a value that does not
    /// parse.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        override_with(&lookup, "MESHGATE_BIND", &mut self.server.bind)?;
        override_with(&lookup, "MESHGATE_MCP_PATH", &mut self.server.mcp_path)?;
        override_with(&lookup, "MESHGATE_LOG_LEVEL", &mut self.log.level)?;
        override_with(&lookup, "MESHGATE_LOG_JSON", &mut self.log.json)?;
        if let Some(url) = lookup("MESHGATE_DATABASE_URL") {
            self.storage.database_url = Some(url);
        }
        override_with(
            &lookup,
            "MESHGATE_EXECUTION_TIMEOUT_MS",
            &mut self.execution.timeout_ms,
        )?;
        override_with(
            &lookup,
            "MESHGATE_EXECUTION_MAX_CONCURRENCY",
            &mut self.execution.max_concurrency_per_tenant,
        )?;
        override_with(
            &lookup,
            "MESHGATE_INGESTION_WORKERS",
            &mut self.ingestion.workers,
        )?;
        override_with(
            &lookup,
            "MESHGATE_INGESTION_MAX_ATTEMPTS",
            &mut self.ingestion.max_attempts,
        )
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending
    /// field.
    pub fn validate(&self) -> ConfigResult<()> {
        self.server.bind_addr()?;
        if !self.server.mcp_path.starts_with('/') {
            return Err(ConfigError::invalid("server.mcp_path", "must start with '/'"));
        }
        if self.storage.max_connections == 0 {
            return Err(ConfigError::invalid("storage.max_connections", "must be positive"));
        }
        if self.execution.max_concurrency_per_tenant == 0 {
            return Err(ConfigError::invalid(
                "execution.max_concurrency_per_tenant",
                "must be positive",
            ));
        }
        self.execution.provider_names()?;
        if self.ingestion.workers == 0 || self.ingestion.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "ingestion",
                "workers and max_attempts must be positive",
            ));
        }
        self.ingestion.dedup_capacity()?;
        self.webhook_verifiers()?;

        let mut seen_keys = HashSet::new();
        for tenant in &self.tenants {
            tenant.tenant_id()?;
            tenant.enablement()?;
            for key in &tenant.api_keys {
                if !seen_keys.insert(key.expose_secret().to_owned()) {
                    return Err(ConfigError::invalid(
                        "tenants.api_keys",
                        format!("a key of tenant '{}' is already assigned", tenant.id),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Returns the execution engine settings.
    #[must_use]
    pub const fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            timeout: Duration::from_millis(self.execution.timeout_ms),
            policy: self.circuit_breaker.policy(),
            max_concurrency_per_tenant: self.execution.max_concurrency_per_tenant,
        }
    }

    /// Builds one verifier per configured webhook provider.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an invalid provider name or
    /// scheme.
    pub fn webhook_verifiers(&self) -> ConfigResult<Vec<WebhookVerifier>> {
        self.webhooks
            .iter()
            .map(|(provider, webhook)| {
                let field = format!("webhooks.{provider}");
                let name = ProviderName::new(provider.as_str())
                    .map_err(|err| ConfigError::invalid(field.as_str(), err))?;
                let scheme = match webhook.scheme.as_deref() {
                    Some(raw) => WebhookScheme::try_from(raw)
                        .map_err(|err| ConfigError::invalid(format!("{field}.scheme"), err))?,
                    None if name.as_str() == "gitlab" => WebhookScheme::SharedToken,
                    None => WebhookScheme::HmacSha256,
                };
                Ok(WebhookVerifier::new(name, scheme, webhook.secret.clone()))
            })
            .collect()
    }
}

fn override_with<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    target: &mut T,
) -> ConfigResult<()> {
    let Some(value) = lookup(var) else {
        return Ok(());
    };
    *target = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride { var, value })?;
    Ok(())
}
