//! Stable `<provider>.<resource>.<verb>` operation keys.

use super::words;
use crate::provider::domain::{HttpMethod, ProviderName};
use crate::tool_registry::domain::{OperationKey, ToolRegistryDomainError};
use std::collections::HashSet;

/// Builds unique operation keys for one catalog.
#[derive(Debug)]
pub struct OperationKeyBuilder {
    provider: String,
    issued: HashSet<String>,
}

impl OperationKeyBuilder {
    /// Creates a builder scoped to `provider`.
    #[must_use]
    pub fn new(provider: &ProviderName) -> Self {
        Self {
            provider: snake_case(provider.as_str()),
            issued: HashSet::new(),
        }
    }

    /// Returns the next unique key for an operation.
    ///
    /// Collisions receive a numeric suffix on the verb, starting at `_2`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidOperationKey`] when the
    /// generated key is not a valid operation key.
    pub fn build(
        &mut self,
        method: HttpMethod,
        path: &str,
        operation_id: Option<&str>,
    ) -> Result<OperationKey, ToolRegistryDomainError> {
        let resource = resource_of(path);
        let verb = operation_id
            .map(snake_case)
            .filter(|verb| !verb.is_empty())
            .unwrap_or_else(|| default_verb(method, path).to_owned());

        let base = format!("{}.{resource}.{verb}", self.provider);
        let mut candidate = base.clone();
        let mut suffix = 2_u32;
        while self.issued.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        let key = OperationKey::new(candidate)?;
        self.issued.insert(key.as_str().to_owned());
        Ok(key)
    }
}

/// Returns the last static, non-version path segment in snake case.
#[must_use]
pub fn resource_of(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && !segment.starts_with('{'))
        .filter(|segment| *segment != "api" && !is_version_segment(segment))
        .next_back()
        .map(snake_case)
        .filter(|resource| !resource.is_empty())
        .unwrap_or_else(|| "root".to_owned())
}

fn is_version_segment(segment: &str) -> bool {
    segment
        .strip_prefix('v')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

fn default_verb(method: HttpMethod, path: &str) -> &'static str {
    let targets_item = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .is_some_and(|segment| segment.starts_with('{'));
    match method {
        HttpMethod::Get | HttpMethod::Head if targets_item => "get",
        HttpMethod::Get | HttpMethod::Head => "list",
        HttpMethod::Post => "create",
        HttpMethod::Put => "update",
        HttpMethod::Patch => "patch",
        HttpMethod::Delete => "delete",
    }
}

/// Converts `text` to `snake_case`.
#[must_use]
pub fn snake_case(text: &str) -> String {
    words(text).join("_")
}
