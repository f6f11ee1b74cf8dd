//! Execution records written for every tool invocation.

use super::{ExecutionId, ParseExecutionStatusError, TenantId, ToolId, ToolRegistryDomainError};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Lifecycle status of an execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The provider call is in progress.
    Pending,
    /// The provider call succeeded.
    Success,
    /// The provider call failed.
    Failed,
}

impl ExecutionStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ExecutionStatus {
    type Error = ParseExecutionStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseExecutionStatusError(value.to_owned())),
        }
    }
}

/// Audit record of one invocation.
///
/// Records are created `pending` when the provider call starts and finalized
/// exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    id: ExecutionId,
    tenant: TenantId,
    tool_id: ToolId,
    operation_key: String,
    input_digest: String,
    status: ExecutionStatus,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    error_kind: Option<String>,
    error_detail: Option<String>,
}

impl ExecutionRecord {
    /// Starts a pending record.
    ///
    /// Only a SHA-256 digest of `arguments` is retained.
    #[must_use]
    pub fn begin(
        tenant: TenantId,
        tool_id: ToolId,
        operation_key: impl Into<String>,
        arguments: &Value,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            tenant,
            tool_id,
            operation_key: operation_key.into(),
            input_digest: digest_arguments(arguments),
            status: ExecutionStatus::Pending,
            started_at: clock.utc(),
            finished_at: None,
            error_kind: None,
            error_detail: None,
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> ExecutionId {
        self.id
    }

    /// Returns the tenant.
    #[must_use]
    pub const fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Returns the tool identifier.
    #[must_use]
    pub const fn tool_id(&self) -> ToolId {
        self.tool_id
    }

    /// Returns the invoked operation key.
    #[must_use]
    pub fn operation_key(&self) -> &str {
        &self.operation_key
    }

    /// Returns the hex-encoded SHA-256 digest of the arguments.
    #[must_use]
    pub fn input_digest(&self) -> &str {
        &self.input_digest
    }

    /// Returns the status.
    #[must_use]
    pub const fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// Returns the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the completion timestamp.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Returns the duration in milliseconds once finalized.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_milliseconds())
    }

    /// Returns the failure kind.
    #[must_use]
    pub fn error_kind(&self) -> Option<&str> {
        self.error_kind.as_deref()
    }

    /// Returns the failure detail.
    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// Returns whether the record has been finalized.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        !matches!(self.status, ExecutionStatus::Pending)
    }

    /// Finalizes the record as successful.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::ExecutionAlreadyFinalized`] when the
    /// record is not pending.
    pub fn complete(&mut self, clock: &impl Clock) -> Result<(), ToolRegistryDomainError> {
        self.finalize(ExecutionStatus::Success, clock)
    }

    /// Finalizes the record as failed.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::ExecutionAlreadyFinalized`] when the
    /// record is not pending.
    pub fn fail(
        &mut self,
        kind: impl Into<String>,
        detail: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), ToolRegistryDomainError> {
        self.finalize(ExecutionStatus::Failed, clock)?;
        self.error_kind = Some(kind.into());
        self.error_detail = Some(detail.into());
        Ok(())
    }

    fn finalize(
        &mut self,
        status: ExecutionStatus,
        clock: &impl Clock,
    ) -> Result<(), ToolRegistryDomainError> {
        if self.is_finalized() {
            return Err(ToolRegistryDomainError::ExecutionAlreadyFinalized(self.id));
        }
        self.status = status;
        self.finished_at = Some(clock.utc());
        Ok(())
    }
}

/// Computes the hex-encoded SHA-256 digest of a JSON value.
///
/// Object keys are serialized in sorted order, so equal arguments produce
/// equal digests.
#[must_use]
pub fn digest_arguments(arguments: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(arguments).as_bytes());
    hex::encode(hasher.finalize())
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|left, right| left.0.cmp(right.0));
            let rendered: Vec<String> = entries
                .into_iter()
                .map(|(key, item)| format!("{}:{}", Value::String(key.clone()), canonical_json(item)))
                .collect();
            format!("{{{}}}", rendered.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockable::DefaultClock;
    use serde_json::json;

    fn record() -> ExecutionRecord {
        ExecutionRecord::begin(
            TenantId::new("acme").expect("valid tenant"),
            ToolId::new(),
            "github.repos.list",
            &json!({"org": "acme"}),
            &DefaultClock,
        )
    }

    #[test]
    fn digest_ignores_key_order() {
        let left = json!({"a": 1, "b": {"c": true, "d": [1, 2]}});
        let right = json!({"b": {"d": [1, 2], "c": true}, "a": 1});
        assert_eq!(digest_arguments(&left), digest_arguments(&right));
        assert_ne!(digest_arguments(&left), digest_arguments(&json!({"a": 2})));
    }

    #[test]
    fn records_start_pending_and_finalize_once() {
        let mut record = record();
        assert_eq!(record.status(), ExecutionStatus::Pending);
        assert_eq!(record.input_digest().len(), 64);

        record.complete(&DefaultClock).expect("first finalize succeeds");
        assert_eq!(record.status(), ExecutionStatus::Success);
        assert!(record.duration_ms().is_some());

        let second = record.fail("provider_error", "late failure", &DefaultClock);
        assert_eq!(
            second,
            Err(ToolRegistryDomainError::ExecutionAlreadyFinalized(record.id()))
        );
        assert_eq!(record.status(), ExecutionStatus::Success);
    }

    #[test]
    fn failed_records_keep_error_detail() {
        let mut record = record();
        record
            .fail("circuit_open", "breaker open", &DefaultClock)
            .expect("finalize succeeds");
        assert_eq!(record.error_kind(), Some("circuit_open"));
        assert_eq!(record.error_detail(), Some("breaker open"));
    }
}
