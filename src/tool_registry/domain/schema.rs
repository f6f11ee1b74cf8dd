//! Validation of invocation arguments against minimized input schemas.
//!
//! Minimized schemas use a small JSON Schema subset: `type`, `properties`,
//! `required`, `items`, `enum` and `additionalProperties`. A property whose
//! schema is an `{"$expand": ...}` placeholder accepts any value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Key marking a placeholder for a schema collapsed during minimization.
pub const EXPAND_KEY: &str = "$expand";

/// One argument that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Dotted path of the offending field; empty for the root.
    pub field: String,
    /// Human-readable reason.
    pub reason: String,
}

impl FieldViolation {
    /// Creates a violation for `field`.
    #[must_use]
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            formatter.write_str(&self.reason)
        } else {
            write!(formatter, "{}: {}", self.field, self.reason)
        }
    }
}

/// Validates `arguments` against a minimized input schema.
///
/// # Errors
///
/// Returns every violation found, in field order.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), Vec<FieldViolation>> {
    let mut violations = Vec::new();
    if arguments.is_object() {
        check(schema, arguments, "", &mut violations);
    } else {
        violations.push(FieldViolation::new("", "arguments must be a JSON object"));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check(schema: &Value, value: &Value, path: &str, violations: &mut Vec<FieldViolation>) {
    let Some(schema) = schema.as_object() else {
        return;
    };
    if schema.contains_key(EXPAND_KEY) {
        return;
    }

    if let Some(expected) = schema.get("type")
        && !matches_type(expected, value)
    {
        violations.push(FieldViolation::new(
            path,
            format!("expected {}, found {}", describe_type(expected), json_type(value)),
        ));
        return;
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array)
        && !allowed.contains(value)
    {
        violations.push(FieldViolation::new(path, "value is not one of the allowed values"));
    }

    match value {
        Value::Object(fields) => check_object(schema, fields, path, violations),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (index, item) in items.iter().enumerate() {
                    check(item_schema, item, &join(path, &index.to_string()), violations);
                }
            }
        }
        _ => {}
    }
}

fn check_object(
    schema: &Map<String, Value>,
    fields: &Map<String, Value>,
    path: &str,
    violations: &mut Vec<FieldViolation>,
) {
    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                violations.push(FieldViolation::new(join(path, name), "is required"));
            }
        }
    }

    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
    for (name, field) in fields {
        match properties.and_then(|declared| declared.get(name)) {
            Some(field_schema) => check(field_schema, field, &join(path, name), violations),
            None if closed => {
                violations.push(FieldViolation::new(join(path, name), "is not a known parameter"));
            }
            None => {}
        }
    }
}

fn matches_type(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_named_type(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_named_type(name, value)),
        _ => true,
    }
}

fn matches_named_type(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.as_str().unwrap_or("any").to_owned(),
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_owned()
    } else {
        format!("{path}.{segment}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["owner", "repo"],
            "properties": {
                "owner": {"type": "string"},
                "repo": {"type": "string"},
                "state": {"type": "string", "enum": ["open", "closed"]},
                "per_page": {"type": "integer"},
                "labels": {"type": "array", "items": {"type": "string"}},
                "body": {"$expand": "IssueBody"}
            }
        })
    }

    #[rstest]
    fn valid_arguments_pass(schema: Value) {
        let arguments = json!({
            "owner": "octo",
            "repo": "hello",
            "state": "open",
            "labels": ["bug"],
            "body": {"anything": [1, 2, 3]},
            "extra": true
        });
        assert_eq!(validate_arguments(&schema, &arguments), Ok(()));
    }

    #[rstest]
    fn every_violation_is_reported(schema: Value) {
        let arguments = json!({
            "owner": 7,
            "state": "merged",
            "per_page": 1.5,
            "labels": ["bug", 3]
        });
        let violations = validate_arguments(&schema, &arguments).expect_err("should fail");
        let mut fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        fields.sort_unstable();

        assert_eq!(
            fields,
            vec!["labels.1", "owner", "per_page", "repo", "state"]
        );
    }

    #[rstest]
    fn non_object_arguments_are_rejected(schema: Value) {
        let violations = validate_arguments(&schema, &json!([1])).expect_err("should fail");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "");
    }

    #[test]
    fn closed_objects_reject_unknown_fields() {
        let schema = json!({
            "type": "object",
            "properties": {"id": {"type": "integer"}},
            "additionalProperties": false
        });
        let violations =
            validate_arguments(&schema, &json!({"id": 1, "name": "x"})).expect_err("should fail");
        assert_eq!(violations, vec![FieldViolation::new("name", "is not a known parameter")]);
    }
}
