//! Reduction of operation schemas to what an agent needs to build a request.
//!
//! Only `type`, `enum`, `items`, `properties`, `required` and combinators
//! survive. Named schemas nested deeper than the depth limit, and any
//! reference cycle, collapse to an `{"$expand": "<Name>"}` placeholder whose
//! full (minimized) schema is kept in an expansion table.

use super::{
    ApiDocument, CandidateLocation, CandidateOperation, DiscoveryDomainError, reference_of,
};
use crate::tool_registry::domain::{EXPAND_KEY, ParameterLocation};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};

/// Default nesting depth below which named schemas are inlined.
pub const DEFAULT_DEPTH_LIMIT: usize = 2;

/// Argument name used when the whole body is a single non-object value.
pub const BODY_ARGUMENT: &str = "body";

const COMBINATORS: [&str; 3] = ["allOf", "anyOf", "oneOf"];

/// Minimized invocation schema for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizedOperation {
    /// JSON Schema object describing the arguments.
    pub input_schema: Value,
    /// Request location of every argument.
    pub locations: BTreeMap<String, ParameterLocation>,
    /// Serialized size of the operation and everything it references.
    pub original_bytes: usize,
    /// Serialized size of `input_schema`.
    pub minimized_bytes: usize,
}

/// Minimizes operations from one document, sharing an expansion table.
#[derive(Debug)]
pub struct SchemaMinimizer<'doc> {
    document: &'doc ApiDocument,
    depth_limit: usize,
    expansions: BTreeMap<String, Value>,
}

impl<'doc> SchemaMinimizer<'doc> {
    /// Creates a minimizer for `document`.
    #[must_use]
    pub const fn new(document: &'doc ApiDocument, depth_limit: usize) -> Self {
        Self {
            document,
            depth_limit,
            expansions: BTreeMap::new(),
        }
    }

    /// Returns the expansion table collected so far.
    #[must_use]
    pub fn into_expansions(self) -> BTreeMap<String, Value> {
        self.expansions
    }

    /// Builds the minimized invocation schema for `candidate`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::UnresolvableReference`] when a schema
    /// reference cannot be resolved.
    pub fn minimize(
        &mut self,
        candidate: &CandidateOperation,
    ) -> Result<MinimizedOperation, DiscoveryDomainError> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        let mut locations = BTreeMap::new();

        for parameter in &candidate.parameters {
            let location = match parameter.location {
                CandidateLocation::Path => ParameterLocation::Path,
                CandidateLocation::Query => ParameterLocation::Query,
                CandidateLocation::Form => ParameterLocation::Body,
            };
            let schema = self.schema(&parameter.schema, 1, &mut Vec::new())?;
            properties.insert(parameter.name.clone(), schema);
            locations.insert(parameter.name.clone(), location);
            if parameter.required {
                required.push(Value::String(parameter.name.clone()));
            }
        }

        for name in template_parameters(&candidate.path) {
            if !properties.contains_key(name) {
                properties.insert(name.to_owned(), json!({ "type": "string" }));
                locations.insert(name.to_owned(), ParameterLocation::Path);
                required.push(Value::String(name.to_owned()));
            }
        }

        if let Some(body) = &candidate.body {
            self.body_arguments(
                &body.schema,
                body.required,
                &mut properties,
                &mut required,
                &mut locations,
            )?;
        }

        let mut input_schema = json!({ "type": "object", "properties": properties });
        if !required.is_empty()
            && let Some(object) = input_schema.as_object_mut()
        {
            object.insert("required".to_owned(), Value::Array(required));
        }

        let minimized_bytes = serialized_len(&input_schema);
        let original_bytes = self.footprint(candidate);
        Ok(MinimizedOperation {
            input_schema,
            locations,
            original_bytes,
            minimized_bytes,
        })
    }

    fn body_arguments(
        &mut self,
        schema: &Value,
        body_required: bool,
        properties: &mut Map<String, Value>,
        required: &mut Vec<Value>,
        locations: &mut BTreeMap<String, ParameterLocation>,
    ) -> Result<(), DiscoveryDomainError> {
        let document = self.document;
        let resolved = document.dereference(schema)?;
        let fields = resolved.get("properties").and_then(Value::as_object);

        let Some(fields) = fields else {
            let minimized = self.schema(schema, 1, &mut Vec::new())?;
            properties.insert(BODY_ARGUMENT.to_owned(), minimized);
            locations.insert(BODY_ARGUMENT.to_owned(), ParameterLocation::BodyRoot);
            if body_required {
                required.push(Value::String(BODY_ARGUMENT.to_owned()));
            }
            return Ok(());
        };

        let field_required = required_names(resolved);
        let mut visiting: Vec<String> = reference_name(schema).into_iter().collect();
        for (name, field) in fields {
            // Path and query parameters win over a body field of the same name.
            if properties.contains_key(name) {
                continue;
            }
            let minimized = self.schema(field, 1, &mut visiting)?;
            properties.insert(name.clone(), minimized);
            locations.insert(name.clone(), ParameterLocation::Body);
            if body_required && field_required.contains(name.as_str()) {
                required.push(Value::String(name.clone()));
            }
        }
        Ok(())
    }

    fn schema(
        &mut self,
        schema: &Value,
        depth: usize,
        visiting: &mut Vec<String>,
    ) -> Result<Value, DiscoveryDomainError> {
        if let Some(reference) = reference_of(schema) {
            let name = last_segment(reference);
            if visiting.iter().any(|seen| seen == name) || depth > self.depth_limit {
                self.record_expansion(reference)?;
                return Ok(json!({ EXPAND_KEY: name }));
            }
            let document = self.document;
            let target = document.resolve(reference)?;
            visiting.push(name.to_owned());
            let minimized = self.schema(target, depth, visiting);
            visiting.pop();
            return minimized;
        }

        let Some(object) = schema.as_object() else {
            return Ok(Value::Object(Map::new()));
        };
        let mut minimized = Map::new();

        if let Some(declared) = object.get("type") {
            let nullable = object
                .get("nullable")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let kind = match declared {
                Value::String(single) if nullable => json!([single, "null"]),
                other => other.clone(),
            };
            minimized.insert("type".to_owned(), kind);
        }
        if let Some(values) = object.get("enum") {
            minimized.insert("enum".to_owned(), values.clone());
        }

        if let Some(fields) = object.get("properties").and_then(Value::as_object) {
            let mut properties = Map::new();
            for (name, field) in fields {
                properties.insert(name.clone(), self.schema(field, depth + 1, visiting)?);
            }
            minimized.insert("properties".to_owned(), Value::Object(properties));
            let names = required_names(schema);
            if !names.is_empty() {
                minimized.insert(
                    "required".to_owned(),
                    names.into_iter().map(Value::from).collect(),
                );
            }
        }
        if let Some(items) = object.get("items") {
            minimized.insert("items".to_owned(), self.schema(items, depth + 1, visiting)?);
        }

        for combinator in COMBINATORS {
            if let Some(members) = object.get(combinator).and_then(Value::as_array) {
                let mut reduced = Vec::with_capacity(members.len());
                for member in members {
                    reduced.push(self.schema(member, depth, visiting)?);
                }
                minimized.insert(combinator.to_owned(), Value::Array(reduced));
            }
        }

        Ok(Value::Object(minimized))
    }

    fn record_expansion(&mut self, reference: &str) -> Result<(), DiscoveryDomainError> {
        let name = last_segment(reference).to_owned();
        if self.expansions.contains_key(&name) {
            return Ok(());
        }
        // Reserve the slot first so self-referencing schemas terminate.
        self.expansions.insert(name.clone(), Value::Null);
        let document = self.document;
        let target = document.resolve(reference)?;
        let mut visiting = vec![name.clone()];
        let expanded = self.schema(target, 0, &mut visiting)?;
        self.expansions.insert(name, expanded);
        Ok(())
    }

    fn footprint(&self, candidate: &CandidateOperation) -> usize {
        let mut seen = BTreeSet::new();
        let mut total = serialized_len(&candidate.raw);
        for shared in &candidate.shared_parameters {
            total += serialized_len(shared);
            self.referenced_len(shared, &mut seen, &mut total);
        }
        self.referenced_len(&candidate.raw, &mut seen, &mut total);
        total
    }

    fn referenced_len(&self, value: &Value, seen: &mut BTreeSet<String>, total: &mut usize) {
        match value {
            Value::Object(fields) => {
                if let Some(reference) = reference_of(value)
                    && seen.insert(reference.to_owned())
                    && let Ok(target) = self.document.resolve(reference)
                {
                    *total += serialized_len(target);
                    self.referenced_len(target, seen, total);
                }
                for field in fields.values() {
                    self.referenced_len(field, seen, total);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.referenced_len(item, seen, total);
                }
            }
            _ => {}
        }
    }
}

/// Returns the `{placeholder}` names in a path template.
fn template_parameters(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter_map(|segment| {
        segment
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .filter(|name| !name.is_empty())
    })
}

fn required_names(schema: &Value) -> BTreeSet<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn reference_name(schema: &Value) -> Option<String> {
    reference_of(schema).map(|reference| last_segment(reference).to_owned())
}

fn last_segment(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

fn serialized_len(value: &Value) -> usize {
    serde_json::to_vec(value).map_or(0, |bytes| bytes.len())
}

/// Collapses whitespace and truncates to `limit` characters.
#[must_use]
pub fn condense(text: &str, limit: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= limit {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(limit.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}
