//! Operations published in a tool's catalog.

use super::{ParseOperationClassError, ToolRegistryDomainError};
use crate::provider::domain::HttpMethod;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

const MAX_OPERATION_KEY_LENGTH: usize = 200;

/// Provider-scoped, stable operation key such as `github.repos.list`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationKey(String);

impl OperationKey {
    /// Creates a validated operation key.
    ///
    /// Keys are dotted, lowercase segments of `[a-z0-9_-]`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidOperationKey`] when the key is
    /// empty, too long, has empty segments or contains invalid characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized = value.into().trim().to_owned();
        let valid_segments = normalized.split('.').all(|segment| {
            !segment.is_empty()
                && segment.chars().all(|character| {
                    character.is_ascii_lowercase()
                        || character.is_ascii_digit()
                        || character == '_'
                        || character == '-'
                })
        });

        if normalized.is_empty() || normalized.len() > MAX_OPERATION_KEY_LENGTH || !valid_segments
        {
            return Err(ToolRegistryDomainError::InvalidOperationKey(normalized));
        }
        Ok(Self(normalized))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Advisory classification used to gate tool exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Read-only or otherwise low-impact operation.
    Safe,
    /// Operation that deletes data or changes administrative state.
    Destructive,
}

impl OperationClass {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Destructive => "destructive",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for OperationClass {
    type Error = ParseOperationClassError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "destructive" => Ok(Self::Destructive),
            _ => Err(ParseOperationClassError(value.to_owned())),
        }
    }
}

/// Where an argument travels in the provider request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterLocation {
    /// Substituted into the path template.
    Path,
    /// Sent in the query string.
    Query,
    /// Sent as a field of a JSON object body.
    Body,
    /// Sent as the entire JSON body.
    BodyRoot,
}

/// Arguments split by request location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacedArguments {
    /// Path template values.
    pub path: Map<String, Value>,
    /// Query string values.
    pub query: Map<String, Value>,
    /// JSON body, when any body argument was supplied.
    pub body: Option<Value>,
}

/// One invocable operation in a published catalog.
///
/// Operations are immutable once published; re-discovery publishes a new
/// catalog version rather than mutating an existing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    key: OperationKey,
    method: HttpMethod,
    path_template: String,
    description: String,
    input_schema: Value,
    locations: BTreeMap<String, ParameterLocation>,
    classification: OperationClass,
}

impl Operation {
    /// Creates a safe operation with an empty description and no parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidPathTemplate`] when the path
    /// template does not start with `/`.
    pub fn new(
        key: OperationKey,
        method: HttpMethod,
        path_template: impl Into<String>,
        input_schema: Value,
    ) -> Result<Self, ToolRegistryDomainError> {
        let path_template = path_template.into();
        if !path_template.starts_with('/') {
            return Err(ToolRegistryDomainError::InvalidPathTemplate(path_template));
        }

        Ok(Self {
            key,
            method,
            path_template,
            description: String::new(),
            input_schema,
            locations: BTreeMap::new(),
            classification: OperationClass::Safe,
        })
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the classification.
    #[must_use]
    pub const fn with_classification(mut self, classification: OperationClass) -> Self {
        self.classification = classification;
        self
    }

    /// Sets where each named argument travels.
    #[must_use]
    pub fn with_locations(mut self, locations: BTreeMap<String, ParameterLocation>) -> Self {
        self.locations = locations;
        self
    }

    /// Returns the operation key.
    #[must_use]
    pub const fn key(&self) -> &OperationKey {
        &self.key
    }

    /// Returns the HTTP method.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the path template.
    #[must_use]
    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the minimized input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Returns the argument locations.
    #[must_use]
    pub const fn locations(&self) -> &BTreeMap<String, ParameterLocation> {
        &self.locations
    }

    /// Returns the classification.
    #[must_use]
    pub const fn classification(&self) -> OperationClass {
        self.classification
    }

    /// Returns whether the operation is classified destructive.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        matches!(self.classification, OperationClass::Destructive)
    }

    /// Splits validated arguments by request location.
    ///
    /// Arguments without a recorded location go to the path when the
    /// template names them as `{name}`. Otherwise they travel in the query
    /// string for `GET`, `HEAD` and `DELETE`, and in the body for the rest.
    #[must_use]
    pub fn place_arguments(&self, arguments: &Map<String, Value>) -> PlacedArguments {
        let mut placed = PlacedArguments::default();
        let mut body_fields = Map::new();

        for (name, value) in arguments {
            let location = self
                .locations
                .get(name)
                .copied()
                .unwrap_or_else(|| self.default_location(name));
            match location {
                ParameterLocation::Path => {
                    placed.path.insert(name.clone(), value.clone());
                }
                ParameterLocation::Query => {
                    placed.query.insert(name.clone(), value.clone());
                }
                ParameterLocation::Body => {
                    body_fields.insert(name.clone(), value.clone());
                }
                ParameterLocation::BodyRoot => {
                    placed.body = Some(value.clone());
                }
            }
        }

        if placed.body.is_none() && !body_fields.is_empty() {
            placed.body = Some(Value::Object(body_fields));
        }
        placed
    }

    fn default_location(&self, name: &str) -> ParameterLocation {
        if self.path_template.contains(&format!("{{{name}}}")) {
            ParameterLocation::Path
        } else if self.method.prefers_query() {
            ParameterLocation::Query
        } else {
            ParameterLocation::Body
        }
    }
}
