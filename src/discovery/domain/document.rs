//! OpenAPI and Swagger documents flattened into candidate operations.

use super::DiscoveryDomainError;
use crate::provider::domain::HttpMethod;
use serde_json::{Map, Value};

/// A parsed OpenAPI 3 or Swagger 2 document.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiDocument {
    root: Value,
}

/// Where a candidate parameter is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateLocation {
    /// Path template placeholder.
    Path,
    /// Query string.
    Query,
    /// Swagger 2 `formData` field.
    Form,
}

/// A declared path, query or form parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateParameter {
    /// Parameter name.
    pub name: String,
    /// Request location.
    pub location: CandidateLocation,
    /// Whether the parameter must be supplied.
    pub required: bool,
    /// Raw parameter schema.
    pub schema: Value,
}

/// A declared request body.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateBody {
    /// Whether a body must be supplied.
    pub required: bool,
    /// Raw body schema.
    pub schema: Value,
}

/// One operation found in a document, before minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateOperation {
    /// HTTP method.
    pub method: HttpMethod,
    /// Path template, such as `/repos/{owner}/{repo}`.
    pub path: String,
    /// Declared `operationId`.
    pub operation_id: Option<String>,
    /// Declared `summary`.
    pub summary: Option<String>,
    /// Declared `description`.
    pub description: Option<String>,
    /// Path, query and form parameters. Header and cookie parameters are
    /// not part of the invocation schema.
    pub parameters: Vec<CandidateParameter>,
    /// JSON request body.
    pub body: Option<CandidateBody>,
    /// Raw operation object as it appears in the document.
    pub raw: Value,
    /// Raw path-level parameters shared with sibling operations.
    pub shared_parameters: Vec<Value>,
}

impl ApiDocument {
    /// Parses a JSON or YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::UnreadableDocument`] when the text is
    /// neither JSON nor YAML, and
    /// [`DiscoveryDomainError::InvalidSpecification`] when it is not an
    /// OpenAPI or Swagger document.
    pub fn parse(text: &str) -> Result<Self, DiscoveryDomainError> {
        let root = match serde_json::from_str::<Value>(text) {
            Ok(root) => root,
            Err(json_error) => {
                // YAML allows non-string keys such as `200:` under
                // `responses`; going through the YAML value model stringifies
                // them.
                let yaml = serde_yml::from_str::<serde_yml::Value>(text).map_err(|yaml_error| {
                    DiscoveryDomainError::UnreadableDocument(format!(
                        "json: {json_error}; yaml: {yaml_error}"
                    ))
                })?;
                serde_json::to_value(yaml)
                    .map_err(|err| DiscoveryDomainError::UnreadableDocument(err.to_string()))?
            }
        };
        Self::from_value(root)
    }

    /// Wraps an already decoded document.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::InvalidSpecification`] when the value
    /// lacks a version marker or a `paths` object.
    pub fn from_value(root: Value) -> Result<Self, DiscoveryDomainError> {
        let Some(object) = root.as_object() else {
            return Err(DiscoveryDomainError::InvalidSpecification(
                "document root must be an object".to_owned(),
            ));
        };
        if !object.contains_key("openapi") && !object.contains_key("swagger") {
            return Err(DiscoveryDomainError::InvalidSpecification(
                "missing 'openapi' or 'swagger' version field".to_owned(),
            ));
        }
        if !object.get("paths").is_some_and(Value::is_object) {
            return Err(DiscoveryDomainError::InvalidSpecification(
                "missing 'paths' object".to_owned(),
            ));
        }
        Ok(Self { root })
    }

    /// Returns the raw document.
    #[must_use]
    pub const fn root(&self) -> &Value {
        &self.root
    }

    /// Returns whether this is a Swagger 2 document.
    #[must_use]
    pub fn is_swagger(&self) -> bool {
        self.root.get("swagger").is_some()
    }

    /// Resolves a local `#/...` reference.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::UnresolvableReference`] for remote
    /// references or missing targets.
    pub fn resolve(&self, reference: &str) -> Result<&Value, DiscoveryDomainError> {
        reference
            .strip_prefix('#')
            .and_then(|pointer| self.root.pointer(pointer))
            .ok_or_else(|| DiscoveryDomainError::UnresolvableReference(reference.to_owned()))
    }

    /// Follows `$ref` chains until a concrete object is reached.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError::UnresolvableReference`] when a link
    /// is missing or the chain loops.
    pub fn dereference<'a>(&'a self, value: &'a Value) -> Result<&'a Value, DiscoveryDomainError> {
        let mut current = value;
        let mut seen = Vec::new();
        while let Some(reference) = reference_of(current) {
            if seen.contains(&reference) {
                return Err(DiscoveryDomainError::UnresolvableReference(
                    reference.to_owned(),
                ));
            }
            seen.push(reference);
            current = self.resolve(reference)?;
        }
        Ok(current)
    }

    /// Flattens the document into candidate operations in path order.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryDomainError`] when a path item, parameter or body
    /// is malformed.
    pub fn candidates(&self) -> Result<Vec<CandidateOperation>, DiscoveryDomainError> {
        let Some(paths) = self.root.get("paths").and_then(Value::as_object) else {
            return Ok(Vec::new());
        };

        let mut candidates = Vec::new();
        for (path, item) in paths {
            if !path.starts_with('/') {
                return Err(DiscoveryDomainError::InvalidSpecification(format!(
                    "path '{path}' must start with '/'"
                )));
            }
            let Some(path_item) = self.dereference(item)?.as_object() else {
                return Err(DiscoveryDomainError::InvalidSpecification(format!(
                    "path item '{path}' must be an object"
                )));
            };
            let shared = path_item
                .get("parameters")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for method in HttpMethod::ALL {
                let method_key = method.as_str().to_ascii_lowercase();
                let Some(raw) = path_item.get(&method_key) else {
                    continue;
                };
                candidates.push(self.candidate(method, path, raw, &shared)?);
            }
        }
        Ok(candidates)
    }

    fn candidate(
        &self,
        method: HttpMethod,
        path: &str,
        raw: &Value,
        shared: &[Value],
    ) -> Result<CandidateOperation, DiscoveryDomainError> {
        let Some(operation) = raw.as_object() else {
            return Err(DiscoveryDomainError::InvalidSpecification(format!(
                "{method} {path} must be an object"
            )));
        };

        let own = operation
            .get("parameters")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut parameters: Vec<CandidateParameter> = Vec::new();
        let mut body = None;
        // Operation-level parameters override path-level ones of the same
        // name and location, so they are visited first.
        for reference in own.iter().chain(shared) {
            let declared = self.dereference(reference)?;
            match Self::parameter(declared, method, path)? {
                Declared::Parameter(parameter) => {
                    let duplicate = parameters.iter().any(|existing| {
                        existing.name == parameter.name && existing.location == parameter.location
                    });
                    if !duplicate {
                        parameters.push(parameter);
                    }
                }
                Declared::Body(declared_body) => {
                    body.get_or_insert(declared_body);
                }
                Declared::Ignored => {}
            }
        }

        if body.is_none()
            && let Some(request_body) = operation.get("requestBody")
        {
            body = self.request_body(request_body)?;
        }

        Ok(CandidateOperation {
            method,
            path: path.to_owned(),
            operation_id: string_field(operation, "operationId"),
            summary: string_field(operation, "summary"),
            description: string_field(operation, "description"),
            parameters,
            body,
            raw: raw.clone(),
            shared_parameters: shared.to_vec(),
        })
    }

    fn parameter(
        declared: &Value,
        method: HttpMethod,
        path: &str,
    ) -> Result<Declared, DiscoveryDomainError> {
        let name = declared.get("name").and_then(Value::as_str);
        let declared_in = declared.get("in").and_then(Value::as_str);
        let (Some(name), Some(declared_in)) = (name, declared_in) else {
            return Err(DiscoveryDomainError::InvalidSpecification(format!(
                "{method} {path} declares a parameter without 'name' or 'in'"
            )));
        };
        let required = declared
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(declared_in == "path");

        let location = match declared_in {
            "path" => CandidateLocation::Path,
            "query" => CandidateLocation::Query,
            "formData" => CandidateLocation::Form,
            "body" => {
                return Ok(Declared::Body(CandidateBody {
                    required,
                    schema: declared.get("schema").cloned().unwrap_or(Value::Null),
                }));
            }
            _ => return Ok(Declared::Ignored),
        };

        let schema = match declared.get("schema") {
            Some(schema) => schema.clone(),
            // Swagger 2 puts the schema keywords on the parameter itself.
            None => Value::Object(
                declared
                    .as_object()
                    .map(|fields| {
                        fields
                            .iter()
                            .filter(|(key, _)| {
                                !matches!(key.as_str(), "name" | "in" | "required")
                            })
                            .map(|(key, value)| (key.clone(), value.clone()))
                            .collect::<Map<String, Value>>()
                    })
                    .unwrap_or_default(),
            ),
        };

        Ok(Declared::Parameter(CandidateParameter {
            name: name.to_owned(),
            location,
            required,
            schema,
        }))
    }

    fn request_body(&self, reference: &Value) -> Result<Option<CandidateBody>, DiscoveryDomainError> {
        let declared = self.dereference(reference)?;
        let required = declared
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let Some(content) = declared.get("content").and_then(Value::as_object) else {
            return Ok(None);
        };
        let media = content
            .get("application/json")
            .or_else(|| {
                content
                    .iter()
                    .find(|(media_type, _)| media_type.ends_with("json"))
                    .map(|(_, media)| media)
            })
            .or_else(|| content.values().next());
        Ok(media
            .and_then(|media| media.get("schema"))
            .map(|schema| CandidateBody {
                required,
                schema: schema.clone(),
            }))
    }
}

enum Declared {
    Parameter(CandidateParameter),
    Body(CandidateBody),
    Ignored,
}

/// Returns the `$ref` target of a reference object.
#[must_use]
pub fn reference_of(value: &Value) -> Option<&str> {
    value.get("$ref").and_then(Value::as_str)
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}
