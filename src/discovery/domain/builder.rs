//! Turns a parsed document into an unpublished catalog.

use super::{
    ApiDocument, CandidateOperation, DiscoveryDomainError, OperationKeyBuilder, SchemaMinimizer,
    classify, condense,
};
use crate::provider::domain::ProviderName;
use crate::tool_registry::domain::{CatalogDraft, Operation, OperationKey};

/// Maximum description length kept in a catalog.
pub const MAX_DESCRIPTION_CHARS: usize = 200;

/// Size of one operation before and after minimization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFootprint {
    /// Generated operation key.
    pub key: OperationKey,
    /// Serialized size of the operation in the source document.
    pub original_bytes: usize,
    /// Serialized size of the minimized input schema.
    pub minimized_bytes: usize,
}

/// A catalog draft with its per-operation size report.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredCatalog {
    /// Catalog content ready to publish.
    pub draft: CatalogDraft,
    /// Size report in catalog order.
    pub footprints: Vec<OperationFootprint>,
}

impl DiscoveredCatalog {
    /// Returns the summed original and minimized sizes.
    #[must_use]
    pub fn totals(&self) -> (usize, usize) {
        self.footprints
            .iter()
            .fold((0, 0), |(original, minimized), footprint| {
                (
                    original + footprint.original_bytes,
                    minimized + footprint.minimized_bytes,
                )
            })
    }
}

/// Builds a catalog draft for `provider` from `document`.
///
/// # Errors
///
/// Returns [`DiscoveryDomainError`] when the document is structurally
/// invalid or an operation cannot be represented.
pub fn build_catalog(
    document: &ApiDocument,
    provider: &ProviderName,
    depth_limit: usize,
) -> Result<DiscoveredCatalog, DiscoveryDomainError> {
    let candidates = document.candidates()?;
    let mut minimizer = SchemaMinimizer::new(document, depth_limit);
    let mut keys = OperationKeyBuilder::new(provider);
    let mut operations = Vec::with_capacity(candidates.len());
    let mut footprints = Vec::with_capacity(candidates.len());

    for candidate in &candidates {
        let key = keys
            .build(
                candidate.method,
                &candidate.path,
                candidate.operation_id.as_deref(),
            )
            .map_err(|err| DiscoveryDomainError::InvalidSpecification(err.to_string()))?;
        let minimized = minimizer.minimize(candidate)?;

        footprints.push(OperationFootprint {
            key: key.clone(),
            original_bytes: minimized.original_bytes,
            minimized_bytes: minimized.minimized_bytes,
        });
        let operation = Operation::new(
            key,
            candidate.method,
            candidate.path.clone(),
            minimized.input_schema,
        )
        .map_err(|err| DiscoveryDomainError::InvalidSpecification(err.to_string()))?
        .with_description(describe(candidate))
        .with_locations(minimized.locations)
        .with_classification(classify(
            candidate.method,
            &candidate.path,
            candidate.operation_id.as_deref(),
        ));
        operations.push(operation);
    }

    Ok(DiscoveredCatalog {
        draft: CatalogDraft {
            operations,
            expansions: minimizer.into_expansions(),
        },
        footprints,
    })
}

fn describe(candidate: &CandidateOperation) -> String {
    candidate
        .summary
        .as_deref()
        .or_else(|| candidate.description.as_deref())
        .map(|text| condense(text, MAX_DESCRIPTION_CHARS))
        .unwrap_or_else(|| format!("{} {}", candidate.method, candidate.path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_registry::domain::OperationClass;
    use serde_json::json;

    #[test]
    fn catalogs_carry_descriptions_classes_and_expansions() {
        let document = ApiDocument::from_value(json!({
            "openapi": "3.0.0",
            "paths": {
                "/nodes/{id}": {
                    "get": {"description": "Fetch   one\n node"},
                    "delete": {}
                },
                "/nodes": {
                    "post": {"requestBody": {"content": {"application/json": {
                        "schema": {"$ref": "#/components/schemas/Node"}
                    }}}}
                }
            },
            "components": {"schemas": {"Node": {
                "type": "object",
                "properties": {"child": {"$ref": "#/components/schemas/Node"}}
            }}}
        }))
        .expect("valid document");
        let provider = ProviderName::new("graph").expect("valid provider");

        let discovered = build_catalog(&document, &provider, 2).expect("catalog should build");
        let draft = &discovered.draft;

        assert_eq!(draft.operations.len(), 3);
        let get = draft
            .operations
            .iter()
            .find(|operation| operation.key().as_str() == "graph.nodes.get")
            .expect("get operation");
        assert_eq!(get.description(), "Fetch one node");
        assert_eq!(get.input_schema()["required"], json!(["id"]));
        let delete = draft
            .operations
            .iter()
            .find(|operation| operation.key().as_str() == "graph.nodes.delete")
            .expect("delete operation");
        assert_eq!(delete.classification(), OperationClass::Destructive);
        assert_eq!(delete.description(), "DELETE /nodes/{id}");
        assert!(draft.expansions.contains_key("Node"));
    }
}
