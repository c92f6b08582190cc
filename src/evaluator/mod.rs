//! Backward-compatibility evaluation between two document versions.
//!
//! ## Ordering
//!
//! Results are sorted by normalized path, then HTTP method, then rule id, then
//! text. Path-level findings (no method) sort before the operations of the
//! same path. Evaluating the same pair twice yields the same sequence.

pub mod diff;
pub mod rules;

use async_trait::async_trait;

use crate::document::Document;
use crate::types::Incompatibility;

pub use diff::{normalize_path, OperationDiff};
pub use rules::ids;

/// Error type for evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    /// Document structure the rules cannot interpret.
    #[error("Malformed document at '{location}': {message}")]
    Malformed {
        /// Where in the document.
        location: String,
        /// What is wrong.
        message: String,
    },
}

/// Computes the backward-incompatible changes between two documents.
#[async_trait]
pub trait IncompatibilityEvaluator: Send + Sync {
    /// Error type for evaluation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Changes that break clients of `old` when `new` replaces it.
    ///
    /// An empty result means no breaking change. Locators only label the
    /// results; nothing is fetched.
    async fn evaluate(
        &self,
        old: &Document,
        old_locator: &str,
        new: &Document,
        new_locator: &str,
    ) -> Result<Vec<Incompatibility>, Self::Error>;
}

/// The built-in rule set (see [`rules`] for the table).
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleSetEvaluator;

impl RuleSetEvaluator {
    /// Create the evaluator.
    pub fn new() -> Self {
        Self
    }

    /// Synchronous evaluation.
    pub fn check(
        &self,
        old: &Document,
        new: &Document,
        new_locator: &str,
    ) -> Result<Vec<Incompatibility>, EvaluatorError> {
        if old.fingerprint() == new.fingerprint() && old.root() == new.root() {
            return Ok(Vec::new());
        }

        let diff = OperationDiff::compute(old, new)?;
        let ctx = rules::RuleContext { old, new };
        let mut found = Vec::new();
        rules::apply_all(&ctx, &diff, &mut found);

        let mut keyed: Vec<(String, Incompatibility)> = found
            .into_iter()
            .map(|c| (normalize_path(&c.path), c.with_source(new_locator)))
            .collect();
        keyed.sort_by(|(a_path, a), (b_path, b)| {
            a_path
                .cmp(b_path)
                .then_with(|| a.operation.cmp(&b.operation))
                .then_with(|| a.id.cmp(&b.id))
                .then_with(|| a.text.cmp(&b.text))
        });
        keyed.dedup_by(|(_, a), (_, b)| a == b);

        Ok(keyed.into_iter().map(|(_, c)| c).collect())
    }
}

#[async_trait]
impl IncompatibilityEvaluator for RuleSetEvaluator {
    type Error = EvaluatorError;

    async fn evaluate(
        &self,
        old: &Document,
        old_locator: &str,
        new: &Document,
        new_locator: &str,
    ) -> Result<Vec<Incompatibility>, Self::Error> {
        let changes = self.check(old, new, new_locator)?;
        tracing::debug!(
            old = old_locator,
            new = new_locator,
            changes = changes.len(),
            "Evaluated documents"
        );
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Level;
    use serde_json::{json, Value};

    fn doc(paths: Value) -> Document {
        Document::from_value(json!({
            "openapi": "3.0.3",
            "info": {"title": "Pets", "version": "1"},
            "paths": paths,
            "components": {"schemas": {
                "Pet": {
                    "type": "object",
                    "required": ["id", "name"],
                    "properties": {
                        "id": {"type": "integer"},
                        "name": {"type": "string"},
                        "tag": {"type": "string"}
                    }
                }
            }}
        }))
        .unwrap()
    }

    fn json_response(schema: Value) -> Value {
        json!({"description": "ok", "content": {"application/json": {"schema": schema}}})
    }

    fn rule_ids(changes: &[Incompatibility]) -> Vec<&str> {
        changes.iter().map(|c| c.id.as_str()).collect()
    }

    async fn run(old: &Document, new: &Document) -> Vec<Incompatibility> {
        RuleSetEvaluator::new()
            .evaluate(old, "1234567", new, "https://api.example.test/openapi.yaml")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_identical_documents_are_compatible() {
        let paths = json!({"/pets": {"get": {"responses": {"200": json_response(json!({"$ref": "#/components/schemas/Pet"}))}}}});
        let old = doc(paths.clone());
        let new = doc(paths);
        assert!(run(&old, &new).await.is_empty());
        // Twice, same answer.
        assert!(run(&old, &new).await.is_empty());
    }

    #[tokio::test]
    async fn test_fingerprint_collision_still_evaluated() {
        let old = doc(json!({"/pets": {"get": {}}, "/owners": {"get": {}}}));
        let new = doc(json!({"/pets": {"get": {}}})).with_fingerprint(old.fingerprint());

        let changes = run(&old, &new).await;
        assert_eq!(rule_ids(&changes), vec![ids::API_PATH_REMOVED]);
    }

    #[tokio::test]
    async fn test_removed_path_and_operation() {
        let old = doc(json!({
            "/pets": {"get": {}, "post": {}},
            "/owners": {"get": {}}
        }));
        let new = doc(json!({"/pets": {"get": {}}}));

        let changes = run(&old, &new).await;
        assert_eq!(rule_ids(&changes), vec![ids::API_PATH_REMOVED, ids::API_REMOVED]);
        assert_eq!(changes[0].path, "/owners");
        assert_eq!(changes[0].operation, "");
        assert_eq!(changes[1].operation, "POST");
        assert!(changes
            .iter()
            .all(|c| c.source == "https://api.example.test/openapi.yaml"));
    }

    #[tokio::test]
    async fn test_deprecated_removal_not_reported() {
        let old = doc(json!({
            "/pets": {"get": {}, "delete": {"deprecated": true}},
            "/legacy": {"get": {"deprecated": true}}
        }));
        let new = doc(json!({"/pets": {"get": {}}}));
        assert!(run(&old, &new).await.is_empty());
    }

    #[tokio::test]
    async fn test_added_optional_things_are_compatible() {
        let old = doc(json!({"/pets": {"get": {"responses": {"200": json_response(json!({"$ref": "#/components/schemas/Pet"}))}}}}));
        let new = doc(json!({
            "/pets": {"get": {
                "parameters": [{"in": "query", "name": "limit", "schema": {"type": "integer"}}],
                "responses": {
                    "200": json_response(json!({"$ref": "#/components/schemas/Pet"})),
                    "404": {"description": "missing"}
                }
            }},
            "/owners": {"get": {}}
        }));
        assert!(run(&old, &new).await.is_empty());
    }

    #[tokio::test]
    async fn test_parameter_rules() {
        let old = doc(json!({"/pets/{id}": {
            "parameters": [{"in": "path", "name": "id", "required": true, "schema": {"type": "string"}}],
            "get": {"parameters": [
                {"in": "query", "name": "verbose", "schema": {"type": "boolean"}},
                {"in": "header", "name": "X-Trace", "schema": {"type": "string"}}
            ]}
        }}));
        let new = doc(json!({"/pets/{petId}": {
            "parameters": [{"in": "path", "name": "petId", "required": true, "schema": {"type": "string"}}],
            "get": {"parameters": [
                {"in": "query", "name": "verbose", "required": true, "schema": {"type": "boolean"}},
                {"in": "header", "name": "X-Trace", "schema": {"type": "integer"}},
                {"in": "query", "name": "tenant", "required": true, "schema": {"type": "string"}}
            ]}
        }}));

        let changes = run(&old, &new).await;
        assert_eq!(
            rule_ids(&changes),
            vec![
                ids::NEW_REQUIRED_REQUEST_PARAMETER,
                ids::REQUEST_PARAMETER_BECAME_REQUIRED,
                ids::REQUEST_PARAMETER_TYPE_CHANGED,
            ]
        );
        assert!(changes.iter().all(|c| c.path == "/pets/{id}" && c.operation == "GET"));
        assert!(changes[2].text.contains("'string' to 'integer'"));
    }

    #[tokio::test]
    async fn test_request_body_rules() {
        let body = |required: bool, schema: Value| {
            json!({"required": required, "content": {"application/json": {"schema": schema}}})
        };
        let old = doc(json!({"/pets": {"post": {
            "requestBody": body(false, json!({"type": "object", "required": ["name"], "properties": {"name": {"type": "string"}}}))
        }}}));
        let new = doc(json!({"/pets": {"post": {
            "requestBody": body(true, json!({"type": "object", "required": ["name", "species"], "properties": {
                "name": {"type": "string"}, "species": {"type": "string"}
            }}))
        }}}));

        let changes = run(&old, &new).await;
        assert_eq!(
            rule_ids(&changes),
            vec![ids::NEW_REQUIRED_REQUEST_PROPERTY, ids::REQUEST_BODY_BECAME_REQUIRED]
        );
        assert!(changes[0].text.contains("'species'"));
    }

    #[tokio::test]
    async fn test_response_rules() {
        let old = doc(json!({"/pets": {"get": {"responses": {
            "200": json_response(json!({"$ref": "#/components/schemas/Pet"})),
            "201": {"description": "created"}
        }}}}));
        let new = doc(json!({"/pets": {"get": {"responses": {
            "200": json_response(json!({"type": "object", "required": ["id"], "properties": {
                "id": {"type": "string"}
            }}))
        }}}}));

        let changes = run(&old, &new).await;
        assert_eq!(
            rule_ids(&changes),
            vec![
                ids::RESPONSE_PROPERTY_REMOVED,
                ids::RESPONSE_PROPERTY_REMOVED,
                ids::RESPONSE_PROPERTY_TYPE_CHANGED,
                ids::RESPONSE_SUCCESS_STATUS_REMOVED,
            ]
        );

        let name = changes.iter().find(|c| c.text.contains("'name'")).unwrap();
        assert_eq!(name.level, Level::Error);
        let tag = changes.iter().find(|c| c.text.contains("'tag'")).unwrap();
        assert_eq!(tag.level, Level::Warning);
    }

    #[tokio::test]
    async fn test_ordering_across_paths() {
        let old = doc(json!({
            "/b": {"get": {}, "delete": {}},
            "/a": {"put": {}}
        }));
        let new = doc(json!({"/b": {"get": {}}}));

        let changes = run(&old, &new).await;
        let keys: Vec<(&str, &str)> = changes
            .iter()
            .map(|c| (c.path.as_str(), c.operation.as_str()))
            .collect();
        assert_eq!(keys, vec![("/a", ""), ("/b", "DELETE")]);
    }
}
