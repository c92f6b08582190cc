//! Structural pairing of operations between two documents.
//!
//! Paths are matched after template normalization, so `/pets/{id}` and
//! `/pets/{petId}` denote the same endpoint.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use regex_lite::Regex;
use serde_json::{Map, Value};

use crate::document::Document;
use super::EvaluatorError;

/// HTTP methods an OpenAPI path item may hold, in the order rules report them.
pub const METHODS: [&str; 8] = ["delete", "get", "head", "options", "patch", "post", "put", "trace"];

/// Replace every `{param}` segment with `{}`.
pub fn normalize_path(path: &str) -> String {
    static TEMPLATE: OnceLock<Regex> = OnceLock::new();
    let template = TEMPLATE.get_or_init(|| {
        Regex::new(r"\{[^}/]*\}").expect("path template pattern is valid")
    });
    template.replace_all(path, "{}").to_string()
}

/// A path item as found in one document.
#[derive(Debug, Clone, Copy)]
pub struct PathEntry<'a> {
    /// Path as written.
    pub path: &'a str,
    /// The path item object.
    pub item: &'a Map<String, Value>,
}

/// An operation present in both documents.
#[derive(Debug, Clone)]
pub struct OperationPair<'a> {
    /// Normalized path used for matching and ordering.
    pub normalized: String,
    /// Lower-case method.
    pub method: &'static str,
    /// Path item in the older document.
    pub old_item: PathEntry<'a>,
    /// Operation object in the older document.
    pub old: &'a Value,
    /// Path item in the newer document.
    pub new_item: PathEntry<'a>,
    /// Operation object in the newer document.
    pub new: &'a Value,
}

/// Operation-level diff between two documents.
#[derive(Debug, Default)]
pub struct OperationDiff<'a> {
    /// Paths present only in the older document.
    pub removed_paths: Vec<PathEntry<'a>>,
    /// Operations removed from a path that still exists: (old entry, method, operation).
    pub removed_operations: Vec<(PathEntry<'a>, &'static str, &'a Value)>,
    /// Operations present on both sides, ordered by normalized path then method.
    pub operations: Vec<OperationPair<'a>>,
}

impl<'a> OperationDiff<'a> {
    /// Pair up paths and operations of `old` and `new`.
    pub fn compute(old: &'a Document, new: &'a Document) -> Result<Self, EvaluatorError> {
        let old_paths = path_entries(old)?;
        let new_paths: BTreeMap<String, PathEntry<'a>> = path_entries(new)?.into_iter().collect();

        let mut diff = OperationDiff::default();
        for (normalized, old_entry) in old_paths {
            let Some(new_entry) = new_paths.get(&normalized).copied() else {
                diff.removed_paths.push(old_entry);
                continue;
            };

            for method in METHODS {
                let Some(old_op) = old_entry.item.get(method) else {
                    continue;
                };
                match new_entry.item.get(method) {
                    Some(new_op) => diff.operations.push(OperationPair {
                        normalized: normalized.clone(),
                        method,
                        old_item: old_entry,
                        old: old_op,
                        new_item: new_entry,
                        new: new_op,
                    }),
                    None => diff.removed_operations.push((old_entry, method, old_op)),
                }
            }
        }
        Ok(diff)
    }

    /// Whether nothing structural differs at the operation level.
    pub fn is_empty(&self) -> bool {
        self.removed_paths.is_empty() && self.removed_operations.is_empty()
    }
}

/// Path entries keyed by normalized path, sorted.
fn path_entries(doc: &Document) -> Result<Vec<(String, PathEntry<'_>)>, EvaluatorError> {
    let Some(paths) = doc.paths() else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::with_capacity(paths.len());
    for (path, item) in paths {
        let item = doc.resolve(item).as_object().ok_or_else(|| EvaluatorError::Malformed {
            location: path.clone(),
            message: "path item is not an object".to_string(),
        })?;
        entries.push((normalize_path(path), PathEntry { path, item }));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.path.cmp(b.1.path)));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(paths: Value) -> Document {
        Document::from_value(json!({"openapi": "3.0.3", "paths": paths})).unwrap()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/pets/{petId}/toys/{toyId}"), "/pets/{}/toys/{}");
        assert_eq!(normalize_path("/pets"), "/pets");
    }

    #[test]
    fn test_pairs_renamed_path_params() {
        let old = doc(json!({"/pets/{id}": {"get": {}, "delete": {}}, "/gone": {"get": {}}}));
        let new = doc(json!({"/pets/{petId}": {"get": {}}}));

        let diff = OperationDiff::compute(&old, &new).unwrap();
        assert_eq!(diff.removed_paths.len(), 1);
        assert_eq!(diff.removed_paths[0].path, "/gone");
        assert_eq!(diff.removed_operations.len(), 1);
        assert_eq!(diff.removed_operations[0].1, "delete");

        let ops = &diff.operations;
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].method, "get");
        assert_eq!(ops[0].normalized, "/pets/{}");
        assert_eq!(ops[0].new_item.path, "/pets/{petId}");
    }

    #[test]
    fn test_identical_documents_have_empty_diff() {
        let paths = json!({"/pets": {"get": {}, "post": {}}});
        let diff_doc = doc(paths.clone());
        let same = doc(paths);
        let diff = OperationDiff::compute(&diff_doc, &same).unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff.operations.len(), 2);
    }

    #[test]
    fn test_malformed_path_item() {
        let old = doc(json!({"/pets": "nope"}));
        let new = doc(json!({}));
        assert!(matches!(
            OperationDiff::compute(&old, &new),
            Err(EvaluatorError::Malformed { .. })
        ));
    }
}
