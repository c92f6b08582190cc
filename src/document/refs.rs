//! External `$ref` resolution.
//!
//! Resolution runs in two passes: the loader first fetches every document
//! reachable through external references (see [`external_targets`]), then
//! [`inline_external`] rewrites the root so that each external reference is
//! replaced by the value it points to. Local references inside the root stay
//! as they are; local references inside fetched documents are inlined because
//! their pointers would otherwise dangle.
//!
//! A reference that re-enters a fragment already being inlined (a recursive
//! schema such as a tree node) is not expanded again. It is written back as an
//! absolute `{"$ref": "<document>#<pointer>"}`, which readers treat as opaque.

use std::collections::BTreeMap;
use reqwest::Url;
use serde_json::{Map, Value};

use super::LoadError;

/// Where a non-local `$ref` points: the document URL and the fragment pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefTarget {
    /// Document URL without fragment.
    pub document: Url,
    /// JSON pointer inside that document (may be empty).
    pub pointer: String,
}

/// Classify a `$ref` value relative to the document it appears in.
///
/// Returns `None` for local references and for relative references that have
/// no base to resolve against.
pub fn ref_target(reference: &str, base: Option<&Url>) -> Result<Option<RefTarget>, LoadError> {
    let (location, fragment) = reference.split_once('#').unwrap_or((reference, ""));
    if location.is_empty() {
        return Ok(None);
    }

    let mut document = match base {
        Some(base) => base.join(location).map_err(|e| LoadError::Reference {
            reference: reference.to_string(),
            message: e.to_string(),
        })?,
        None => match Url::parse(location) {
            Ok(url) => url,
            Err(_) => return Ok(None),
        },
    };
    document.set_fragment(None);

    Ok(Some(RefTarget {
        document,
        pointer: fragment.to_string(),
    }))
}

/// Collect every `$ref` string in `value`.
pub fn collect_refs<'v>(value: &'v Value, out: &mut Vec<&'v str>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                out.push(reference);
            }
            for child in map.values() {
                collect_refs(child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        _ => {}
    }
}

/// External documents referenced from `value`, de-duplicated, in first-seen order.
pub fn external_targets(value: &Value, base: Option<&Url>) -> Result<Vec<Url>, LoadError> {
    let mut refs = Vec::new();
    collect_refs(value, &mut refs);

    let mut targets: Vec<Url> = Vec::new();
    for reference in refs {
        if let Some(target) = ref_target(reference, base)? {
            if !targets.contains(&target.document) {
                targets.push(target.document);
            }
        }
    }
    Ok(targets)
}

/// Replace external references in `root` with the values they point to.
///
/// `documents` must hold every document reachable from `root`, keyed by URL.
pub fn inline_external(
    root: &Value,
    root_url: Option<&Url>,
    documents: &BTreeMap<Url, Value>,
) -> Result<Value, LoadError> {
    let mut inliner = Inliner {
        documents,
        root_url: root_url.cloned(),
        stack: Vec::new(),
    };
    inliner.inline(root, root_url)
}

struct Inliner<'a> {
    documents: &'a BTreeMap<Url, Value>,
    root_url: Option<Url>,
    stack: Vec<String>,
}

impl<'a> Inliner<'a> {
    fn inline(&mut self, value: &Value, current: Option<&Url>) -> Result<Value, LoadError> {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    if let Some(resolved) = self.inline_ref(reference, current)? {
                        return Ok(resolved);
                    }
                }
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    out.insert(key.clone(), self.inline(child, current)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| self.inline(item, current))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            scalar => Ok(scalar.clone()),
        }
    }

    /// Resolve one reference, or `None` if it should stay as written.
    fn inline_ref(&mut self, reference: &str, current: Option<&Url>) -> Result<Option<Value>, LoadError> {
        let target = match ref_target(reference, current)? {
            Some(target) => target,
            None => {
                // Local reference: only rewritten inside fetched documents.
                let in_root = current == self.root_url.as_ref();
                match (current, reference.strip_prefix('#')) {
                    (Some(url), Some(pointer)) if !in_root => RefTarget {
                        document: url.clone(),
                        pointer: pointer.to_string(),
                    },
                    _ => return Ok(None),
                }
            }
        };

        let key = format!("{}#{}", target.document, target.pointer);
        if self.stack.contains(&key) {
            let mut marker = Map::with_capacity(1);
            marker.insert("$ref".to_string(), Value::String(key));
            return Ok(Some(Value::Object(marker)));
        }

        let documents = self.documents;
        let (document_url, document) = documents
            .get_key_value(&target.document)
            .ok_or_else(|| LoadError::Reference {
                reference: reference.to_string(),
                message: format!("document {} was not loaded", target.document),
            })?;
        let fragment = if target.pointer.is_empty() {
            Some(document)
        } else {
            document.pointer(&target.pointer)
        };
        let fragment = fragment.ok_or_else(|| LoadError::Reference {
            reference: reference.to_string(),
            message: format!("pointer '{}' not found in {}", target.pointer, target.document),
        })?;

        self.stack.push(key);
        let resolved = self.inline(fragment, Some(document_url));
        self.stack.pop();
        resolved.map(Some)
    }
}
