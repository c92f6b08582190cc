//! The fixed backward-compatibility rule set.
//!
//! | Rule | Level |
//! |------|-------|
//! | `api-path-removed` | error |
//! | `api-removed` | error |
//! | `new-required-request-parameter` | error |
//! | `request-parameter-became-required` | error |
//! | `request-parameter-type-changed` | error |
//! | `request-body-became-required` | error |
//! | `new-required-request-property` | error |
//! | `response-success-status-removed` | error |
//! | `response-property-removed` | error if it was required, else warning |
//! | `response-property-type-changed` | error |
//!
//! Removing an operation (or every operation of a path) that was already marked
//! `deprecated` is not reported.

use std::collections::{BTreeMap, BTreeSet};
use serde_json::{Map, Value};

use crate::document::Document;
use crate::types::{Incompatibility, Level};
use super::diff::{OperationDiff, OperationPair, PathEntry, METHODS};

/// Rule identifiers.
pub mod ids {
    /// Path removed.
    pub const API_PATH_REMOVED: &str = "api-path-removed";
    /// Operation removed.
    pub const API_REMOVED: &str = "api-removed";
    /// New required parameter.
    pub const NEW_REQUIRED_REQUEST_PARAMETER: &str = "new-required-request-parameter";
    /// Optional parameter became required.
    pub const REQUEST_PARAMETER_BECAME_REQUIRED: &str = "request-parameter-became-required";
    /// Parameter type changed.
    pub const REQUEST_PARAMETER_TYPE_CHANGED: &str = "request-parameter-type-changed";
    /// Request body became required.
    pub const REQUEST_BODY_BECAME_REQUIRED: &str = "request-body-became-required";
    /// New required request body property.
    pub const NEW_REQUIRED_REQUEST_PROPERTY: &str = "new-required-request-property";
    /// Success response removed.
    pub const RESPONSE_SUCCESS_STATUS_REMOVED: &str = "response-success-status-removed";
    /// Response property removed.
    pub const RESPONSE_PROPERTY_REMOVED: &str = "response-property-removed";
    /// Response property type changed.
    pub const RESPONSE_PROPERTY_TYPE_CHANGED: &str = "response-property-type-changed";
}

/// Nesting limit when flattening schema properties.
const MAX_SCHEMA_DEPTH: usize = 10;

/// Both documents, for dereferencing local `$ref`s on either side.
pub struct RuleContext<'a> {
    /// Older document.
    pub old: &'a Document,
    /// Newer document.
    pub new: &'a Document,
}

/// Apply every rule to `diff`, appending findings to `out`.
pub fn apply_all(ctx: &RuleContext<'_>, diff: &OperationDiff<'_>, out: &mut Vec<Incompatibility>) {
    removed_paths(diff, out);
    removed_operations(diff, out);
    for pair in &diff.operations {
        request_parameters(ctx, pair, out);
        request_body(ctx, pair, out);
        response_statuses(ctx, pair, out);
        response_properties(ctx, pair, out);
    }
}

fn is_deprecated(operation: &Value) -> bool {
    operation.get("deprecated").and_then(Value::as_bool).unwrap_or(false)
}

fn removed_paths(diff: &OperationDiff<'_>, out: &mut Vec<Incompatibility>) {
    for entry in &diff.removed_paths {
        let operations: Vec<&Value> = METHODS.iter().filter_map(|m| entry.item.get(*m)).collect();
        if !operations.is_empty() && operations.iter().all(|op| is_deprecated(op)) {
            continue;
        }
        out.push(Incompatibility::error(
            ids::API_PATH_REMOVED,
            "api path removed without deprecation",
            "",
            entry.path,
        ));
    }
}

fn removed_operations(diff: &OperationDiff<'_>, out: &mut Vec<Incompatibility>) {
    for (entry, method, operation) in &diff.removed_operations {
        if is_deprecated(operation) {
            continue;
        }
        out.push(Incompatibility::error(
            ids::API_REMOVED,
            "api removed without deprecation",
            method.to_uppercase(),
            entry.path,
        ));
    }
}

/// A parameter after merging path-level and operation-level declarations.
struct Parameter {
    location: String,
    name: String,
    required: bool,
    schema_type: Option<String>,
}

/// Parameters of an operation keyed by (location, name); operation entries
/// override path-level ones.
fn parameters<'a>(doc: &'a Document, entry: PathEntry<'a>, operation: &'a Value) -> BTreeMap<(String, String), Parameter> {
    let mut merged = BTreeMap::new();
    let lists = [entry.item.get("parameters"), operation.get("parameters")];
    for list in lists.into_iter().flatten() {
        let Some(items) = doc.resolve(list).as_array() else {
            continue;
        };
        for item in items {
            let param = doc.resolve(item);
            let (Some(location), Some(name)) = (
                param.get("in").and_then(Value::as_str),
                param.get("name").and_then(Value::as_str),
            ) else {
                continue;
            };
            let required = location == "path"
                || param.get("required").and_then(Value::as_bool).unwrap_or(false);
            let schema_type = param.get("schema").and_then(|s| schema_type(doc, s));
            merged.insert(
                (location.to_string(), name.to_string()),
                Parameter {
                    location: location.to_string(),
                    name: name.to_string(),
                    required,
                    schema_type,
                },
            );
        }
    }
    merged
}

fn request_parameters(ctx: &RuleContext<'_>, pair: &OperationPair<'_>, out: &mut Vec<Incompatibility>) {
    let old_params = parameters(ctx.old, pair.old_item, pair.old);
    let new_params = parameters(ctx.new, pair.new_item, pair.new);
    let method = pair.method.to_uppercase();

    for (key, new_param) in &new_params {
        match old_params.get(key) {
            None => {
                // Path parameters come with the path template itself.
                if new_param.required && new_param.location != "path" {
                    out.push(Incompatibility::error(
                        ids::NEW_REQUIRED_REQUEST_PARAMETER,
                        format!(
                            "added the new required '{}' request parameter '{}'",
                            new_param.location, new_param.name
                        ),
                        method.clone(),
                        pair.old_item.path,
                    ));
                }
            }
            Some(old_param) => {
                if new_param.required && !old_param.required {
                    out.push(Incompatibility::error(
                        ids::REQUEST_PARAMETER_BECAME_REQUIRED,
                        format!(
                            "the '{}' request parameter '{}' became required",
                            new_param.location, new_param.name
                        ),
                        method.clone(),
                        pair.old_item.path,
                    ));
                }
                if let (Some(old_type), Some(new_type)) = (&old_param.schema_type, &new_param.schema_type) {
                    if old_type != new_type {
                        out.push(Incompatibility::error(
                            ids::REQUEST_PARAMETER_TYPE_CHANGED,
                            format!(
                                "the '{}' request parameter '{}' type changed from '{}' to '{}'",
                                new_param.location, new_param.name, old_type, new_type
                            ),
                            method.clone(),
                            pair.old_item.path,
                        ));
                    }
                }
            }
        }
    }
}

fn request_body(ctx: &RuleContext<'_>, pair: &OperationPair<'_>, out: &mut Vec<Incompatibility>) {
    let old_body = pair.old.get("requestBody").map(|b| ctx.old.resolve(b));
    let new_body = pair.new.get("requestBody").map(|b| ctx.new.resolve(b));
    let method = pair.method.to_uppercase();

    let is_required = |body: Option<&Value>| {
        body.and_then(|b| b.get("required"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };
    if is_required(new_body) && !is_required(old_body) {
        out.push(Incompatibility::error(
            ids::REQUEST_BODY_BECAME_REQUIRED,
            "request body became required",
            method.clone(),
            pair.old_item.path,
        ));
    }

    let Some(new_schema) = new_body.and_then(|b| body_schema(ctx.new, b)) else {
        return;
    };
    let new_props = flatten_properties(ctx.new, new_schema);
    let old_props = old_body
        .and_then(|b| body_schema(ctx.old, b))
        .map(|s| flatten_properties(ctx.old, s))
        .unwrap_or_default();

    for (name, prop) in &new_props {
        if !prop.required {
            continue;
        }
        let was_required = old_props.get(name).map_or(false, |p| p.required);
        if !was_required {
            out.push(Incompatibility::error(
                ids::NEW_REQUIRED_REQUEST_PROPERTY,
                format!("added the new required request property '{name}'"),
                method.clone(),
                pair.old_item.path,
            ));
        }
    }
}

/// Success (2xx) response codes declared by an operation.
fn success_responses<'a>(doc: &'a Document, operation: &'a Value) -> BTreeMap<&'a str, &'a Value> {
    operation
        .get("responses")
        .map(|r| doc.resolve(r))
        .and_then(Value::as_object)
        .map(|responses| {
            responses
                .iter()
                .filter(|(status, _)| status.starts_with('2'))
                .map(|(status, response)| (status.as_str(), doc.resolve(response)))
                .collect()
        })
        .unwrap_or_default()
}

fn response_statuses(ctx: &RuleContext<'_>, pair: &OperationPair<'_>, out: &mut Vec<Incompatibility>) {
    let old = success_responses(ctx.old, pair.old);
    let new = success_responses(ctx.new, pair.new);
    for status in old.keys().filter(|s| !new.contains_key(*s)) {
        out.push(Incompatibility::error(
            ids::RESPONSE_SUCCESS_STATUS_REMOVED,
            format!("removed the success response with the status '{status}'"),
            pair.method.to_uppercase(),
            pair.old_item.path,
        ));
    }
}

fn response_properties(ctx: &RuleContext<'_>, pair: &OperationPair<'_>, out: &mut Vec<Incompatibility>) {
    let old = success_responses(ctx.old, pair.old);
    let new = success_responses(ctx.new, pair.new);
    let method = pair.method.to_uppercase();

    for (status, old_response) in &old {
        let Some(new_response) = new.get(status) else {
            continue;
        };
        let Some(old_schema) = body_schema(ctx.old, old_response) else {
            continue;
        };
        let old_props = flatten_properties(ctx.old, old_schema);
        let new_props = body_schema(ctx.new, new_response)
            .map(|s| flatten_properties(ctx.new, s))
            .unwrap_or_default();

        for (name, old_prop) in &old_props {
            match new_props.get(name) {
                None => {
                    let (level, qualifier) = if old_prop.required {
                        (Level::Error, "required ")
                    } else {
                        (Level::Warning, "optional ")
                    };
                    out.push(
                        Incompatibility::error(
                            ids::RESPONSE_PROPERTY_REMOVED,
                            format!(
                                "removed the {qualifier}property '{name}' from the response with the '{status}' status"
                            ),
                            method.clone(),
                            pair.old_item.path,
                        )
                        .with_level(level),
                    );
                }
                Some(new_prop) => {
                    if let (Some(old_type), Some(new_type)) = (&old_prop.schema_type, &new_prop.schema_type) {
                        if old_type != new_type {
                            out.push(Incompatibility::error(
                                ids::RESPONSE_PROPERTY_TYPE_CHANGED,
                                format!(
                                    "the response property '{name}' type changed from '{old_type}' to '{new_type}' for the status '{status}'"
                                ),
                                method.clone(),
                                pair.old_item.path,
                            ));
                        }
                    }
                }
            }
        }
    }
}

/// Schema of the JSON media type of a request body or response, falling back
/// to the first declared media type.
fn body_schema<'a>(doc: &'a Document, body: &'a Value) -> Option<&'a Value> {
    let content: &Map<String, Value> = body.get("content")?.as_object()?;
    let media = content
        .get("application/json")
        .or_else(|| {
            content
                .iter()
                .find(|(media_type, _)| media_type.contains("json"))
                .map(|(_, v)| v)
        })
        .or_else(|| content.values().next())?;
    media.get("schema").map(|s| doc.resolve(s))
}

/// Declared `type` of a schema; 3.1 type arrays are joined as `a|b`.
fn schema_type(doc: &Document, schema: &Value) -> Option<String> {
    match doc.resolve(schema).get("type")? {
        Value::String(t) => Some(t.clone()),
        Value::Array(types) => {
            let set: BTreeSet<&str> = types.iter().filter_map(Value::as_str).collect();
            Some(set.into_iter().collect::<Vec<_>>().join("|"))
        }
        _ => None,
    }
}

/// What the rules need to know about one property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    /// Listed in the parent's `required` array.
    pub required: bool,
    /// Declared type, if any.
    pub schema_type: Option<String>,
}

/// Flatten nested object properties into dotted paths (`items[].id` for arrays).
///
/// A nested property is only required if every ancestor is required too.
pub fn flatten_properties(doc: &Document, schema: &Value) -> BTreeMap<String, PropertyInfo> {
    let mut out = BTreeMap::new();
    let mut visiting: Vec<*const Value> = Vec::new();
    walk_schema(doc, schema, "", true, 0, &mut visiting, &mut out);
    out
}

fn walk_schema(
    doc: &Document,
    schema: &Value,
    prefix: &str,
    parent_required: bool,
    depth: usize,
    visiting: &mut Vec<*const Value>,
    out: &mut BTreeMap<String, PropertyInfo>,
) {
    let schema = doc.resolve(schema);
    let id = schema as *const Value;
    if depth > MAX_SCHEMA_DEPTH || visiting.contains(&id) {
        return;
    }
    visiting.push(id);

    if let Some(parts) = schema.get("allOf").and_then(Value::as_array) {
        for part in parts {
            walk_schema(doc, part, prefix, parent_required, depth + 1, visiting, out);
        }
    }

    if let Some(items) = schema.get("items") {
        let array_prefix = format!("{prefix}[]");
        walk_schema(doc, items, &array_prefix, parent_required, depth + 1, visiting, out);
    }

    let required: BTreeSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop_schema) in properties {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            let is_required = parent_required && required.contains(name.as_str());
            out.insert(
                path.clone(),
                PropertyInfo {
                    required: is_required,
                    schema_type: schema_type(doc, prop_schema),
                },
            );
            walk_schema(doc, prop_schema, &path, is_required, depth + 1, visiting, out);
        }
    }

    visiting.pop();
}
