//! Canonical serialization for deterministic document fingerprints.
//!
//! ## Determinism Guarantees
//!
//! - Object keys are written in sorted order regardless of how the map was built
//! - Array order is preserved
//! - Numbers use serde_json's formatting
//!
//! Different fingerprints mean the documents differ. Equal fingerprints only
//! suggest equality; callers confirm with a structural comparison.

use serde_json::Value;
use xxhash_rust::xxh64::xxh64;

/// Serialize a JSON value to canonical bytes.
pub fn to_canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                // String keys always display as valid JSON strings.
                out.extend_from_slice(Value::String(key.clone()).to_string().as_bytes());
                out.push(b':');
                write_canonical(&map[key], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        scalar => out.extend_from_slice(scalar.to_string().as_bytes()),
    }
}

/// Compute canonical hash of a JSON value.
pub fn canonical_hash(value: &Value) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_determinism() {
        let v = json!({"openapi": "3.0.3", "paths": {"/a": {}}});
        assert_eq!(canonical_hash(&v), canonical_hash(&v.clone()));
    }

    #[test]
    fn test_key_order_independent() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": [1, 2], "x": null}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": null, "y": [1, 2]}, "b": 1}"#).unwrap();
        assert_eq!(to_canonical_bytes(&a), to_canonical_bytes(&b));
        assert_eq!(
            String::from_utf8(to_canonical_bytes(&a)).unwrap(),
            r#"{"a":{"x":null,"y":[1,2]},"b":1}"#
        );
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(canonical_hash(&json!([1, 2])), canonical_hash(&json!([2, 1])));
    }
}
