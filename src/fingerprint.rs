//! # Content Fingerprint
//!
//! Deterministic digest of arbitrary structured secret content, used by the
//! reconciler as a durable "did anything change" oracle across restarts.
//!
//! Every input is canonicalized before hashing: absent values map to a fixed
//! sentinel, mapping keys are written in sorted order regardless of insertion
//! order, and composite values are serialized field-by-field through their
//! `serde` representation. The digest is md5 over the canonical byte form -
//! change detection only, not a security boundary.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Canonical byte written for null/absent values
const NULL_SENTINEL: &[u8] = b"~";

#[derive(Debug, Error)]
pub enum FingerprintError {
    /// The value could not be mapped into a canonical serialized form
    #[error("value cannot be canonicalized: {0}")]
    Canonicalize(#[from] serde_json::Error),
}

/// Compute the content fingerprint of any serializable value.
///
/// Pure function: no I/O, no shared state. Identical input always yields an
/// identical lowercase hex digest, across calls, processes, and restarts.
/// Two mappings with the same key/value pairs but different insertion order
/// produce the same digest.
///
/// # Errors
///
/// Returns [`FingerprintError::Canonicalize`] when the value cannot be
/// deterministically serialized (e.g. a map with non-string keys).
pub fn fingerprint<T>(value: &T) -> Result<String, FingerprintError>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value)?;
    let mut canonical = Vec::new();
    write_canonical(&value, &mut canonical)?;
    Ok(format!("{:x}", md5::compute(&canonical)))
}

/// Write the canonical byte encoding of a JSON value.
///
/// The encoding is explicit and stable: it does not depend on how the
/// original Rust type was implemented, only on the value's shape.
fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<(), FingerprintError> {
    match value {
        Value::Null => out.extend_from_slice(NULL_SENTINEL),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => out.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => {
            // JSON string escaping gives an unambiguous, deterministic quoting
            out.extend_from_slice(serde_json::to_string(s)?.as_bytes());
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            // Sort keys explicitly - insertion order must never leak into
            // the digest, whatever map implementation produced the value
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(serde_json::to_string(key)?.as_bytes());
                out.push(b':');
                if let Some(inner) = map.get(*key) {
                    write_canonical(inner, out)?;
                }
            }
            out.push(b'}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let value = json!({"foo": "value1", "bar": "value2"});
        assert_eq!(
            fingerprint(&value).unwrap(),
            fingerprint(&value).unwrap(),
            "repeated calls must agree"
        );
    }

    #[test]
    fn test_nil_has_fixed_distinct_digest() {
        let nil = fingerprint(&Option::<String>::None).unwrap();
        let unit = fingerprint(&()).unwrap();
        // Absent values share one sentinel representation
        assert_eq!(nil, unit);
        // And the sentinel is distinct from scalar content
        assert_ne!(nil, fingerprint("hello there").unwrap());
        assert_ne!(nil, fingerprint("").unwrap());
        assert_ne!(nil, fingerprint("~").unwrap());
    }

    #[test]
    fn test_scalar_sensitivity() {
        assert_ne!(
            fingerprint("hello there").unwrap(),
            fingerprint("hello there!").unwrap()
        );
        assert_ne!(fingerprint(&1u64).unwrap(), fingerprint(&2u64).unwrap());
        assert_ne!(fingerprint(&1u64).unwrap(), fingerprint("1").unwrap());
    }

    #[test]
    fn test_mapping_insertion_order_is_irrelevant() {
        let forward = json!({"bar": "value2", "foo": "value1"});
        let reverse = json!({"foo": "value1", "bar": "value2"});
        assert_eq!(
            fingerprint(&forward).unwrap(),
            fingerprint(&reverse).unwrap()
        );
    }

    #[test]
    fn test_composite_fields_hash_by_value_not_declaration_order() {
        #[derive(Serialize)]
        struct Forward {
            foo: String,
            bar: String,
        }
        #[derive(Serialize)]
        struct Reverse {
            bar: String,
            foo: String,
        }
        let a = Forward {
            foo: "value1".into(),
            bar: "value2".into(),
        };
        let b = Reverse {
            bar: "value2".into(),
            foo: "value1".into(),
        };
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_nested_change_is_detected() {
        let base = json!({"db": {"user": "svc", "password": "a"}, "tier": "prod"});
        let changed = json!({"db": {"user": "svc", "password": "b"}, "tier": "prod"});
        assert_ne!(fingerprint(&base).unwrap(), fingerprint(&changed).unwrap());
    }

    #[test]
    fn test_byte_map_matches_across_map_types() {
        let mut tree = BTreeMap::new();
        tree.insert("foo", "value1");
        tree.insert("bar", "value2");
        let literal = json!({"bar": "value2", "foo": "value1"});
        assert_eq!(fingerprint(&tree).unwrap(), fingerprint(&literal).unwrap());
    }
}
