// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic JSON canonicalization and SHA-256 hashing.
//!
//! This is project-defined canonicalization, not [RFC 8785]: it exists so
//! every writer and reader in this kernel agrees on one byte string for a
//! given logical document, not to interoperate with other canonical-JSON
//! tooling. The rules are:
//!
//! - Object keys are sorted by Unicode code point (Rust's `String: Ord`
//!   already compares valid UTF-8 by code point, so a plain key sort is
//!   sufficient).
//! - Object entries whose value is JSON `null` are omitted entirely: `null`
//!   is this kernel's "field absent" sentinel, not a value in its own right.
//! - Arrays keep their original order.
//! - No insignificant whitespace.
//! - Numbers that are not finite (`NaN`, `Infinity`) are rejected with
//!   [`gov_error::ErrorCode::EncodingUnrepresentable`]; `serde_json` cannot
//!   represent them in the first place, but this guards the path where a
//!   caller builds a `Value` programmatically before handing it to us.
//!
//! [RFC 8785]: https://www.rfc-editor.org/rfc/rfc8785

#![deny(unsafe_code)]
#![warn(missing_docs)]

use gov_error::{ErrorCode, GovError};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Separator used to join the fields hashed into an [`action_hash`].
const ACTION_HASH_SEPARATOR: &str = "||";

/// Serialize `value` to this kernel's canonical byte encoding.
///
/// # Errors
///
/// Returns [`ErrorCode::EncodingUnrepresentable`] if `value` contains a
/// non-finite number.
pub fn canonicalize(value: &Value) -> Result<Vec<u8>, GovError> {
    let mut out = Vec::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

/// Canonicalize `value`, then return its lowercase `0x`-prefixed hex
/// SHA-256.
///
/// # Errors
///
/// Propagates [`canonicalize`]'s errors.
pub fn canonical_hash(value: &Value) -> Result<String, GovError> {
    let bytes = canonicalize(value)?;
    Ok(sha256_hex(&bytes))
}

/// Canonicalize `value` excluding the given top-level object keys (used to
/// hash a document around a field that embeds the hash itself, e.g. a
/// receipt's own `receipt_hash` or a manifest's own `signature`).
///
/// Non-object values are canonicalized as-is; `exclude_keys` only applies at
/// the top level.
///
/// # Errors
///
/// Propagates [`canonicalize`]'s errors.
pub fn canonical_hash_excluding(value: &Value, exclude_keys: &[&str]) -> Result<String, GovError> {
    let trimmed = match value {
        Value::Object(map) => {
            let mut pruned = serde_json::Map::new();
            for (k, v) in map {
                if !exclude_keys.contains(&k.as_str()) {
                    pruned.insert(k.clone(), v.clone());
                }
            }
            Value::Object(pruned)
        }
        other => other.clone(),
    };
    canonical_hash(&trimmed)
}

/// SHA-256 of raw bytes, as lowercase `0x`-prefixed hex.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("0x{}", hex::encode(digest))
}

/// Compute `sha256(release_root_hash || tool_name || canonical_json(params))`.
///
/// This binds an approval token (or a receipt) to the exact release it was
/// issued under, the tool it authorizes, and the exact parameters, so that
/// changing any one of the three invalidates the hash.
///
/// # Errors
///
/// Propagates [`canonicalize`]'s errors on `params`.
pub fn action_hash(
    release_root_hash: &str,
    tool_name: &str,
    params: &Value,
) -> Result<String, GovError> {
    let canonical_params = canonicalize(params)?;
    let mut buf = Vec::with_capacity(
        release_root_hash.len() + tool_name.len() + canonical_params.len() + 8,
    );
    buf.extend_from_slice(release_root_hash.as_bytes());
    buf.extend_from_slice(ACTION_HASH_SEPARATOR.as_bytes());
    buf.extend_from_slice(tool_name.as_bytes());
    buf.extend_from_slice(ACTION_HASH_SEPARATOR.as_bytes());
    buf.extend_from_slice(&canonical_params);
    Ok(sha256_hex(&buf))
}

/// Canonicalize any `Serialize` value by first round-tripping it through
/// [`serde_json::to_value`].
///
/// # Errors
///
/// Returns [`ErrorCode::EncodingUnrepresentable`] if `value` cannot be
/// converted to a [`Value`], or if the resulting value fails canonicalization.
pub fn canonical_hash_of<T: Serialize>(value: &T) -> Result<String, GovError> {
    let v = serde_json::to_value(value).map_err(|e| {
        GovError::new(
            ErrorCode::EncodingUnrepresentable,
            format!("value could not be converted to JSON: {e}"),
        )
    })?;
    canonical_hash(&v)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> Result<(), GovError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(GovError::new(
                        ErrorCode::EncodingUnrepresentable,
                        "non-finite number cannot be canonicalized",
                    ));
                }
            }
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => write_json_string(s, out),
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
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut first = true;
            for key in keys {
                let v = &map[key];
                if v.is_null() {
                    continue;
                }
                if !first {
                    out.push(b',');
                }
                first = false;
                write_json_string(key, out);
                out.push(b':');
                write_canonical(v, out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_json_string(s: &str, out: &mut Vec<u8>) {
    // serde_json's string escaping is already minimal and deterministic;
    // reuse it rather than hand-rolling escape rules.
    let encoded = serde_json::to_string(s).expect("string serialization cannot fail");
    out.extend_from_slice(encoded.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted() {
        let a = canonicalize(&json!({"b": 1, "a": 2})).unwrap();
        let b = canonicalize(&json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(a, b);
        assert_eq!(String::from_utf8(a).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn null_fields_are_omitted() {
        let out = canonicalize(&json!({"a": 1, "b": null})).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn array_order_is_preserved() {
        let out = canonicalize(&json!([3, 1, 2])).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[3,1,2]");
    }

    #[test]
    fn no_insignificant_whitespace() {
        let out = canonicalize(&json!({"x": [1, 2], "y": "z"})).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert!(!s.contains(' '));
        assert!(!s.contains('\n'));
    }

    #[test]
    fn sha256_hex_is_stable() {
        let h1 = sha256_hex(b"hello");
        let h2 = sha256_hex(b"hello");
        assert_eq!(h1, h2);
        assert!(h1.starts_with("0x"));
        assert_eq!(h1.len(), 2 + 64);
    }

    #[test]
    fn canonical_hash_is_order_independent() {
        let h1 = canonical_hash(&json!({"b": 1, "a": 2})).unwrap();
        let h2 = canonical_hash(&json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn canonical_hash_excluding_drops_the_named_key() {
        let doc = json!({"payload": "x", "signature": "sig-a"});
        let doc2 = json!({"payload": "x", "signature": "sig-b"});
        let h1 = canonical_hash_excluding(&doc, &["signature"]).unwrap();
        let h2 = canonical_hash_excluding(&doc2, &["signature"]).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn action_hash_changes_with_any_input() {
        let params = json!({"to": "a@example.com"});
        let h1 = action_hash("0xroot", "send_email", &params).unwrap();
        let h2 = action_hash("0xroot2", "send_email", &params).unwrap();
        let h3 = action_hash("0xroot", "other_tool", &params).unwrap();
        let h4 = action_hash("0xroot", "send_email", &json!({"to": "b@example.com"})).unwrap();
        assert_ne!(h1, h2);
        assert_ne!(h1, h3);
        assert_ne!(h1, h4);
    }

    #[test]
    fn action_hash_is_deterministic() {
        let params = json!({"b": 1, "a": 2});
        let h1 = action_hash("0xroot", "tool", &params).unwrap();
        let h2 = action_hash("0xroot", "tool", &json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        // serde_json cannot itself represent NaN/Infinity, so we exercise the
        // guard through a manually constructed Number-adjacent path isn't
        // reachable from `json!`; this documents the intent for callers that
        // build `Value`s through other means and still route through us.
        let v = json!({"a": 1.5});
        assert!(canonicalize(&v).is_ok());
    }

    #[test]
    fn proptest_style_nested_structures_round_trip_stable() {
        let v = json!({
            "z": [1, 2, {"nested": true, "drop_me": null}],
            "a": "value",
        });
        let h1 = canonical_hash(&v).unwrap();
        let h2 = canonical_hash(&v).unwrap();
        assert_eq!(h1, h2);
    }
}
