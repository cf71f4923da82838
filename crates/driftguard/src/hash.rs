//! Canonical hashing of desired-state manifests.
//!
//! Two semantically equal manifests must hash identically, so the JSON is
//! serialised in a canonical form first: object keys in lexicographic
//! order, no insignificant whitespace. `serde_json` maps already iterate
//! in sorted key order, which leaves escaping and number formatting to the
//! standard serialiser.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Serialises a JSON value canonically: sorted object keys, compact output.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Computes the `sha256:`-prefixed hash of the canonical form.
pub fn hash_state(value: &Value) -> String {
    let canonical = canonicalize(value);
    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = String::with_capacity(7 + digest.len() * 2);
    out.push_str("sha256:");
    for byte in digest {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => {
            // serde_json's string escaping is already minimal and stable.
            let _ = write!(out, "{}", Value::String(s.clone()));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // serde_json::Map is BTreeMap-backed: iteration is sorted by key.
            out.push('{');
            for (i, (key, val)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}", Value::String(key.clone()));
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
    }
}
