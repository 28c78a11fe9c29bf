//! Canonical JSON encoding and content hashing
//!
//! Object keys are emitted in lexicographic order, arrays keep their order,
//! and there is no incidental whitespace. The SHA-256 of the canonical string
//! is the content address used throughout the store.

use crate::error::CanonicalizeError;
use crate::value::CanonValue;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Largest integer an f64 holds exactly (2^53)
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Render a value as canonical JSON
pub fn canonicalize(value: &CanonValue) -> Result<String, CanonicalizeError> {
    let mut out = String::new();
    write_value(value, "$", &mut out)?;
    Ok(out)
}

/// Canonicalize any serializable record through its JSON shape
///
/// Serde maps non-finite floats to `null` on the way, so values that may hold
/// NaN must be validated as [`CanonValue`] before reaching this function.
pub fn canonicalize_serializable<T: Serialize>(value: &T) -> Result<String, CanonicalizeError> {
    canonicalize(&CanonValue::from_serializable(value)?)
}

/// SHA-256 of the canonical encoding, hex-encoded
pub fn hash_canonical(value: &CanonValue) -> Result<String, CanonicalizeError> {
    Ok(sha256_hex(canonicalize(value)?.as_bytes()))
}

/// SHA-256 of a serializable record's canonical encoding
pub fn hash_serializable<T: Serialize>(value: &T) -> Result<String, CanonicalizeError> {
    Ok(sha256_hex(canonicalize_serializable(value)?.as_bytes()))
}

/// Hex-encoded SHA-256 of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn write_value(value: &CanonValue, path: &str, out: &mut String) -> Result<(), CanonicalizeError> {
    match value {
        CanonValue::Null => out.push_str("null"),
        CanonValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        CanonValue::Number(n) => out.push_str(&render_number(*n, path)?),
        CanonValue::String(s) => out.push_str(&serde_json::to_string(s)?),
        CanonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, &format!("{}[{}]", path, i), out)?;
            }
            out.push(']');
        }
        CanonValue::Object(map) => {
            // BTreeMap iterates keys in byte order
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_value(item, &format!("{}.{}", path, key), out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn render_number(n: f64, path: &str) -> Result<String, CanonicalizeError> {
    if !n.is_finite() {
        return Err(CanonicalizeError::NonFinite {
            path: path.to_string(),
        });
    }
    if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        // -0 renders as 0
        return Ok((n as i64).to_string());
    }
    serde_json::Number::from_f64(n)
        .map(|num| num.to_string())
        .ok_or_else(|| CanonicalizeError::NonFinite {
            path: path.to_string(),
        })
}
