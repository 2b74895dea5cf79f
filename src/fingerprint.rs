//! # Cache Key Fingerprinting
//!
//! Deterministic, order-independent cache keys built from the request inputs
//! and the output-relevant part of the configuration.
//!
//! Canonical form:
//! - object keys sorted by UTF-8 byte order, no whitespace
//! - integral floats written as integers, `-0` written as `0`
//! - arrays in the inputs treated as sets (sorted by canonical text); arrays
//!   in the configuration keep their order
//!
//! Keys look like `insights:v2:<32 hex chars>`.

use crate::constants::CACHE_KEY_NAMESPACE;
use crate::error::{InsightsError, InsightsResult};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

/// Hex characters of the digest kept in the key
const DIGEST_HEX_LEN: usize = 32;

/// Builds cache keys for one namespace and schema version
#[derive(Debug, Clone)]
pub struct FingerprintBuilder {
    namespace: String,
    schema_version: u32,
}

impl FingerprintBuilder {
    pub fn new(schema_version: u32) -> Self {
        Self {
            namespace: CACHE_KEY_NAMESPACE.to_string(),
            schema_version,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Build the key for `(inputs, relevant_config)`.
    ///
    /// Fails only when a value cannot be represented as JSON (for example a
    /// map with non-string keys), which is a programming error.
    pub fn build_key<I, C>(&self, inputs: &I, relevant_config: &C) -> InsightsResult<String>
    where
        I: Serialize + ?Sized,
        C: Serialize + ?Sized,
    {
        let inputs = serde_json::to_value(inputs)?;
        let config = serde_json::to_value(relevant_config)?;

        let mut canonical = String::with_capacity(256);
        canonical.push_str("{\"config\":");
        write_value(&config, false, &mut canonical)?;
        canonical.push_str(",\"inputs\":");
        write_value(&inputs, true, &mut canonical)?;
        canonical.push('}');

        let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
        Ok(format!(
            "{}:v{}:{}",
            self.namespace,
            self.schema_version,
            &digest[..DIGEST_HEX_LEN]
        ))
    }
}

/// Canonical text of a JSON value.
///
/// With `unordered_arrays`, array elements are sorted by their own canonical
/// text so that collection order does not affect the result.
pub fn canonical_string(value: &Value, unordered_arrays: bool) -> InsightsResult<String> {
    let mut out = String::new();
    write_value(value, unordered_arrays, &mut out)?;
    Ok(out)
}

fn write_value(value: &Value, unordered_arrays: bool, out: &mut String) -> InsightsResult<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::Array(items) => {
            let mut rendered = items
                .iter()
                .map(|item| canonical_string(item, unordered_arrays))
                .collect::<InsightsResult<Vec<_>>>()?;
            if unordered_arrays {
                rendered.sort_unstable();
            }
            out.push('[');
            out.push_str(&rendered.join(","));
            out.push(']');
        }
        Value::Object(map) => write_object(map, unordered_arrays, out)?,
    }
    Ok(())
}

fn write_object(map: &Map<String, Value>, unordered_arrays: bool, out: &mut String) -> InsightsResult<()> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&serde_json::to_string(*key)?);
        out.push(':');
        if let Some(val) = map.get(*key) {
            write_value(val, unordered_arrays, out)?;
        }
    }
    out.push('}');
    Ok(())
}

fn write_number(n: &Number, out: &mut String) -> InsightsResult<()> {
    if n.is_i64() || n.is_u64() {
        out.push_str(&n.to_string());
        return Ok(());
    }
    let f = n
        .as_f64()
        .ok_or_else(|| InsightsError::Serialization(format!("unrepresentable number {n}")))?;
    if !f.is_finite() {
        return Err(InsightsError::Serialization(format!(
            "non-finite number {f}"
        )));
    }
    // 2^53: beyond this integral floats lose precision as i64 text
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        out.push_str(&(f as i64).to_string());
    } else {
        out.push_str(&n.to_string());
    }
    Ok(())
}
