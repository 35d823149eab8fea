//! Canonical hashing of report definitions and execution parameters.
//!
//! Cache keys must be structural: logically identical report + parameter
//! pairs hash identically no matter how the structures were built or how a
//! formula happens to be spaced. Serialization goes through
//! `serde_json::Value`, whose object representation keeps keys sorted, and
//! the resulting canonical string is hashed with SHA-256.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::report::{ExecutionParams, ReportDefinition};

/// Hex SHA-256 digest identifying one (definition, parameters) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical JSON text of any serializable value: sorted object keys, no
/// insignificant whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let tree = serde_json::to_value(value)?;
    Ok(tree.to_string())
}

/// Strip insignificant whitespace from a formula, leaving string literals
/// untouched, so `a+b` and `a + b` key identically. Formula tokens are
/// always delimited by operators or punctuation, never by whitespace alone,
/// so dropping it cannot merge tokens of a valid formula.
pub fn normalize_formula(formula: &str) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut in_string = false;
    for c in formula.chars() {
        if in_string {
            out.push(c);
            if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c.is_whitespace() {
            continue;
        }
        out.push(c);
        if c == '"' {
            in_string = true;
        }
    }
    out
}

/// Cache key over the complete definition plus the runtime parameters.
/// Any semantic change to either produces a new key.
pub fn cache_key(definition: &ReportDefinition, params: &ExecutionParams) -> Result<CacheKey> {
    let mut normalized = definition.clone();
    for field in &mut normalized.calculated_fields {
        field.formula = normalize_formula(&field.formula);
    }

    let mut envelope = serde_json::Map::new();
    envelope.insert("definition".into(), serde_json::to_value(&normalized)?);
    envelope.insert("params".into(), serde_json::to_value(params)?);
    let canonical = canonical_json(&serde_json::Value::Object(envelope))?;

    Ok(CacheKey(sha256_hex(canonical.as_bytes())))
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
