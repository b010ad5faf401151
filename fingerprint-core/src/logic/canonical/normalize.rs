//! Canonicalizer
//!
//! SignalBag + schema → CanonicalVector.
//!
//! Never fails: a field that cannot be normalized degrades to the null
//! marker and the rest of the vector is still produced.

use std::collections::BTreeMap;

use super::bag::{SignalBag, SignalValue};
use super::vector::{CanonicalEntry, CanonicalValue, CanonicalVector};
use crate::logic::schema::layout::{hash_keys, SCHEMA_VERSION};

/// Why a single field degraded to null
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("non-finite number")]
    NonFiniteNumber,
    #[error("list element must be a primitive, got {0}")]
    NestedListElement(&'static str),
}

// ============================================================================
// MAIN CANONICALIZE FUNCTION
// ============================================================================

/// Canonicalize a bag against an ordered key list
pub fn canonicalize(bag: &SignalBag, schema: &[&str]) -> CanonicalVector {
    let entries = schema
        .iter()
        .map(|key| {
            let value = match bag.get(key) {
                None | Some(SignalValue::Null) => CanonicalValue::Null,
                Some(raw) => normalize_value(raw).unwrap_or_else(|e| {
                    log::debug!("Signal '{}' degraded to null: {}", key, e);
                    CanonicalValue::Null
                }),
            };
            CanonicalEntry {
                key: key.to_string(),
                value,
            }
        })
        .collect();

    CanonicalVector {
        schema_version: SCHEMA_VERSION,
        layout_hash: hash_keys(schema),
        entries,
    }
}

/// Normalize one non-null signal value
pub fn normalize_value(raw: &SignalValue) -> Result<CanonicalValue, FieldError> {
    match raw {
        SignalValue::Null => Ok(CanonicalValue::Null),
        SignalValue::Text(s) => Ok(CanonicalValue::Text(normalize_text(s))),
        SignalValue::Number(n) => {
            if n.is_finite() {
                Ok(CanonicalValue::Number(*n))
            } else {
                Err(FieldError::NonFiniteNumber)
            }
        }
        SignalValue::Bool(b) => Ok(CanonicalValue::Bool(*b)),
        SignalValue::List(_) | SignalValue::Record(_) => {
            let json = to_canonical_json(raw, true)?;
            Ok(CanonicalValue::Composite(json.to_string()))
        }
    }
}

/// Trim and collapse every whitespace run to a single space
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// COMPOSITE SERIALIZATION
// ============================================================================

/// Lists keep element order; records are emitted with sorted keys
fn to_canonical_json(value: &SignalValue, top_level: bool) -> Result<serde_json::Value, FieldError> {
    use serde_json::Value;

    match value {
        SignalValue::Null => Ok(Value::Null),
        SignalValue::Text(s) => Ok(Value::String(normalize_text(s))),
        SignalValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .ok_or(FieldError::NonFiniteNumber),
        SignalValue::Bool(b) => Ok(Value::Bool(*b)),
        SignalValue::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                // Signal lists carry primitives only; lists nested in records are free-form
                if top_level && !item.is_primitive() {
                    return Err(FieldError::NestedListElement(item.type_name()));
                }
                out.push(to_canonical_json(item, false)?);
            }
            Ok(Value::Array(out))
        }
        SignalValue::Record(fields) => {
            let mut sorted = BTreeMap::new();
            for (key, field) in fields {
                sorted.insert(key.clone(), to_canonical_json(field, false)?);
            }
            // Insert in sorted order so the output is sorted even with preserve_order maps
            let mut map = serde_json::Map::new();
            for (key, field) in sorted {
                map.insert(key, field);
            }
            Ok(Value::Object(map))
        }
    }
}
