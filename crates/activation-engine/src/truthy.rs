//! Truthiness rules for loosely typed node data
//!
//! Node data arrives as JSON written by many different node
//! implementations, so flags may be booleans, strings or numbers.

use serde_json::Value;

/// Fields that carry a node's produced output
pub const OUTPUT_FIELDS: &[&str] = &["text", "value", "output", "heldText"];

/// Fields consulted when deciding whether an upstream source is producing
pub const UPSTREAM_VALUE_FIELDS: &[&str] = &["value", "text", "output"];

/// Coerce a flag value to a boolean
///
/// `true` and `"true"` (trimmed, any case) are true. Other strings are
/// false. Numbers are true when non-zero and not NaN.
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        _ => false,
    }
}

/// Read and coerce a flag from node data; absent flags are false
pub fn flag(data: &Value, key: &str) -> bool {
    data.get(key).map(coerce_bool).unwrap_or(false)
}

/// Defined, not null, and not the empty string
///
/// `0` and `false` pass this check.
pub fn is_meaningful(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Any of the output fields carries a meaningful value
pub fn has_meaningful_output(data: &Value) -> bool {
    OUTPUT_FIELDS.iter().any(|key| is_meaningful(data.get(*key)))
}

/// Content check used for displayed values
///
/// Stricter than [`is_meaningful`]: whitespace-only strings, empty
/// collections and falsy scalars do not count.
pub fn is_meaningful_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
    }
}
