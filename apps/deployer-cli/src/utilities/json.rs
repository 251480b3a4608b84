//! JSON serialization utilities
//!
//! Every serialization call site states how its output should look by passing a
//! [`JsonStyle`]. There is no process-wide serializer configuration.
//!
//! Export bundles (`deploy.config.json`, `.platform` files) are written pretty-printed
//! and keep struct field order so they diff cleanly when committed to a repository.
//! Request bodies sent to remote platforms are compact.

use serde::Serialize;
use serde_json::{Map, Value};

/// Output shape for a serialization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonStyle {
    pub pretty: bool,
    pub sort_keys: bool,
}

impl JsonStyle {
    /// Human-facing files committed alongside exported items.
    pub const EXPORT: JsonStyle = JsonStyle {
        pretty: true,
        sort_keys: false,
    };

    /// Request payloads and other machine-facing text.
    pub const COMPACT: JsonStyle = JsonStyle {
        pretty: false,
        sort_keys: false,
    };

    /// Deterministic output regardless of map ordering.
    pub const CANONICAL: JsonStyle = JsonStyle {
        pretty: true,
        sort_keys: true,
    };
}

/// Recursively sorts all object keys in a JSON value
///
/// Arrays keep their element order; only the keys inside objects are reordered.
pub fn sort_json_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut sorted_map = Map::new();
            for (key, val) in entries {
                sorted_map.insert(key, sort_json_keys(val));
            }
            Value::Object(sorted_map)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(sort_json_keys).collect()),
        other => other,
    }
}

/// Serializes a value using the given style.
///
/// # Arguments
/// * `value` - Any serializable value
/// * `style` - Pretty printing and key ordering for this call site
pub fn to_string_styled<T: Serialize>(value: &T, style: JsonStyle) -> serde_json::Result<String> {
    let mut json_value = serde_json::to_value(value)?;

    if style.sort_keys {
        json_value = sort_json_keys(json_value);
    }

    if style.pretty {
        serde_json::to_string_pretty(&json_value)
    } else {
        serde_json::to_string(&json_value)
    }
}

/// Same as [`to_string_styled`] but returns the UTF-8 bytes, ready to be written to a file
/// or stored in an item definition part.
pub fn to_vec_styled<T: Serialize>(value: &T, style: JsonStyle) -> serde_json::Result<Vec<u8>> {
    to_string_styled(value, style).map(String::into_bytes)
}
