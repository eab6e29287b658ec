//! Unwrapping of agent payloads into flat sub-item lists.
//!
//! A payload may be a bare object, an array, or an object wrapping its items
//! under `results`, `articles` or `result` (checked in that order). Wrappers
//! nest arbitrarily; recursion is capped by depth.

use serde_json::{Map, Value};

const MAX_DEPTH: usize = 16;
const WRAPPER_KEYS: &[&str] = &["results", "articles", "result"];

/// Flatten a payload into its sub-items. Empty objects and scalars yield nothing.
pub fn extract_sub_items(data: &Value) -> Vec<&Map<String, Value>> {
    let mut items = Vec::new();
    collect(data, 0, &mut items);
    items
}

fn collect<'a>(value: &'a Value, depth: usize, out: &mut Vec<&'a Map<String, Value>>) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::Array(values) => {
            for item in values {
                collect(item, depth + 1, out);
            }
        }
        Value::Object(map) => {
            let wrapped = WRAPPER_KEYS
                .iter()
                .filter_map(|key| map.get(*key))
                .find(|inner| matches!(inner, Value::Array(_) | Value::Object(_)));
            match wrapped {
                Some(inner) => collect(inner, depth + 1, out),
                None if !map.is_empty() => out.push(map),
                None => {}
            }
        }
        _ => {}
    }
}

/// Lower-cased `status` label of a sub-item, if it carries one.
pub fn status_label(item: &Map<String, Value>) -> Option<String> {
    item.get("status")
        .and_then(Value::as_str)
        .map(|label| label.trim().to_ascii_lowercase())
        .filter(|label| !label.is_empty())
}

pub fn is_error_label(label: &str) -> bool {
    matches!(label, "error" | "failed" | "failure")
}

/// First non-empty string under any of `keys`.
pub fn first_string<'a>(item: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| item.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|text| !text.is_empty())
}
