//! Request parameter merging and header filtering.
//!
//! The outbound payload is a single JSON object assembled from up to three
//! sources. Precedence on key conflict, lowest to highest: body, path
//! parameters, query parameters.

use http::HeaderMap;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Merge body, path, and query parameters into one payload object.
///
/// Only object-shaped bodies contribute; a non-object body (array, string,
/// number) has no keys to merge and is ignored.
#[must_use]
pub fn merge_payload(
    body: Option<&Value>,
    path_params: &HashMap<String, String>,
    query_params: &HashMap<String, String>,
) -> Map<String, Value> {
    let mut payload = Map::new();

    match body {
        Some(Value::Object(fields)) => {
            payload.extend(fields.clone());
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            tracing::debug!(body_type = %json_type(other), "ignoring non-object request body");
        }
    }
    for (key, value) in path_params {
        payload.insert(key.clone(), Value::String(value.clone()));
    }
    for (key, value) in query_params {
        payload.insert(key.clone(), Value::String(value.clone()));
    }

    payload
}

/// Keep only the headers named in the route's allow-list, compared
/// case-insensitively. Values cross unchanged; non-UTF-8 values are
/// dropped.
#[must_use]
pub fn filter_headers(headers: &HeaderMap, allowed: &[String]) -> HashMap<String, String> {
    let mut filtered = HashMap::new();
    for name in allowed {
        if let Some(value) = headers.get(name.as_str()) {
            if let Ok(value) = value.to_str() {
                filtered.insert(name.to_ascii_lowercase(), value.to_string());
            }
        }
    }
    filtered
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
