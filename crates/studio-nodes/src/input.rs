// studio-nodes/src/input.rs
// ============================================================================
// Module: Input Value Helpers
// Description: Reads typed values out of an ExecutionContext's resolved
//              input map.
// Purpose: Share the "single value or ordered array" unwrapping rule across
//          every node executor without duplicating it per module.
// Dependencies: serde_json, studio-core
// ============================================================================

//! ## Overview
//! `ExecutionContext::inputs` is a JSON object keyed by input port ID. A port
//! fed by exactly one inbound edge holds that edge's value directly; a port
//! fed by more than one holds a JSON array in edge declaration order. Node
//! executors that only care about "the" value on a port take the first
//! element when it is an array, matching how the scheduler aggregates
//! multi-edge inputs.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Returns the raw value bound to `port`, unwrapping a multi-edge array to
/// its first element.
#[must_use]
pub fn first<'a>(inputs: &'a Value, port: &str) -> Option<&'a Value> {
    match inputs.get(port)? {
        Value::Array(values) => values.first(),
        other => Some(other),
    }
}

/// Returns every value bound to `port`, in edge order. A single-edge port
/// yields a one-element slice.
#[must_use]
pub fn all(inputs: &Value, port: &str) -> Vec<&Value> {
    match inputs.get(port) {
        Some(Value::Array(values)) => values.iter().collect(),
        Some(other) => vec![other],
        None => Vec::new(),
    }
}

/// Reads `port` as a string, unwrapping a multi-edge array to its first
/// element.
#[must_use]
pub fn as_str(inputs: &Value, port: &str) -> Option<String> {
    first(inputs, port).and_then(Value::as_str).map(str::to_string)
}

/// Deserializes `port`'s first bound value as `T`.
#[must_use]
pub fn as_typed<T: DeserializeOwned>(inputs: &Value, port: &str) -> Option<T> {
    first(inputs, port).and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Deserializes every value bound to `port` as `T`, discarding entries that
/// do not deserialize.
#[must_use]
pub fn all_typed<T: DeserializeOwned>(inputs: &Value, port: &str) -> Vec<T> {
    all(inputs, port)
        .into_iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_edge_value_is_returned_directly() {
        let inputs = json!({"prompt": "hello"});
        assert_eq!(as_str(&inputs, "prompt").as_deref(), Some("hello"));
    }

    #[test]
    fn multi_edge_array_unwraps_to_its_first_element() {
        let inputs = json!({"prompt": ["first", "second"]});
        assert_eq!(as_str(&inputs, "prompt").as_deref(), Some("first"));
        assert_eq!(all(&inputs, "prompt").len(), 2);
    }

    #[test]
    fn missing_port_yields_none_and_empty() {
        let inputs = json!({});
        assert!(first(&inputs, "prompt").is_none());
        assert!(all(&inputs, "prompt").is_empty());
    }
}
