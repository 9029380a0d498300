// studio-core/src/core/fingerprint.rs
// ============================================================================
// Module: Studio Fingerprint
// Description: Per-node input fingerprint used to key the result cache.
// Purpose: Compute a stable hash over a node's salt, kind, version, config, inputs.
// Dependencies: serde, crate::core::hashing
// ============================================================================

//! ## Overview
//! A node's fingerprint is the SHA-256 of the stable JSON form of
//! `{salt, kind, version, config, inputs}`. `salt` is a per-kind constant used
//! to force cache invalidation on a semantic (non-config) change to a node's
//! behavior. `config` must already have UI-only fields stripped by the caller
//! before this function is invoked, per the node definition's schema.

use serde::Serialize;
use serde_json::Value;

use crate::core::hashing::HashAlgorithm;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;

#[derive(Serialize)]
struct FingerprintInput<'a> {
    salt: &'a str,
    kind: &'a str,
    version: u32,
    config: &'a Value,
    inputs: &'a Value,
}

/// Computes a node's input fingerprint as a hex string.
///
/// # Errors
///
/// Returns [`HashError`] if `config` or `inputs` cannot be canonicalized
/// (e.g. contain a non-finite float).
pub fn compute_fingerprint(
    salt: &str,
    kind: &str,
    version: u32,
    config: &Value,
    inputs: &Value,
) -> Result<String, HashError> {
    let payload = FingerprintInput {
        salt,
        kind,
        version,
        config,
        inputs,
    };
    Ok(hash_canonical_json(HashAlgorithm::Sha256, &payload)?.value)
}

/// Removes UI-only fields (as declared on the node's config schema) from a
/// raw config object before fingerprinting.
#[must_use]
pub fn strip_ui_only_fields(
    config: &Value,
    schema: &[crate::core::registry::ConfigFieldSpec],
) -> Value {
    let Some(object) = config.as_object() else {
        return config.clone();
    };
    let mut filtered = object.clone();
    for field in schema {
        if field.ui_only {
            filtered.remove(&field.key);
        }
    }
    Value::Object(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_under_key_reordering() {
        let a = serde_json::json!({"x": 1, "y": 2});
        let b = serde_json::json!({"y": 2, "x": 1});
        let inputs = Value::Null;
        let f1 = compute_fingerprint("v1", "studio.value", 1, &a, &inputs).expect("fp");
        let f2 = compute_fingerprint("v1", "studio.value", 1, &b, &inputs).expect("fp");
        assert_eq!(f1, f2);
    }

    #[test]
    fn fingerprint_changes_with_config() {
        let a = serde_json::json!({"x": 1});
        let b = serde_json::json!({"x": 2});
        let inputs = Value::Null;
        let f1 = compute_fingerprint("v1", "studio.value", 1, &a, &inputs).expect("fp");
        let f2 = compute_fingerprint("v1", "studio.value", 1, &b, &inputs).expect("fp");
        assert_ne!(f1, f2);
    }

    #[test]
    fn strip_ui_only_fields_removes_marked_keys() {
        let config = serde_json::json!({"prompt": "hi", "lastDisplayedOutput": "stale"});
        let schema = vec![
            crate::core::registry::ConfigFieldSpec {
                key: "prompt".to_string(),
                field_type: crate::core::registry::ConfigFieldType::String,
                ui_only: false,
            },
            crate::core::registry::ConfigFieldSpec {
                key: "lastDisplayedOutput".to_string(),
                field_type: crate::core::registry::ConfigFieldType::String,
                ui_only: true,
            },
        ];
        let stripped = strip_ui_only_fields(&config, &schema);
        assert_eq!(stripped, serde_json::json!({"prompt": "hi"}));
    }
}
