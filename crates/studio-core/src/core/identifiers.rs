// studio-core/src/core/identifiers.rs
// ============================================================================
// Module: Studio Identifiers
// Description: Canonical opaque identifiers for projects, graphs, and runs.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the opaque string-based identifiers used throughout
//! Studio. Identifiers serialize as plain strings; validation (uniqueness,
//! resolvability) is handled at the document or compiler boundary rather than
//! within these wrappers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Macro
// ============================================================================

/// Declares a newtype string identifier with the shared opaque-ID boilerplate:
/// `new`, `as_str`, `Display`, and `From<&str>`/`From<String>`.
macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

opaque_id!(
    /// Identity of a Project document, stable across renames of the backing file.
    ProjectId
);

opaque_id!(
    /// Identity of a NodeInstance, unique within its owning Project's graph.
    NodeId
);

opaque_id!(
    /// Identity of an Edge, unique within its owning Project's graph.
    EdgeId
);

opaque_id!(
    /// Identity of a Group (visual-only node clustering), unique within a Project.
    GroupId
);

opaque_id!(
    /// Identity of a single run, minted when a run is enqueued.
    RunId
);

opaque_id!(
    /// Identity of a permission grant within a PermissionPolicy.
    GrantId
);

opaque_id!(
    /// Identity of an applied migration (e.g. `path-only-ports-v1`).
    MigrationId
);

opaque_id!(
    /// A node kind string, e.g. `studio.text_generation`, binding a NodeInstance
    /// to a registered NodeDefinition.
    NodeKind
);

opaque_id!(
    /// A port identifier on a node, unique within that node's input or output set.
    PortId
);

// ============================================================================
// SECTION: Random Prefixed Identifiers
// ============================================================================

/// Generates a random, prefixed identifier of the form `<prefix>-<hex>`, used
/// wherever the runtime mints a fresh identity (run IDs, grant IDs, temp file
/// names) rather than accepting one from a document.
#[must_use]
pub fn random_id(prefix: &str) -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let suffix: [u8; 8] = rng.r#gen();
    format!("{prefix}-{}", crate::core::hashing::hex_encode(&suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string_forms() {
        let id = NodeId::from("n1");
        assert_eq!(id.as_str(), "n1");
        assert_eq!(id.to_string(), "n1");
        assert_eq!(NodeId::new("n1".to_string()), id);
    }

    #[test]
    fn random_id_carries_the_requested_prefix_and_is_unique() {
        let a = random_id("run");
        let b = random_id("run");
        assert!(a.starts_with("run-"));
        assert_ne!(a, b);
    }

    #[test]
    fn serializes_transparently() {
        let id = RunId::new("run-1");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"run-1\"");
        let back: RunId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}
