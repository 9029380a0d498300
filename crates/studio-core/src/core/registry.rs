// studio-core/src/core/registry.rs
// ============================================================================
// Module: Studio Node Registry & Port Resolver
// Description: Registration of node definitions keyed by (kind, version).
// Purpose: Resolve a NodeInstance's kind+version to its executable definition.
// Dependencies: serde, crate::core::identifiers, crate::interfaces::NodeExecutor
// ============================================================================

//! ## Overview
//! The registry binds `(kind, version)` pairs to [`NodeDefinition`]s: their
//! capability class, cache policy, port shapes, config schema, and executor.
//! Nodes whose port sets depend on their config (variadic "dataset" nodes)
//! supply a dynamic port resolver on the [`crate::interfaces::NodeExecutor`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::NodeKind;
use crate::core::identifiers::PortId;
use crate::core::run::CacheEntry;
use crate::interfaces::NodeExecutor;

/// The scheduling category of a node, governing concurrency limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityClass {
    /// Pure, local computation.
    LocalCpu,
    /// Local disk or subprocess I/O.
    LocalIo,
    /// Remote network I/O.
    Api,
}

/// Per-node directive controlling fingerprint-keyed result caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Cache keyed by the node's input fingerprint.
    ByInputs,
    /// Never cache; always recompute.
    Never,
}

/// A type tag on a port. `"any"` is compatible with every other tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortType(pub String);

impl PortType {
    /// The wildcard type tag compatible with anything.
    pub const ANY: &'static str = "any";

    /// Returns true if this type is compatible with `other` per the compiler's
    /// rule: `any` on either side is compatible with anything, otherwise the
    /// tags must match exactly.
    #[must_use]
    pub fn compatible_with(&self, other: &PortType) -> bool {
        self.0 == Self::ANY || other.0 == Self::ANY || self.0 == other.0
    }
}

/// A single declared port on a node definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    /// Port identifier, unique within the node's input or output set.
    pub id: PortId,
    /// The port's type tag.
    pub port_type: PortType,
    /// For input ports: whether at least one inbound edge is required.
    #[serde(default)]
    pub required: bool,
}

/// A declared config field on a node definition's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFieldSpec {
    /// The JSON object key this field occupies in a node's config.
    pub key: String,
    /// The field's accepted shape.
    pub field_type: ConfigFieldType,
    /// If true, this field is UI-display-only and is stripped before fingerprinting.
    #[serde(default)]
    pub ui_only: bool,
}

/// The accepted shape of a single config field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigFieldType {
    /// An arbitrary string.
    String,
    /// A number, optionally range-bounded.
    Number {
        /// Inclusive lower bound, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        /// Inclusive upper bound, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// A boolean flag.
    Boolean,
    /// A closed string enumeration.
    Enum {
        /// Accepted values.
        values: Vec<String>,
    },
    /// An unconstrained JSON value, accepted as an escape hatch.
    Json,
}

/// A registry entry: everything the compiler and scheduler need to resolve and
/// run a node instance bound to this `(kind, version)`. Not persisted.
#[derive(Clone)]
pub struct NodeDefinition {
    /// The node kind string.
    pub kind: NodeKind,
    /// The definition version.
    pub version: u32,
    /// Scheduling capability class.
    pub capability_class: CapabilityClass,
    /// Result caching policy.
    pub cache_policy: CachePolicy,
    /// Statically declared input ports (may be extended dynamically; see
    /// [`NodeExecutor::resolve_ports`]).
    pub input_ports: Vec<PortSpec>,
    /// Statically declared output ports.
    pub output_ports: Vec<PortSpec>,
    /// Config schema used for compile-time validation.
    pub config_schema: Vec<ConfigFieldSpec>,
    /// A per-kind constant folded into the fingerprint, bumped to force cache
    /// invalidation on a semantic (non-config) change to the node's behavior.
    pub fingerprint_salt: String,
    /// True for visual-only node kinds (e.g. labels): retained in the document,
    /// exempt from compilation and execution.
    pub is_visual_only: bool,
    /// Per-kind escape hatch consulted on an otherwise-matching cache hit:
    /// returning `true` forces re-execution even though the fingerprint
    /// matches. Defaults to [`never_bypass`] (always accept the hit).
    pub cache_bypass: fn(&CacheEntry) -> bool,
    /// The executable behavior bound to this definition.
    pub executor: Arc<dyn NodeExecutor>,
}

/// The default [`NodeDefinition::cache_bypass`]: a matching fingerprint is
/// always honored.
#[must_use]
pub fn never_bypass(_entry: &CacheEntry) -> bool {
    false
}

/// A `(kind, version) -> NodeDefinition` map populated at startup by the host.
#[derive(Default, Clone)]
pub struct Registry {
    definitions: BTreeMap<(NodeKind, u32), NodeDefinition>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node definition, replacing any prior entry with the same
    /// `(kind, version)`.
    pub fn register(&mut self, definition: NodeDefinition) {
        let key = (definition.kind.clone(), definition.version);
        self.definitions.insert(key, definition);
    }

    /// Looks up a definition by kind and version.
    #[must_use]
    pub fn lookup(&self, kind: &NodeKind, version: u32) -> Option<&NodeDefinition> {
        self.definitions.get(&(kind.clone(), version))
    }

    /// Iterates all registered definitions.
    pub fn iter(&self) -> impl Iterator<Item = &NodeDefinition> {
        self.definitions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_port_type_is_universally_compatible() {
        let any = PortType(PortType::ANY.to_string());
        let text = PortType("text".to_string());
        assert!(any.compatible_with(&text));
        assert!(text.compatible_with(&any));
    }

    #[test]
    fn mismatched_concrete_types_are_incompatible() {
        let text = PortType("text".to_string());
        let image = PortType("image".to_string());
        assert!(!text.compatible_with(&image));
    }
}
