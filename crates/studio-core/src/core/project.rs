// studio-core/src/core/project.rs
// ============================================================================
// Module: Studio Project Document
// Description: The versioned project document: graph, engine config, settings.
// Purpose: Model the `studio.project.v1` document and its structural invariants.
// Dependencies: serde, crate::core::identifiers
// ============================================================================

//! ## Overview
//! A [`Project`] is the persisted unit of authoring: a graph of [`NodeInstance`]s
//! and [`Edge`]s plus the engine, permissions, settings, and migration
//! bookkeeping that travel with it. The Runtime only ever holds a snapshot copy;
//! the live document is owned exclusively by the project store.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::EdgeId;
use crate::core::identifiers::GroupId;
use crate::core::identifiers::MigrationId;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::NodeKind;
use crate::core::identifiers::PortId;
use crate::core::identifiers::ProjectId;

/// The project document schema tag, as written in the `schema` field on disk.
pub const PROJECT_SCHEMA_TAG: &str = "studio.project.v1";

/// The current project schema version understood by this runtime.
pub const CURRENT_PROJECT_SCHEMA_VERSION: u32 = 1;

/// The versioned, persisted project document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Schema tag, always [`PROJECT_SCHEMA_TAG`] for documents this runtime writes.
    pub schema: String,
    /// Opaque identity, stable across renames of the backing file.
    pub project_id: ProjectId,
    /// Human-readable project name.
    pub name: String,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
    /// ISO-8601 last-modified timestamp.
    pub updated_at: String,
    /// Minimum host engine version and API mode.
    pub engine: EngineConfig,
    /// The node/edge graph.
    pub graph: Graph,
    /// Pointer to the sibling permission policy document.
    pub permissions_ref: PermissionsRef,
    /// Retention and concurrency settings.
    pub settings: ProjectSettings,
    /// Applied migration bookkeeping.
    pub migrations: MigrationsState,
}

/// Engine compatibility declaration carried on a project document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Fixed API mode; always `"systemsculpt_only"` for this runtime.
    pub api_mode: String,
    /// Minimum host engine version required to open this project, as `[major, minor, patch]`.
    pub min_plugin_version: (u32, u32, u32),
}

impl EngineConfig {
    /// Returns true if `host_version` satisfies this project's minimum requirement.
    #[must_use]
    pub fn satisfies(&self, host_version: (u32, u32, u32)) -> bool {
        host_version >= self.min_plugin_version
    }
}

/// The node/edge graph, plus recomputed entry points and visual-only groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    /// Ordered node instances.
    pub nodes: Vec<NodeInstance>,
    /// Ordered edges.
    pub edges: Vec<Edge>,
    /// Nodes with zero inbound edges, recomputed on structural change.
    pub entry_node_ids: Vec<NodeId>,
    /// Visual-only node clusters.
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Graph {
    /// Recomputes [`Graph::entry_node_ids`] as the set of nodes with no inbound
    /// edge, in node declaration order.
    pub fn recompute_entry_node_ids(&mut self) {
        let targets: BTreeSet<&NodeId> = self.edges.iter().map(|e| &e.to_node_id).collect();
        self.entry_node_ids = self
            .nodes
            .iter()
            .map(|n| &n.id)
            .filter(|id| !targets.contains(id))
            .cloned()
            .collect();
    }
}

/// A single node placed in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
    /// Unique identity within the owning project.
    pub id: NodeId,
    /// Node kind string binding this instance to a registered definition.
    pub kind: NodeKind,
    /// Definition version this instance was authored against.
    pub version: u32,
    /// Display title shown in the editor.
    pub title: String,
    /// Editor canvas position.
    pub position: Position,
    /// Node configuration, validated against the definition's config schema.
    pub config: Value,
    /// When true, a failure in this node does not fail the run.
    #[serde(default)]
    pub continue_on_error: bool,
    /// When true, the node is a zero-cost passthrough: dependents see it as
    /// satisfied with no outputs.
    #[serde(default)]
    pub disabled: bool,
}

/// A 2D editor canvas position. Carried for round-tripping only; the runtime
/// never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal offset.
    pub x: f64,
    /// Vertical offset.
    pub y: f64,
}

/// A directed connection from one node's output port to another's input port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Unique identity within the owning project.
    pub id: EdgeId,
    /// Source node.
    pub from_node_id: NodeId,
    /// Source output port.
    pub from_port_id: PortId,
    /// Target node.
    pub to_node_id: NodeId,
    /// Target input port.
    pub to_port_id: PortId,
}

impl Edge {
    /// The four-tuple used for duplicate-edge detection.
    #[must_use]
    pub fn identity_tuple(&self) -> (&NodeId, &PortId, &NodeId, &PortId) {
        (
            &self.from_node_id,
            &self.from_port_id,
            &self.to_node_id,
            &self.to_port_id,
        )
    }
}

/// Visual-only node clustering; never read by the runtime except to filter
/// membership during scope projection and migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Unique identity within the owning project.
    pub id: GroupId,
    /// Display title.
    pub title: String,
    /// Member node IDs.
    pub member_node_ids: Vec<NodeId>,
}

/// Pointer to the sibling permission policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsRef {
    /// Policy schema version expected.
    pub policy_version: u32,
    /// Path to the policy document, relative to the project file.
    pub policy_path: String,
}

/// Retention and concurrency settings for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    /// Fixed concurrency hint; always `"adaptive"` for this runtime.
    pub run_concurrency: String,
    /// Default filesystem scope label surfaced to the editor.
    pub default_fs_scope: String,
    /// Run and artifact retention bounds.
    pub retention: Retention,
}

/// Retention bounds enforced by the run journal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retention {
    /// Maximum number of run directories to retain.
    pub max_runs: u32,
    /// Maximum artifact storage, in megabytes, advisory only.
    pub max_artifacts_mb: u32,
}

/// Migration bookkeeping carried on the project document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationsState {
    /// Schema version the document was authored under.
    pub project_schema_version: u32,
    /// Monotonic list of applied migrations.
    #[serde(default)]
    pub applied: Vec<AppliedMigration>,
}

impl MigrationsState {
    /// Returns true if `id` is already recorded as applied.
    #[must_use]
    pub fn has_applied(&self, id: &MigrationId) -> bool {
        self.applied.iter().any(|a| &a.id == id)
    }
}

/// A single applied-migration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    /// Migration identifier.
    pub id: MigrationId,
    /// ISO-8601 timestamp of application.
    pub at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeInstance {
        NodeInstance {
            id: NodeId::from(id),
            kind: NodeKind::from("studio.value"),
            version: 1,
            title: id.to_string(),
            position: Position { x: 0.0, y: 0.0 },
            config: Value::Null,
            continue_on_error: false,
            disabled: false,
        }
    }

    #[test]
    fn recompute_entry_node_ids_finds_roots() {
        let mut graph = Graph {
            nodes: vec![node("a"), node("b"), node("c")],
            edges: vec![Edge {
                id: EdgeId::from("e1"),
                from_node_id: NodeId::from("a"),
                from_port_id: PortId::from("out"),
                to_node_id: NodeId::from("b"),
                to_port_id: PortId::from("in"),
            }],
            entry_node_ids: vec![],
            groups: vec![],
        };
        graph.recompute_entry_node_ids();
        assert_eq!(
            graph.entry_node_ids,
            vec![NodeId::from("a"), NodeId::from("c")]
        );
    }

    #[test]
    fn engine_config_satisfies_is_inclusive() {
        let cfg = EngineConfig {
            api_mode: "systemsculpt_only".to_string(),
            min_plugin_version: (2, 1, 0),
        };
        assert!(cfg.satisfies((2, 1, 0)));
        assert!(cfg.satisfies((3, 0, 0)));
        assert!(!cfg.satisfies((2, 0, 9)));
    }
}
