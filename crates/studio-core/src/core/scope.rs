// studio-core/src/core/scope.rs
// ============================================================================
// Module: Studio Run Scope Projection
// Description: Subsets a project's graph for a "run from here" request.
// Purpose: Compute downstream closure plus required upstream; drop visuals.
// Dependencies: crate::core::project, crate::core::registry
// ============================================================================

//! ## Overview
//! A scoped run executes a requested subtree plus the minimum upstream
//! dependencies needed to feed it, without dragging in sibling branches. This
//! module projects a full [`Project`] down to that subset.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::identifiers::NodeId;
use crate::core::project::Project;
use crate::core::registry::Registry;

/// Errors raised projecting a project to a scoped entry set.
#[derive(Debug, Error, PartialEq)]
pub enum ScopeError {
    /// A requested scoped entry does not exist in the project.
    #[error("unknown scoped entry node: {0}")]
    UnknownEntry(String),
    /// A requested scoped entry resolves to a visual-only node kind.
    #[error("scoped entry is visual-only: {0}")]
    VisualOnlyEntry(String),
}

/// Projects `project` down to the closure required by `scoped_entries`.
///
/// If `scoped_entries` is empty, the project is returned unchanged (visual-only
/// nodes remain in the document; the runtime excludes them later during
/// compilation). Otherwise, visual-only nodes and their incident edges are
/// removed first, then the downstream closure of the entries is computed
/// along outgoing edges, then the required upstream closure along incoming
/// edges. A node is kept iff it is in the downstream closure or is an
/// ancestor of a node in it.
///
/// # Errors
///
/// Returns [`ScopeError`] if an entry does not exist or names a visual-only
/// node.
pub fn project_scope(
    project: &Project,
    scoped_entries: &[NodeId],
    registry: &Registry,
) -> Result<Project, ScopeError> {
    if scoped_entries.is_empty() {
        return Ok(project.clone());
    }

    let mut projected = project.clone();

    let visual_only: BTreeSet<NodeId> = projected
        .graph
        .nodes
        .iter()
        .filter(|n| {
            registry
                .lookup(&n.kind, n.version)
                .is_some_and(|def| def.is_visual_only)
        })
        .map(|n| n.id.clone())
        .collect();

    projected
        .graph
        .nodes
        .retain(|n| !visual_only.contains(&n.id));
    projected.graph.edges.retain(|e| {
        !visual_only.contains(&e.from_node_id) && !visual_only.contains(&e.to_node_id)
    });

    for entry in scoped_entries {
        if visual_only.contains(entry) {
            return Err(ScopeError::VisualOnlyEntry(entry.to_string()));
        }
        if !projected.graph.nodes.iter().any(|n| &n.id == entry) {
            return Err(ScopeError::UnknownEntry(entry.to_string()));
        }
    }

    let downstream = closure(
        scoped_entries,
        &projected,
        |edge| (&edge.from_node_id, &edge.to_node_id),
    );
    let upstream = closure(
        &downstream.iter().cloned().collect::<Vec<_>>(),
        &projected,
        |edge| (&edge.to_node_id, &edge.from_node_id),
    );

    let keep: BTreeSet<NodeId> = downstream.union(&upstream).cloned().collect();

    projected.graph.nodes.retain(|n| keep.contains(&n.id));
    projected
        .graph
        .edges
        .retain(|e| keep.contains(&e.from_node_id) && keep.contains(&e.to_node_id));
    projected.graph.recompute_entry_node_ids();
    projected
        .graph
        .groups
        .iter_mut()
        .for_each(|g| g.member_node_ids.retain(|id| keep.contains(id)));

    Ok(projected)
}

/// Computes the reachability closure of `seeds` by repeatedly following edges
/// in the direction `direction` selects: `(from, to)` for downstream,
/// `(to, from)` for upstream.
fn closure<'a>(
    seeds: &[NodeId],
    project: &'a Project,
    direction: impl Fn(&'a crate::core::project::Edge) -> (&'a NodeId, &'a NodeId),
) -> BTreeSet<NodeId> {
    let mut visited: BTreeSet<NodeId> = seeds.iter().cloned().collect();
    let mut frontier: Vec<NodeId> = seeds.to_vec();

    while let Some(current) = frontier.pop() {
        for edge in &project.graph.edges {
            let (source, target) = direction(edge);
            if source == &current && visited.insert(target.clone()) {
                frontier.push(target.clone());
            }
        }
    }

    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifiers::EdgeId;
    use crate::core::identifiers::PortId;
    use crate::core::project::Edge;
    use crate::core::project::Graph;
    use crate::core::project::NodeInstance;
    use crate::core::project::Position;

    fn linear_project_with_branch() -> Project {
        let n = |id: &str| NodeInstance {
            id: NodeId::from(id),
            kind: crate::core::identifiers::NodeKind::from("studio.value"),
            version: 1,
            title: id.to_string(),
            position: Position { x: 0.0, y: 0.0 },
            config: serde_json::Value::Null,
            continue_on_error: false,
            disabled: false,
        };
        let e = |id: &str, from: &str, to: &str| Edge {
            id: EdgeId::from(id),
            from_node_id: NodeId::from(from),
            from_port_id: PortId::from("out"),
            to_node_id: NodeId::from(to),
            to_port_id: PortId::from("in"),
        };
        Project {
            schema: crate::core::project::PROJECT_SCHEMA_TAG.to_string(),
            project_id: crate::core::identifiers::ProjectId::from("p1"),
            name: "test".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            engine: crate::core::project::EngineConfig {
                api_mode: "systemsculpt_only".to_string(),
                min_plugin_version: (1, 0, 0),
            },
            graph: Graph {
                nodes: vec![n("a"), n("b"), n("c"), n("d"), n("x")],
                edges: vec![
                    e("e1", "a", "b"),
                    e("e2", "b", "c"),
                    e("e3", "c", "d"),
                    e("e4", "a", "x"),
                ],
                entry_node_ids: vec![NodeId::from("a")],
                groups: vec![],
            },
            permissions_ref: crate::core::project::PermissionsRef {
                policy_version: 1,
                policy_path: "policy.json".to_string(),
            },
            settings: crate::core::project::ProjectSettings {
                run_concurrency: "adaptive".to_string(),
                default_fs_scope: "vault".to_string(),
                retention: crate::core::project::Retention {
                    max_runs: 50,
                    max_artifacts_mb: 500,
                },
            },
            migrations: crate::core::project::MigrationsState {
                project_schema_version: 1,
                applied: vec![],
            },
        }
    }

    #[test]
    fn scoped_from_middle_excludes_sibling_branch() {
        let project = linear_project_with_branch();
        let registry = Registry::new();
        let scoped =
            project_scope(&project, &[NodeId::from("c")], &registry).expect("scope");
        let ids: BTreeSet<NodeId> = scoped.graph.nodes.iter().map(|n| n.id.clone()).collect();
        assert_eq!(
            ids,
            BTreeSet::from([
                NodeId::from("a"),
                NodeId::from("b"),
                NodeId::from("c"),
                NodeId::from("d"),
            ])
        );
        assert!(!ids.contains(&NodeId::from("x")));
    }

    #[test]
    fn empty_scope_returns_project_unchanged() {
        let project = linear_project_with_branch();
        let registry = Registry::new();
        let scoped = project_scope(&project, &[], &registry).expect("scope");
        assert_eq!(scoped, project);
    }

    #[test]
    fn unknown_entry_is_an_error() {
        let project = linear_project_with_branch();
        let registry = Registry::new();
        let err = project_scope(&project, &[NodeId::from("nope")], &registry).unwrap_err();
        assert_eq!(err, ScopeError::UnknownEntry("nope".to_string()));
    }
}
