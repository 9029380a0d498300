// studio-core/src/core/migration.rs
// ============================================================================
// Module: Studio Migration Engine
// Description: Forward-only schema and port renaming over a Project document.
// Purpose: Normalize older project documents without ever reverting a change.
// Dependencies: crate::core::project, crate::core::identifiers
// ============================================================================

//! ## Overview
//! Migrations are ordered, idempotent, and applied once: each records its ID
//! and timestamp in [`MigrationsState::applied`](crate::core::project::MigrationsState)
//! the first time it changes the document, and is a no-op thereafter. The
//! engine dispatches over an ordered [`MigrationRegistry`] rather than
//! hand-sequencing each migration inline, so each one stays independently
//! testable.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::identifiers::EdgeId;
use crate::core::identifiers::MigrationId;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::PortId;
use crate::core::project::AppliedMigration;
use crate::core::project::Project;

/// Errors raised applying a migration.
#[derive(Debug, Error, PartialEq)]
pub enum MigrationError {
    /// A migration's precondition was violated (e.g. an edge endpoint missing).
    #[error("migration {0} failed: {1}")]
    Failed(String, String),
}

/// A single forward-only migration.
pub trait Migration: Send + Sync {
    /// This migration's stable identifier.
    fn id(&self) -> MigrationId;

    /// Applies the migration in place, returning whether it changed anything.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`] if the migration cannot be applied safely.
    fn apply(&self, project: &mut Project) -> Result<bool, MigrationError>;
}

/// An ordered set of migrations, applied in registration order, each exactly
/// once.
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRegistry {
    /// Builds the registry with the two migrations this runtime ships.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.push(PathOnlyPortsV1);
        registry.push(InlinePromptTemplateV1);
        registry
    }

    /// Registers a migration, appending it after any already registered.
    pub fn push(&mut self, migration: impl Migration + 'static) {
        self.migrations.push(Box::new(migration));
    }

    /// Applies every registered migration in order, skipping any already
    /// recorded in `project.migrations.applied`, and returns the IDs of
    /// migrations that changed the document (and were newly recorded).
    ///
    /// # Errors
    ///
    /// Returns the first [`MigrationError`] a migration raises.
    pub fn apply_all(
        &self,
        project: &mut Project,
        now: &str,
    ) -> Result<Vec<MigrationId>, MigrationError> {
        let mut applied = Vec::new();
        for migration in &self.migrations {
            let id = migration.id();
            if project.migrations.has_applied(&id) {
                continue;
            }
            let changed = migration.apply(project)?;
            if changed {
                project.migrations.applied.push(AppliedMigration {
                    id: id.clone(),
                    at: now.to_string(),
                });
                applied.push(id);
            }
        }
        Ok(applied)
    }
}

/// Renames legacy port IDs to the unified vocabulary and normalizes
/// media-ingest config to a single `sourcePath` key, deduping edges by their
/// four-tuple identity.
pub struct PathOnlyPortsV1;

impl Migration for PathOnlyPortsV1 {
    fn id(&self) -> MigrationId {
        MigrationId::from("path-only-ports-v1")
    }

    fn apply(&self, project: &mut Project) -> Result<bool, MigrationError> {
        let mut changed = false;

        for edge in &mut project.graph.edges {
            changed |= rename_port(&mut edge.from_port_id, "asset", "path");
            changed |= rename_port(&mut edge.from_port_id, "mime", "path");
            changed |= rename_port(&mut edge.from_port_id, "media_kind", "path");
            changed |= rename_port(&mut edge.from_port_id, "image", "media");
            changed |= rename_port(&mut edge.from_port_id, "images", "media");
            changed |= rename_port(&mut edge.to_port_id, "image", "media");
            changed |= rename_port(&mut edge.to_port_id, "images", "media");
            changed |= rename_port(&mut edge.from_port_id, "prompt_text", "prompt");
            changed |= rename_port(&mut edge.to_port_id, "prompt_text", "prompt");
            changed |= rename_port(&mut edge.from_port_id, "system_prompt", "system_prompt");
        }

        for node in &mut project.graph.nodes {
            if node.kind.as_str() == "studio.media_ingest" {
                if let Some(object) = node.config.as_object_mut() {
                    let legacy_keys = ["assetPath", "inputPath", "filePath"];
                    if !object.contains_key("sourcePath") {
                        for key in legacy_keys {
                            if let Some(value) = object.remove(key) {
                                object.insert("sourcePath".to_string(), value);
                                changed = true;
                                break;
                            }
                        }
                    } else {
                        for key in legacy_keys {
                            if object.remove(key).is_some() {
                                changed = true;
                            }
                        }
                    }
                }
            }
        }

        let mut seen: BTreeSet<(NodeId, PortId, NodeId, PortId)> = BTreeSet::new();
        let before = project.graph.edges.len();
        project.graph.edges.retain(|edge| {
            let tuple = (
                edge.from_node_id.clone(),
                edge.from_port_id.clone(),
                edge.to_node_id.clone(),
                edge.to_port_id.clone(),
            );
            seen.insert(tuple)
        });
        if project.graph.edges.len() != before {
            changed = true;
        }

        if changed {
            project.graph.recompute_entry_node_ids();
        }

        Ok(changed)
    }
}

fn rename_port(port: &mut PortId, from: &str, to: &str) -> bool {
    if port.as_str() == from {
        *port = PortId::from(to);
        true
    } else {
        false
    }
}

/// Removes `studio.prompt_template` nodes, appending their `template` text to
/// downstream text/image generation `systemPrompt` config and rewiring their
/// inbound edges directly to the downstream node.
pub struct InlinePromptTemplateV1;

impl Migration for InlinePromptTemplateV1 {
    fn id(&self) -> MigrationId {
        MigrationId::from("inline-prompt-template-v1")
    }

    fn apply(&self, project: &mut Project) -> Result<bool, MigrationError> {
        let template_node_ids: Vec<NodeId> = project
            .graph
            .nodes
            .iter()
            .filter(|n| n.kind.as_str() == "studio.prompt_template")
            .map(|n| n.id.clone())
            .collect();

        if template_node_ids.is_empty() {
            return Ok(false);
        }

        for template_id in &template_node_ids {
            let template_text = project
                .graph
                .nodes
                .iter()
                .find(|n| &n.id == template_id)
                .and_then(|n| n.config.get("template"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            let outgoing: Vec<crate::core::project::Edge> = project
                .graph
                .edges
                .iter()
                .filter(|e| &e.from_node_id == template_id)
                .cloned()
                .collect();

            for edge in &outgoing {
                let Some(target) = project
                    .graph
                    .nodes
                    .iter_mut()
                    .find(|n| n.id == edge.to_node_id)
                else {
                    continue;
                };
                let is_image = target.kind.as_str() == "studio.image_generation";
                let is_text = target.kind.as_str() == "studio.text_generation";
                if !is_image && !is_text {
                    continue;
                }
                if let Some(object) = target.config.as_object_mut() {
                    let existing = object
                        .get("systemPrompt")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    let combined = if existing.is_empty() {
                        template_text.clone()
                    } else {
                        format!("{existing}\n{template_text}")
                    };
                    object.insert(
                        "systemPrompt".to_string(),
                        serde_json::Value::String(combined),
                    );
                }
            }

            let incoming: Vec<crate::core::project::Edge> = project
                .graph
                .edges
                .iter()
                .filter(|e| &e.to_node_id == template_id)
                .cloned()
                .collect();

            let mut rewired = Vec::new();
            for in_edge in &incoming {
                for out_edge in &outgoing {
                    let Some(target) = project
                        .graph
                        .nodes
                        .iter()
                        .find(|n| n.id == out_edge.to_node_id)
                    else {
                        continue;
                    };
                    let is_image = target.kind.as_str() == "studio.image_generation";
                    let to_port = if is_image {
                        if in_edge.from_port_id.as_str() == "image"
                            || in_edge.from_port_id.as_str() == "media"
                        {
                            PortId::from("images")
                        } else {
                            PortId::from("prompt")
                        }
                    } else {
                        if in_edge.from_port_id.as_str() == "image"
                            || in_edge.from_port_id.as_str() == "media"
                        {
                            continue;
                        }
                        PortId::from("prompt")
                    };
                    rewired.push(crate::core::project::Edge {
                        id: EdgeId::from(format!(
                            "{}-inlined-{}",
                            in_edge.id, out_edge.to_node_id
                        )),
                        from_node_id: in_edge.from_node_id.clone(),
                        from_port_id: in_edge.from_port_id.clone(),
                        to_node_id: out_edge.to_node_id.clone(),
                        to_port_id: to_port,
                    });
                }
            }

            project
                .graph
                .edges
                .retain(|e| &e.from_node_id != template_id && &e.to_node_id != template_id);
            project.graph.edges.extend(rewired);
        }

        project
            .graph
            .nodes
            .retain(|n| !template_node_ids.contains(&n.id));
        project.graph.groups.iter_mut().for_each(|g| {
            g.member_node_ids
                .retain(|id| !template_node_ids.contains(id));
        });
        project.graph.recompute_entry_node_ids();

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifiers::ProjectId;
    use crate::core::project::Edge;
    use crate::core::project::EngineConfig;
    use crate::core::project::Graph;
    use crate::core::project::MigrationsState;
    use crate::core::project::NodeInstance;
    use crate::core::project::PermissionsRef;
    use crate::core::project::Position;
    use crate::core::project::ProjectSettings;
    use crate::core::project::Retention;
    use crate::core::project::PROJECT_SCHEMA_TAG;

    fn base_project() -> Project {
        Project {
            schema: PROJECT_SCHEMA_TAG.to_string(),
            project_id: ProjectId::from("p1"),
            name: "test".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            engine: EngineConfig {
                api_mode: "systemsculpt_only".to_string(),
                min_plugin_version: (1, 0, 0),
            },
            graph: Graph {
                nodes: vec![],
                edges: vec![],
                entry_node_ids: vec![],
                groups: vec![],
            },
            permissions_ref: PermissionsRef {
                policy_version: 1,
                policy_path: "policy.json".to_string(),
            },
            settings: ProjectSettings {
                run_concurrency: "adaptive".to_string(),
                default_fs_scope: "vault".to_string(),
                retention: Retention {
                    max_runs: 50,
                    max_artifacts_mb: 500,
                },
            },
            migrations: MigrationsState {
                project_schema_version: 1,
                applied: vec![],
            },
        }
    }

    #[test]
    fn path_only_ports_renames_legacy_port_and_is_idempotent() {
        let mut project = base_project();
        project.graph.nodes.push(NodeInstance {
            id: NodeId::from("a"),
            kind: crate::core::identifiers::NodeKind::from("studio.media_node"),
            version: 1,
            title: "a".to_string(),
            position: Position { x: 0.0, y: 0.0 },
            config: serde_json::json!({}),
            continue_on_error: false,
            disabled: false,
        });
        project.graph.nodes.push(NodeInstance {
            id: NodeId::from("b"),
            kind: crate::core::identifiers::NodeKind::from("studio.consumer"),
            version: 1,
            title: "b".to_string(),
            position: Position { x: 0.0, y: 0.0 },
            config: serde_json::json!({}),
            continue_on_error: false,
            disabled: false,
        });
        project.graph.edges.push(Edge {
            id: EdgeId::from("e1"),
            from_node_id: NodeId::from("a"),
            from_port_id: PortId::from("asset"),
            to_node_id: NodeId::from("b"),
            to_port_id: PortId::from("in"),
        });

        let registry = MigrationRegistry::with_builtins();
        let applied = registry
            .apply_all(&mut project, "2026-02-01T00:00:00Z")
            .expect("apply");
        assert_eq!(applied, vec![MigrationId::from("path-only-ports-v1")]);
        assert_eq!(project.graph.edges[0].from_port_id, PortId::from("path"));
        assert!(project.migrations.has_applied(&MigrationId::from(
            "path-only-ports-v1"
        )));

        let applied_again = registry
            .apply_all(&mut project, "2026-02-02T00:00:00Z")
            .expect("apply again");
        assert!(applied_again.is_empty());
        assert_eq!(project.migrations.applied.len(), 1);
    }
}
