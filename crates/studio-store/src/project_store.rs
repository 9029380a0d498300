// studio-store/src/project_store.rs
// ============================================================================
// Module: Project/Policy Store
// Description: Parse, migrate, validate, and serialize project + policy documents.
// Purpose: Own the on-disk `studio.project.v1` file and its sibling policy file.
// Dependencies: serde_json, studio-core
// ============================================================================

//! ## Overview
//! [`ProjectStore`] is the exclusive writer of a project's JSON document. It
//! reads strictly when the document already carries the current schema tag,
//! performs a one-shot legacy-canvas migration otherwise, runs the forward-only
//! [`MigrationRegistry`](studio_core::core::migration::MigrationRegistry) migrations,
//! validates edge references, and serializes with RFC 8785 canonical JSON plus a
//! trailing newline.

use std::path::Path;
use std::path::PathBuf;

use serde_json::Value;
use studio_core::core::hashing::HashError;
use studio_core::core::hashing::canonical_json_bytes;
use studio_core::core::host::HostEnvironment;
use studio_core::core::host::HostError;
use studio_core::core::identifiers::EdgeId;
use studio_core::core::identifiers::MigrationId;
use studio_core::core::identifiers::NodeId;
use studio_core::core::identifiers::NodeKind;
use studio_core::core::identifiers::PortId;
use studio_core::core::identifiers::ProjectId;
use studio_core::core::identifiers::random_id;
use studio_core::core::migration::MigrationRegistry;
use studio_core::core::policy::PermissionPolicy;
use studio_core::core::policy::POLICY_SCHEMA_TAG;
use studio_core::core::project::AppliedMigration;
use studio_core::core::project::CURRENT_PROJECT_SCHEMA_VERSION;
use studio_core::core::project::Edge;
use studio_core::core::project::EngineConfig;
use studio_core::core::project::Graph;
use studio_core::core::project::MigrationsState;
use studio_core::core::project::NodeInstance;
use studio_core::core::project::PermissionsRef;
use studio_core::core::project::Position;
use studio_core::core::project::Project;
use studio_core::core::project::PROJECT_SCHEMA_TAG;
use studio_core::core::project::ProjectSettings;
use studio_core::core::project::Retention;
use thiserror::Error;
use tracing::info;

use crate::clock::Clock;

/// The identifier recorded in `migrations.applied` when a legacy canvas
/// document is converted into a `studio.project.v1` document for the first
/// time.
pub const LEGACY_AUTO_MIGRATION_ID: &str = "legacy-auto-migration";

/// Errors raised parsing, validating, or persisting a project or policy
/// document.
#[derive(Debug, Error)]
pub enum ProjectStoreError {
    /// The backing file could not be read or written.
    #[error(transparent)]
    Io(#[from] HostError),
    /// The document is not valid JSON, or is missing a field a legacy
    /// document must have to be migrated.
    #[error("failed to parse project document: {0}")]
    Parse(String),
    /// A forward-only migration failed.
    #[error(transparent)]
    Migration(#[from] studio_core::core::migration::MigrationError),
    /// The document's edges reference a node that does not exist, or its
    /// policy path is empty.
    #[error("project document is invalid: {0}")]
    Validation(String),
    /// The document could not be canonicalized for writing.
    #[error(transparent)]
    Serialize(#[from] HashError),
}

/// Reads, migrates, validates, and writes the project document and its
/// sibling policy document at a fixed pair of paths.
pub struct ProjectStore<'a> {
    host: &'a dyn HostEnvironment,
    clock: &'a dyn Clock,
}

impl<'a> ProjectStore<'a> {
    /// Builds a store backed by `host`, stamping timestamps via `clock`.
    #[must_use]
    pub fn new(host: &'a dyn HostEnvironment, clock: &'a dyn Clock) -> Self {
        Self { host, clock }
    }

    /// Opens the project at `project_path`, migrating and validating it, and
    /// loads its sibling policy document (resolved relative to
    /// `project_path`'s parent directory via `permissions_ref.policy_path`).
    ///
    /// If the migration pipeline changes the document, the updated project is
    /// written back to `project_path` before returning, so disk state never
    /// drifts from the in-memory copy the Facade hands to the Runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectStoreError`] if the file is missing, unparsable,
    /// fails validation, or a migration fails.
    pub fn open(&self, project_path: &Path) -> Result<(Project, PermissionPolicy), ProjectStoreError> {
        let bytes = self.host.read_binary(project_path)?;
        let mut project = parse_project(&bytes, self.clock)?;

        let registry = MigrationRegistry::with_builtins();
        let now = self.clock.now_iso8601();
        let applied = registry.apply_all(&mut project, &now)?;
        if !applied.is_empty() {
            info!(
                project_id = %project.project_id,
                migrations = ?applied,
                "applied forward migrations to project"
            );
            project.updated_at = now;
            self.write(project_path, &project)?;
        }

        validate(&project)?;

        let policy_path = self.resolve_policy_path(project_path, &project);
        let policy = self.load_or_init_policy(&policy_path)?;

        Ok((project, policy))
    }

    /// Creates a brand-new project document at `project_path` with an empty
    /// graph and an empty sibling policy document, failing if a project
    /// already exists there.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectStoreError`] if a document already exists at
    /// `project_path`, or if either document cannot be written.
    pub fn create(
        &self,
        project_path: &Path,
        name: impl Into<String>,
    ) -> Result<(Project, PermissionPolicy), ProjectStoreError> {
        if self.host.exists(project_path) {
            return Err(ProjectStoreError::Validation(format!(
                "a project already exists at {}",
                project_path.display()
            )));
        }

        let now = self.clock.now_iso8601();
        let project = Project {
            schema: PROJECT_SCHEMA_TAG.to_string(),
            project_id: ProjectId::new(random_id("proj")),
            name: name.into(),
            created_at: now.clone(),
            updated_at: now.clone(),
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
                project_schema_version: CURRENT_PROJECT_SCHEMA_VERSION,
                applied: vec![],
            },
        };

        self.write(project_path, &project)?;
        let policy = PermissionPolicy::empty(now);
        let policy_path = self.resolve_policy_path(project_path, &project);
        self.write_policy(&policy_path, &policy)?;

        Ok((project, policy))
    }

    /// Validates and writes `project` to `project_path`, bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectStoreError`] if validation or serialization fails.
    pub fn save(&self, project_path: &Path, project: &mut Project) -> Result<(), ProjectStoreError> {
        project.updated_at = self.clock.now_iso8601();
        validate(project)?;
        self.write(project_path, project)
    }

    /// Writes `policy` to `policy_path`, bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectStoreError`] if serialization fails.
    pub fn save_policy(&self, policy_path: &Path, policy: &mut PermissionPolicy) -> Result<(), ProjectStoreError> {
        policy.updated_at = self.clock.now_iso8601();
        self.write_policy(policy_path, policy)
    }

    fn resolve_policy_path(&self, project_path: &Path, project: &Project) -> PathBuf {
        project_path
            .parent()
            .map(|parent| parent.join(&project.permissions_ref.policy_path))
            .unwrap_or_else(|| PathBuf::from(&project.permissions_ref.policy_path))
    }

    fn load_or_init_policy(&self, policy_path: &Path) -> Result<PermissionPolicy, ProjectStoreError> {
        if !self.host.exists(policy_path) {
            let policy = PermissionPolicy::empty(self.clock.now_iso8601());
            self.write_policy(policy_path, &policy)?;
            return Ok(policy);
        }
        let bytes = self.host.read_binary(policy_path)?;
        serde_json::from_slice(&bytes).map_err(|e| ProjectStoreError::Parse(e.to_string()))
    }

    fn write(&self, path: &Path, project: &Project) -> Result<(), ProjectStoreError> {
        let mut bytes = canonical_json_bytes(project)?;
        bytes.push(b'\n');
        self.host.write_binary(path, &bytes)?;
        Ok(())
    }

    fn write_policy(&self, path: &Path, policy: &PermissionPolicy) -> Result<(), ProjectStoreError> {
        let mut bytes = canonical_json_bytes(policy)?;
        bytes.push(b'\n');
        self.host.write_binary(path, &bytes)?;
        Ok(())
    }
}

/// Parses raw project bytes, dispatching to strict parsing or the one-shot
/// legacy canvas migration based on whether a `schema` field tagged
/// [`PROJECT_SCHEMA_TAG`] is present.
///
/// # Errors
///
/// Returns [`ProjectStoreError::Parse`] if the bytes are not valid JSON, or
/// look like neither a tagged project document nor a legacy canvas shape.
pub fn parse_project(bytes: &[u8], clock: &dyn Clock) -> Result<Project, ProjectStoreError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ProjectStoreError::Parse(e.to_string()))?;

    let is_current_schema = value
        .get("schema")
        .and_then(Value::as_str)
        .is_some_and(|s| s == PROJECT_SCHEMA_TAG);

    if is_current_schema {
        return serde_json::from_value(value).map_err(|e| ProjectStoreError::Parse(e.to_string()));
    }

    let looks_legacy = value.get("nodes").is_some_and(Value::is_array)
        && value.get("edges").is_some_and(Value::is_array);
    if !looks_legacy {
        return Err(ProjectStoreError::Parse(
            "document is neither a tagged project nor a legacy canvas shape".to_string(),
        ));
    }

    migrate_legacy_canvas(&value, clock)
}

/// Converts a legacy, untagged canvas document (`{nodes, edges}`, no schema
/// tag) into a minimal current-schema [`Project`], recording a single
/// `legacy-auto-migration` entry.
fn migrate_legacy_canvas(value: &Value, clock: &dyn Clock) -> Result<Project, ProjectStoreError> {
    let now = clock.now_iso8601();

    let raw_nodes = value
        .get("nodes")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let nodes = raw_nodes
        .iter()
        .map(legacy_node)
        .collect::<Result<Vec<_>, _>>()?;

    let raw_edges = value
        .get("edges")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let edges = raw_edges
        .iter()
        .enumerate()
        .map(|(index, edge)| legacy_edge(index, edge))
        .collect::<Result<Vec<_>, _>>()?;

    let mut graph = Graph {
        nodes,
        edges,
        entry_node_ids: vec![],
        groups: vec![],
    };
    graph.recompute_entry_node_ids();

    let name = value
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("Untitled")
        .to_string();

    Ok(Project {
        schema: PROJECT_SCHEMA_TAG.to_string(),
        project_id: ProjectId::new(random_id("proj")),
        name,
        created_at: now.clone(),
        updated_at: now.clone(),
        engine: EngineConfig {
            api_mode: "systemsculpt_only".to_string(),
            min_plugin_version: (1, 0, 0),
        },
        graph,
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
            project_schema_version: CURRENT_PROJECT_SCHEMA_VERSION,
            applied: vec![AppliedMigration {
                id: MigrationId::from(LEGACY_AUTO_MIGRATION_ID),
                at: now,
            }],
        },
    })
}

fn legacy_node(raw: &Value) -> Result<NodeInstance, ProjectStoreError> {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ProjectStoreError::Parse("legacy node missing id".to_string()))?;
    let kind = raw
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| ProjectStoreError::Parse(format!("legacy node {id} missing kind")))?;
    let title = raw
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or(id)
        .to_string();
    let x = raw
        .get("position")
        .and_then(|p| p.get("x"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let y = raw
        .get("position")
        .and_then(|p| p.get("y"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let config = raw.get("config").cloned().unwrap_or_else(|| Value::Object(Default::default()));

    let version = raw
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(1);

    Ok(NodeInstance {
        id: NodeId::from(id),
        kind: NodeKind::from(kind),
        version,
        title,
        position: Position { x, y },
        config,
        continue_on_error: raw
            .get("continueOnError")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        disabled: raw.get("disabled").and_then(Value::as_bool).unwrap_or(false),
    })
}

fn legacy_edge(index: usize, raw: &Value) -> Result<Edge, ProjectStoreError> {
    let field = |key: &str| -> Result<String, ProjectStoreError> {
        raw.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProjectStoreError::Parse(format!("legacy edge {index} missing {key}")))
    };

    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("legacy-edge-{index}"));

    Ok(Edge {
        id: EdgeId::from(id),
        from_node_id: NodeId::from(field("fromNodeId")?),
        from_port_id: PortId::from(field("fromPortId")?),
        to_node_id: NodeId::from(field("toNodeId")?),
        to_port_id: PortId::from(field("toPortId")?),
    })
}

/// Validates that every edge endpoint resolves to a node in the graph, that
/// the policy path is non-empty, and that node IDs are unique.
///
/// # Errors
///
/// Returns [`ProjectStoreError::Validation`] describing the first violation
/// found.
pub fn validate(project: &Project) -> Result<(), ProjectStoreError> {
    let node_ids: std::collections::BTreeSet<&NodeId> =
        project.graph.nodes.iter().map(|n| &n.id).collect();

    if node_ids.len() != project.graph.nodes.len() {
        return Err(ProjectStoreError::Validation(
            "duplicate node id in graph".to_string(),
        ));
    }

    for edge in &project.graph.edges {
        if !node_ids.contains(&edge.from_node_id) {
            return Err(ProjectStoreError::Validation(format!(
                "edge {} references unknown source node {}",
                edge.id, edge.from_node_id
            )));
        }
        if !node_ids.contains(&edge.to_node_id) {
            return Err(ProjectStoreError::Validation(format!(
                "edge {} references unknown target node {}",
                edge.id, edge.to_node_id
            )));
        }
    }

    if project.permissions_ref.policy_path.trim().is_empty() {
        return Err(ProjectStoreError::Validation(
            "permissions_ref.policy_path must not be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::host::FsHostEnvironment;

    fn clock() -> FixedClock {
        FixedClock("2026-01-01T00:00:00Z".to_string())
    }

    #[test]
    fn creates_and_reopens_a_fresh_project() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FsHostEnvironment::new(dir.path());
        let clock = clock();
        let store = ProjectStore::new(&host, &clock);
        let path = dir.path().join("project.json");

        let (created, _policy) = store.create(&path, "My Project").expect("create");
        assert_eq!(created.name, "My Project");
        assert!(host.exists(&path));

        let (reopened, policy) = store.open(&path).expect("open");
        assert_eq!(reopened.project_id, created.project_id);
        assert!(policy.grants.is_empty());
    }

    #[test]
    fn migrates_a_legacy_canvas_document_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FsHostEnvironment::new(dir.path());
        let clock = clock();
        let path = dir.path().join("project.json");

        let legacy = serde_json::json!({
            "name": "Old Canvas",
            "nodes": [
                {"id": "a", "kind": "studio.value", "config": {"value": "hi"}},
            ],
            "edges": [],
        });
        host.write_binary(&path, serde_json::to_vec(&legacy).expect("serialize legacy").as_slice())
            .expect("write legacy");

        let store = ProjectStore::new(&host, &clock);
        let (project, _policy) = store.open(&path).expect("open");

        assert_eq!(project.schema, PROJECT_SCHEMA_TAG);
        assert_eq!(project.graph.nodes.len(), 1);
        assert!(
            project
                .migrations
                .has_applied(&MigrationId::from(LEGACY_AUTO_MIGRATION_ID))
        );
    }

    #[test]
    fn rejects_an_edge_that_references_a_missing_node() {
        let project = Project {
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
                edges: vec![Edge {
                    id: EdgeId::from("e1"),
                    from_node_id: NodeId::from("missing"),
                    from_port_id: PortId::from("out"),
                    to_node_id: NodeId::from("also-missing"),
                    to_port_id: PortId::from("in"),
                }],
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
        };

        assert!(validate(&project).is_err());
    }

    #[test]
    fn policy_schema_tag_constant_matches_expected_value() {
        assert_eq!(POLICY_SCHEMA_TAG, "studio.policy.v1");
    }
}
