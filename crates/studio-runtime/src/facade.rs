// studio-runtime/src/facade.rs
// ============================================================================
// Module: Service Facade
// Description: The single public orchestration entry point a host embeds
//              against: open/create/save a project, run it (whole or
//              scoped), list recent runs, and append a permission grant.
// Purpose: Compose one ProjectStore, one Registry, and one Runtime behind a
//          small method set: the one canonical execution path every surface
//          calls through.
// Dependencies: studio-core, studio-store, tokio
// ============================================================================

//! ## Overview
//! [`Facade`] is the type a host (a CLI, an MCP server, an editor process)
//! constructs once and holds for the life of the process. It never mutates a
//! live project document except through [`Facade::save_project`] and
//! [`Facade::add_grant`] — both of which go through [`ProjectStore`], the
//! document's exclusive writer — and it delegates every run to the single
//! [`Runtime`] it owns, which in turn builds the per-run `AssetStore`,
//! `PermissionManager`, `Sandbox`, and `Adapter` instances scoped to that
//! run's policy snapshot (see `scheduler.rs`). The Facade does not hold a
//! standalone `AssetStore`: none of its entry points write content-addressed
//! bytes directly, so the per-run instance the Runtime already constructs is
//! the only one ever needed.

use std::path::Path;
use std::sync::Arc;

use studio_adapters::AdapterEndpoints;
use studio_core::core::host::HostEnvironment;
use studio_core::core::identifiers::GrantId;
use studio_core::core::identifiers::NodeId;
use studio_core::core::identifiers::random_id;
use studio_core::core::policy::Capability;
use studio_core::core::policy::Grant;
use studio_core::core::policy::GrantScope;
use studio_core::PermissionPolicy;
use studio_core::Project;
use studio_core::Registry;
use studio_core::RunSummary;
use studio_store::Clock;
use studio_store::ProjectStore;

use crate::error::FacadeError;
use crate::scheduler::Runtime;
use crate::scheduler::assets_root_for;

/// The Service Facade: the sole orchestration entry point a host embeds
/// against, composing the Project Store and the Runtime behind the seven
/// named operations.
pub struct Facade {
    host: Arc<dyn HostEnvironment>,
    clock: Arc<dyn Clock>,
    runtime: Runtime,
}

impl Facade {
    /// Builds a Facade over the given host environment, clock, and remote
    /// adapter endpoints, constructing its owned [`Runtime`] (which in turn
    /// registers the built-in node kinds into the shared [`Registry`]).
    #[must_use]
    pub fn new(
        host: Arc<dyn HostEnvironment>,
        clock: Arc<dyn Clock>,
        http: reqwest::Client,
        endpoints: AdapterEndpoints,
    ) -> Self {
        let runtime = Runtime::new(host.clone(), clock.clone(), http, endpoints);
        Self { host, clock, runtime }
    }

    /// The node registry the Runtime compiles and executes against, exposed
    /// so a host can list available node kinds for an editor palette.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        self.runtime.registry()
    }

    /// Opens an existing project at `project_path`, migrating it forward and
    /// loading its sibling permission policy.
    ///
    /// # Errors
    ///
    /// Returns [`FacadeError`] if the document is missing, unparsable, fails
    /// validation, or a forward migration fails.
    pub fn open_project(
        &self,
        project_path: &Path,
    ) -> Result<(Project, PermissionPolicy), FacadeError> {
        let store = ProjectStore::new(self.host.as_ref(), self.clock.as_ref());
        store.open(project_path).map_err(FacadeError::from)
    }

    /// Creates a brand-new project document (and empty sibling policy) at
    /// `project_path`.
    ///
    /// # Errors
    ///
    /// Returns [`FacadeError`] if a document already exists at
    /// `project_path`, or either document cannot be written.
    pub fn create_project(
        &self,
        project_path: &Path,
        name: impl Into<String>,
    ) -> Result<(Project, PermissionPolicy), FacadeError> {
        let store = ProjectStore::new(self.host.as_ref(), self.clock.as_ref());
        store.create(project_path, name).map_err(FacadeError::from)
    }

    /// Validates and persists `project` to `project_path`.
    ///
    /// # Errors
    ///
    /// Returns [`FacadeError`] if validation or serialization fails.
    pub fn save_project(&self, project_path: &Path, project: &mut Project) -> Result<(), FacadeError> {
        let store = ProjectStore::new(self.host.as_ref(), self.clock.as_ref());
        store.save(project_path, project).map_err(FacadeError::from)
    }

    /// Runs the whole graph at `project_path` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`FacadeError`] if the project cannot be opened, credit
    /// preflight is denied, or the graph fails to compile. Node execution
    /// failures are recorded in the returned [`RunSummary`], not raised here.
    pub async fn run(&self, project_path: &Path) -> Result<RunSummary, FacadeError> {
        self.runtime.run(project_path, &[], &[]).await.map_err(FacadeError::from)
    }

    /// Runs `project_path` scoped to `entry_node_ids`: their downstream
    /// closure plus the minimum upstream set required to feed it (§4.7).
    /// `force_node_ids` names nodes that bypass an otherwise-matching cache
    /// entry for this run only (e.g. an editor's explicit "re-run this node"
    /// action); pass an empty slice for ordinary cache-aware runs.
    ///
    /// # Errors
    ///
    /// Same as [`Facade::run`], plus failure if a scoped entry does not
    /// resolve against the project.
    pub async fn run_scoped(
        &self,
        project_path: &Path,
        entry_node_ids: &[NodeId],
        force_node_ids: &[NodeId],
    ) -> Result<RunSummary, FacadeError> {
        self.runtime
            .run(project_path, entry_node_ids, force_node_ids)
            .await
            .map_err(FacadeError::from)
    }

    /// Lists the project's run summaries, newest first, as retained after
    /// retention pruning (§4.9).
    #[must_use]
    pub fn recent_runs(&self, project_path: &Path) -> Vec<RunSummary> {
        let assets_root = assets_root_for(project_path);
        studio_store::recent_runs(self.host.as_ref(), &assets_root)
    }

    /// Appends a new, user-granted permission grant to `project_path`'s
    /// sibling policy document and persists it. Only the Facade may add
    /// grants; the Runtime never mutates the policy it is handed (§3).
    ///
    /// # Errors
    ///
    /// Returns [`FacadeError`] if the project or policy document cannot be
    /// opened or the updated policy cannot be written.
    pub fn add_grant(
        &self,
        project_path: &Path,
        capability: Capability,
        scope: GrantScope,
    ) -> Result<PermissionPolicy, FacadeError> {
        let store = ProjectStore::new(self.host.as_ref(), self.clock.as_ref());
        let (project, mut policy) = store.open(project_path)?;
        let policy_path = project_path
            .parent()
            .map(|parent| parent.join(&project.permissions_ref.policy_path))
            .unwrap_or_else(|| std::path::PathBuf::from(&project.permissions_ref.policy_path));

        policy.grants.push(Grant {
            id: GrantId::new(random_id("grant")),
            capability,
            scope,
            granted_at: self.clock.now_iso8601(),
            granted_by_user: true,
        });

        store.save_policy(&policy_path, &mut policy).map_err(FacadeError::Store)?;
        Ok(policy)
    }
}
