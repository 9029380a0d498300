// studio-cli/src/main.rs
// ============================================================================
// Module: Studio CLI Entry Point
// Description: Command dispatcher exercising the Service Facade end to end.
// Purpose: Give a host a minimal, scriptable way to create a project, wire
//          up a graph by hand, run it (whole or scoped), inspect recent
//          runs, and grant capabilities — without a graph editor UI.
// Dependencies: clap, studio-core, studio-runtime, studio-store, tokio.
// ============================================================================

//! ## Overview
//! `studio-cli` is a thin binary wrapper around
//! [`studio_runtime::Facade`]. It owns no state of its own beyond the
//! project file path a command is pointed at: every subcommand opens (or
//! creates) the project, calls exactly one Facade entry point, and prints
//! the result as JSON. This is not part of the Studio core; it exists so the
//! runtime can be driven from a terminal without a graph editor UI.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod config;
#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use serde_json::json;
use studio_core::core::host::HostEnvironment;
use studio_core::core::identifiers::EdgeId;
use studio_core::core::identifiers::NodeId;
use studio_core::core::identifiers::NodeKind;
use studio_core::core::identifiers::PortId;
use studio_core::core::policy::Capability;
use studio_core::core::policy::GrantScope;
use studio_core::core::project::Edge;
use studio_core::core::project::NodeInstance;
use studio_core::core::project::Position;
use studio_runtime::Facade;
use studio_store::FsHostEnvironment;
use studio_store::SystemClock;
use thiserror::Error;

use crate::config::CliConfig;
use crate::config::ConfigError;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "studio-cli", disable_help_subcommand = true)]
struct Cli {
    /// Optional TOML file overriding the default remote adapter endpoints.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands, one per Service Facade entry point plus the
/// minimal graph-authoring commands an editor-less host needs.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Creates a brand-new project document and sibling policy file.
    New(NewCommand),
    /// Opens a project and prints its graph and policy as JSON.
    Show(ProjectPathArgs),
    /// Lists the built-in node kinds available to wire into a graph.
    NodeKinds,
    /// Adds a node instance to a project's graph.
    AddNode(AddNodeCommand),
    /// Adds an edge between two node ports in a project's graph.
    AddEdge(AddEdgeCommand),
    /// Runs a project's whole graph to completion.
    Run(RunCommand),
    /// Lists a project's retained run summaries, newest first.
    Runs(ProjectPathArgs),
    /// Appends a permission grant to a project's policy document.
    Grant(GrantCommand),
}

/// Shared positional argument: the path to a project document.
#[derive(clap::Args, Debug)]
struct ProjectPathArgs {
    /// Path to the `studio.project.v1` document.
    project: PathBuf,
}

/// Arguments for [`Commands::New`].
#[derive(clap::Args, Debug)]
struct NewCommand {
    /// Path to create the project document at.
    project: PathBuf,
    /// Display name for the new project.
    #[arg(long, default_value = "Untitled Studio Project")]
    name: String,
}

/// Arguments for [`Commands::AddNode`].
#[derive(clap::Args, Debug)]
struct AddNodeCommand {
    /// Path to the project document to edit.
    project: PathBuf,
    /// Unique node ID within the project.
    #[arg(long)]
    id: String,
    /// Node kind string (see `node-kinds` for the built-in catalog).
    #[arg(long)]
    kind: String,
    /// Definition version to bind this instance to.
    #[arg(long, default_value_t = 1)]
    version: u32,
    /// Display title; defaults to the node ID.
    #[arg(long)]
    title: Option<String>,
    /// JSON object literal for the node's config.
    #[arg(long, default_value = "{}")]
    config: String,
    /// Editor canvas X position.
    #[arg(long, default_value_t = 0.0)]
    x: f64,
    /// Editor canvas Y position.
    #[arg(long, default_value_t = 0.0)]
    y: f64,
    /// Treat a failure of this node as an empty-output success.
    #[arg(long)]
    continue_on_error: bool,
    /// Mark this node a zero-cost passthrough, skipped by the scheduler.
    #[arg(long)]
    disabled: bool,
}

/// Arguments for [`Commands::AddEdge`].
#[derive(clap::Args, Debug)]
struct AddEdgeCommand {
    /// Path to the project document to edit.
    project: PathBuf,
    /// Unique edge ID within the project.
    #[arg(long)]
    id: String,
    /// Source node ID.
    #[arg(long)]
    from: String,
    /// Source output port ID.
    #[arg(long = "from-port")]
    from_port: String,
    /// Target node ID.
    #[arg(long)]
    to: String,
    /// Target input port ID.
    #[arg(long = "to-port")]
    to_port: String,
}

/// Arguments for [`Commands::Run`].
#[derive(clap::Args, Debug)]
struct RunCommand {
    /// Path to the project document to run.
    project: PathBuf,
    /// Scope the run to these entry node IDs' downstream closure plus
    /// required upstream (§4.7); omit to run the whole graph.
    #[arg(long = "scope")]
    scope: Vec<String>,
    /// Force these node IDs to bypass an otherwise-matching cache entry for
    /// this run only, even if their fingerprint is unchanged.
    #[arg(long = "force")]
    force: Vec<String>,
}

/// Arguments for [`Commands::Grant`].
#[derive(clap::Args, Debug)]
struct GrantCommand {
    /// Path to the project document whose policy is being granted.
    project: PathBuf,
    /// The capability this grant authorizes.
    #[arg(long, value_enum)]
    capability: CapabilityArg,
    /// Allowed values for the capability's scope (paths, CLI glob patterns,
    /// or domains, depending on `--capability`); `*` allows anything.
    #[arg(long = "value", required = true)]
    values: Vec<String>,
}

/// CLI-facing mirror of [`Capability`], since `clap::ValueEnum` cannot be
/// derived on a type from another crate.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CapabilityArg {
    /// Filesystem path access.
    Filesystem,
    /// CLI subprocess invocation.
    Cli,
    /// Outbound network access.
    Network,
}

impl From<CapabilityArg> for Capability {
    fn from(value: CapabilityArg) -> Self {
        match value {
            CapabilityArg::Filesystem => Self::Filesystem,
            CapabilityArg::Cli => Self::Cli,
            CapabilityArg::Network => Self::Network,
        }
    }
}

/// Errors surfaced by the CLI's command dispatch, wrapping every fallible
/// layer (config loading, project I/O, Facade orchestration) behind one
/// reportable type.
#[derive(Debug, Error)]
enum CliError {
    /// The config file could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A Facade entry point failed.
    #[error(transparent)]
    Facade(#[from] studio_runtime::FacadeError),
    /// A `--config` JSON literal (node config) was not valid JSON.
    #[error("invalid JSON for --config: {0}")]
    InvalidNodeConfigJson(serde_json::Error),
    /// The requested node kind is not in the built-in registry.
    #[error("unknown node kind {0}; see `studio-cli node-kinds`")]
    UnknownNodeKind(String),
}

/// Shorthand for a command handler's result type.
type CliResult<T> = Result<T, CliError>;

/// Parses arguments, dispatches the selected subcommand, and maps any
/// error to a non-zero exit code with a message on stderr.
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Loads config, builds the Facade, and runs the parsed subcommand.
async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;
    let facade = build_facade(config);

    match cli.command {
        Commands::New(cmd) => command_new(&facade, &cmd),
        Commands::Show(args) => command_show(&facade, &args.project),
        Commands::NodeKinds => command_node_kinds(&facade),
        Commands::AddNode(cmd) => command_add_node(&facade, &cmd),
        Commands::AddEdge(cmd) => command_add_edge(&facade, &cmd),
        Commands::Run(cmd) => command_run(&facade, &cmd).await,
        Commands::Runs(args) => command_runs(&facade, &args.project),
        Commands::Grant(cmd) => command_grant(&facade, &cmd),
    }
}

/// Builds a [`Facade`] rooted at the current directory, using the real
/// filesystem host, the system wall clock, and a single shared HTTP client.
fn build_facade(config: CliConfig) -> Facade {
    let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let host: Arc<dyn HostEnvironment> = Arc::new(FsHostEnvironment::new(base_dir));
    Facade::new(
        host,
        Arc::new(SystemClock),
        reqwest::Client::new(),
        config.into_adapter_endpoints(),
    )
}

/// Handles `studio-cli new`: creates the project document and policy.
fn command_new(facade: &Facade, cmd: &NewCommand) -> CliResult<()> {
    let (project, _policy) = facade.create_project(&cmd.project, cmd.name.clone())?;
    print_json(&json!({ "projectId": project.project_id, "path": cmd.project }))
}

/// Handles `studio-cli show`: prints a project's graph and policy.
fn command_show(facade: &Facade, project_path: &Path) -> CliResult<()> {
    let (project, policy) = facade.open_project(project_path)?;
    print_json(&json!({ "project": project, "policy": policy }))
}

/// Handles `studio-cli node-kinds`: lists the registered node definitions.
fn command_node_kinds(facade: &Facade) -> CliResult<()> {
    let kinds: Vec<serde_json::Value> = facade
        .registry()
        .iter()
        .map(|def| {
            json!({
                "kind": def.kind,
                "version": def.version,
                "capabilityClass": def.capability_class,
                "cachePolicy": def.cache_policy,
                "inputPorts": def.input_ports,
                "outputPorts": def.output_ports,
                "isVisualOnly": def.is_visual_only,
            })
        })
        .collect();
    print_json(&json!({ "nodeKinds": kinds }))
}

/// Handles `studio-cli add-node`: appends a node instance to the graph.
fn command_add_node(facade: &Facade, cmd: &AddNodeCommand) -> CliResult<()> {
    let kind = NodeKind::from(cmd.kind.as_str());
    if facade.registry().lookup(&kind, cmd.version).is_none() {
        return Err(CliError::UnknownNodeKind(cmd.kind.clone()));
    }
    let config: serde_json::Value =
        serde_json::from_str(&cmd.config).map_err(CliError::InvalidNodeConfigJson)?;

    let (mut project, _policy) = facade.open_project(&cmd.project)?;
    project.graph.nodes.push(NodeInstance {
        id: NodeId::from(cmd.id.as_str()),
        kind,
        version: cmd.version,
        title: cmd.title.clone().unwrap_or_else(|| cmd.id.clone()),
        position: Position { x: cmd.x, y: cmd.y },
        config,
        continue_on_error: cmd.continue_on_error,
        disabled: cmd.disabled,
    });
    project.graph.recompute_entry_node_ids();
    facade.save_project(&cmd.project, &mut project)?;
    print_json(&json!({ "added": cmd.id, "entryNodeIds": project.graph.entry_node_ids }))
}

/// Handles `studio-cli add-edge`: appends an edge between two node ports.
fn command_add_edge(facade: &Facade, cmd: &AddEdgeCommand) -> CliResult<()> {
    let (mut project, _policy) = facade.open_project(&cmd.project)?;
    project.graph.edges.push(Edge {
        id: EdgeId::from(cmd.id.as_str()),
        from_node_id: NodeId::from(cmd.from.as_str()),
        from_port_id: PortId::from(cmd.from_port.as_str()),
        to_node_id: NodeId::from(cmd.to.as_str()),
        to_port_id: PortId::from(cmd.to_port.as_str()),
    });
    project.graph.recompute_entry_node_ids();
    facade.save_project(&cmd.project, &mut project)?;
    print_json(&json!({ "added": cmd.id, "entryNodeIds": project.graph.entry_node_ids }))
}

/// Handles `studio-cli run`: runs the whole graph or a scoped subset.
async fn command_run(facade: &Facade, cmd: &RunCommand) -> CliResult<()> {
    let force: Vec<NodeId> = cmd.force.iter().map(|s| NodeId::from(s.as_str())).collect();
    let summary = if cmd.scope.is_empty() && force.is_empty() {
        facade.run(&cmd.project).await?
    } else {
        let entries: Vec<NodeId> = cmd.scope.iter().map(|s| NodeId::from(s.as_str())).collect();
        facade.run_scoped(&cmd.project, &entries, &force).await?
    };
    print_json(&summary)
}

/// Handles `studio-cli runs`: lists retained run summaries, newest first.
fn command_runs(facade: &Facade, project_path: &Path) -> CliResult<()> {
    let runs = facade.recent_runs(project_path);
    print_json(&json!({ "runs": runs }))
}

/// Handles `studio-cli grant`: appends a capability grant to the policy.
fn command_grant(facade: &Facade, cmd: &GrantCommand) -> CliResult<()> {
    let capability: Capability = cmd.capability.into();
    let scope = match capability {
        Capability::Filesystem => GrantScope {
            allowed_paths: Some(cmd.values.clone()),
            ..GrantScope::default()
        },
        Capability::Cli => GrantScope {
            allowed_command_patterns: Some(cmd.values.clone()),
            ..GrantScope::default()
        },
        Capability::Network => GrantScope {
            allowed_domains: Some(cmd.values.clone()),
            ..GrantScope::default()
        },
    };
    let policy = facade.add_grant(&cmd.project, capability, scope)?;
    print_json(&policy)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Serializes `value` as pretty JSON and writes it to stdout, followed by a
/// trailing newline. Uses `std::io::stdout()` directly rather than
/// `println!`, per the workspace's `print_stdout` lint.
fn print_json(value: &impl serde::Serialize) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string());
    let mut stdout = std::io::stdout();
    let _ = writeln!(&mut stdout, "{text}");
    Ok(())
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) {
    let mut stderr = std::io::stderr();
    let _ = writeln!(&mut stderr, "{message}");
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    write_stderr_line(message);
    ExitCode::FAILURE
}
