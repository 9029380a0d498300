// crates/studio-runtime/tests/run_lifecycle.rs
// ============================================================================
// Module: Run Lifecycle Tests
// Description: End-to-end exercises of the Facade/Runtime/Scheduler over a
//              real filesystem host: empty runs, cache hit/miss, cycle
//              rejection, permission denial, scoped closures, continue-on-
//              error, retention pruning, and fingerprint sensitivity.
// ============================================================================
//! ## Overview
//! Every test here drives a project through [`Facade`] exactly as a host
//! would, then inspects the run journal on disk to assert the events the
//! scheduler actually emitted. All fixtures stay network-free (`studio.value`
//! and `studio.local_cli_tool` only) so credit preflight never touches the
//! network and the crypto provider install is the only reqwest-adjacent cost.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::json;
use studio_adapters::AdapterEndpoints;
use studio_adapters::image::ImageEndpoints;
use studio_core::Edge;
use studio_core::EdgeId;
use studio_core::NodeId;
use studio_core::NodeInstance;
use studio_core::NodeKind;
use studio_core::PortId;
use studio_core::Position;
use studio_core::RunStatus;
use studio_runtime::Facade;
use studio_runtime::FacadeError;
use studio_runtime::RuntimeError;
use studio_runtime::assets_root_for;
use studio_store::Clock;
use studio_store::FsHostEnvironment;

// ============================================================================
// SECTION: Test Helpers
// ============================================================================

/// A clock that advances by one second on every call, so fixtures needing
/// distinct `startedAt` timestamps (retention ordering) don't collide the
/// way a [`studio_store::FixedClock`] would.
struct TickingClock(Mutex<u64>);

impl TickingClock {
    fn new() -> Self {
        Self(Mutex::new(0))
    }
}

impl Clock for TickingClock {
    fn now_iso8601(&self) -> String {
        let mut ticks = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let stamp = format!("2026-01-01T00:{:02}:{:02}Z", (*ticks / 60) % 60, *ticks % 60);
        *ticks += 1;
        stamp
    }
}

fn endpoints() -> AdapterEndpoints {
    AdapterEndpoints {
        turns_url: "https://example.invalid/turns".to_string(),
        image: ImageEndpoints {
            prepare_uploads_url: "https://example.invalid/images/prepare".to_string(),
            create_job_url: "https://example.invalid/images/create".to_string(),
            poll_job_url_template: "https://example.invalid/images/{job_id}".to_string(),
        },
        transcribe_url: "https://example.invalid/transcribe".to_string(),
        credits_url: "https://example.invalid/credits".to_string(),
    }
}

fn facade(host: Arc<dyn studio_core::HostEnvironment>, clock: Arc<dyn Clock>) -> Facade {
    Facade::new(host, clock, reqwest::Client::new(), endpoints())
}

fn value_node(id: &str, seed: serde_json::Value) -> NodeInstance {
    NodeInstance {
        id: NodeId::from(id),
        kind: NodeKind::from("studio.value"),
        version: 1,
        title: id.to_string(),
        position: Position { x: 0.0, y: 0.0 },
        config: json!({ "__studio_seed_value": seed }),
        continue_on_error: false,
        disabled: false,
    }
}

fn cli_node(id: &str, command: &str, continue_on_error: bool) -> NodeInstance {
    NodeInstance {
        id: NodeId::from(id),
        kind: NodeKind::from("studio.local_cli_tool"),
        version: 1,
        title: id.to_string(),
        position: Position { x: 0.0, y: 0.0 },
        config: json!({ "command": command, "args": [], "workingDir": "." }),
        continue_on_error,
        disabled: false,
    }
}

fn edge(id: &str, from: &str, from_port: &str, to: &str, to_port: &str) -> Edge {
    Edge {
        id: EdgeId::from(id),
        from_node_id: NodeId::from(from),
        from_port_id: PortId::from(from_port),
        to_node_id: NodeId::from(to),
        to_port_id: PortId::from(to_port),
    }
}

fn events_text(project_path: &Path, run_id: &studio_core::RunId) -> String {
    let assets_root = assets_root_for(project_path);
    let events_path = assets_root.join("runs").join(run_id.as_str()).join("events.ndjson");
    std::fs::read_to_string(events_path).expect("read events.ndjson")
}

fn event_lines(text: &str, event_type: &str) -> Vec<serde_json::Value> {
    text.lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).expect("parse event line"))
        .filter(|value| value["type"] == event_type)
        .collect()
}

/// Grants full filesystem and CLI access so `studio.local_cli_tool` fixtures
/// can run without a dedicated permission-denial assertion getting in the way.
fn grant_everything(facade: &Facade, project_path: &Path) {
    facade
        .add_grant(
            project_path,
            studio_core::Capability::Filesystem,
            studio_core::GrantScope {
                allowed_paths: Some(vec!["*".to_string()]),
                allowed_command_patterns: None,
                allowed_domains: None,
            },
        )
        .expect("grant filesystem");
    facade
        .add_grant(
            project_path,
            studio_core::Capability::Cli,
            studio_core::GrantScope {
                allowed_paths: None,
                allowed_command_patterns: Some(vec!["*".to_string()]),
                allowed_domains: None,
            },
        )
        .expect("grant cli");
}

// ============================================================================
// SECTION: S1 — Empty Project
// ============================================================================

#[tokio::test]
async fn s1_empty_project_runs_cleanly() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host: Arc<dyn studio_core::HostEnvironment> = Arc::new(FsHostEnvironment::new(dir.path()));
    let clock: Arc<dyn Clock> = Arc::new(TickingClock::new());
    let facade = facade(host, clock);
    let project_path = dir.path().join("project.json");
    facade.create_project(&project_path, "Empty").expect("create");

    let summary = facade.run(&project_path).await.expect("run");
    assert_eq!(summary.status, RunStatus::Success);
    assert!(summary.executed_node_ids.is_empty());
    assert!(summary.cached_node_ids.is_empty());

    let text = events_text(&project_path, &summary.run_id);
    assert_eq!(event_lines(&text, "run.started").len(), 1);
    assert_eq!(event_lines(&text, "run.completed").len(), 1);
}

// ============================================================================
// SECTION: S2 — Single Node Cache Hit/Miss
// ============================================================================

#[tokio::test]
async fn s2_a_repeat_run_serves_the_cache_and_does_not_re_execute() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host: Arc<dyn studio_core::HostEnvironment> = Arc::new(FsHostEnvironment::new(dir.path()));
    let clock: Arc<dyn Clock> = Arc::new(TickingClock::new());
    let facade = facade(host, clock);
    let project_path = dir.path().join("project.json");
    let (mut project, _policy) = facade.create_project(&project_path, "Single").expect("create");

    project.graph.nodes.push(value_node("seed", json!("hello")));
    project.graph.recompute_entry_node_ids();
    facade.save_project(&project_path, &mut project).expect("save");

    let first = facade.run(&project_path).await.expect("first run");
    assert_eq!(first.status, RunStatus::Success);
    assert_eq!(first.executed_node_ids, vec![NodeId::from("seed")]);
    assert!(first.cached_node_ids.is_empty());

    let second = facade.run(&project_path).await.expect("second run");
    assert_eq!(second.status, RunStatus::Success);
    assert!(second.executed_node_ids.is_empty());
    assert_eq!(second.cached_node_ids, vec![NodeId::from("seed")]);

    let text = events_text(&project_path, &second.run_id);
    assert_eq!(event_lines(&text, "node.cache_hit").len(), 1);
}

// ============================================================================
// SECTION: S3 — Cycle Detection
// ============================================================================

#[tokio::test]
async fn s3_a_cycle_fails_compilation_before_any_run_directory_exists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host: Arc<dyn studio_core::HostEnvironment> = Arc::new(FsHostEnvironment::new(dir.path()));
    let clock: Arc<dyn Clock> = Arc::new(TickingClock::new());
    let facade = facade(host, clock);
    let project_path = dir.path().join("project.json");
    let (mut project, _policy) = facade.create_project(&project_path, "Cycle").expect("create");

    project.graph.nodes.push(cli_node("a", "echo", false));
    project.graph.nodes.push(cli_node("b", "echo", false));
    project.graph.edges.push(edge("e1", "a", "stdout", "b", "input"));
    project.graph.edges.push(edge("e2", "b", "stdout", "a", "input"));
    project.graph.recompute_entry_node_ids();
    facade.save_project(&project_path, &mut project).expect("save");
    grant_everything(&facade, &project_path);

    let err = facade.run(&project_path).await.expect_err("cycle must fail");
    assert!(matches!(
        err,
        FacadeError::Runtime(RuntimeError::Compile(studio_core::CompileError::GraphCycleDetected))
    ));

    let assets_root = assets_root_for(&project_path);
    let runs_dir = assets_root.join("runs");
    assert!(!runs_dir.exists() || std::fs::read_dir(&runs_dir).expect("read_dir").next().is_none());
}

// ============================================================================
// SECTION: S4 — Permission Denial
// ============================================================================

#[tokio::test]
async fn s4_a_cli_node_with_no_grants_fails_the_run_without_panicking() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host: Arc<dyn studio_core::HostEnvironment> = Arc::new(FsHostEnvironment::new(dir.path()));
    let clock: Arc<dyn Clock> = Arc::new(TickingClock::new());
    let facade = facade(host, clock);
    let project_path = dir.path().join("project.json");
    let (mut project, _policy) = facade.create_project(&project_path, "Denied").expect("create");

    project.graph.nodes.push(cli_node("tool", "echo", false));
    project.graph.recompute_entry_node_ids();
    facade.save_project(&project_path, &mut project).expect("save");

    let summary = facade.run(&project_path).await.expect("run completes with a failed status");
    assert_eq!(summary.status, RunStatus::Failed);
    let error = summary.error.expect("error message");
    assert!(error.contains("permission denied"), "unexpected error: {error}");
    assert!(error.contains("cli"), "unexpected error: {error}");

    let text = events_text(&project_path, &summary.run_id);
    assert_eq!(event_lines(&text, "node.failed").len(), 1);
    assert_eq!(event_lines(&text, "run.failed").len(), 1);
}

// ============================================================================
// SECTION: S5 — Scoped Run Closure
// ============================================================================

#[tokio::test]
async fn s5_a_scoped_run_executes_only_the_required_closure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host: Arc<dyn studio_core::HostEnvironment> = Arc::new(FsHostEnvironment::new(dir.path()));
    let clock: Arc<dyn Clock> = Arc::new(TickingClock::new());
    let facade = facade(host, clock);
    let project_path = dir.path().join("project.json");
    let (mut project, _policy) = facade.create_project(&project_path, "Scoped").expect("create");

    // a -> b -> c -> d, plus an unrelated branch a -> x.
    project.graph.nodes.push(value_node("a", json!("seed")));
    project.graph.nodes.push(cli_node("b", "echo", false));
    project.graph.nodes.push(cli_node("c", "echo", false));
    project.graph.nodes.push(cli_node("d", "echo", false));
    project.graph.nodes.push(cli_node("x", "echo", false));
    project.graph.edges.push(edge("e_ab", "a", "value", "b", "input"));
    project.graph.edges.push(edge("e_bc", "b", "stdout", "c", "input"));
    project.graph.edges.push(edge("e_cd", "c", "stdout", "d", "input"));
    project.graph.edges.push(edge("e_ax", "a", "value", "x", "input"));
    project.graph.recompute_entry_node_ids();
    facade.save_project(&project_path, &mut project).expect("save");
    grant_everything(&facade, &project_path);

    let entries = vec![NodeId::from("c")];
    let summary = facade
        .run_scoped(&project_path, &entries, &[])
        .await
        .expect("scoped run");

    assert_eq!(summary.status, RunStatus::Success);
    let mut executed: Vec<String> = summary.executed_node_ids.iter().map(ToString::to_string).collect();
    executed.sort();
    assert_eq!(executed, vec!["a", "b", "c", "d"]);
}

// ============================================================================
// SECTION: Invariant 2 — Fingerprint Sensitivity
// ============================================================================

#[tokio::test]
async fn config_changes_force_re_execution_but_cosmetic_unrelated_edits_to_other_nodes_do_not() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host: Arc<dyn studio_core::HostEnvironment> = Arc::new(FsHostEnvironment::new(dir.path()));
    let clock: Arc<dyn Clock> = Arc::new(TickingClock::new());
    let facade = facade(host, clock);
    let project_path = dir.path().join("project.json");
    let (mut project, _policy) = facade.create_project(&project_path, "Fingerprint").expect("create");

    project.graph.nodes.push(value_node("seed", json!("first")));
    project.graph.recompute_entry_node_ids();
    facade.save_project(&project_path, &mut project).expect("save");
    facade.run(&project_path).await.expect("first run");

    // Editing the node's position (carried for round-tripping only, never
    // read by the fingerprint) must not force re-execution.
    let (mut project, _policy) = facade.open_project(&project_path).expect("reopen");
    project.graph.nodes[0].position = Position { x: 42.0, y: 7.0 };
    facade.save_project(&project_path, &mut project).expect("save");
    let cosmetic_run = facade.run(&project_path).await.expect("cosmetic run");
    assert!(cosmetic_run.executed_node_ids.is_empty());
    assert_eq!(cosmetic_run.cached_node_ids, vec![NodeId::from("seed")]);

    // Editing the literal config value must force re-execution.
    let (mut project, _policy) = facade.open_project(&project_path).expect("reopen");
    project.graph.nodes[0].config = json!({ "__studio_seed_value": "second" });
    facade.save_project(&project_path, &mut project).expect("save");
    let changed_run = facade.run(&project_path).await.expect("changed run");
    assert_eq!(changed_run.executed_node_ids, vec![NodeId::from("seed")]);
    assert!(changed_run.cached_node_ids.is_empty());
}

// ============================================================================
// SECTION: Invariant 8 — Retention Pruning
// ============================================================================

#[tokio::test]
async fn retention_prunes_the_run_index_to_max_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host: Arc<dyn studio_core::HostEnvironment> = Arc::new(FsHostEnvironment::new(dir.path()));
    let clock: Arc<dyn Clock> = Arc::new(TickingClock::new());
    let facade = facade(host, clock);
    let project_path = dir.path().join("project.json");
    let (mut project, _policy) = facade.create_project(&project_path, "Retained").expect("create");
    project.settings.retention.max_runs = 2;
    project.graph.nodes.push(value_node("seed", json!("v")));
    project.graph.recompute_entry_node_ids();
    facade.save_project(&project_path, &mut project).expect("save");

    let mut run_ids = Vec::new();
    for _ in 0..3 {
        let summary = facade.run(&project_path).await.expect("run");
        run_ids.push(summary.run_id);
    }

    let recent = facade.recent_runs(&project_path);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].run_id, run_ids[2]);
    assert_eq!(recent[1].run_id, run_ids[1]);

    let assets_root = assets_root_for(&project_path);
    assert!(!assets_root.join("runs").join(run_ids[0].as_str()).exists());
}

// ============================================================================
// SECTION: Invariant 9 — Continue-On-Error
// ============================================================================

#[tokio::test]
async fn continue_on_error_lets_dependents_run_with_empty_inputs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host: Arc<dyn studio_core::HostEnvironment> = Arc::new(FsHostEnvironment::new(dir.path()));
    let clock: Arc<dyn Clock> = Arc::new(TickingClock::new());
    let facade = facade(host, clock);
    let project_path = dir.path().join("project.json");
    let (mut project, _policy) = facade.create_project(&project_path, "Continue").expect("create");

    // `failing` is permission-granted but names a binary that cannot spawn,
    // so its executor genuinely errors; `continueOnError` swallows that into
    // an empty-output success and `after` still runs off the empty input.
    project.graph.nodes.push(cli_node("failing", "studio-test-nonexistent-binary", true));
    project.graph.nodes.push(cli_node("after", "echo", false));
    project
        .graph
        .edges
        .push(edge("e1", "failing", "stdout", "after", "input"));
    project.graph.recompute_entry_node_ids();
    facade.save_project(&project_path, &mut project).expect("save");
    grant_everything(&facade, &project_path);

    let summary = facade.run(&project_path).await.expect("run");
    assert_eq!(summary.status, RunStatus::Success);
    assert!(summary.executed_node_ids.contains(&NodeId::from("failing")));
    assert!(summary.executed_node_ids.contains(&NodeId::from("after")));

    let text = events_text(&project_path, &summary.run_id);
    assert_eq!(event_lines(&text, "node.failed").len(), 1);
    assert_eq!(event_lines(&text, "node.output").len(), 2);
}

// ============================================================================
// SECTION: Invariant 10 — Cancellation On Fatal Failure
// ============================================================================

#[tokio::test]
async fn a_fatal_node_failure_aborts_downstream_nodes_that_never_started() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host: Arc<dyn studio_core::HostEnvironment> = Arc::new(FsHostEnvironment::new(dir.path()));
    let clock: Arc<dyn Clock> = Arc::new(TickingClock::new());
    let facade = facade(host, clock);
    let project_path = dir.path().join("project.json");
    let (mut project, _policy) = facade.create_project(&project_path, "Fatal").expect("create");

    // No grants: `tool` fails fatally (continueOnError=false). `downstream`
    // depends on it and must never be started.
    project.graph.nodes.push(cli_node("tool", "echo", false));
    project.graph.nodes.push(cli_node("downstream", "echo", false));
    project
        .graph
        .edges
        .push(edge("e1", "tool", "stdout", "downstream", "input"));
    project.graph.recompute_entry_node_ids();
    facade.save_project(&project_path, &mut project).expect("save");

    let summary = facade.run(&project_path).await.expect("run completes with failed status");
    assert_eq!(summary.status, RunStatus::Failed);

    let text = events_text(&project_path, &summary.run_id);
    // Only `tool` ever starts; `downstream`'s dependency counter never
    // settles once `tool` completes fatally, so it is never dispatched.
    let started_ids: Vec<String> = event_lines(&text, "node.started")
        .iter()
        .map(|event| event["nodeId"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(started_ids, vec!["tool"]);

    let failed_ids: Vec<String> = event_lines(&text, "node.failed")
        .iter()
        .map(|event| event["nodeId"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(failed_ids, vec!["tool"]);
}

// ============================================================================
// SECTION: Force-Listed Cache Bypass
// ============================================================================

#[tokio::test]
async fn force_node_ids_bypasses_an_otherwise_matching_cache_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let host: Arc<dyn studio_core::HostEnvironment> = Arc::new(FsHostEnvironment::new(dir.path()));
    let clock: Arc<dyn Clock> = Arc::new(TickingClock::new());
    let facade = facade(host, clock);
    let project_path = dir.path().join("project.json");
    let (mut project, _policy) = facade.create_project(&project_path, "Forced").expect("create");

    project.graph.nodes.push(value_node("seed", json!("same")));
    project.graph.recompute_entry_node_ids();
    facade.save_project(&project_path, &mut project).expect("save");

    facade.run(&project_path).await.expect("first run");

    let plain = facade.run(&project_path).await.expect("second run");
    assert!(plain.executed_node_ids.is_empty());
    assert_eq!(plain.cached_node_ids, vec![NodeId::from("seed")]);

    let forced = facade
        .run_scoped(&project_path, &[], &[NodeId::from("seed")])
        .await
        .expect("forced run");
    assert_eq!(forced.executed_node_ids, vec![NodeId::from("seed")]);
    assert!(forced.cached_node_ids.is_empty());
}

