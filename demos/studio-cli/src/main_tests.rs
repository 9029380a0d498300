// studio-cli/src/main_tests.rs
// ============================================================================
// Module: Studio CLI Integration Tests
// Description: Exercises command handlers against a real temp-directory
//              project, end to end through the Service Facade.
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::sync::Arc;

use serde_json::json;
use studio_core::RunStatus;
use studio_core::core::host::HostEnvironment;
use studio_core::core::identifiers::NodeId;
use studio_runtime::Facade;
use studio_store::FsHostEnvironment;
use studio_store::SystemClock;

use super::*;

fn facade_in(dir: &std::path::Path) -> Facade {
    let host: Arc<dyn HostEnvironment> = Arc::new(FsHostEnvironment::new(dir));
    Facade::new(
        host,
        Arc::new(SystemClock),
        reqwest::Client::new(),
        CliConfig::default().into_adapter_endpoints(),
    )
}

#[test]
fn node_kinds_lists_the_seven_built_ins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let facade = facade_in(dir.path());
    let kinds: Vec<_> = facade.registry().iter().map(|d| d.kind.to_string()).collect();
    assert!(kinds.iter().any(|k| k == "studio.value"));
    assert_eq!(kinds.len(), 7);
}

#[tokio::test]
async fn create_add_node_and_run_round_trips_to_a_successful_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let project_path = dir.path().join("demo.studio.json");
    let facade = facade_in(dir.path());

    facade
        .create_project(&project_path, "Demo")
        .expect("create project");

    let cmd = AddNodeCommand {
        project: project_path.clone(),
        id: "seed".to_string(),
        kind: "studio.value".to_string(),
        version: 1,
        title: None,
        config: json!({ "__studio_seed_value": "hello" }).to_string(),
        x: 0.0,
        y: 0.0,
        continue_on_error: false,
        disabled: false,
    };
    command_add_node(&facade, &cmd).expect("add node");

    let summary = facade.run(&project_path).await.expect("run");
    assert_eq!(summary.status, RunStatus::Success);
    assert!(summary.executed_node_ids.contains(&NodeId::from("seed")));

    let runs = facade.recent_runs(&project_path);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, summary.run_id);
}

#[test]
fn add_node_rejects_an_unknown_kind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let project_path = dir.path().join("demo.studio.json");
    let facade = facade_in(dir.path());
    facade
        .create_project(&project_path, "Demo")
        .expect("create project");

    let cmd = AddNodeCommand {
        project: project_path,
        id: "seed".to_string(),
        kind: "studio.not_a_real_kind".to_string(),
        version: 1,
        title: None,
        config: "{}".to_string(),
        x: 0.0,
        y: 0.0,
        continue_on_error: false,
        disabled: false,
    };
    let err = command_add_node(&facade, &cmd).expect_err("should reject unknown kind");
    assert!(matches!(err, CliError::UnknownNodeKind(_)));
}

#[test]
fn grant_appends_a_filesystem_grant_with_the_requested_paths() {
    let dir = tempfile::tempdir().expect("tempdir");
    let project_path = dir.path().join("demo.studio.json");
    let facade = facade_in(dir.path());
    facade
        .create_project(&project_path, "Demo")
        .expect("create project");

    let cmd = GrantCommand {
        project: project_path,
        capability: CapabilityArg::Filesystem,
        values: vec!["/tmp/allowed".to_string()],
    };
    let policy = {
        let capability: studio_core::Capability = cmd.capability.into();
        let scope = studio_core::GrantScope {
            allowed_paths: Some(cmd.values.clone()),
            ..studio_core::GrantScope::default()
        };
        facade
            .add_grant(&cmd.project, capability, scope)
            .expect("add grant")
    };
    assert_eq!(policy.grants.len(), 1);
    assert_eq!(
        policy.grants[0].scope.allowed_paths,
        Some(vec!["/tmp/allowed".to_string()])
    );
}

#[test]
fn add_edge_recomputes_entry_node_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let project_path = dir.path().join("demo.studio.json");
    let facade = facade_in(dir.path());
    facade
        .create_project(&project_path, "Demo")
        .expect("create project");

    for (id, kind) in [("a", "studio.value"), ("b", "studio.value")] {
        command_add_node(
            &facade,
            &AddNodeCommand {
                project: project_path.clone(),
                id: id.to_string(),
                kind: kind.to_string(),
                version: 1,
                title: None,
                config: "{}".to_string(),
                x: 0.0,
                y: 0.0,
                continue_on_error: false,
                disabled: false,
            },
        )
        .expect("add node");
    }

    command_add_edge(
        &facade,
        &AddEdgeCommand {
            project: project_path.clone(),
            id: "e1".to_string(),
            from: "a".to_string(),
            from_port: "value".to_string(),
            to: "b".to_string(),
            to_port: "value".to_string(),
        },
    )
    .expect("add edge");

    let (project, _policy) = facade.open_project(&project_path).expect("open");
    assert_eq!(project.graph.entry_node_ids, vec![NodeId::from("a")]);
}
