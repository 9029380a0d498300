// studio-core/src/core/compiler.rs
// ============================================================================
// Module: Studio Graph Compiler
// Description: Validates a Project's graph into an executable compiled plan.
// Purpose: Config validation, port typing, required-input checks, topo sort.
// Dependencies: crate::core::{project, registry, identifiers}
// ============================================================================

//! ## Overview
//! The compiler runs a fixed, sequential validation order over a
//! [`Project`](crate::core::project::Project) and a
//! [`Registry`](crate::core::registry::Registry), producing a [`CompiledGraph`]
//! with a topological execution order. Every failure is fatal and identifies
//! the offending node or edge; the first error wins.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;

use thiserror::Error;

use crate::core::identifiers::EdgeId;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::PortId;
use crate::core::project::Project;
use crate::core::registry::NodeDefinition;
use crate::core::registry::PortSpec;
use crate::core::registry::Registry;

/// Errors raised compiling a project's graph. All are fatal: no run directory
/// is created when compilation fails.
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    /// Two nodes in the graph share the same ID.
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),
    /// A node's `(kind, version)` has no registered definition.
    #[error("unknown node kind for node {node_id}: {kind}@{version}")]
    UnknownNodeKind {
        /// The node carrying the unresolvable kind.
        node_id: String,
        /// The unresolved kind string.
        kind: String,
        /// The unresolved version.
        version: u32,
    },
    /// A node's config failed schema validation.
    #[error("invalid config for node {node_id}, field {field}: {reason}")]
    InvalidNodeConfig {
        /// The offending node.
        node_id: String,
        /// The offending config field key.
        field: String,
        /// Human-readable reason.
        reason: String,
    },
    /// An edge is malformed or its endpoints do not resolve.
    #[error("invalid edge {edge_id}: {reason}")]
    InvalidEdge {
        /// The offending edge.
        edge_id: String,
        /// Human-readable reason.
        reason: String,
    },
    /// An edge connects ports with incompatible type tags.
    #[error("port type mismatch on edge {edge_id}: {from} -> {to}")]
    PortTypeMismatch {
        /// The offending edge.
        edge_id: String,
        /// The source port's type tag.
        from: String,
        /// The target port's type tag.
        to: String,
    },
    /// A required input port has no inbound edge.
    #[error("missing required input on node {node_id}, port {port_id}")]
    MissingRequiredInput {
        /// The offending node.
        node_id: String,
        /// The unfed required port.
        port_id: String,
    },
    /// The graph contains a cycle.
    #[error("graph cycle detected")]
    GraphCycleDetected,
}

/// A node as resolved during compilation: its definition plus the edges and
/// dependency set bound to it in this graph.
#[derive(Clone)]
pub struct ResolvedNode {
    /// The node's registry definition.
    pub definition: NodeDefinition,
    /// Resolved input ports (static plus any dynamically resolved ones).
    pub input_ports: Vec<PortSpec>,
    /// Resolved output ports (static plus any dynamically resolved ones).
    pub output_ports: Vec<PortSpec>,
    /// Inbound edge IDs, in declaration order.
    pub inbound_edges: Vec<EdgeId>,
    /// Outbound edge IDs, in declaration order.
    pub outbound_edges: Vec<EdgeId>,
    /// Node IDs this node depends on (sources of inbound edges).
    pub dependencies: BTreeSet<NodeId>,
}

/// The output of a successful compile: a resolved node map and an executable
/// topological order.
pub struct CompiledGraph {
    /// Resolved nodes by ID, excluding visual-only nodes.
    pub nodes: BTreeMap<NodeId, ResolvedNode>,
    /// Topological execution order (ties broken by declaration order).
    pub order: Vec<NodeId>,
}

/// Compiles `project`'s graph against `registry`, running the full validation
/// order and producing a topologically ordered, dependency-resolved plan.
///
/// # Errors
///
/// Returns the first [`CompileError`] encountered, in the validation order
/// documented on [`CompileError`]'s variants.
pub fn compile(project: &Project, registry: &Registry) -> Result<CompiledGraph, CompileError> {
    ensure_unique_node_ids(project)?;

    let mut nodes: BTreeMap<NodeId, ResolvedNode> = BTreeMap::new();
    for instance in &project.graph.nodes {
        let definition = registry
            .lookup(&instance.kind, instance.version)
            .ok_or_else(|| CompileError::UnknownNodeKind {
                node_id: instance.id.to_string(),
                kind: instance.kind.to_string(),
                version: instance.version,
            })?
            .clone();
        if definition.is_visual_only {
            continue;
        }

        validate_config(instance, &definition)?;

        let (input_ports, output_ports) = definition
            .executor
            .resolve_ports(&instance.config, &definition)
            .map_err(|reason| CompileError::InvalidNodeConfig {
                node_id: instance.id.to_string(),
                field: "config".to_string(),
                reason,
            })?;

        nodes.insert(
            instance.id.clone(),
            ResolvedNode {
                definition,
                input_ports,
                output_ports,
                inbound_edges: Vec::new(),
                outbound_edges: Vec::new(),
                dependencies: BTreeSet::new(),
            },
        );
    }

    ensure_unique_edges(project)?;
    wire_edges(project, &mut nodes)?;

    let order = topological_sort(&nodes)?;

    Ok(CompiledGraph { nodes, order })
}

fn ensure_unique_node_ids(project: &Project) -> Result<(), CompileError> {
    let mut seen = BTreeSet::new();
    for node in &project.graph.nodes {
        if !seen.insert(&node.id) {
            return Err(CompileError::DuplicateNodeId(node.id.to_string()));
        }
    }
    Ok(())
}

fn validate_config(
    instance: &crate::core::project::NodeInstance,
    definition: &NodeDefinition,
) -> Result<(), CompileError> {
    let config = instance
        .config
        .as_object()
        .ok_or_else(|| CompileError::InvalidNodeConfig {
            node_id: instance.id.to_string(),
            field: "config".to_string(),
            reason: "config must be a JSON object".to_string(),
        })?;

    for field in &definition.config_schema {
        let Some(value) = config.get(&field.key) else {
            continue;
        };
        let ok = match &field.field_type {
            crate::core::registry::ConfigFieldType::String => value.is_string(),
            crate::core::registry::ConfigFieldType::Boolean => value.is_boolean(),
            crate::core::registry::ConfigFieldType::Json => true,
            crate::core::registry::ConfigFieldType::Number { min, max } => value
                .as_f64()
                .is_some_and(|n| min.is_none_or(|m| n >= m) && max.is_none_or(|m| n <= m)),
            crate::core::registry::ConfigFieldType::Enum { values } => {
                value.as_str().is_some_and(|s| values.iter().any(|v| v == s))
            }
        };
        if !ok {
            return Err(CompileError::InvalidNodeConfig {
                node_id: instance.id.to_string(),
                field: field.key.clone(),
                reason: "value does not satisfy field schema".to_string(),
            });
        }
    }
    Ok(())
}

fn ensure_unique_edges(project: &Project) -> Result<(), CompileError> {
    let mut seen_ids = BTreeSet::new();
    let mut seen_tuples = BTreeSet::new();
    for edge in &project.graph.edges {
        if !seen_ids.insert(&edge.id) {
            return Err(CompileError::InvalidEdge {
                edge_id: edge.id.to_string(),
                reason: "duplicate edge id".to_string(),
            });
        }
        if !seen_tuples.insert(edge.identity_tuple()) {
            return Err(CompileError::InvalidEdge {
                edge_id: edge.id.to_string(),
                reason: "duplicate edge endpoints".to_string(),
            });
        }
    }
    Ok(())
}

fn wire_edges(
    project: &Project,
    nodes: &mut BTreeMap<NodeId, ResolvedNode>,
) -> Result<(), CompileError> {
    for edge in &project.graph.edges {
        let Some(from_ports) = nodes.get(&edge.from_node_id).map(|n| n.output_ports.clone())
        else {
            // A node resolving to a visual-only definition is legal to
            // reference from the document but never wired into the compiled
            // graph; treat a dangling endpoint as an invalid edge.
            return Err(CompileError::InvalidEdge {
                edge_id: edge.id.to_string(),
                reason: format!("source node {} does not resolve", edge.from_node_id),
            });
        };
        let Some(to_ports) = nodes.get(&edge.to_node_id).map(|n| n.input_ports.clone()) else {
            return Err(CompileError::InvalidEdge {
                edge_id: edge.id.to_string(),
                reason: format!("target node {} does not resolve", edge.to_node_id),
            });
        };

        let from_port = find_port(&from_ports, &edge.from_port_id).ok_or_else(|| {
            CompileError::InvalidEdge {
                edge_id: edge.id.to_string(),
                reason: format!("source port {} does not exist", edge.from_port_id),
            }
        })?;
        let to_port =
            find_port(&to_ports, &edge.to_port_id).ok_or_else(|| CompileError::InvalidEdge {
                edge_id: edge.id.to_string(),
                reason: format!("target port {} does not exist", edge.to_port_id),
            })?;

        if !from_port.port_type.compatible_with(&to_port.port_type) {
            return Err(CompileError::PortTypeMismatch {
                edge_id: edge.id.to_string(),
                from: from_port.port_type.0.clone(),
                to: to_port.port_type.0.clone(),
            });
        }

        if let Some(source) = nodes.get_mut(&edge.from_node_id) {
            source.outbound_edges.push(edge.id.clone());
        }
        let from_node_id = edge.from_node_id.clone();
        if let Some(target) = nodes.get_mut(&edge.to_node_id) {
            target.inbound_edges.push(edge.id.clone());
            target.dependencies.insert(from_node_id);
        }
    }

    ensure_required_inputs(project, nodes)?;

    Ok(())
}

fn ensure_required_inputs(
    project: &Project,
    nodes: &BTreeMap<NodeId, ResolvedNode>,
) -> Result<(), CompileError> {
    for (node_id, resolved) in nodes {
        for port in &resolved.input_ports {
            if !port.required {
                continue;
            }
            let fed = project.graph.edges.iter().any(|e| {
                &e.to_node_id == node_id && &e.to_port_id == &port.id
            });
            if !fed {
                return Err(CompileError::MissingRequiredInput {
                    node_id: node_id.to_string(),
                    port_id: port.id.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn find_port<'a>(ports: &'a [PortSpec], id: &PortId) -> Option<&'a PortSpec> {
    ports.iter().find(|p| &p.id == id)
}

fn topological_sort(
    nodes: &BTreeMap<NodeId, ResolvedNode>,
) -> Result<Vec<NodeId>, CompileError> {
    let mut in_degree: BTreeMap<NodeId, usize> = nodes
        .keys()
        .map(|id| (id.clone(), nodes[id].dependencies.len()))
        .collect();

    let mut dependents: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for (id, resolved) in nodes {
        for dep in &resolved.dependencies {
            dependents.entry(dep.clone()).or_default().push(id.clone());
        }
    }

    let mut ready: VecDeque<NodeId> = nodes
        .keys()
        .filter(|id| in_degree[*id] == 0)
        .cloned()
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(next) = ready.pop_front() {
        order.push(next.clone());
        if let Some(children) = dependents.get(&next) {
            for child in children {
                let degree = in_degree.get_mut(child).expect("dependent tracked");
                *degree -= 1;
                if *degree == 0 {
                    ready.push_back(child.clone());
                }
            }
        }
    }

    if order.len() != nodes.len() {
        return Err(CompileError::GraphCycleDetected);
    }

    Ok(order)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]
mod tests {
    use async_trait::async_trait;
    use serde_json::Value;
    use serde_json::json;

    use super::*;
    use crate::core::identifiers::NodeKind;
    use crate::core::identifiers::ProjectId;
    use crate::core::project::EngineConfig;
    use crate::core::project::Graph;
    use crate::core::project::MigrationsState;
    use crate::core::project::NodeInstance;
    use crate::core::project::PermissionsRef;
    use crate::core::project::Position;
    use crate::core::project::ProjectSettings;
    use crate::core::project::Retention;
    use crate::core::registry::CachePolicy;
    use crate::core::registry::CapabilityClass;
    use crate::core::registry::ConfigFieldSpec;
    use crate::core::registry::ConfigFieldType;
    use crate::core::registry::PortType;
    use crate::interfaces::ExecutionContext;
    use crate::interfaces::NodeExecutionError;
    use crate::interfaces::NodeExecutor;
    use crate::interfaces::NodeOutput;

    struct PassthroughExecutor;

    #[async_trait]
    impl NodeExecutor for PassthroughExecutor {
        async fn execute(&self, _ctx: &ExecutionContext) -> Result<NodeOutput, NodeExecutionError> {
            Ok(NodeOutput::empty())
        }
    }

    fn stub_definition(
        kind: &str,
        input_ports: Vec<PortSpec>,
        output_ports: Vec<PortSpec>,
    ) -> NodeDefinition {
        NodeDefinition {
            kind: NodeKind::from(kind),
            version: 1,
            capability_class: CapabilityClass::LocalCpu,
            cache_policy: CachePolicy::ByInputs,
            input_ports,
            output_ports,
            config_schema: vec![ConfigFieldSpec {
                key: "label".to_string(),
                field_type: ConfigFieldType::String,
                ui_only: false,
            }],
            fingerprint_salt: format!("{kind}.v1"),
            is_visual_only: false,
            cache_bypass: crate::core::registry::never_bypass,
            executor: std::sync::Arc::new(PassthroughExecutor),
        }
    }

    fn node(id: &str, kind: &str, config: Value) -> NodeInstance {
        NodeInstance {
            id: NodeId::from(id),
            kind: NodeKind::from(kind),
            version: 1,
            title: id.to_string(),
            position: Position { x: 0.0, y: 0.0 },
            config,
            continue_on_error: false,
            disabled: false,
        }
    }

    fn edge(id: &str, from: &str, from_port: &str, to: &str, to_port: &str) -> crate::core::project::Edge {
        crate::core::project::Edge {
            id: EdgeId::from(id),
            from_node_id: NodeId::from(from),
            from_port_id: PortId::from(from_port),
            to_node_id: NodeId::from(to),
            to_port_id: PortId::from(to_port),
        }
    }

    fn project_with(nodes: Vec<NodeInstance>, edges: Vec<crate::core::project::Edge>) -> Project {
        Project {
            schema: crate::core::project::PROJECT_SCHEMA_TAG.to_string(),
            project_id: ProjectId::from("p1"),
            name: "test".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            engine: EngineConfig {
                api_mode: "systemsculpt_only".to_string(),
                min_plugin_version: (0, 0, 0),
            },
            graph: Graph {
                nodes,
                edges,
                entry_node_ids: Vec::new(),
                groups: Vec::new(),
            },
            permissions_ref: PermissionsRef {
                policy_version: 1,
                policy_path: "policy.json".to_string(),
            },
            settings: ProjectSettings {
                run_concurrency: "adaptive".to_string(),
                default_fs_scope: "vault".to_string(),
                retention: Retention {
                    max_runs: 10,
                    max_artifacts_mb: 100,
                },
            },
            migrations: MigrationsState {
                project_schema_version: crate::core::project::CURRENT_PROJECT_SCHEMA_VERSION,
                applied: Vec::new(),
            },
        }
    }

    fn source_sink_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(stub_definition(
            "studio.source",
            Vec::new(),
            vec![PortSpec {
                id: PortId::from("out"),
                port_type: PortType("text".to_string()),
                required: false,
            }],
        ));
        registry.register(stub_definition(
            "studio.sink",
            vec![PortSpec {
                id: PortId::from("in"),
                port_type: PortType("text".to_string()),
                required: true,
            }],
            Vec::new(),
        ));
        registry
    }

    #[test]
    fn duplicate_node_ids_fail_fast() {
        let registry = source_sink_registry();
        let project = project_with(
            vec![
                node("a", "studio.source", json!({"label": "x"})),
                node("a", "studio.source", json!({"label": "y"})),
            ],
            Vec::new(),
        );
        assert_eq!(
            compile(&project, &registry).unwrap_err(),
            CompileError::DuplicateNodeId("a".to_string())
        );
    }

    #[test]
    fn unknown_node_kind_is_fatal() {
        let registry = source_sink_registry();
        let project = project_with(vec![node("a", "studio.missing", json!({}))], Vec::new());
        let err = compile(&project, &registry).unwrap_err();
        assert!(matches!(err, CompileError::UnknownNodeKind { node_id, .. } if node_id == "a"));
    }

    #[test]
    fn invalid_config_reports_node_and_field() {
        let registry = source_sink_registry();
        let project = project_with(
            vec![node("a", "studio.source", json!({"label": 42}))],
            Vec::new(),
        );
        let err = compile(&project, &registry).unwrap_err();
        assert!(
            matches!(err, CompileError::InvalidNodeConfig { node_id, field, .. } if node_id == "a" && field == "label")
        );
    }

    #[test]
    fn edge_with_duplicate_endpoints_is_invalid() {
        let registry = source_sink_registry();
        let project = project_with(
            vec![
                node("a", "studio.source", json!({"label": "x"})),
                node("b", "studio.sink", json!({"label": "y"})),
            ],
            vec![
                edge("e1", "a", "out", "b", "in"),
                edge("e2", "a", "out", "b", "in"),
            ],
        );
        let err = compile(&project, &registry).unwrap_err();
        assert!(matches!(err, CompileError::InvalidEdge { edge_id, .. } if edge_id == "e2"));
    }

    #[test]
    fn dangling_edge_endpoint_is_invalid() {
        let registry = source_sink_registry();
        let project = project_with(
            vec![node("a", "studio.source", json!({"label": "x"}))],
            vec![edge("e1", "a", "out", "ghost", "in")],
        );
        let err = compile(&project, &registry).unwrap_err();
        assert!(matches!(err, CompileError::InvalidEdge { edge_id, .. } if edge_id == "e1"));
    }

    #[test]
    fn nonexistent_port_is_invalid_edge() {
        let registry = source_sink_registry();
        let project = project_with(
            vec![
                node("a", "studio.source", json!({"label": "x"})),
                node("b", "studio.sink", json!({"label": "y"})),
            ],
            vec![edge("e1", "a", "missing_out", "b", "in")],
        );
        let err = compile(&project, &registry).unwrap_err();
        assert!(matches!(err, CompileError::InvalidEdge { edge_id, .. } if edge_id == "e1"));
    }

    #[test]
    fn mismatched_port_types_are_fatal() {
        let mut registry = Registry::new();
        registry.register(stub_definition(
            "studio.source",
            Vec::new(),
            vec![PortSpec {
                id: PortId::from("out"),
                port_type: PortType("image".to_string()),
                required: false,
            }],
        ));
        registry.register(stub_definition(
            "studio.sink",
            vec![PortSpec {
                id: PortId::from("in"),
                port_type: PortType("text".to_string()),
                required: true,
            }],
            Vec::new(),
        ));
        let project = project_with(
            vec![
                node("a", "studio.source", json!({"label": "x"})),
                node("b", "studio.sink", json!({"label": "y"})),
            ],
            vec![edge("e1", "a", "out", "b", "in")],
        );
        let err = compile(&project, &registry).unwrap_err();
        assert!(matches!(
            err,
            CompileError::PortTypeMismatch { edge_id, .. } if edge_id == "e1"
        ));
    }

    #[test]
    fn any_type_tag_is_compatible_with_any_concrete_type() {
        let mut registry = Registry::new();
        registry.register(stub_definition(
            "studio.source",
            Vec::new(),
            vec![PortSpec {
                id: PortId::from("out"),
                port_type: PortType(PortType::ANY.to_string()),
                required: false,
            }],
        ));
        registry.register(stub_definition(
            "studio.sink",
            vec![PortSpec {
                id: PortId::from("in"),
                port_type: PortType("text".to_string()),
                required: true,
            }],
            Vec::new(),
        ));
        let project = project_with(
            vec![
                node("a", "studio.source", json!({"label": "x"})),
                node("b", "studio.sink", json!({"label": "y"})),
            ],
            vec![edge("e1", "a", "out", "b", "in")],
        );
        assert!(compile(&project, &registry).is_ok());
    }

    #[test]
    fn missing_required_input_is_fatal() {
        let registry = source_sink_registry();
        let project = project_with(vec![node("b", "studio.sink", json!({"label": "y"}))], Vec::new());
        let err = compile(&project, &registry).unwrap_err();
        assert!(
            matches!(err, CompileError::MissingRequiredInput { node_id, port_id } if node_id == "b" && port_id == "in")
        );
    }

    #[test]
    fn two_node_cycle_is_detected() {
        let mut registry = Registry::new();
        registry.register(stub_definition(
            "studio.relay",
            vec![PortSpec {
                id: PortId::from("in"),
                port_type: PortType("text".to_string()),
                required: false,
            }],
            vec![PortSpec {
                id: PortId::from("out"),
                port_type: PortType("text".to_string()),
                required: false,
            }],
        ));
        let project = project_with(
            vec![
                node("a", "studio.relay", json!({"label": "x"})),
                node("b", "studio.relay", json!({"label": "y"})),
            ],
            vec![
                edge("e1", "a", "out", "b", "in"),
                edge("e2", "b", "out", "a", "in"),
            ],
        );
        assert_eq!(
            compile(&project, &registry).unwrap_err(),
            CompileError::GraphCycleDetected
        );
    }

    #[test]
    fn acyclic_graph_orders_sources_before_sinks() {
        let registry = source_sink_registry();
        let project = project_with(
            vec![
                node("b", "studio.sink", json!({"label": "y"})),
                node("a", "studio.source", json!({"label": "x"})),
            ],
            vec![edge("e1", "a", "out", "b", "in")],
        );
        let compiled = compile(&project, &registry).expect("compiles");
        let pos_a = compiled.order.iter().position(|id| id == &NodeId::from("a")).expect("a present");
        let pos_b = compiled.order.iter().position(|id| id == &NodeId::from("b")).expect("b present");
        assert!(pos_a < pos_b);
    }

    #[test]
    fn visual_only_nodes_are_excluded_from_the_compiled_graph() {
        let mut registry = source_sink_registry();
        let mut label = stub_definition("studio.label", Vec::new(), Vec::new());
        label.is_visual_only = true;
        registry.register(label);
        let project = project_with(
            vec![
                node("a", "studio.source", json!({"label": "x"})),
                node("lbl", "studio.label", json!({"label": "note"})),
            ],
            Vec::new(),
        );
        let compiled = compile(&project, &registry).expect("compiles");
        assert_eq!(compiled.nodes.len(), 1);
        assert!(compiled.nodes.contains_key(&NodeId::from("a")));
    }
}
