// studio-runtime/src/scheduler.rs
// ============================================================================
// Module: Scheduler & Runtime
// Description: Drives one run of a compiled graph from credit preflight
//              through journal-persisted completion.
// Purpose: Implement the run lifecycle: open, scope, preflight, compile,
//          execute with cache-aware dependency scheduling, persist.
// Dependencies: futures-util, tokio, studio-core, studio-store,
//               studio-sandbox, studio-adapters, studio-nodes
// ============================================================================

//! ## Overview
//! [`Runtime`] owns the long-lived, run-independent state (the node registry,
//! the shared HTTP client, the per-project run lock, the per-capability-class
//! semaphores, and the process-wide [`studio_adapters::TurnQueues`]) and
//! exposes a single [`Runtime::run`] entry point. Everything scoped to one
//! run's policy snapshot — the [`PermissionManager`], the [`Sandbox`], the
//! [`Adapter`] — is constructed fresh inside `run`, since
//! `PolicyPermissionManager` snapshots one immutable policy at construction
//! and cannot safely be shared across two runs with differing grants. The
//! turn queues are the one exception: they are built once on `Runtime` and
//! handed to every per-run `HttpAdapter` by `Arc`, because §4.11.1 requires
//! managed/local text turns to serialize process-wide, not merely within a
//! single run — two concurrent runs against different projects hold
//! different [`ProjectLockMap`] locks and must still contend for the same
//! turn queue.
//!
//! The main loop drives node execution without `tokio::spawn`: each node's
//! future is pushed into a single [`FuturesUnordered`] polled from within
//! `run`'s own stack frame, so futures may borrow the run's local state
//! (the journal, the cache) directly instead of requiring `'static` bounds.
//! This happens to reproduce a single-threaded cooperative event-loop model
//! more faithfully than spawning onto separate tasks would.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use studio_adapters::AdapterEndpoints;
use studio_adapters::HttpAdapter;
use studio_adapters::TurnQueues;
use studio_core::core::identifiers::random_id;
use studio_core::interfaces::Adapter;
use studio_core::interfaces::AssetStore;
use studio_core::interfaces::ExecutionContext;
use studio_core::interfaces::NodeOutput;
use studio_core::interfaces::PermissionManager;
use studio_core::interfaces::Sandbox;
use studio_core::interfaces::SecretStore;
use studio_core::interfaces::ServiceBundle;
use studio_core::CacheEntry;
use studio_core::CachePolicy;
use studio_core::NodeId;
use studio_core::OutputSource;
use studio_core::Project;
use studio_core::Registry;
use studio_core::ResolvedNode;
use studio_core::RunEvent;
use studio_core::RunEventKind;
use studio_core::RunId;
use studio_core::RunSnapshot;
use studio_core::RunStatus;
use studio_core::RunSummary;
use studio_core::RUN_SNAPSHOT_SCHEMA_TAG;
use studio_core::compute_fingerprint;
use studio_core::core::host::HostEnvironment;
use studio_core::project_scope;
use studio_sandbox::KeychainSecretStore;
use studio_sandbox::PolicyPermissionManager;
use studio_sandbox::ProcessSandbox;
use studio_sandbox::UnavailableSecretStore;
use studio_store::CacheSnapshot;
use studio_store::Clock;
use studio_store::FsAssetStore;
use studio_store::ProjectStore;
use studio_store::RunJournal;
use tokio_util::sync::CancellationToken;
use tracing::info_span;
use tracing::warn;

use crate::capability::CapabilityLimits;
use crate::error::RuntimeError;
use crate::project_lock::ProjectLockMap;

/// The directory (relative to the host base path) scratch audio files are
/// staged under by the transcription adapter; swept best-effort at the end
/// of every run.
fn runtime_tmp_root(host: &dyn HostEnvironment) -> PathBuf {
    host.resolve_absolute(Path::new(studio_adapters::transcription::runtime_tmp_audio_dir()))
}

/// Derives a project's assets root from its document path: `<project>.assets`,
/// appended as a literal suffix rather than an extension replacement.
#[must_use]
pub fn assets_root_for(project_path: &Path) -> PathBuf {
    let mut name = project_path.as_os_str().to_os_string();
    name.push(".assets");
    PathBuf::from(name)
}

/// One node's completed future, reported back to the driving loop.
enum Completion {
    /// The node ran (or was trivially satisfied) and produced an output.
    Executed {
        /// The node that completed.
        node_id: NodeId,
        /// Its output, real or empty (for a disabled/continue-on-error node).
        output: NodeOutput,
        /// The fingerprint it was executed under, for the cache write.
        fingerprint: String,
        /// What to do with the cache slot.
        cache_policy: CachePolicy,
        /// Whether this result should count as "executed" or "cached" in the
        /// run summary.
        source: OutputSource,
        /// Set when the executor actually failed but `continueOnError=true`
        /// swallowed it into an empty-output success; carries the error so a
        /// `node.failed` event is still journaled ahead of `node.output`.
        swallowed_error: Option<(String, Option<String>)>,
    },
    /// The node's executor returned a fatal error (`continueOnError = false`).
    Fatal {
        /// The failing node.
        node_id: NodeId,
        /// Human-readable error message.
        message: String,
        /// Optional cause chain.
        stack: Option<String>,
    },
    /// The node never started: the shared cancellation signal had already
    /// fired by the time its semaphore permit was granted.
    Aborted(NodeId),
}

/// Long-lived, run-independent runtime state: the node registry, the shared
/// HTTP client, per-project run serialization, per-capability-class
/// concurrency ceilings, and the process-wide text-turn serialization queues.
pub struct Runtime {
    host: Arc<dyn HostEnvironment>,
    clock: Arc<dyn Clock>,
    registry: Arc<Registry>,
    http: reqwest::Client,
    endpoints: AdapterEndpoints,
    limits: Arc<CapabilityLimits>,
    locks: Arc<ProjectLockMap>,
    turns: Arc<TurnQueues>,
}

impl Runtime {
    /// Builds a runtime over the given host, clock, and remote endpoints,
    /// registering the built-in node kinds. The managed/local text-turn
    /// queues are constructed once here and shared by every per-run adapter,
    /// so turn serialization holds process-wide rather than per-run (§4.11.1).
    #[must_use]
    pub fn new(
        host: Arc<dyn HostEnvironment>,
        clock: Arc<dyn Clock>,
        http: reqwest::Client,
        endpoints: AdapterEndpoints,
    ) -> Self {
        Self {
            host,
            clock,
            registry: Arc::new(studio_nodes::builtin_registry()),
            http,
            endpoints,
            limits: Arc::new(CapabilityLimits::new()),
            locks: Arc::new(ProjectLockMap::new()),
            turns: Arc::new(TurnQueues::new()),
        }
    }

    /// The shared node registry, exposed so the Service Facade can compile
    /// and validate against the same definitions the Runtime executes.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Runs `project_path`, scoped to `scoped_entries` (the whole graph if
    /// empty), to completion. Nodes named in `force_node_ids` bypass an
    /// otherwise-matching cache entry for this run only: the cache slot is
    /// still overwritten afterward per the node's cache policy.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if the project cannot be opened, the scoped
    /// entry set does not resolve, the credit preflight is denied, or the
    /// graph fails to compile. Node execution failures are recorded in the
    /// returned [`RunSummary`] rather than raised as a `Result` error, since
    /// a run that executes but fails a node still produces a valid journal.
    pub async fn run(
        &self,
        project_path: &Path,
        scoped_entries: &[NodeId],
        force_node_ids: &[NodeId],
    ) -> Result<RunSummary, RuntimeError> {
        let _project_guard = self.locks.acquire(project_path).await;

        let store = ProjectStore::new(self.host.as_ref(), self.clock.as_ref());
        let (project, policy) = store.open(project_path)?;
        let scoped_project = project_scope(&project, scoped_entries, &self.registry)?;

        let assets_root = assets_root_for(project_path);
        let permissions: Arc<dyn PermissionManager> =
            Arc::new(PolicyPermissionManager::new(policy.clone()));
        let assets: Arc<dyn AssetStore> =
            Arc::new(FsAssetStore::new(self.host.clone(), assets_root.join("assets")));
        let sandbox: Arc<dyn Sandbox> =
            Arc::new(ProcessSandbox::new(permissions.clone(), self.host.clone()));
        let secrets: Arc<dyn SecretStore> = if self.host.is_desktop() {
            Arc::new(KeychainSecretStore::new())
        } else {
            Arc::new(UnavailableSecretStore)
        };
        let adapter: Arc<dyn Adapter> = Arc::new(HttpAdapter::new(
            self.http.clone(),
            permissions.clone(),
            sandbox.clone(),
            assets.clone(),
            self.host.clone(),
            self.endpoints.clone(),
            self.turns.clone(),
        ));

        let estimate = adapter.estimate_run_credits(&scoped_project).await;
        if !estimate.ok {
            return Err(RuntimeError::CreditPreflightDenied(estimate.reason));
        }

        let compiled = studio_core::compile(&scoped_project, &self.registry)?;

        let run_id = RunId::new(random_id("run"));
        let started_at = self.clock.now_iso8601();
        let span = info_span!("studio_run", run_id = %run_id);
        let _entered = span.enter();

        let journal = RunJournal::open(self.host.as_ref(), &assets_root, run_id.clone())?;
        let snapshot = RunSnapshot {
            schema: RUN_SNAPSHOT_SCHEMA_TAG.to_string(),
            project: scoped_project.clone(),
            policy,
        };
        journal.write_snapshot(&snapshot)?;
        let snapshot_hash = snapshot.compute_hash()?;
        journal.append_event(&RunEvent {
            run_id: run_id.clone(),
            timestamp: self.clock.now_iso8601(),
            kind: RunEventKind::RunStarted {
                snapshot_hash: snapshot_hash.value,
            },
        });

        let cache_path = assets_root.join("cache").join("node-results.json");
        let mut cache = CacheSnapshot::load(self.host.as_ref(), &cache_path);
        let cancellation = CancellationToken::new();

        let bundle = ServiceBundle {
            assets,
            secrets,
            permissions,
            sandbox,
            adapter,
            host: self.host.clone(),
        };

        let force_set: std::collections::HashSet<&NodeId> = force_node_ids.iter().collect();
        let outcome = self
            .drive(
                &run_id,
                project_path,
                &scoped_project,
                &compiled.nodes,
                &compiled.order,
                &journal,
                &mut cache,
                &cancellation,
                &bundle,
                &force_set,
            )
            .await;

        cache.save(self.host.as_ref(), &cache_path);

        let tmp_root = runtime_tmp_root(self.host.as_ref());
        if self.host.exists(&tmp_root) {
            if let Err(err) = self.host.remove(&tmp_root) {
                warn!(run_id = %run_id, error = %err, "failed to sweep run temp root");
            }
        }

        let finished_at = self.clock.now_iso8601();
        let status = if outcome.fatal.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };

        if let Some((ref message, ref stack)) = outcome.fatal {
            journal.append_event(&RunEvent {
                run_id: run_id.clone(),
                timestamp: self.clock.now_iso8601(),
                kind: RunEventKind::RunFailed {
                    error: message.clone(),
                    error_stack: stack.clone(),
                },
            });
        }
        journal.append_event(&RunEvent {
            run_id: run_id.clone(),
            timestamp: finished_at.clone(),
            kind: RunEventKind::RunCompleted { status },
        });

        let summary = RunSummary {
            run_id: run_id.clone(),
            status,
            started_at,
            finished_at: Some(finished_at),
            error: outcome.fatal.map(|(message, _)| message),
            executed_node_ids: outcome.executed_ids,
            cached_node_ids: outcome.cached_ids,
        };
        journal.record_summary(summary.clone(), scoped_project.settings.retention.max_runs);

        Ok(summary)
    }

    /// Runs the dependency-ordered scheduling loop over a compiled graph.
    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        run_id: &RunId,
        project_path: &Path,
        project: &Project,
        nodes: &std::collections::BTreeMap<NodeId, ResolvedNode>,
        order: &[NodeId],
        journal: &RunJournal<'_>,
        cache: &mut CacheSnapshot,
        cancellation: &CancellationToken,
        bundle: &ServiceBundle,
        force_node_ids: &std::collections::HashSet<&NodeId>,
    ) -> LoopOutcome {
        let instances: HashMap<&NodeId, &studio_core::NodeInstance> =
            project.graph.nodes.iter().map(|n| (&n.id, n)).collect();
        let edge_by_id: HashMap<&studio_core::EdgeId, &studio_core::Edge> =
            project.graph.edges.iter().map(|e| (&e.id, e)).collect();

        let mut remaining_deps: HashMap<NodeId, usize> = nodes
            .iter()
            .map(|(id, resolved)| (id.clone(), resolved.dependencies.len()))
            .collect();
        let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for (id, resolved) in nodes {
            for dep in &resolved.dependencies {
                dependents.entry(dep.clone()).or_default().push(id.clone());
            }
        }

        let mut outputs: HashMap<NodeId, NodeOutput> = HashMap::new();
        let mut executed_ids = Vec::new();
        let mut cached_ids = Vec::new();
        let mut fatal: Option<(String, Option<String>)> = None;

        let mut in_flight: FuturesUnordered<
            Pin<Box<dyn Future<Output = Completion> + Send + '_>>,
        > = FuturesUnordered::new();
        let mut pos = 0usize;

        loop {
            while pos < order.len() {
                let node_id = &order[pos];
                if remaining_deps.get(node_id).copied().unwrap_or(0) != 0 {
                    break;
                }
                pos += 1;

                let Some(instance) = instances.get(node_id) else {
                    continue;
                };
                let resolved = &nodes[node_id];

                if instance.disabled {
                    outputs.insert((*node_id).clone(), NodeOutput::empty());
                    self.settle_dependents(node_id, &mut remaining_deps, &dependents);
                    continue;
                }

                let input_value = resolve_inputs(resolved, &edge_by_id, &outputs);
                let fingerprint = match compute_fingerprint(
                    &resolved.definition.fingerprint_salt,
                    instance.kind.as_str(),
                    instance.version,
                    &instance.config,
                    &input_value,
                ) {
                    Ok(fp) => fp,
                    Err(err) => {
                        fatal.get_or_insert((err.to_string(), None));
                        cancellation.cancel();
                        continue;
                    }
                };

                if let Some(entry) = cache.get(node_id) {
                    if entry.fingerprint == fingerprint
                        && !force_node_ids.contains(node_id)
                        && !(resolved.definition.cache_bypass)(entry)
                    {
                        let output = NodeOutput {
                            outputs: entry.outputs.clone(),
                            artifacts: entry.artifacts.clone(),
                            output_ref: entry.artifacts.first().map(|a| a.hash.clone()),
                        };
                        journal.append_event(&RunEvent {
                            run_id: run_id.clone(),
                            timestamp: self.clock.now_iso8601(),
                            kind: RunEventKind::NodeCacheHit {
                                node_id: (*node_id).clone(),
                                cache_updated_at: entry.written_at.clone(),
                            },
                        });
                        journal.append_event(&RunEvent {
                            run_id: run_id.clone(),
                            timestamp: self.clock.now_iso8601(),
                            kind: RunEventKind::NodeOutput {
                                node_id: (*node_id).clone(),
                                output_ref: output.output_ref.clone(),
                                output_source: OutputSource::Cache,
                                outputs: output.outputs.clone(),
                            },
                        });
                        cached_ids.push((*node_id).clone());
                        outputs.insert((*node_id).clone(), output);
                        self.settle_dependents(node_id, &mut remaining_deps, &dependents);
                        continue;
                    }
                }

                if cancellation.is_cancelled() {
                    in_flight.push(Box::pin(async move { Completion::Aborted(node_id.clone()) }));
                    continue;
                }

                journal.append_event(&RunEvent {
                    run_id: run_id.clone(),
                    timestamp: self.clock.now_iso8601(),
                    kind: RunEventKind::NodeStarted {
                        node_id: (*node_id).clone(),
                    },
                });

                let future = self.execute_node(
                    run_id,
                    project_path,
                    instance,
                    resolved,
                    input_value,
                    fingerprint,
                    cancellation,
                    bundle,
                );
                in_flight.push(Box::pin(future));
            }

            let Some(completion) = in_flight.next().await else {
                break;
            };

            match completion {
                Completion::Executed {
                    node_id,
                    output,
                    fingerprint,
                    cache_policy,
                    source,
                    swallowed_error,
                } => {
                    if let Some((message, stack)) = swallowed_error {
                        journal.append_event(&RunEvent {
                            run_id: run_id.clone(),
                            timestamp: self.clock.now_iso8601(),
                            kind: RunEventKind::NodeFailed {
                                node_id: node_id.clone(),
                                error: message,
                                error_stack: stack,
                            },
                        });
                    }
                    journal.append_event(&RunEvent {
                        run_id: run_id.clone(),
                        timestamp: self.clock.now_iso8601(),
                        kind: RunEventKind::NodeOutput {
                            node_id: node_id.clone(),
                            output_ref: output.output_ref.clone(),
                            output_source: source,
                            outputs: output.outputs.clone(),
                        },
                    });
                    match cache_policy {
                        CachePolicy::ByInputs => cache.put(CacheEntry {
                            node_id: node_id.clone(),
                            kind: instances
                                .get(&node_id)
                                .map_or_else(String::new, |i| i.kind.to_string()),
                            version: instances.get(&node_id).map_or(1, |i| i.version),
                            fingerprint,
                            outputs: output.outputs.clone(),
                            artifacts: output.artifacts.clone(),
                            written_at: self.clock.now_iso8601(),
                            run_id: run_id.clone(),
                        }),
                        CachePolicy::Never => cache.delete(&node_id),
                    }
                    if matches!(source, OutputSource::Execution) {
                        executed_ids.push(node_id.clone());
                    }
                    outputs.insert(node_id.clone(), output);
                    self.settle_dependents(&node_id, &mut remaining_deps, &dependents);
                }
                Completion::Fatal {
                    node_id,
                    message,
                    stack,
                } => {
                    journal.append_event(&RunEvent {
                        run_id: run_id.clone(),
                        timestamp: self.clock.now_iso8601(),
                        kind: RunEventKind::NodeFailed {
                            node_id,
                            error: message.clone(),
                            error_stack: stack.clone(),
                        },
                    });
                    fatal.get_or_insert((message, stack));
                    cancellation.cancel();
                }
                Completion::Aborted(_) => {}
            }
        }

        LoopOutcome {
            executed_ids,
            cached_ids,
            fatal,
        }
    }

    /// Removes `node_id` from its dependents' remaining-dependency counters.
    fn settle_dependents(
        &self,
        node_id: &NodeId,
        remaining_deps: &mut HashMap<NodeId, usize>,
        dependents: &HashMap<NodeId, Vec<NodeId>>,
    ) {
        if let Some(children) = dependents.get(node_id) {
            for child in children {
                if let Some(count) = remaining_deps.get_mut(child) {
                    *count = count.saturating_sub(1);
                }
            }
        }
    }

    /// Builds the future that executes (or cache-skips) a single node,
    /// gated by its capability-class semaphore and the shared cancellation
    /// signal.
    #[allow(clippy::too_many_arguments)]
    fn execute_node<'a>(
        &'a self,
        run_id: &RunId,
        project_path: &Path,
        instance: &'a studio_core::NodeInstance,
        resolved: &'a ResolvedNode,
        inputs: serde_json::Value,
        fingerprint: String,
        cancellation: &'a CancellationToken,
        bundle: &'a ServiceBundle,
    ) -> impl Future<Output = Completion> + Send + 'a {
        let run_id = run_id.clone();
        let project_path = project_path.to_path_buf();
        let limits = self.limits.clone();
        let cache_policy = resolved.definition.cache_policy;
        async move {
            let semaphore = limits.semaphore_for(resolved.definition.capability_class);
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return Completion::Aborted(instance.id.clone());
            };
            if cancellation.is_cancelled() {
                return Completion::Aborted(instance.id.clone());
            }

            let ctx = ExecutionContext {
                run_id,
                project_path,
                node: instance.clone(),
                inputs,
                cancellation: cancellation.clone(),
                services: bundle.clone(),
                log: info_span!("studio_node", node_id = %instance.id, kind = %instance.kind),
            };

            match resolved.definition.executor.execute(&ctx).await {
                Ok(output) => Completion::Executed {
                    node_id: instance.id.clone(),
                    output,
                    fingerprint,
                    cache_policy,
                    source: OutputSource::Execution,
                    swallowed_error: None,
                },
                Err(err) if instance.continue_on_error => Completion::Executed {
                    node_id: instance.id.clone(),
                    output: NodeOutput::empty(),
                    fingerprint,
                    cache_policy,
                    source: OutputSource::Execution,
                    swallowed_error: Some((err.message, err.stack)),
                },
                Err(err) => Completion::Fatal {
                    node_id: instance.id.clone(),
                    message: err.message,
                    stack: err.stack,
                },
            }
        }
    }
}

/// The scheduling loop's final tally, folded into the run summary.
struct LoopOutcome {
    executed_ids: Vec<NodeId>,
    cached_ids: Vec<NodeId>,
    fatal: Option<(String, Option<String>)>,
}

/// Resolves a node's input map: one value per input port, or a JSON array in
/// edge-declaration order when more than one inbound edge feeds the same
/// port.
fn resolve_inputs(
    resolved: &ResolvedNode,
    edge_by_id: &HashMap<&studio_core::EdgeId, &studio_core::Edge>,
    outputs: &HashMap<NodeId, NodeOutput>,
) -> serde_json::Value {
    let mut by_port: HashMap<&str, Vec<serde_json::Value>> = HashMap::new();
    for edge_id in &resolved.inbound_edges {
        let Some(edge) = edge_by_id.get(edge_id) else {
            continue;
        };
        let value = outputs
            .get(&edge.from_node_id)
            .and_then(|o| o.outputs.get(edge.from_port_id.as_str()))
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        by_port.entry(edge.to_port_id.as_str()).or_default().push(value);
    }

    let mut map = serde_json::Map::new();
    for (port, mut values) in by_port {
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            serde_json::Value::Array(values)
        };
        map.insert(port.to_string(), value);
    }
    serde_json::Value::Object(map)
}
