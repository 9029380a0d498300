// studio-core/src/core/run.rs
// ============================================================================
// Module: Studio Run Types
// Description: Asset refs, cache entries, run snapshots, summaries, and events.
// Purpose: Model the per-run data the Journal and Result Cache persist.
// Dependencies: serde, crate::core::{hashing, identifiers, policy, project}
// ============================================================================

//! ## Overview
//! Types written to the run journal and cache snapshot: the immutable
//! [`RunSnapshot`] captured at run start, the [`RunSummary`] appended to the
//! run index, and the [`RunEvent`] stream appended to `events.ndjson`.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::hashing::HashAlgorithm;
use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::RunId;
use crate::core::policy::PermissionPolicy;
use crate::core::project::Project;

/// A content-addressed reference to a stored asset blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    /// SHA-256 hex digest of the stored bytes.
    pub hash: String,
    /// MIME type as declared at store time.
    pub mime: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Path to the stored file, relative to the project's assets root.
    pub path: String,
}

/// A cached node result, keyed by node ID (not fingerprint) within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// The node this entry belongs to.
    pub node_id: NodeId,
    /// Node kind at the time of caching.
    pub kind: String,
    /// Node definition version at the time of caching.
    pub version: u32,
    /// The input fingerprint this entry was written under.
    pub fingerprint: String,
    /// Cached output port values.
    pub outputs: Value,
    /// Cached artifact references, if any.
    #[serde(default)]
    pub artifacts: Vec<AssetRef>,
    /// ISO-8601 timestamp of the write.
    pub written_at: String,
    /// The run that produced this entry.
    pub run_id: RunId,
}

/// An immutable copy of the project and policy captured at run start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    /// Schema tag for the snapshot document.
    pub schema: String,
    /// The scoped project as compiled for this run.
    pub project: Project,
    /// The policy in effect for this run.
    pub policy: PermissionPolicy,
}

/// The run snapshot schema tag.
pub const RUN_SNAPSHOT_SCHEMA_TAG: &str = "studio.run_snapshot.v1";

impl RunSnapshot {
    /// Computes the SHA-256-over-canonical-JSON hash that becomes the run's
    /// `snapshotHash`, carried on the `run.started` event.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the snapshot cannot be canonicalized.
    pub fn compute_hash(&self) -> Result<HashDigest, HashError> {
        hash_canonical_json(HashAlgorithm::Sha256, self)
    }
}

/// Terminal or in-flight status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Enqueued, not yet dequeued.
    Queued,
    /// Dequeued and actively executing.
    Running,
    /// Completed with no fatal error.
    Success,
    /// Completed with a fatal error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

/// The run-index entry summarizing a completed (or in-flight) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Run identity.
    pub run_id: RunId,
    /// Terminal or in-flight status.
    pub status: RunStatus,
    /// ISO-8601 start timestamp.
    pub started_at: String,
    /// ISO-8601 completion timestamp, if finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// The first fatal error message, if the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Node IDs that executed (cache miss).
    pub executed_node_ids: Vec<NodeId>,
    /// Node IDs served from cache.
    pub cached_node_ids: Vec<NodeId>,
}

/// Where a node's output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSource {
    /// Produced by running the node's executor this run.
    Execution,
    /// Served from the result cache.
    Cache,
}

/// A single journaled event, one JSON object per NDJSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    /// The run this event belongs to.
    pub run_id: RunId,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    /// The event payload.
    #[serde(flatten)]
    pub kind: RunEventKind,
}

/// The tagged union of run event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEventKind {
    /// Emitted once, immediately after the run snapshot is written.
    #[serde(rename = "run.started")]
    RunStarted {
        /// SHA-256 hex digest of the run snapshot.
        snapshot_hash: String,
    },
    /// Emitted exactly once, terminating the run.
    #[serde(rename = "run.completed")]
    RunCompleted {
        /// Terminal status, `success` or `failed`.
        status: RunStatus,
    },
    /// Emitted when a fatal error aborts the run, before `run.completed`.
    #[serde(rename = "run.failed")]
    RunFailed {
        /// Human-readable error message.
        error: String,
        /// Optional error stack/cause chain.
        #[serde(skip_serializing_if = "Option::is_none")]
        error_stack: Option<String>,
    },
    /// Emitted when a node begins executing (cache miss).
    #[serde(rename = "node.started")]
    NodeStarted {
        /// The node starting.
        node_id: NodeId,
    },
    /// Emitted when a node's result is served from cache.
    #[serde(rename = "node.cache_hit")]
    NodeCacheHit {
        /// The node hitting cache.
        node_id: NodeId,
        /// Timestamp the cache entry was originally written.
        cache_updated_at: String,
    },
    /// Emitted once a node produces outputs, whether from execution or cache.
    #[serde(rename = "node.output")]
    NodeOutput {
        /// The producing node.
        node_id: NodeId,
        /// Primary artifact reference, if the node produced one.
        #[serde(skip_serializing_if = "Option::is_none")]
        output_ref: Option<String>,
        /// Whether the outputs came from execution or cache.
        output_source: OutputSource,
        /// The output port values.
        outputs: Value,
    },
    /// Emitted when a node fails, whether or not `continueOnError` swallows it.
    #[serde(rename = "node.failed")]
    NodeFailed {
        /// The failing node.
        node_id: NodeId,
        /// Human-readable error message.
        error: String,
        /// Optional error stack/cause chain.
        #[serde(skip_serializing_if = "Option::is_none")]
        error_stack: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_started_event_serializes_with_dotted_type_tag() {
        let event = RunEvent {
            run_id: RunId::from("run-1"),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            kind: RunEventKind::RunStarted {
                snapshot_hash: "abc123".to_string(),
            },
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "run.started");
        assert_eq!(json["snapshotHash"], "abc123");
        assert_eq!(json["runId"], "run-1");
    }
}
