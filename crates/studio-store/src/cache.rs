// studio-store/src/cache.rs
// ============================================================================
// Module: Result Cache Snapshot
// Description: Project-local, node-keyed cache of prior run outputs.
// Purpose: Persist `CacheEntry` values across runs at `cache/node-results.json`.
// Dependencies: serde_json, studio-core
// ============================================================================

//! ## Overview
//! The cache snapshot is loaded once at run start, mutated in memory for the
//! duration of the run, and rewritten once at run end regardless of outcome.
//! A corrupt or unreadable snapshot file downgrades silently to an empty
//! cache rather than failing the run (`CacheCorruption` is non-fatal).

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use studio_core::CacheEntry;
use studio_core::NodeId;
use studio_core::core::host::HostEnvironment;
use tracing::warn;

/// The on-disk shape of `cache/node-results.json`: a flat map from node ID to
/// its single cached entry. Cache policy `by_inputs` writes one slot per
/// node, overwritten each run; there is no per-fingerprint history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheSnapshot {
    entries: BTreeMap<NodeId, CacheEntry>,
}

impl CacheSnapshot {
    /// Loads the cache snapshot at `path` via `host`. A missing file yields
    /// an empty snapshot; a present-but-unparseable file logs a warning (the
    /// `CacheCorruption` taxonomy member) and also yields an empty snapshot.
    #[must_use]
    pub fn load(host: &dyn HostEnvironment, path: &Path) -> Self {
        if !host.exists(path) {
            return Self::default();
        }
        let Ok(bytes) = host.read_binary(path) else {
            warn!(path = %path.display(), "cache snapshot unreadable, starting empty");
            return Self::default();
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "cache snapshot corrupt, starting empty");
            Self::default()
        })
    }

    /// Looks up the cached entry for `node_id`, if any.
    #[must_use]
    pub fn get(&self, node_id: &NodeId) -> Option<&CacheEntry> {
        self.entries.get(node_id)
    }

    /// Writes or overwrites the single cache slot for `entry.node_id`.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.node_id.clone(), entry);
    }

    /// Deletes the cache slot for `node_id`, used when a node's cache policy
    /// is `never`.
    pub fn delete(&mut self, node_id: &NodeId) {
        self.entries.remove(node_id);
    }

    /// Persists the snapshot to `path`. Write failures are logged and never
    /// propagated as a run failure: the cache is a best-effort accelerator,
    /// not a durability guarantee.
    pub fn save(&self, host: &dyn HostEnvironment, path: &Path) {
        let Ok(bytes) = serde_json::to_vec_pretty(self) else {
            warn!(path = %path.display(), "failed to serialize cache snapshot");
            return;
        };
        if let Err(err) = host.write_binary(path, &bytes) {
            warn!(path = %path.display(), error = %err, "failed to persist cache snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FsHostEnvironment;
    use studio_core::RunId;

    fn entry(node_id: &str, fingerprint: &str) -> CacheEntry {
        CacheEntry {
            node_id: NodeId::from(node_id),
            kind: "studio.value".to_string(),
            version: 1,
            fingerprint: fingerprint.to_string(),
            outputs: serde_json::json!({"value": "hi"}),
            artifacts: vec![],
            written_at: "2026-01-01T00:00:00Z".to_string(),
            run_id: RunId::from("run-1"),
        }
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FsHostEnvironment::new(dir.path());
        let path = dir.path().join("cache/node-results.json");
        let snapshot = CacheSnapshot::load(&host, &path);
        assert!(snapshot.get(&NodeId::from("n1")).is_none());
    }

    #[test]
    fn corrupt_file_downgrades_to_empty_without_failing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FsHostEnvironment::new(dir.path());
        let path = dir.path().join("cache/node-results.json");
        host.write_binary(&path, b"not json").expect("write garbage");
        let snapshot = CacheSnapshot::load(&host, &path);
        assert!(snapshot.get(&NodeId::from("n1")).is_none());
    }

    #[test]
    fn round_trips_entries_through_save_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FsHostEnvironment::new(dir.path());
        let path = dir.path().join("cache/node-results.json");

        let mut snapshot = CacheSnapshot::default();
        snapshot.put(entry("n1", "fp1"));
        snapshot.save(&host, &path);

        let reloaded = CacheSnapshot::load(&host, &path);
        assert_eq!(reloaded.get(&NodeId::from("n1")).expect("entry").fingerprint, "fp1");
    }

    #[test]
    fn delete_removes_the_slot() {
        let mut snapshot = CacheSnapshot::default();
        snapshot.put(entry("n1", "fp1"));
        snapshot.delete(&NodeId::from("n1"));
        assert!(snapshot.get(&NodeId::from("n1")).is_none());
    }
}
