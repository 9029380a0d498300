// studio-store/src/journal.rs
// ============================================================================
// Module: Run Journal
// Description: Per-run directory: immutable snapshot, append-only event log,
//              and a retention-pruned run index.
// Purpose: Implement the §4.9 Run Journal contract.
// Dependencies: serde_json, studio-core
// ============================================================================

//! ## Overview
//! Each run gets `<assets>/runs/<runId>/snapshot.json` (written once,
//! immutable) and `events.ndjson` (appended one JSON object per line). The
//! run's summary is appended to `<assets>/runs/index.json`; after each run
//! the index is pruned to the newest `maxRuns` entries and the dropped run
//! directories are best-effort deleted (`RetentionPruneFailure` is logged,
//! never fatal).

use std::path::Path;
use std::path::PathBuf;

use studio_core::RunEvent;
use studio_core::RunId;
use studio_core::RunSnapshot;
use studio_core::RunSummary;
use studio_core::core::host::HostEnvironment;
use thiserror::Error;
use tracing::warn;

/// Errors raised writing the immutable parts of a run's journal. Event
/// appends and retention pruning never raise: they downgrade to a logged
/// warning instead of failing the run.
#[derive(Debug, Error)]
pub enum JournalError {
    /// The run directory or snapshot file could not be written.
    #[error("journal io error: {0}")]
    Io(#[from] studio_core::core::host::HostError),
    /// The snapshot could not be serialized to JSON.
    #[error("failed to serialize run snapshot: {0}")]
    Serialize(String),
}

/// A single run's on-disk journal: snapshot, event log, and the path to the
/// shared run index.
pub struct RunJournal<'a> {
    host: &'a dyn HostEnvironment,
    run_id: RunId,
    run_dir: PathBuf,
    index_path: PathBuf,
}

impl<'a> RunJournal<'a> {
    /// Opens a fresh journal for `run_id` under `assets_root`
    /// (`<project>.assets`), creating `runs/<runId>/` and truncating any
    /// prior `events.ndjson` at that path, defensive against a reused run ID.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the run directory cannot be created.
    pub fn open(
        host: &'a dyn HostEnvironment,
        assets_root: &Path,
        run_id: RunId,
    ) -> Result<Self, JournalError> {
        let run_dir = assets_root.join("runs").join(run_id.as_str());
        host.mkdir_all(&run_dir)?;
        let events_path = run_dir.join("events.ndjson");
        if host.exists(&events_path) {
            host.remove(&events_path)?;
        }
        Ok(Self {
            host,
            run_id,
            run_dir,
            index_path: assets_root.join("runs").join("index.json"),
        })
    }

    /// Path to this run's directory.
    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Writes the immutable run snapshot once. Callers MUST write this
    /// before emitting `run.started`, per the scheduler's run lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the snapshot cannot be serialized or
    /// written.
    pub fn write_snapshot(&self, snapshot: &RunSnapshot) -> Result<(), JournalError> {
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| JournalError::Serialize(e.to_string()))?;
        self.host.write_binary(&self.run_dir.join("snapshot.json"), &bytes)?;
        Ok(())
    }

    /// Appends one NDJSON line for `event`. Serialization failures are
    /// logged and swallowed: a malformed event must never abort a run.
    pub fn append_event(&self, event: &RunEvent) {
        let Ok(mut line) = serde_json::to_vec(event) else {
            warn!(run_id = %self.run_id, "failed to serialize run event");
            return;
        };
        line.push(b'\n');
        if let Err(err) = self.host.append(&self.run_dir.join("events.ndjson"), &line) {
            warn!(run_id = %self.run_id, error = %err, "failed to append run event");
        }
    }

    /// Appends `summary` to the shared run index and prunes it to the newest
    /// `max_runs` entries (ordered by `startedAt`), best-effort deleting the
    /// pruned run directories. Any failure here is logged, never fatal.
    pub fn record_summary(&self, summary: RunSummary, max_runs: u32) {
        let mut index = RunIndex::load(self.host, &self.index_path);
        index.runs.retain(|r| r.run_id != summary.run_id);
        index.runs.push(summary);
        index.runs.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        let keep_from = index.runs.len().saturating_sub(max_runs as usize);
        let pruned: Vec<RunSummary> = index.runs.drain(..keep_from).collect();

        if let Err(err) = index.save(self.host, &self.index_path) {
            warn!(error = %err, "failed to persist run index");
        }

        for run in pruned {
            let dir = self
                .index_path
                .parent()
                .map(|p| p.join(run.run_id.as_str()))
                .unwrap_or_else(|| PathBuf::from(run.run_id.as_str()));
            if let Err(err) = self.host.remove(&dir) {
                warn!(run_id = %run.run_id, error = %err, "failed to prune run directory");
            }
        }
    }
}

/// The `runs/index.json` document: the run summary list consumers read for
/// `getRecentRuns`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct RunIndex {
    #[serde(default)]
    runs: Vec<RunSummary>,
}

impl RunIndex {
    fn load(host: &dyn HostEnvironment, path: &Path) -> Self {
        if !host.exists(path) {
            return Self::default();
        }
        host.read_binary(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn save(
        &self,
        host: &dyn HostEnvironment,
        path: &Path,
    ) -> Result<(), studio_core::core::host::HostError> {
        let bytes = serde_json::to_vec_pretty(self).unwrap_or_default();
        host.write_binary(path, &bytes)
    }
}

/// Reads the newest-first run summary list from `<assets_root>/runs/index.json`,
/// for the Service Facade's `recent_runs` entry point.
#[must_use]
pub fn recent_runs(host: &dyn HostEnvironment, assets_root: &Path) -> Vec<RunSummary> {
    let index_path = assets_root.join("runs").join("index.json");
    let mut runs = RunIndex::load(host, &index_path).runs;
    runs.reverse();
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FsHostEnvironment;
    use studio_core::RunStatus;

    fn summary(run_id: &str, started_at: &str) -> RunSummary {
        RunSummary {
            run_id: RunId::from(run_id),
            status: RunStatus::Success,
            started_at: started_at.to_string(),
            finished_at: Some(started_at.to_string()),
            error: None,
            executed_node_ids: vec![],
            cached_node_ids: vec![],
        }
    }

    #[test]
    fn retention_keeps_only_the_newest_max_runs_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FsHostEnvironment::new(dir.path());
        let assets_root = dir.path().join("proj.assets");

        for (i, id) in ["r1", "r2", "r3"].iter().enumerate() {
            let journal = RunJournal::open(&host, &assets_root, RunId::from(*id)).expect("open");
            journal.record_summary(summary(id, &format!("2026-01-0{}T00:00:00Z", i + 1)), 2);
        }

        let runs = recent_runs(&host, &assets_root);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, RunId::from("r3"));
        assert_eq!(runs[1].run_id, RunId::from("r2"));
        assert!(!host.exists(&assets_root.join("runs").join("r1")));
    }

    #[test]
    fn events_append_as_ndjson_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FsHostEnvironment::new(dir.path());
        let assets_root = dir.path().join("proj.assets");
        let journal = RunJournal::open(&host, &assets_root, RunId::from("r1")).expect("open");

        journal.append_event(&RunEvent {
            run_id: RunId::from("r1"),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            kind: studio_core::RunEventKind::RunStarted {
                snapshot_hash: "abc".to_string(),
            },
        });
        journal.append_event(&RunEvent {
            run_id: RunId::from("r1"),
            timestamp: "2026-01-01T00:00:01Z".to_string(),
            kind: studio_core::RunEventKind::RunCompleted {
                status: RunStatus::Success,
            },
        });

        let bytes = host
            .read_binary(&journal.run_dir().join("events.ndjson"))
            .expect("read");
        let text = String::from_utf8(bytes).expect("utf8");
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().next().expect("line").contains("run.started"));
    }

    #[test]
    fn opening_truncates_a_stale_event_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = FsHostEnvironment::new(dir.path());
        let assets_root = dir.path().join("proj.assets");
        {
            let journal = RunJournal::open(&host, &assets_root, RunId::from("r1")).expect("open");
            journal.append_event(&RunEvent {
                run_id: RunId::from("r1"),
                timestamp: "2026-01-01T00:00:00Z".to_string(),
                kind: studio_core::RunEventKind::RunStarted {
                    snapshot_hash: "abc".to_string(),
                },
            });
        }
        let journal = RunJournal::open(&host, &assets_root, RunId::from("r1")).expect("reopen");
        assert!(!host.exists(&journal.run_dir().join("events.ndjson")));
    }
}
