// studio-runtime/src/project_lock.rs
// ============================================================================
// Module: Per-Project Run Serialization
// Description: Guarantees at most one run per project path is active at a
//              time, with additional requests queued FIFO.
// Purpose: Implement the concurrency model's "project runs" ordering
//          guarantee without a central dispatcher thread.
// Dependencies: tokio, std::sync
// ============================================================================

//! ## Overview
//! [`ProjectLockMap`] maps a normalized project path to a `tokio::sync::Mutex`
//! acquired for the duration of a run. Adapted from the turn-serialization
//! lock map pattern: unlike a per-session chat turn, a queued run must never
//! be rejected as busy, so [`ProjectLockMap::acquire`] always awaits rather
//! than attempting a non-blocking acquire first — every caller eventually
//! runs, in the order it called `acquire`, which is what `tokio::sync::Mutex`
//! already guarantees for its waiters.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::OwnedMutexGuard;

/// Per-project-path FIFO serialization for runs.
#[derive(Default)]
pub struct ProjectLockMap {
    locks: StdMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl ProjectLockMap {
    /// Builds an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Awaits exclusive access to `project_path`, queuing FIFO behind any
    /// run already holding it. The returned guard releases the lock on drop.
    pub async fn acquire(&self, project_path: &Path) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            locks
                .entry(project_path.to_path_buf())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test]
    async fn different_projects_do_not_contend() {
        let locks = Arc::new(ProjectLockMap::new());
        let a = locks.acquire(&PathBuf::from("/a/project.json")).await;
        let b = locks.acquire(&PathBuf::from("/b/project.json")).await;
        drop(a);
        drop(b);
    }

    #[tokio::test]
    async fn same_project_runs_are_fifo_serialized() {
        let locks = Arc::new(ProjectLockMap::new());
        let order = Arc::new(StdMutex::new(Vec::new()));
        let path = PathBuf::from("/p/project.json");

        let first = locks.acquire(&path).await;

        let locks2 = locks.clone();
        let order2 = order.clone();
        let path2 = path.clone();
        let waiter = tokio::spawn(async move {
            let _guard = locks2.acquire(&path2).await;
            order2
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(2);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        order
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(1);
        drop(first);
        waiter.await.expect("waiter completes");

        assert_eq!(
            *order.lock().unwrap_or_else(std::sync::PoisonError::into_inner),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn queue_depth_is_unbounded_unlike_a_busy_reject() {
        let locks = Arc::new(ProjectLockMap::new());
        let path = PathBuf::from("/p/project.json");
        let completed = Arc::new(AtomicU32::new(0));
        let guard = locks.acquire(&path).await;

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let locks = locks.clone();
            let path = path.clone();
            let completed = completed.clone();
            waiters.push(tokio::spawn(async move {
                let _guard = locks.acquire(&path).await;
                completed.fetch_add(1, Ordering::SeqCst);
            }));
        }

        drop(guard);
        for waiter in waiters {
            waiter.await.expect("waiter completes");
        }
        assert_eq!(completed.load(Ordering::SeqCst), 3);
    }
}
