// studio-runtime/src/capability.rs
// ============================================================================
// Module: Capability Concurrency Ceilings
// Description: One semaphore per `CapabilityClass`, bounding how many nodes
//              of that class may be mid-execution at once.
// Purpose: Reproduce the reference per-capability-class concurrency limits
//          on top of real OS threads using `tokio::sync::Semaphore`.
// Dependencies: tokio, studio-core
// ============================================================================

//! ## Overview
//! The reference scheduling model is a single-threaded event loop with
//! structural (not OS-threaded) parallelism, bounded per capability class.
//! [`CapabilityLimits`] reproduces the same bound on a multi-threaded runtime:
//! each class gets a fixed-size `Semaphore`, and a node may not begin
//! executing until it holds a permit for its class. `api` and `local_io` each
//! allow two nodes in flight; `local_cpu` allows one, matching the ceilings
//! named in the concurrency model.

use std::sync::Arc;

use studio_core::CapabilityClass;
use tokio::sync::Semaphore;

/// The ceiling for remote/API-bound nodes.
const API_CONCURRENCY: usize = 2;
/// The ceiling for local disk/subprocess-bound nodes.
const LOCAL_IO_CONCURRENCY: usize = 2;
/// The ceiling for pure local compute nodes.
const LOCAL_CPU_CONCURRENCY: usize = 1;

/// One semaphore per [`CapabilityClass`], sized to the concurrency ceilings
/// above.
pub struct CapabilityLimits {
    api: Arc<Semaphore>,
    local_io: Arc<Semaphore>,
    local_cpu: Arc<Semaphore>,
}

impl CapabilityLimits {
    /// Builds the fixed set of per-class semaphores.
    #[must_use]
    pub fn new() -> Self {
        Self {
            api: Arc::new(Semaphore::new(API_CONCURRENCY)),
            local_io: Arc::new(Semaphore::new(LOCAL_IO_CONCURRENCY)),
            local_cpu: Arc::new(Semaphore::new(LOCAL_CPU_CONCURRENCY)),
        }
    }

    /// Returns the shared semaphore governing `class`.
    #[must_use]
    pub fn semaphore_for(&self, class: CapabilityClass) -> Arc<Semaphore> {
        match class {
            CapabilityClass::Api => self.api.clone(),
            CapabilityClass::LocalIo => self.local_io.clone(),
            CapabilityClass::LocalCpu => self.local_cpu.clone(),
        }
    }
}

impl Default for CapabilityLimits {
    fn default() -> Self {
        Self::new()
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

    #[tokio::test]
    async fn local_cpu_ceiling_admits_exactly_one_at_a_time() {
        let limits = CapabilityLimits::new();
        let sem = limits.semaphore_for(CapabilityClass::LocalCpu);
        let first = sem.clone().acquire_owned().await.expect("permit");
        assert_eq!(sem.available_permits(), 0);
        drop(first);
        assert_eq!(sem.available_permits(), 1);
    }

    #[tokio::test]
    async fn api_and_local_io_share_no_permits() {
        let limits = CapabilityLimits::new();
        let api = limits.semaphore_for(CapabilityClass::Api);
        let io = limits.semaphore_for(CapabilityClass::LocalIo);
        let _a = api.clone().acquire_owned().await.expect("permit");
        assert_eq!(io.available_permits(), 2);
    }
}
