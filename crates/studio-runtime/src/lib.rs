// studio-runtime/src/lib.rs
// ============================================================================
// Crate: studio-runtime
// Description: The Scheduler & Runtime and the Service Facade.
// Purpose: Drive a compiled graph's dependency-ordered, capability-bounded
//          execution and expose the single orchestration entry point a host
//          embeds against.
// ============================================================================

//! # studio-runtime
//!
//! Wires every other Studio crate together: [`scheduler::Runtime`] drives one
//! run of a compiled graph (credit preflight, compile, schedule, journal),
//! [`capability::CapabilityLimits`] bounds per-capability-class concurrency,
//! [`project_lock::ProjectLockMap`] serializes runs per project path, and
//! [`facade::Facade`] composes a `ProjectStore` with a `Runtime` behind the
//! seven host-facing entry points (`open_project`, `create_project`,
//! `save_project`, `run`, `run_scoped`, `recent_runs`, `add_grant`).

pub mod capability;
pub mod error;
pub mod facade;
pub mod project_lock;
pub mod scheduler;

pub use capability::CapabilityLimits;
pub use error::FacadeError;
pub use error::RuntimeError;
pub use facade::Facade;
pub use project_lock::ProjectLockMap;
pub use scheduler::Runtime;
pub use scheduler::assets_root_for;
