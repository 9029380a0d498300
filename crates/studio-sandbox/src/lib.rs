// studio-sandbox/src/lib.rs
// ============================================================================
// Module: Studio Sandbox Library
// Description: Permission Manager, Sandbox Runner, and Secret Store.
// Purpose: Implement the capability-gated effect surfaces the scheduler drives.
// Dependencies: studio-core
// ============================================================================

//! ## Overview
//! This crate implements the three capability-scoped interfaces
//! `studio-core` defines but does not itself provide an I/O-performing
//! backend for: [`PermissionManager`](studio_core::interfaces::PermissionManager)
//! (allow-list enforcement over a policy snapshot), [`Sandbox`](studio_core::interfaces::Sandbox)
//! (subprocess execution), and [`SecretStore`](studio_core::interfaces::SecretStore)
//! (OS keychain lookup). Nothing here is visible to node implementations
//! directly; the Runtime wires concrete instances into each run's
//! `ServiceBundle`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod permissions;
pub mod sandbox;
pub mod secrets;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use permissions::PolicyPermissionManager;
pub use sandbox::ProcessSandbox;
pub use sandbox::resolve_working_dir;
pub use secrets::KeychainSecretStore;
pub use secrets::UnavailableSecretStore;
