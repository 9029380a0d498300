// studio-core/src/lib.rs
// ============================================================================
// Module: Studio Core Library
// Description: Public API surface for the Studio workflow runtime's hard core.
// Purpose: Expose the data model, the capability interfaces, and the pure
//          compile-time logic (compiler, migration, scope projection,
//          fingerprinting, hashing) that every other Studio crate builds on.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Studio core is backend-agnostic: it models the project document, the node
//! registry, the compiled graph, and the capability-scoped interfaces
//! (`HostEnvironment`, `NodeExecutor`) that concrete stores, sandboxes, and
//! adapters implement elsewhere in the workspace. Nothing here performs I/O,
//! spawns a process, or reaches the network — those concerns live in
//! `studio-store`, `studio-sandbox`, and `studio-adapters`, wired together by
//! `studio-runtime`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::compiler::CompileError;
pub use core::compiler::CompiledGraph;
pub use core::compiler::ResolvedNode;
pub use core::compiler::compile;
pub use core::fingerprint::compute_fingerprint;
pub use core::fingerprint::strip_ui_only_fields;
pub use core::hashing::DEFAULT_HASH_ALGORITHM;
pub use core::hashing::HashAlgorithm;
pub use core::hashing::HashDigest;
pub use core::hashing::HashError;
pub use core::hashing::canonical_json_bytes;
pub use core::hashing::hash_bytes;
pub use core::hashing::hash_canonical_json;
pub use core::host::HostEnvironment;
pub use core::host::HostError;
pub use core::identifiers::EdgeId;
pub use core::identifiers::GrantId;
pub use core::identifiers::GroupId;
pub use core::identifiers::MigrationId;
pub use core::identifiers::NodeId;
pub use core::identifiers::NodeKind;
pub use core::identifiers::PortId;
pub use core::identifiers::ProjectId;
pub use core::identifiers::RunId;
pub use core::migration::Migration;
pub use core::migration::MigrationError;
pub use core::migration::MigrationRegistry;
pub use core::policy::Capability;
pub use core::policy::Grant;
pub use core::policy::GrantScope;
pub use core::policy::POLICY_SCHEMA_TAG;
pub use core::policy::PermissionPolicy;
pub use core::project::AppliedMigration;
pub use core::project::CURRENT_PROJECT_SCHEMA_VERSION;
pub use core::project::Edge;
pub use core::project::EngineConfig;
pub use core::project::Graph;
pub use core::project::Group;
pub use core::project::MigrationsState;
pub use core::project::NodeInstance;
pub use core::project::PROJECT_SCHEMA_TAG;
pub use core::project::PermissionsRef;
pub use core::project::Position;
pub use core::project::Project;
pub use core::project::ProjectSettings;
pub use core::project::Retention;
pub use core::registry::CachePolicy;
pub use core::registry::CapabilityClass;
pub use core::registry::ConfigFieldSpec;
pub use core::registry::ConfigFieldType;
pub use core::registry::NodeDefinition;
pub use core::registry::PortSpec;
pub use core::registry::PortType;
pub use core::registry::Registry;
pub use core::registry::never_bypass;
pub use core::run::AssetRef;
pub use core::run::CacheEntry;
pub use core::run::OutputSource;
pub use core::run::RUN_SNAPSHOT_SCHEMA_TAG;
pub use core::run::RunEvent;
pub use core::run::RunEventKind;
pub use core::run::RunSnapshot;
pub use core::run::RunStatus;
pub use core::run::RunSummary;
pub use core::scope::ScopeError;
pub use core::scope::project_scope;
pub use interfaces::ExecutionContext;
pub use interfaces::NodeExecutionError;
pub use interfaces::NodeExecutor;
pub use interfaces::NodeOutput;
