// studio-runtime/src/error.rs
// ============================================================================
// Module: Studio Runtime Errors
// Description: The error taxonomy for the Scheduler & Runtime and the
//              Service Facade.
// Purpose: Fold every fallible stage of a run (open, scope, preflight,
//          compile, execute) and every Facade entry point into two
//          composed `thiserror` enums.
// Dependencies: thiserror, studio-core, studio-store
// ============================================================================

use studio_core::CompileError;
use studio_core::HashError;
use studio_core::ScopeError;
use studio_store::JournalError;
use studio_store::ProjectStoreError;
use thiserror::Error;

/// Errors raised opening, scoping, preflighting, compiling, or executing a
/// run. Everything before "write run snapshot" in the run lifecycle is fatal
/// before a run directory exists; see [`RuntimeError::is_pre_run`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Failed to open or migrate the project/policy documents.
    #[error(transparent)]
    Store(#[from] ProjectStoreError),
    /// The requested scoped entry set does not resolve against the project.
    #[error(transparent)]
    Scope(#[from] ScopeError),
    /// Graph compilation failed; no run directory is created.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// The credit preflight denied the run before compilation.
    #[error("credit preflight denied the run{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    CreditPreflightDenied(Option<String>),
    /// Canonical hashing failed while computing a snapshot hash or fingerprint.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// The run journal could not be opened or written.
    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl RuntimeError {
    /// True for every failure that occurs before a run directory is created
    /// (document open, scope projection, credit preflight, graph compile).
    #[must_use]
    pub const fn is_pre_run(&self) -> bool {
        matches!(
            self,
            Self::Store(_) | Self::Scope(_) | Self::Compile(_) | Self::CreditPreflightDenied(_)
        )
    }
}

/// Errors raised by the Service Facade's entry points, composing
/// [`RuntimeError`] with the document-store failures `open_project`,
/// `create_project`, `save_project`, and `add_grant` may raise directly.
#[derive(Debug, Error)]
pub enum FacadeError {
    /// A scoped run failed; see [`RuntimeError`].
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// Failed to open, create, or save the project/policy documents.
    #[error(transparent)]
    Store(#[from] ProjectStoreError),
}
