// studio-core/src/interfaces/mod.rs
// ============================================================================
// Module: Studio Capability Interfaces
// Description: Backend-agnostic traits for node execution, storage, the
//              permission-gated sandbox, and the remote/local adapter layer.
// Purpose: Define the contract surfaces the Scheduler drives and that
//          `studio-store`, `studio-sandbox`, and `studio-adapters` implement.
// Dependencies: async-trait, serde, thiserror, tokio-util, crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the Studio runtime reaches storage, the sandbox, and
//! external adapters without embedding any backend-specific detail into the
//! scheduler. Every capability crate in this workspace implements one or more
//! of these traits; `studio-runtime` assembles concrete implementations into
//! a [`ServiceBundle`] and hands it to each node's [`ExecutionContext`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::core::host::HostEnvironment;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::RunId;
use crate::core::project::NodeInstance;
use crate::core::project::Project;
use crate::core::registry::NodeDefinition;
use crate::core::registry::PortSpec;
use crate::core::run::AssetRef;

// ============================================================================
// SECTION: Node Executor
// ============================================================================

/// The result of running (or trivially satisfying) a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Output port values, keyed by port ID.
    pub outputs: Value,
    /// Any artifacts the node produced, for cache entries and `node.output`.
    #[serde(default)]
    pub artifacts: Vec<AssetRef>,
    /// The primary artifact reference surfaced on `node.output`, if any.
    #[serde(default)]
    pub output_ref: Option<String>,
}

impl NodeOutput {
    /// An empty output, used to satisfy dependents of a disabled node or a
    /// `continueOnError` node that failed.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            outputs: Value::Object(serde_json::Map::new()),
            artifacts: Vec::new(),
            output_ref: None,
        }
    }
}

/// A node execution failure. Carried on `node.failed` and, unless the node
/// has `continueOnError = true`, aborts the run.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct NodeExecutionError {
    /// Human-readable error message.
    pub message: String,
    /// Optional error stack/cause chain.
    pub stack: Option<String>,
}

impl NodeExecutionError {
    /// Builds an error carrying only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Builds an error carrying a message and a cause chain.
    #[must_use]
    pub fn with_stack(message: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: Some(stack.into()),
        }
    }
}

/// The per-node execution context the Scheduler builds and hands to
/// [`NodeExecutor::execute`].
pub struct ExecutionContext {
    /// The run this execution belongs to.
    pub run_id: RunId,
    /// The scoped project path the run was opened against.
    pub project_path: PathBuf,
    /// The node instance being executed.
    pub node: NodeInstance,
    /// Resolved inputs by input port ID: a single value, or a JSON array in
    /// edge order when more than one inbound edge targets the same port.
    pub inputs: Value,
    /// The shared cooperative cancellation signal for this run.
    pub cancellation: CancellationToken,
    /// Capability-scoped services available to this node.
    pub services: ServiceBundle,
    /// Structured logging span for this node's execution.
    pub log: tracing::Span,
}

impl ExecutionContext {
    /// True once the run's shared cancellation signal has fired; node
    /// implementations must check this at every meaningful yield point.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// The executable behavior bound to a [`NodeDefinition`].
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Resolves this node's effective input/output ports given its config.
    /// The default returns the definition's statically declared ports
    /// unchanged; variadic ("dataset") node kinds override this to add
    /// config-dependent ports.
    ///
    /// # Errors
    ///
    /// Returns a message describing why the config cannot be resolved into a
    /// port set; surfaced to the compiler as `InvalidNodeConfig`.
    fn resolve_ports(
        &self,
        _config: &Value,
        definition: &NodeDefinition,
    ) -> Result<(Vec<PortSpec>, Vec<PortSpec>), String> {
        Ok((definition.input_ports.clone(), definition.output_ports.clone()))
    }

    /// Executes the node against `ctx`, producing outputs or a fatal error.
    ///
    /// # Errors
    ///
    /// Returns [`NodeExecutionError`] on any failure; the Scheduler decides
    /// whether it aborts the run or is swallowed per `continueOnError`.
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeExecutionError>;
}

// ============================================================================
// SECTION: Asset Store
// ============================================================================

/// Errors raised storing or reading content-addressed blobs.
#[derive(Debug, Error)]
pub enum AssetStoreError {
    /// The backing adapter cannot supply binary reads/writes.
    #[error("asset store io unavailable: {0}")]
    IoUnavailable(String),
}

/// Content-addressed blob storage keyed by SHA-256, sharded by the first two
/// hex characters of the hash.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Stores `bytes` under their SHA-256 hash, skipping the write if the
    /// hash already has a stored representation.
    ///
    /// # Errors
    ///
    /// Returns [`AssetStoreError`] if the bytes cannot be written.
    async fn store(&self, bytes: &[u8], mime: &str) -> Result<AssetRef, AssetStoreError>;

    /// Reads the stored bytes for `asset`.
    ///
    /// # Errors
    ///
    /// Returns [`AssetStoreError`] if the bytes cannot be read.
    async fn read(&self, asset: &AssetRef) -> Result<Vec<u8>, AssetStoreError>;
}

// ============================================================================
// SECTION: Secret Store
// ============================================================================

/// Errors raised resolving a named secret reference.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// No keychain backend is available on this host.
    #[error("secret store unavailable")]
    Unavailable,
    /// The named reference has no value in the backend.
    #[error("secret unavailable: {0}")]
    SecretUnavailable(String),
}

/// Lookup of named secret references from an OS keychain or equivalent.
/// Absence of a backend is a feature flag, not a construction-time error.
pub trait SecretStore: Send + Sync {
    /// True if a keychain backend is present on this host.
    fn is_available(&self) -> bool;

    /// Resolves `reference_id` to its secret value.
    ///
    /// # Errors
    ///
    /// Returns [`SecretStoreError::Unavailable`] if no backend is present, or
    /// [`SecretStoreError::SecretUnavailable`] if the reference is unknown.
    fn get_secret(&self, reference_id: &str) -> Result<String, SecretStoreError>;
}

// ============================================================================
// SECTION: Permission Manager
// ============================================================================

/// Errors raised by a denied capability assertion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("permission denied: capability={capability} subject={subject}")]
pub struct PermissionError {
    /// The capability surface that denied the request.
    pub capability: &'static str,
    /// The specific path, command, or URL that was denied.
    pub subject: String,
}

/// Per-capability allow-list enforcement over a policy snapshot held for a
/// run.
pub trait PermissionManager: Send + Sync {
    /// Asserts `path` is authorized under some `filesystem` grant.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] if no grant authorizes `path`.
    fn assert_filesystem_path(&self, path: &Path) -> Result<(), PermissionError>;

    /// Asserts `command` is authorized under some `cli` grant.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] if no grant authorizes `command`.
    fn assert_cli_command(&self, command: &str) -> Result<(), PermissionError>;

    /// Asserts `url` is `https:` and authorized under some `network` grant.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError`] if the scheme is not `https:` or no grant
    /// authorizes the URL's host.
    fn assert_network_url(&self, url: &str) -> Result<(), PermissionError>;
}

// ============================================================================
// SECTION: Sandbox Runner
// ============================================================================

/// A subprocess invocation request.
#[derive(Debug, Clone)]
pub struct CliRequest {
    /// The executable to invoke; never shell-interpreted.
    pub command: String,
    /// Argument vector, passed verbatim.
    pub args: Vec<String>,
    /// Working directory for the child process.
    pub working_dir: PathBuf,
    /// Environment overlay, merged over the current process environment.
    pub env: BTreeMap<String, String>,
    /// Timeout, clamped to a minimum of 100 ms.
    pub timeout_ms: u64,
    /// Maximum captured bytes per stream, clamped to a minimum of 1 KiB.
    pub max_output_bytes: usize,
}

impl CliRequest {
    /// The minimum allowed timeout.
    pub const MIN_TIMEOUT_MS: u64 = 100;
    /// The default timeout (30s).
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
    /// The minimum allowed per-stream output cap.
    pub const MIN_OUTPUT_BYTES: usize = 1024;
    /// The default per-stream output cap (256 KiB).
    pub const DEFAULT_OUTPUT_BYTES: usize = 256 * 1024;
}

/// The observed outcome of a subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOutcome {
    /// The process's exit code, or `1` if the runtime exited without one.
    pub exit_code: i32,
    /// Captured standard output, truncated at the request's byte cap.
    pub stdout: Vec<u8>,
    /// Captured standard error, truncated at the request's byte cap.
    pub stderr: Vec<u8>,
    /// True if the process was hard-killed after exceeding its timeout.
    pub timed_out: bool,
}

/// Errors raised running a sandboxed subprocess.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The embedding host does not support subprocess execution.
    #[error("unsupported environment")]
    UnsupportedEnvironment,
    /// The requested capability was denied.
    #[error(transparent)]
    Permission(#[from] PermissionError),
    /// The child process could not be spawned.
    #[error("failed to spawn process: {0}")]
    Spawn(String),
}

/// Subprocess execution with CWD/env/arg/stdin policy, timeout, and output
/// truncation, gated by a permission preflight.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Runs `request` to completion or timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError`] if the environment is unsupported, the
    /// command/working-directory preflight is denied, or the process cannot
    /// be spawned.
    async fn run_cli(&self, request: CliRequest) -> Result<CliOutcome, SandboxError>;
}

// ============================================================================
// SECTION: Adapter Layer
// ============================================================================

/// Errors raised by the remote/local adapter layer.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// A non-2xx HTTP response, carrying the status and a body prefix.
    #[error("adapter http error: status={status} body={body_prefix}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// First 240 bytes of the response body.
        body_prefix: String,
    },
    /// A `409 turn_in_flight` conflict from the managed text provider.
    #[error("adapter conflict: {reason}")]
    Conflict {
        /// Server-reported reason.
        reason: String,
        /// Server-reported retry-after timestamp, if present.
        lock_until: Option<String>,
    },
    /// A transient failure eligible for retry within the adapter call.
    #[error("adapter transient error: {0}")]
    Transient(String),
    /// The requested capability was denied.
    #[error(transparent)]
    Permission(#[from] PermissionError),
    /// A local subprocess (e.g. `pi`) failed.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// A text generation provider selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextProvider {
    /// The managed remote provider, serialized through a single global turn
    /// queue.
    Managed,
    /// A local model invoked via the external `pi` binary, serialized
    /// through a separate global queue.
    Local {
        /// Normalized `provider/model` token.
        model: String,
    },
}

/// A text generation request.
#[derive(Debug, Clone)]
pub struct TextGenerationRequest {
    /// The owning run.
    pub run_id: RunId,
    /// The requesting node.
    pub node_id: NodeId,
    /// Optional system prompt.
    pub system: Option<String>,
    /// User message text.
    pub user: String,
    /// Which provider mode to use.
    pub provider: TextProvider,
}

/// A text generation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextGenerationResult {
    /// The generated, trimmed text.
    pub text: String,
    /// The model identifier that produced it.
    pub model: String,
}

/// An image generation request.
#[derive(Debug, Clone)]
pub struct ImageGenerationRequest {
    /// The owning run.
    pub run_id: RunId,
    /// The requesting node.
    pub node_id: NodeId,
    /// The generation prompt.
    pub prompt: String,
    /// Reference input images, if any.
    pub reference_images: Vec<AssetRef>,
    /// Number of images requested.
    pub count: u32,
    /// Aspect ratio token (provider-defined).
    pub aspect_ratio: String,
    /// The retry attempt number, starting at 1.
    pub attempt: u32,
}

/// An image generation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageGenerationResult {
    /// The generated assets, already routed through the Asset Store.
    pub assets: Vec<AssetRef>,
    /// The model identifier that produced them.
    pub model: String,
}

/// A transcription request.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    /// The owning run.
    pub run_id: RunId,
    /// The requesting node.
    pub node_id: NodeId,
    /// The source audio asset.
    pub audio: AssetRef,
}

/// A transcription result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionResult {
    /// The transcribed text.
    pub text: String,
}

/// The outcome of a credit preflight check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditEstimate {
    /// True if the run may proceed.
    pub ok: bool,
    /// A human-readable reason, populated when `ok` is false due to an
    /// exception rather than an exhausted balance.
    pub reason: Option<String>,
}

impl CreditEstimate {
    /// An estimate that always proceeds, used when a scoped graph needs no
    /// remote credits at all.
    #[must_use]
    pub const fn unconstrained() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }
}

/// Remote text/image/transcription adapters plus credit preflight.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Generates text via the managed or local provider.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] on any provider, network, or permission
    /// failure.
    async fn generate_text(
        &self,
        request: TextGenerationRequest,
    ) -> Result<TextGenerationResult, AdapterError>;

    /// Generates one or more images, retrying transient provider failures.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] on any provider, network, or permission
    /// failure, or after exhausting the retry envelope.
    async fn generate_image(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<ImageGenerationResult, AdapterError>;

    /// Transcribes an audio asset.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] on any provider, network, or permission
    /// failure.
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
    ) -> Result<TranscriptionResult, AdapterError>;

    /// Estimates whether `project` may proceed given remaining credits,
    /// without calling the credits endpoint at all if the scoped graph needs
    /// no remote credits.
    async fn estimate_run_credits(&self, project: &Project) -> CreditEstimate;
}

// ============================================================================
// SECTION: Service Bundle
// ============================================================================

/// The capability-scoped services an [`ExecutionContext`] carries: everything
/// a [`NodeExecutor`] may need beyond its own inputs/config.
#[derive(Clone)]
pub struct ServiceBundle {
    /// Content-addressed blob storage.
    pub assets: Arc<dyn AssetStore>,
    /// Named secret lookup.
    pub secrets: Arc<dyn SecretStore>,
    /// Per-capability permission assertions.
    pub permissions: Arc<dyn PermissionManager>,
    /// Subprocess sandbox.
    pub sandbox: Arc<dyn Sandbox>,
    /// Remote/local adapter layer.
    pub adapter: Arc<dyn Adapter>,
    /// Filesystem capability bundle (read/write/mkdir/exists/temp files).
    pub host: Arc<dyn HostEnvironment>,
}
