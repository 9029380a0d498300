// studio-nodes/src/test_support.rs
// ============================================================================
// Module: Node Executor Test Doubles
// Description: In-memory HostEnvironment/AssetStore/Adapter/Sandbox mocks and
//              an ExecutionContext builder shared by every node's unit tests.
// Purpose: Avoid re-deriving the same mock ServiceBundle in each node module.
// Dependencies: studio-core, tokio-util
// ============================================================================

//! ## Overview
//! Every built-in node's unit tests need an [`ExecutionContext`] wired to a
//! working but trivial [`ServiceBundle`]. This module supplies one canonical
//! in-memory host plus permissive/configurable stand-ins for the remaining
//! capability traits, so individual node tests only override the one service
//! their behavior actually exercises.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-support code is exercised only by #[cfg(test)] callers."
)]

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use studio_core::AssetRef;
use studio_core::NodeId;
use studio_core::NodeInstance;
use studio_core::Position;
use studio_core::Project;
use studio_core::RunId;
use studio_core::core::host::HostEnvironment;
use studio_core::core::host::HostError;
use studio_core::interfaces::Adapter;
use studio_core::interfaces::AdapterError;
use studio_core::interfaces::AssetStore;
use studio_core::interfaces::AssetStoreError;
use studio_core::interfaces::CliOutcome;
use studio_core::interfaces::CliRequest;
use studio_core::interfaces::CreditEstimate;
use studio_core::interfaces::ExecutionContext;
use studio_core::interfaces::ImageGenerationRequest;
use studio_core::interfaces::ImageGenerationResult;
use studio_core::interfaces::PermissionError;
use studio_core::interfaces::PermissionManager;
use studio_core::interfaces::Sandbox;
use studio_core::interfaces::SandboxError;
use studio_core::interfaces::SecretStore;
use studio_core::interfaces::SecretStoreError;
use studio_core::interfaces::ServiceBundle;
use studio_core::interfaces::TextGenerationRequest;
use studio_core::interfaces::TextGenerationResult;
use studio_core::interfaces::TranscriptionRequest;
use studio_core::interfaces::TranscriptionResult;
use tokio_util::sync::CancellationToken;

/// An in-memory [`HostEnvironment`], seeded directly by tests that need
/// `resolve_absolute`/`read_binary` to see pre-existing bytes.
#[derive(Default)]
pub struct MemoryHost {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    base: PathBuf,
}

impl MemoryHost {
    /// Builds a host rooted at `base` with `path` pre-populated with `bytes`.
    #[must_use]
    pub fn with_file(base: impl Into<PathBuf>, path: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        let host = Self {
            files: Mutex::new(BTreeMap::new()),
            base: base.into(),
        };
        host.files.lock().expect("lock").insert(path.into(), bytes.to_vec());
        host
    }
}

impl HostEnvironment for MemoryHost {
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>, HostError> {
        self.files
            .lock()
            .expect("lock")
            .get(path)
            .cloned()
            .ok_or_else(|| HostError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)))
    }

    fn write_binary(&self, path: &Path, bytes: &[u8]) -> Result<(), HostError> {
        self.files.lock().expect("lock").insert(path.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn mkdir_all(&self, _path: &Path) -> Result<(), HostError> {
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().expect("lock").contains_key(path)
    }

    fn remove(&self, path: &Path) -> Result<(), HostError> {
        self.files.lock().expect("lock").remove(path);
        Ok(())
    }

    fn base_path(&self) -> &Path {
        &self.base
    }

    fn is_desktop(&self) -> bool {
        true
    }
}

/// An in-memory [`AssetStore`] keyed by hex digest rather than a real SHA-256,
/// sufficient for round-tripping bytes through a node test.
#[derive(Default)]
pub struct MockAssetStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

#[async_trait]
impl AssetStore for MockAssetStore {
    async fn store(&self, bytes: &[u8], mime: &str) -> Result<AssetRef, AssetStoreError> {
        let hash = format!("{:x}", bytes.len()) + "-" + mime.replace('/', "-").as_str();
        self.blobs.lock().expect("lock").insert(hash.clone(), bytes.to_vec());
        Ok(AssetRef {
            hash: hash.clone(),
            mime: mime.to_string(),
            size_bytes: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            path: format!("mock://{hash}"),
        })
    }

    async fn read(&self, asset: &AssetRef) -> Result<Vec<u8>, AssetStoreError> {
        self.blobs
            .lock()
            .expect("lock")
            .get(&asset.hash)
            .cloned()
            .ok_or_else(|| AssetStoreError::IoUnavailable("asset not found".to_string()))
    }
}

/// A [`SecretStore`] with no backend present.
pub struct MockSecretStore;

impl SecretStore for MockSecretStore {
    fn is_available(&self) -> bool {
        false
    }

    fn get_secret(&self, _reference_id: &str) -> Result<String, SecretStoreError> {
        Err(SecretStoreError::Unavailable)
    }
}

/// A [`PermissionManager`] that authorizes everything; node tests that need
/// to exercise a denial construct their own stand-in.
pub struct PermissiveManager;

impl PermissionManager for PermissiveManager {
    fn assert_filesystem_path(&self, _path: &Path) -> Result<(), PermissionError> {
        Ok(())
    }

    fn assert_cli_command(&self, _command: &str) -> Result<(), PermissionError> {
        Ok(())
    }

    fn assert_network_url(&self, _url: &str) -> Result<(), PermissionError> {
        Ok(())
    }
}

/// A [`Sandbox`] returning a fixed, configurable [`CliOutcome`].
pub struct MockSandbox {
    outcome: Result<CliOutcome, String>,
}

impl Default for MockSandbox {
    fn default() -> Self {
        Self {
            outcome: Ok(CliOutcome {
                exit_code: 0,
                stdout: Vec::new(),
                stderr: Vec::new(),
                timed_out: false,
            }),
        }
    }
}

impl MockSandbox {
    /// Builds a sandbox that always returns `outcome`.
    #[must_use]
    pub fn returning(outcome: CliOutcome) -> Self {
        Self { outcome: Ok(outcome) }
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn run_cli(&self, _request: CliRequest) -> Result<CliOutcome, SandboxError> {
        self.outcome
            .clone()
            .map_err(SandboxError::Spawn)
    }
}

/// An [`Adapter`] with one canned response per method, each consumed at most
/// once per test.
#[derive(Default)]
pub struct MockAdapter {
    text: Mutex<Option<Result<TextGenerationResult, AdapterError>>>,
    image: Mutex<Option<Result<ImageGenerationResult, AdapterError>>>,
    transcription: Mutex<Option<Result<TranscriptionResult, AdapterError>>>,
}

impl MockAdapter {
    /// Queues the next `generate_text` response.
    #[must_use]
    pub fn with_text(self, result: Result<TextGenerationResult, AdapterError>) -> Self {
        *self.text.lock().expect("lock") = Some(result);
        self
    }

    /// Queues the next `generate_image` response.
    #[must_use]
    pub fn with_image(self, result: Result<ImageGenerationResult, AdapterError>) -> Self {
        *self.image.lock().expect("lock") = Some(result);
        self
    }

    /// Queues the next `transcribe` response.
    #[must_use]
    pub fn with_transcription(self, result: Result<TranscriptionResult, AdapterError>) -> Self {
        *self.transcription.lock().expect("lock") = Some(result);
        self
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn generate_text(
        &self,
        _request: TextGenerationRequest,
    ) -> Result<TextGenerationResult, AdapterError> {
        self.text
            .lock()
            .expect("lock")
            .take()
            .unwrap_or_else(|| Err(AdapterError::Transient("no canned response".to_string())))
    }

    async fn generate_image(
        &self,
        _request: ImageGenerationRequest,
    ) -> Result<ImageGenerationResult, AdapterError> {
        self.image
            .lock()
            .expect("lock")
            .take()
            .unwrap_or_else(|| Err(AdapterError::Transient("no canned response".to_string())))
    }

    async fn transcribe(
        &self,
        _request: TranscriptionRequest,
    ) -> Result<TranscriptionResult, AdapterError> {
        self.transcription
            .lock()
            .expect("lock")
            .take()
            .unwrap_or_else(|| Err(AdapterError::Transient("no canned response".to_string())))
    }

    async fn estimate_run_credits(&self, _project: &Project) -> CreditEstimate {
        CreditEstimate::unconstrained()
    }
}

/// Assembles a [`ServiceBundle`] from the given adapter/sandbox/host, with
/// permissive defaults for storage, secrets, and permissions.
#[must_use]
pub fn service_bundle(
    adapter: Arc<dyn Adapter>,
    sandbox: Arc<dyn Sandbox>,
    host: Arc<dyn HostEnvironment>,
) -> ServiceBundle {
    ServiceBundle {
        assets: Arc::new(MockAssetStore::default()),
        secrets: Arc::new(MockSecretStore),
        permissions: Arc::new(PermissiveManager),
        sandbox,
        adapter,
        host,
    }
}

/// Builds an [`ExecutionContext`] with a single node `n1` carrying `config`
/// and resolved `inputs`, backed by default (permissive, empty) services.
#[must_use]
pub fn test_context(config: Value, inputs: Value) -> ExecutionContext {
    test_context_with(
        config,
        inputs,
        Arc::new(MockAdapter::default()),
        Arc::new(MockSandbox::default()),
        Arc::new(MemoryHost::default()),
    )
}

/// Builds an [`ExecutionContext`] with caller-supplied adapter, sandbox, and
/// host stand-ins, for tests that need to configure one of them.
#[must_use]
pub fn test_context_with(
    config: Value,
    inputs: Value,
    adapter: Arc<dyn Adapter>,
    sandbox: Arc<dyn Sandbox>,
    host: Arc<dyn HostEnvironment>,
) -> ExecutionContext {
    ExecutionContext {
        run_id: RunId::from("run-test"),
        project_path: PathBuf::from("/tmp/project.json"),
        node: NodeInstance {
            id: NodeId::from("n1"),
            kind: "studio.test".into(),
            version: 1,
            title: "test".to_string(),
            position: Position { x: 0.0, y: 0.0 },
            config,
            continue_on_error: false,
            disabled: false,
        },
        inputs,
        cancellation: CancellationToken::new(),
        services: service_bundle(adapter, sandbox, host),
        log: tracing::Span::none(),
    }
}
