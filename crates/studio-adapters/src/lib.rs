// studio-adapters/src/lib.rs
// ============================================================================
// Module: Studio Adapters Library
// Description: HTTP-backed implementation of `studio_core::interfaces::Adapter`.
// Purpose: Provide the remote/local text, image, transcription, and credit
//          provider surfaces, globally serialized to preserve turn order.
// Dependencies: reqwest, studio-core, tokio
// ============================================================================

//! ## Overview
//! [`HttpAdapter`] is the single concrete [`Adapter`] implementation: remote
//! calls go out over `reqwest` with `rustls`-backed TLS, local text
//! generation shells out through the injected [`Sandbox`]. Turn serialization
//! is enforced by [`TurnQueues`], a pair of `tokio::sync::Mutex<()>` queues
//! the caller owns once (for the life of the process) and shares by `Arc`
//! into every `HttpAdapter` it constructs: at most one managed text turn in
//! flight process-wide, and local turns separately globally serialized,
//! independent of however many runs or nodes are concurrently scheduled.

pub mod clock;
pub mod credits;
pub mod fnv;
pub mod image;
pub mod retry;
pub mod text;
pub mod transcription;

use std::sync::Arc;
use std::sync::Once;

use async_trait::async_trait;
use studio_core::interfaces::Adapter;
use studio_core::interfaces::AdapterError;
use studio_core::interfaces::AssetStore;
use studio_core::interfaces::CreditEstimate;
use studio_core::interfaces::HostEnvironment;
use studio_core::interfaces::ImageGenerationRequest;
use studio_core::interfaces::ImageGenerationResult;
use studio_core::interfaces::PermissionManager;
use studio_core::interfaces::Sandbox;
use studio_core::interfaces::TextGenerationRequest;
use studio_core::interfaces::TextGenerationResult;
use studio_core::interfaces::TextProvider;
use studio_core::interfaces::TranscriptionRequest;
use studio_core::interfaces::TranscriptionResult;
use studio_core::Project;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::image::ImageEndpoints;

static CRYPTO_PROVIDER_INSTALL: Once = Once::new();

/// Installs the process-wide `rustls` crypto provider exactly once. Required
/// because `reqwest`'s `rustls-tls` feature does not install a default
/// provider for us when another crate in the dependency graph also links
/// `rustls`.
fn install_crypto_provider() {
    CRYPTO_PROVIDER_INSTALL.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// Remote HTTPS endpoints the adapter issues calls against, host-approved
/// and passed through `assertNetworkUrl` before every call.
#[derive(Clone)]
pub struct AdapterEndpoints {
    /// Managed text generation "turn" endpoint.
    pub turns_url: String,
    /// Image generation endpoints.
    pub image: ImageEndpoints,
    /// Transcription submission endpoint.
    pub transcribe_url: String,
    /// Credit balance endpoint.
    pub credits_url: String,
}

/// The two turn-serialization queues spec §4.11.1 requires: at most one
/// managed text turn in flight process-wide, and local `pi` turns separately
/// globally serialized. Owned once by the long-lived [`crate::HttpAdapter`]'s
/// caller (`studio-runtime`'s `Runtime`) and shared by `Arc` into every
/// per-run adapter instance, so serialization holds across concurrent runs
/// against different projects, not just within one run.
#[derive(Default)]
pub struct TurnQueues {
    managed: Mutex<()>,
    local: Mutex<()>,
}

impl TurnQueues {
    /// Builds a fresh, unlocked pair of turn queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// HTTP-backed [`Adapter`] implementation wiring the text, image,
/// transcription, and credit provider surfaces together.
pub struct HttpAdapter {
    http: reqwest::Client,
    permissions: Arc<dyn PermissionManager>,
    sandbox: Arc<dyn Sandbox>,
    assets: Arc<dyn AssetStore>,
    host: Arc<dyn HostEnvironment>,
    clock: Arc<dyn Clock>,
    endpoints: AdapterEndpoints,
    turns: Arc<TurnQueues>,
}

impl HttpAdapter {
    /// Builds an adapter over the given capability surfaces and remote
    /// endpoints, using the real system clock for retry/poll timing.
    /// `turns` must be the single process-wide [`TurnQueues`] instance shared
    /// by every adapter constructed for every run, never a fresh one per run.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        permissions: Arc<dyn PermissionManager>,
        sandbox: Arc<dyn Sandbox>,
        assets: Arc<dyn AssetStore>,
        host: Arc<dyn HostEnvironment>,
        endpoints: AdapterEndpoints,
        turns: Arc<TurnQueues>,
    ) -> Self {
        Self::with_clock(
            http,
            permissions,
            sandbox,
            assets,
            host,
            endpoints,
            turns,
            Arc::new(SystemClock),
        )
    }

    /// Builds an adapter with an injected clock, for deterministic testing
    /// of the image generation retry/poll loop.
    #[must_use]
    pub fn with_clock(
        http: reqwest::Client,
        permissions: Arc<dyn PermissionManager>,
        sandbox: Arc<dyn Sandbox>,
        assets: Arc<dyn AssetStore>,
        host: Arc<dyn HostEnvironment>,
        endpoints: AdapterEndpoints,
        turns: Arc<TurnQueues>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        install_crypto_provider();
        Self {
            http,
            permissions,
            sandbox,
            assets,
            host,
            clock,
            endpoints,
            turns,
        }
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    async fn generate_text(
        &self,
        request: TextGenerationRequest,
    ) -> Result<TextGenerationResult, AdapterError> {
        match &request.provider {
            TextProvider::Managed => {
                let _permit = self.turns.managed.lock().await;
                text::run_managed_turn(&self.http, &self.permissions, &self.endpoints.turns_url, &request).await
            }
            TextProvider::Local { .. } => {
                let _permit = self.turns.local.lock().await;
                text::run_local_generation(&self.sandbox, self.host.base_path(), &request).await
            }
        }
    }

    async fn generate_image(
        &self,
        request: ImageGenerationRequest,
    ) -> Result<ImageGenerationResult, AdapterError> {
        image::generate_image(
            &self.http,
            &self.permissions,
            &self.assets,
            self.clock.as_ref(),
            &self.endpoints.image,
            request,
            "systemsculpt-image",
        )
        .await
    }

    async fn transcribe(
        &self,
        request: TranscriptionRequest,
    ) -> Result<TranscriptionResult, AdapterError> {
        transcription::transcribe(
            &self.http,
            &self.permissions,
            &self.assets,
            &self.host,
            &self.endpoints.transcribe_url,
            request,
        )
        .await
    }

    async fn estimate_run_credits(&self, project: &Project) -> CreditEstimate {
        credits::estimate_run_credits(&self.http, &self.permissions, &self.endpoints.credits_url, project).await
    }
}
