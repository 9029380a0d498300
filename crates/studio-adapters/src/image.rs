// studio-adapters/src/image.rs
// ============================================================================
// Module: Image Generation Adapter
// Description: Upload, submit, poll, download sequence with retry.
// Purpose: Implement `Adapter::generate_image`'s full job lifecycle.
// Dependencies: reqwest, serde_json, studio-core, crate::{retry, fnv, clock}
// ============================================================================

//! ## Overview
//! Image generation uploads any reference images, submits a generation job
//! under an idempotency key that changes on every retry, polls until
//! completion, and routes each output URL through the Asset Store. Transient
//! failures are retried per [`crate::retry`]; the job-lifecycle logic itself
//! is independent of the retry loop so it can be tested without sleeping.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use studio_core::interfaces::AdapterError;
use studio_core::interfaces::AssetStore;
use studio_core::interfaces::ImageGenerationRequest;
use studio_core::interfaces::ImageGenerationResult;
use studio_core::interfaces::PermissionManager;
use studio_core::AssetRef;

use crate::clock::Clock;
use crate::fnv::fnv1a_hex;
use crate::retry::MAX_POLL_WAIT;
use crate::retry::POLL_INTERVAL;
use crate::retry::retry_with_backoff;

/// HTTPS endpoints the image adapter calls, host-allowlisted.
#[derive(Clone)]
pub struct ImageEndpoints {
    /// Endpoint returning preflighted PUT URLs for reference image uploads.
    pub prepare_uploads_url: String,
    /// Endpoint accepting a generation job submission.
    pub create_job_url: String,
    /// Endpoint template (containing `{job_id}`) polled for job status.
    pub poll_job_url_template: String,
}

/// Builds the idempotency key for a single attempt, guaranteeing a fresh key
/// on every resubmit by folding the attempt number into the suffix.
#[must_use]
pub fn idempotency_key(
    run_id: &str,
    model: &str,
    attempt: u32,
    prompt: &str,
    aspect_ratio: &str,
    count: u32,
    input_signature: &str,
) -> String {
    let signature_input = format!("{prompt}|{aspect_ratio}|{count}|{input_signature}");
    let hash = fnv1a_hex(&signature_input);
    format!("studio-image-{run_id}-{model}-r{attempt}-{hash}")
}

#[derive(Serialize)]
struct CreateJobBody<'a> {
    prompt: &'a str,
    input_images: &'a [String],
    options: CreateJobOptions<'a>,
}

#[derive(Serialize)]
struct CreateJobOptions<'a> {
    count: u32,
    aspect_ratio: &'a str,
}

#[derive(Deserialize)]
struct CreateJobResponse {
    #[serde(rename = "jobId")]
    job_id: String,
}

#[derive(Deserialize)]
struct PollResponse {
    status: String,
    #[serde(default)]
    outputs: Vec<PollOutput>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct PollOutput {
    url: String,
    mime: String,
}

#[derive(Deserialize)]
struct PrepareUploadsResponse {
    slots: Vec<PreparedUploadSlot>,
}

#[derive(Deserialize)]
struct PreparedUploadSlot {
    #[serde(rename = "putUrl")]
    put_url: String,
    #[serde(rename = "uploadedRef")]
    uploaded_ref: String,
    #[serde(rename = "descriptor")]
    descriptor: UploadedDescriptor,
}

/// The provider's echo of what it received for a single reference upload,
/// checked against the local asset it was derived from.
#[derive(Deserialize)]
struct UploadedDescriptor {
    hash: String,
    mime: String,
    #[serde(rename = "sizeBytes")]
    size_bytes: u64,
}

/// Generates one or more images, retrying transient provider failures for up
/// to 12 attempts or 30 minutes total.
///
/// # Errors
///
/// Returns [`AdapterError`] on permission denial or after the retry envelope
/// is exhausted.
pub async fn generate_image(
    http: &reqwest::Client,
    permissions: &Arc<dyn PermissionManager>,
    assets: &Arc<dyn AssetStore>,
    clock: &dyn Clock,
    endpoints: &ImageEndpoints,
    request: ImageGenerationRequest,
    model: &str,
) -> Result<ImageGenerationResult, AdapterError> {
    retry_with_backoff(clock, request.attempt, |attempt| {
        let mut attempt_request = request.clone();
        attempt_request.attempt = attempt;
        generate_image_once(http, permissions, assets, clock, endpoints, &attempt_request, model)
    })
    .await
}

async fn generate_image_once(
    http: &reqwest::Client,
    permissions: &Arc<dyn PermissionManager>,
    assets: &Arc<dyn AssetStore>,
    clock: &dyn Clock,
    endpoints: &ImageEndpoints,
    request: &ImageGenerationRequest,
    model: &str,
) -> Result<ImageGenerationResult, AdapterError> {
    let input_refs = upload_reference_images(http, permissions, assets, endpoints, request).await?;

    let input_signature = input_refs
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let key = idempotency_key(
        &request.run_id.to_string(),
        model,
        request.attempt,
        &request.prompt,
        &request.aspect_ratio,
        request.count,
        &input_signature,
    );

    permissions.assert_network_url(&endpoints.create_job_url)?;
    let response = http
        .post(&endpoints.create_job_url)
        .header("Idempotency-Key", &key)
        .json(&CreateJobBody {
            prompt: &request.prompt,
            input_images: &input_refs,
            options: CreateJobOptions {
                count: request.count,
                aspect_ratio: &request.aspect_ratio,
            },
        })
        .send()
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(AdapterError::Http {
            status: response.status().as_u16(),
            body_prefix: response.text().await.unwrap_or_default().chars().take(240).collect(),
        });
    }

    let created: CreateJobResponse = response
        .json()
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;

    let poll_url = endpoints
        .poll_job_url_template
        .replace("{job_id}", &created.job_id);
    permissions.assert_network_url(&poll_url)?;

    let started = clock.now();
    loop {
        let poll_response = http
            .get(&poll_url)
            .send()
            .await
            .map_err(|e| AdapterError::Transient(format!("polling failed: {e}")))?;
        if !poll_response.status().is_success() {
            return Err(AdapterError::Transient(format!(
                "polling failed: status {}",
                poll_response.status()
            )));
        }
        let parsed: PollResponse = poll_response
            .json()
            .await
            .map_err(|e| AdapterError::Transient(format!("polling failed: {e}")))?;

        match parsed.status.as_str() {
            "completed" => {
                let mut stored = Vec::with_capacity(parsed.outputs.len());
                for output in parsed.outputs {
                    stored.push(download_and_store(http, permissions, assets, &output).await?);
                }
                return Ok(ImageGenerationResult {
                    assets: stored,
                    model: model.to_string(),
                });
            }
            "failed" => {
                return Err(AdapterError::Transient(
                    parsed.error.unwrap_or_else(|| "image job failed".to_string()),
                ));
            }
            _ => {
                if clock.now().duration_since(started) >= MAX_POLL_WAIT {
                    return Err(AdapterError::Transient("request timed out".to_string()));
                }
                clock.sleep(POLL_INTERVAL).await;
            }
        }
    }
}

async fn upload_reference_images(
    http: &reqwest::Client,
    permissions: &Arc<dyn PermissionManager>,
    assets: &Arc<dyn AssetStore>,
    endpoints: &ImageEndpoints,
    request: &ImageGenerationRequest,
) -> Result<Vec<String>, AdapterError> {
    if request.reference_images.is_empty() {
        return Ok(Vec::new());
    }

    permissions.assert_network_url(&endpoints.prepare_uploads_url)?;
    let response = http
        .post(&endpoints.prepare_uploads_url)
        .json(&request.reference_images)
        .send()
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;
    if !response.status().is_success() {
        return Err(AdapterError::Http {
            status: response.status().as_u16(),
            body_prefix: response.text().await.unwrap_or_default().chars().take(240).collect(),
        });
    }
    let prepared: PrepareUploadsResponse = response
        .json()
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;

    if prepared.slots.len() != request.reference_images.len() {
        return Err(AdapterError::Transient(
            "prepared upload slot count does not match reference image count".to_string(),
        ));
    }

    let mut uploaded_refs = Vec::with_capacity(prepared.slots.len());
    for (slot, asset) in prepared.slots.iter().zip(request.reference_images.iter()) {
        permissions.assert_network_url(&slot.put_url)?;
        let bytes = assets
            .read(asset)
            .await
            .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;
        let put_response = http
            .put(&slot.put_url)
            .header("Content-Type", &asset.mime)
            .body(bytes)
            .send()
            .await
            .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;
        if !put_response.status().is_success() {
            return Err(AdapterError::Http {
                status: put_response.status().as_u16(),
                body_prefix: String::new(),
            });
        }
        if slot.descriptor.hash != asset.hash
            || slot.descriptor.mime != asset.mime
            || slot.descriptor.size_bytes != asset.size_bytes
        {
            return Err(AdapterError::Transient(format!(
                "uploaded reference image descriptor mismatch for asset {}",
                asset.hash
            )));
        }
        uploaded_refs.push(slot.uploaded_ref.clone());
    }

    Ok(uploaded_refs)
}

async fn download_and_store(
    http: &reqwest::Client,
    permissions: &Arc<dyn PermissionManager>,
    assets: &Arc<dyn AssetStore>,
    output: &PollOutput,
) -> Result<AssetRef, AdapterError> {
    permissions.assert_network_url(&output.url)?;
    let response = http
        .get(&output.url)
        .send()
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;
    if !response.status().is_success() {
        return Err(AdapterError::Http {
            status: response.status().as_u16(),
            body_prefix: String::new(),
        });
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;
    assets
        .store(&bytes, &output.mime)
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_increments_attempt_and_stays_deterministic() {
        let k1 = idempotency_key("run-1", "model-x", 1, "a cat", "16:9", 2, "");
        let k2 = idempotency_key("run-1", "model-x", 2, "a cat", "16:9", 2, "");
        assert!(k1.starts_with("studio-image-run-1-model-x-r1-"));
        assert!(k2.starts_with("studio-image-run-1-model-x-r2-"));
        assert_ne!(k1, k2);
        let k1_again = idempotency_key("run-1", "model-x", 1, "a cat", "16:9", 2, "");
        assert_eq!(k1, k1_again);
    }

    #[test]
    fn idempotency_key_changes_with_prompt() {
        let k1 = idempotency_key("run-1", "model-x", 1, "a cat", "16:9", 2, "");
        let k2 = idempotency_key("run-1", "model-x", 1, "a dog", "16:9", 2, "");
        assert_ne!(k1, k2);
    }
}
