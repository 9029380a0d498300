// studio-adapters/src/transcription.rs
// ============================================================================
// Module: Transcription Adapter
// Description: Scratch-file staging and remote transcription submission.
// Purpose: Implement `Adapter::transcribe`.
// Dependencies: reqwest, studio-core
// ============================================================================

//! ## Overview
//! Transcription writes the source audio asset to a scoped temporary file
//! (external transcription services expect a file path, not a byte stream),
//! submits it, and removes the temporary file whether the submission
//! succeeded or failed.

use std::sync::Arc;

use serde::Deserialize;
use studio_core::interfaces::AdapterError;
use studio_core::interfaces::AssetStore;
use studio_core::interfaces::HostEnvironment;
use studio_core::interfaces::TranscriptionRequest;
use studio_core::interfaces::TranscriptionResult;
use studio_core::interfaces::PermissionManager;

/// Directory (relative to the host's base path) scratch audio files are
/// staged under before being handed to the transcription endpoint.
const RUNTIME_TMP_AUDIO_DIR: &str = "SystemSculpt/Studio/.runtime-tmp-audio";

#[derive(Deserialize)]
struct TranscribeResponse {
    text: String,
}

/// Picks a file extension for a staged scratch audio file, preferring the
/// asset's declared MIME type and falling back to its stored path's
/// extension, then a generic default.
#[must_use]
pub fn extension_for(mime: &str, stored_path: &str) -> String {
    let from_mime = match mime {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/ogg" => Some("ogg"),
        "audio/mp4" | "audio/m4a" => Some("m4a"),
        "audio/flac" => Some("flac"),
        "audio/webm" => Some("webm"),
        _ => None,
    };
    if let Some(ext) = from_mime {
        return ext.to_string();
    }
    std::path::Path::new(stored_path)
        .extension()
        .and_then(|e| e.to_str())
        .map_or_else(|| "bin".to_string(), ToString::to_string)
}

/// Transcribes `request.audio`, staging it to a temp file scoped by
/// `run_id` and cleaning it up regardless of outcome.
///
/// # Errors
///
/// Returns [`AdapterError`] on permission denial, staging failure, or a
/// non-2xx response from the transcription endpoint.
pub async fn transcribe(
    http: &reqwest::Client,
    permissions: &Arc<dyn PermissionManager>,
    assets: &Arc<dyn AssetStore>,
    host: &Arc<dyn HostEnvironment>,
    transcribe_url: &str,
    request: TranscriptionRequest,
) -> Result<TranscriptionResult, AdapterError> {
    permissions.assert_network_url(transcribe_url)?;

    let bytes = assets
        .read(&request.audio)
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;

    let ext = extension_for(&request.audio.mime, &request.audio.path);
    let short_hash: String = request.audio.hash.chars().take(12).collect();
    let suffix = format!(".{ext}");
    let dir = host.resolve_absolute(std::path::Path::new(RUNTIME_TMP_AUDIO_DIR));
    let file_name_prefix = format!("{}-{}", request.run_id, short_hash);

    let temp_path = stage_temp_file(host.as_ref(), &dir, &file_name_prefix, &suffix, &bytes)
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;

    let result = submit(http, permissions, transcribe_url, &temp_path, &request).await;

    let _ = host.remove(&temp_path);

    result
}

fn stage_temp_file(
    host: &dyn HostEnvironment,
    dir: &std::path::Path,
    prefix: &str,
    suffix: &str,
    bytes: &[u8],
) -> Result<std::path::PathBuf, studio_core::core::host::HostError> {
    host.mkdir_all(dir)?;
    let path = dir.join(format!("{prefix}{suffix}"));
    host.write_binary(&path, bytes)?;
    Ok(path)
}

async fn submit(
    http: &reqwest::Client,
    permissions: &Arc<dyn PermissionManager>,
    transcribe_url: &str,
    temp_path: &std::path::Path,
    request: &TranscriptionRequest,
) -> Result<TranscriptionResult, AdapterError> {
    permissions.assert_filesystem_path(temp_path)?;
    let bytes = tokio::fs::read(temp_path)
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;

    let file_name = temp_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("audio")
        .to_string();

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(&request.audio.mime)
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;
    let form = reqwest::multipart::Form::new().part("audio", part);

    let response = http
        .post(transcribe_url)
        .multipart(form)
        .send()
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AdapterError::Http {
            status: status.as_u16(),
            body_prefix: body.chars().take(240).collect(),
        });
    }

    let parsed: TranscribeResponse = response
        .json()
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;

    Ok(TranscriptionResult { text: parsed.text })
}

/// The scratch directory scratch audio files are staged under, exposed so
/// callers (and the service facade's cleanup sweep) can reference it without
/// duplicating the literal.
#[must_use]
pub fn runtime_tmp_audio_dir() -> &'static str {
    RUNTIME_TMP_AUDIO_DIR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_mime_over_path_extension() {
        assert_eq!(extension_for("audio/wav", "assets/ab/abc123.bin"), "wav");
    }

    #[test]
    fn falls_back_to_path_extension_when_mime_is_unknown() {
        assert_eq!(extension_for("application/octet-stream", "assets/ab/abc123.flac"), "flac");
    }

    #[test]
    fn falls_back_to_bin_when_nothing_is_known() {
        assert_eq!(extension_for("application/octet-stream", "assets/ab/abc123"), "bin");
    }
}
