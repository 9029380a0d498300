// studio-nodes/src/media_ingest.rs
// ============================================================================
// Module: Media Ingest Node
// Description: Reads a file from disk into the content-addressed asset store.
// Purpose: Implement the `studio.media_ingest` built-in.
// Dependencies: async-trait, serde_json, studio-core
// ============================================================================

//! ## Overview
//! `studio.media_ingest` has no inputs: its config names a path, relative to
//! the host's base path, and its single `"path"` output carries the
//! resulting [`studio_core::AssetRef`] (serialized as a plain JSON object) so
//! downstream nodes (transcription, image generation reference inputs) can
//! deserialize it straight back into a typed asset reference.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use studio_core::CachePolicy;
use studio_core::CapabilityClass;
use studio_core::ConfigFieldSpec;
use studio_core::ConfigFieldType;
use studio_core::NodeDefinition;
use studio_core::PortSpec;
use studio_core::PortType;
use studio_core::interfaces::ExecutionContext;
use studio_core::interfaces::NodeExecutionError;
use studio_core::interfaces::NodeExecutor;
use studio_core::interfaces::NodeOutput;

/// The config key naming the source file, relative to the host's base path.
pub const SOURCE_PATH_KEY: &str = "sourcePath";

/// The output port carrying the ingested asset reference.
pub const OUTPUT_PORT: &str = "path";

/// Builds the `studio.media_ingest` node definition.
#[must_use]
pub fn definition() -> NodeDefinition {
    NodeDefinition {
        kind: "studio.media_ingest".into(),
        version: 1,
        capability_class: CapabilityClass::LocalIo,
        cache_policy: CachePolicy::ByInputs,
        input_ports: Vec::new(),
        output_ports: vec![PortSpec {
            id: OUTPUT_PORT.into(),
            port_type: PortType("media".to_string()),
            required: false,
        }],
        config_schema: vec![ConfigFieldSpec {
            key: SOURCE_PATH_KEY.to_string(),
            field_type: ConfigFieldType::String,
            ui_only: false,
        }],
        fingerprint_salt: "studio.media_ingest.v1".to_string(),
        is_visual_only: false,
        cache_bypass: bypass_missing_preview,
        executor: Arc::new(MediaIngestExecutor),
    }
}

/// Maps a lowercase file extension (no leading dot) to a MIME type, the
/// inverse of the asset store's MIME-to-extension table. Unknown extensions
/// fall back to a generic binary MIME type.
#[must_use]
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// Cache-hit escape hatch for `studio.media_ingest`: a cached entry whose
/// asset is a previewable media type (image or video) but carries no stored
/// artifact is treated as a miss, forcing re-ingestion rather than serving a
/// result with nothing to preview. The original heuristic this is modeled on
/// could not be recovered verbatim (no source was retained for this node in
/// the retrieval pack this crate was built from), so this is the closest
/// faithful proxy over the data this port's [`CacheEntry`] actually carries.
fn bypass_missing_preview(entry: &studio_core::CacheEntry) -> bool {
    let Some(asset) = entry.artifacts.first() else {
        return false;
    };
    let previewable = asset.mime.starts_with("image/") || asset.mime.starts_with("video/");
    previewable && asset.path.is_empty()
}

struct MediaIngestExecutor;

#[async_trait]
impl NodeExecutor for MediaIngestExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeExecutionError> {
        let source_path = ctx
            .node
            .config
            .get(SOURCE_PATH_KEY)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| NodeExecutionError::new(format!("missing required config field \"{SOURCE_PATH_KEY}\"")))?;

        let absolute = ctx.services.host.resolve_absolute(Path::new(source_path));

        ctx.services
            .permissions
            .assert_filesystem_path(&absolute)
            .map_err(|err| NodeExecutionError::new(err.to_string()))?;

        let bytes = ctx
            .services
            .host
            .read_binary(&absolute)
            .map_err(|err| NodeExecutionError::new(format!("failed to read \"{source_path}\": {err}")))?;

        let extension = extension_of(&absolute);
        let mime = mime_for_extension(extension);

        let asset = ctx
            .services
            .assets
            .store(&bytes, mime)
            .await
            .map_err(|err| NodeExecutionError::new(err.to_string()))?;

        let asset_value = serde_json::to_value(&asset)
            .map_err(|err| NodeExecutionError::new(format!("failed to serialize asset reference: {err}")))?;

        Ok(NodeOutput {
            outputs: json!({ OUTPUT_PORT: asset_value }),
            artifacts: vec![asset],
            output_ref: None,
        })
    }
}

fn extension_of(path: &Path) -> &str {
    path.extension().and_then(std::ffi::OsStr::to_str).unwrap_or("")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]
mod tests {
    use super::*;
    use crate::test_support::MemoryHost;
    use crate::test_support::MockAdapter;
    use crate::test_support::MockSandbox;
    use crate::test_support::test_context_with;
    use serde_json::json;
    use studio_core::AssetRef;

    #[tokio::test]
    async fn ingests_a_file_and_emits_an_asset_reference() {
        let host = Arc::new(MemoryHost::with_file("", "clip.mp3", b"sound bytes"));
        let ctx = test_context_with(
            json!({ SOURCE_PATH_KEY: "clip.mp3" }),
            json!({}),
            Arc::new(MockAdapter::default()),
            Arc::new(MockSandbox::default()),
            host,
        );

        let def = definition();
        let output = def.executor.execute(&ctx).await.expect("execute");
        let asset: AssetRef = serde_json::from_value(output.outputs["path"].clone()).expect("asset ref");
        assert_eq!(asset.mime, "audio/mpeg");
        assert_eq!(output.artifacts.len(), 1);
    }

    #[tokio::test]
    async fn missing_source_path_config_is_a_node_error() {
        let ctx = crate::test_support::test_context(json!({}), json!({}));
        let def = definition();
        assert!(def.executor.execute(&ctx).await.is_err());
    }

    fn cache_entry(mime: &str, path: &str) -> studio_core::CacheEntry {
        studio_core::CacheEntry {
            node_id: studio_core::NodeId::from("n1"),
            kind: "studio.media_ingest".to_string(),
            version: 1,
            fingerprint: "fp".to_string(),
            outputs: json!({}),
            artifacts: vec![studio_core::AssetRef {
                hash: "abc".to_string(),
                mime: mime.to_string(),
                size_bytes: 0,
                path: path.to_string(),
            }],
            written_at: "2026-01-01T00:00:00Z".to_string(),
            run_id: studio_core::RunId::from("run-1"),
        }
    }

    #[test]
    fn bypasses_cache_for_previewable_media_with_no_stored_path() {
        assert!(bypass_missing_preview(&cache_entry("image/png", "")));
        assert!(!bypass_missing_preview(&cache_entry("image/png", "assets/sha256/ab/abc.png")));
        assert!(!bypass_missing_preview(&cache_entry("audio/mpeg", "")));
    }

    #[test]
    fn maps_known_extensions_and_falls_back_for_unknown_ones() {
        assert_eq!(mime_for_extension("PNG"), "image/png");
        assert_eq!(mime_for_extension("wav"), "audio/wav");
        assert_eq!(mime_for_extension("xyz"), "application/octet-stream");
    }
}
