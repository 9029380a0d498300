// studio-nodes/src/transcription.rs
// ============================================================================
// Module: Transcription Node
// Description: Wraps Adapter::transcribe over a single audio asset input.
// Purpose: Implement the `studio.transcription` built-in.
// Dependencies: async-trait, serde_json, studio-core
// ============================================================================

//! ## Overview
//! `studio.transcription` takes a required `"media"` input: the JSON form of
//! an [`AssetRef`] produced upstream (typically by `studio.media_ingest`).
//! It deserializes that value back into a typed asset reference, hands it to
//! [`studio_core::interfaces::Adapter::transcribe`], and emits the resulting
//! text on its `"text"` output port.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use studio_core::AssetRef;
use studio_core::CachePolicy;
use studio_core::CapabilityClass;
use studio_core::NodeDefinition;
use studio_core::PortSpec;
use studio_core::PortType;
use studio_core::interfaces::ExecutionContext;
use studio_core::interfaces::NodeExecutionError;
use studio_core::interfaces::NodeExecutor;
use studio_core::interfaces::NodeOutput;
use studio_core::interfaces::TranscriptionRequest;

/// The required input port carrying the source audio asset reference.
pub const MEDIA_PORT: &str = "media";

/// The output port carrying the transcribed text.
pub const OUTPUT_PORT: &str = "text";

/// Builds the `studio.transcription` node definition.
#[must_use]
pub fn definition() -> NodeDefinition {
    NodeDefinition {
        kind: "studio.transcription".into(),
        version: 1,
        capability_class: CapabilityClass::Api,
        cache_policy: CachePolicy::ByInputs,
        input_ports: vec![PortSpec {
            id: MEDIA_PORT.into(),
            port_type: PortType("media".to_string()),
            required: true,
        }],
        output_ports: vec![PortSpec {
            id: OUTPUT_PORT.into(),
            port_type: PortType("text".to_string()),
            required: false,
        }],
        config_schema: Vec::new(),
        fingerprint_salt: "studio.transcription.v1".to_string(),
        is_visual_only: false,
        cache_bypass: studio_core::never_bypass,
        executor: Arc::new(TranscriptionExecutor),
    }
}

struct TranscriptionExecutor;

#[async_trait]
impl NodeExecutor for TranscriptionExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeExecutionError> {
        let audio = crate::input::as_typed::<AssetRef>(&ctx.inputs, MEDIA_PORT)
            .ok_or_else(|| NodeExecutionError::new(format!("missing or malformed required input \"{MEDIA_PORT}\"")))?;

        let request = TranscriptionRequest {
            run_id: ctx.run_id.clone(),
            node_id: ctx.node.id.clone(),
            audio,
        };

        let result = ctx
            .services
            .adapter
            .transcribe(request)
            .await
            .map_err(|err| NodeExecutionError::new(err.to_string()))?;

        Ok(NodeOutput {
            outputs: json!({ OUTPUT_PORT: result.text }),
            artifacts: Vec::new(),
            output_ref: None,
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]
mod tests {
    use super::*;
    use crate::test_support::MockAdapter;
    use crate::test_support::MockSandbox;
    use crate::test_support::test_context_with;
    use serde_json::json;
    use studio_core::interfaces::TranscriptionResult;

    #[tokio::test]
    async fn transcribes_a_deserialized_asset_reference() {
        let adapter = MockAdapter::default().with_transcription(Ok(TranscriptionResult {
            text: "hello from the recording".to_string(),
        }));
        let asset = json!({"hash": "aa", "mime": "audio/wav", "sizeBytes": 5, "path": "assets/sha256/aa.wav"});
        let ctx = test_context_with(
            json!({}),
            json!({ "media": asset }),
            Arc::new(adapter),
            Arc::new(MockSandbox::default()),
            Arc::new(crate::test_support::MemoryHost::default()),
        );

        let output = definition().executor.execute(&ctx).await.expect("execute");
        assert_eq!(output.outputs, json!({"text": "hello from the recording"}));
    }

    #[tokio::test]
    async fn malformed_media_input_is_a_node_error() {
        let ctx = crate::test_support::test_context(json!({}), json!({ "media": "not an asset" }));
        assert!(definition().executor.execute(&ctx).await.is_err());
    }
}
