// studio-nodes/src/image_generation.rs
// ============================================================================
// Module: Image Generation Node
// Description: Wraps Adapter::generate_image, folding an optional system
//              prompt into the user prompt and reference images into the
//              request.
// Purpose: Implement the `studio.image_generation` built-in.
// Dependencies: async-trait, serde_json, studio-core
// ============================================================================

//! ## Overview
//! `studio.image_generation` takes a required `"prompt"` text input and an
//! optional, multi-edge `"images"` reference input, dispatches through
//! [`studio_core::interfaces::Adapter::generate_image`], and emits every
//! generated asset as a JSON array on its `"image"` output port (always an
//! array, even for `count = 1`, so downstream wiring doesn't change shape
//! when a graph author bumps the image count).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use studio_core::AssetRef;
use studio_core::CachePolicy;
use studio_core::CapabilityClass;
use studio_core::ConfigFieldSpec;
use studio_core::ConfigFieldType;
use studio_core::NodeDefinition;
use studio_core::PortSpec;
use studio_core::PortType;
use studio_core::interfaces::ExecutionContext;
use studio_core::interfaces::ImageGenerationRequest;
use studio_core::interfaces::NodeExecutionError;
use studio_core::interfaces::NodeExecutor;
use studio_core::interfaces::NodeOutput;

/// The required input port carrying the generation prompt.
pub const PROMPT_PORT: &str = "prompt";

/// The optional, multi-edge input port carrying reference images.
pub const IMAGES_PORT: &str = "images";

/// The output port carrying the generated image assets.
pub const OUTPUT_PORT: &str = "image";

/// The config key carrying an optional system prompt, folded into the user
/// prompt before dispatch.
pub const SYSTEM_PROMPT_KEY: &str = "systemPrompt";

/// The config key naming how many images to request, clamped to `[1, 8]`.
pub const COUNT_KEY: &str = "count";

/// The config key naming the provider-defined aspect ratio token.
pub const ASPECT_RATIO_KEY: &str = "aspectRatio";

/// The default aspect ratio when the config field is absent.
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

/// Builds the `studio.image_generation` node definition.
#[must_use]
pub fn definition() -> NodeDefinition {
    NodeDefinition {
        kind: "studio.image_generation".into(),
        version: 1,
        capability_class: CapabilityClass::Api,
        cache_policy: CachePolicy::ByInputs,
        input_ports: vec![
            PortSpec {
                id: PROMPT_PORT.into(),
                port_type: PortType("text".to_string()),
                required: true,
            },
            PortSpec {
                id: IMAGES_PORT.into(),
                port_type: PortType("media".to_string()),
                required: false,
            },
        ],
        output_ports: vec![PortSpec {
            id: OUTPUT_PORT.into(),
            port_type: PortType("media".to_string()),
            required: false,
        }],
        config_schema: vec![
            ConfigFieldSpec {
                key: SYSTEM_PROMPT_KEY.to_string(),
                field_type: ConfigFieldType::String,
                ui_only: false,
            },
            ConfigFieldSpec {
                key: COUNT_KEY.to_string(),
                field_type: ConfigFieldType::Number { min: Some(1.0), max: Some(8.0) },
                ui_only: false,
            },
            ConfigFieldSpec {
                key: ASPECT_RATIO_KEY.to_string(),
                field_type: ConfigFieldType::String,
                ui_only: false,
            },
        ],
        fingerprint_salt: "studio.image_generation.v1".to_string(),
        is_visual_only: false,
        cache_bypass: studio_core::never_bypass,
        executor: Arc::new(ImageGenerationExecutor),
    }
}

struct ImageGenerationExecutor;

#[async_trait]
impl NodeExecutor for ImageGenerationExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeExecutionError> {
        let prompt = crate::input::as_str(&ctx.inputs, PROMPT_PORT)
            .ok_or_else(|| NodeExecutionError::new(format!("missing required input \"{PROMPT_PORT}\"")))?;
        let reference_images = crate::input::all_typed::<AssetRef>(&ctx.inputs, IMAGES_PORT);

        let prompt = match ctx.node.config.get(SYSTEM_PROMPT_KEY).and_then(Value::as_str) {
            Some(system) if !system.is_empty() => format!("{system}\n\n{prompt}"),
            _ => prompt,
        };

        let count = ctx
            .node
            .config
            .get(COUNT_KEY)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(1)
            .clamp(1, 8);

        let aspect_ratio = ctx
            .node
            .config
            .get(ASPECT_RATIO_KEY)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_ASPECT_RATIO)
            .to_string();

        let request = ImageGenerationRequest {
            run_id: ctx.run_id.clone(),
            node_id: ctx.node.id.clone(),
            prompt,
            reference_images,
            count,
            aspect_ratio,
            attempt: 1,
        };

        let result = ctx
            .services
            .adapter
            .generate_image(request)
            .await
            .map_err(|err| NodeExecutionError::new(err.to_string()))?;

        let images = serde_json::to_value(&result.assets)
            .map_err(|err| NodeExecutionError::new(format!("failed to serialize generated assets: {err}")))?;

        Ok(NodeOutput {
            outputs: json!({ OUTPUT_PORT: images }),
            artifacts: result.assets,
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
    use studio_core::interfaces::ImageGenerationResult;

    fn asset(hash: &str) -> AssetRef {
        AssetRef {
            hash: hash.to_string(),
            mime: "image/png".to_string(),
            size_bytes: 10,
            path: format!("assets/sha256/{hash}.png"),
        }
    }

    #[tokio::test]
    async fn emits_generated_assets_as_a_json_array() {
        let adapter = MockAdapter::default().with_image(Ok(ImageGenerationResult {
            assets: vec![asset("aa"), asset("bb")],
            model: "model-x".to_string(),
        }));
        let ctx = test_context_with(
            json!({ COUNT_KEY: 2 }),
            json!({ "prompt": "a cat" }),
            Arc::new(adapter),
            Arc::new(MockSandbox::default()),
            Arc::new(crate::test_support::MemoryHost::default()),
        );

        let output = definition().executor.execute(&ctx).await.expect("execute");
        assert_eq!(output.outputs["image"].as_array().expect("array").len(), 2);
        assert_eq!(output.artifacts.len(), 2);
    }

    #[tokio::test]
    async fn folds_system_prompt_ahead_of_the_user_prompt() {
        let adapter = MockAdapter::default().with_image(Ok(ImageGenerationResult {
            assets: vec![asset("aa")],
            model: "model-x".to_string(),
        }));
        let ctx = test_context_with(
            json!({ SYSTEM_PROMPT_KEY: "render in watercolor" }),
            json!({ "prompt": "a cat" }),
            Arc::new(adapter),
            Arc::new(MockSandbox::default()),
            Arc::new(crate::test_support::MemoryHost::default()),
        );
        assert!(definition().executor.execute(&ctx).await.is_ok());
    }

    #[tokio::test]
    async fn missing_prompt_input_is_a_node_error() {
        let ctx = crate::test_support::test_context(json!({}), json!({}));
        assert!(definition().executor.execute(&ctx).await.is_err());
    }
}
