// studio-nodes/src/text_generation.rs
// ============================================================================
// Module: Text Generation Node
// Description: Wraps Adapter::generate_text for the managed and local
//              provider modes.
// Purpose: Implement the `studio.text_generation` built-in.
// Dependencies: async-trait, serde_json, studio-core
// ============================================================================

//! ## Overview
//! `studio.text_generation` takes a required `"prompt"` text input and an
//! optional system prompt from config, dispatches through
//! [`studio_core::interfaces::Adapter::generate_text`], and emits the
//! result's text on its `"text"` output port. This definition is registered
//! under [`studio_core::CapabilityClass::Api`] even though a `local` provider
//! instance actually performs local subprocess I/O: the true capability class
//! is a per-instance, config-dependent fact the static registry entry cannot
//! express, and the scheduler's ceiling is a known, documented simplification
//! rather than something the credit-preflight path (which inspects `provider`
//! directly) depends on.

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
use studio_core::interfaces::TextGenerationRequest;
use studio_core::interfaces::TextProvider;

/// The required input port carrying the user prompt.
pub const PROMPT_PORT: &str = "prompt";

/// The output port carrying the generated text.
pub const OUTPUT_PORT: &str = "text";

/// The config key selecting `"managed"` or `"local"`.
pub const PROVIDER_KEY: &str = "provider";

/// The config key naming the local model selector (required when
/// `provider == "local"`).
pub const MODEL_KEY: &str = "model";

/// The config key carrying an optional system prompt.
pub const SYSTEM_PROMPT_KEY: &str = "systemPrompt";

/// Builds the `studio.text_generation` node definition.
#[must_use]
pub fn definition() -> NodeDefinition {
    NodeDefinition {
        kind: "studio.text_generation".into(),
        version: 1,
        capability_class: CapabilityClass::Api,
        cache_policy: CachePolicy::ByInputs,
        input_ports: vec![PortSpec {
            id: PROMPT_PORT.into(),
            port_type: PortType("text".to_string()),
            required: true,
        }],
        output_ports: vec![PortSpec {
            id: OUTPUT_PORT.into(),
            port_type: PortType("text".to_string()),
            required: false,
        }],
        config_schema: vec![
            ConfigFieldSpec {
                key: PROVIDER_KEY.to_string(),
                field_type: ConfigFieldType::Enum {
                    values: vec!["managed".to_string(), "local".to_string()],
                },
                ui_only: false,
            },
            ConfigFieldSpec {
                key: MODEL_KEY.to_string(),
                field_type: ConfigFieldType::String,
                ui_only: false,
            },
            ConfigFieldSpec {
                key: SYSTEM_PROMPT_KEY.to_string(),
                field_type: ConfigFieldType::String,
                ui_only: false,
            },
        ],
        fingerprint_salt: "studio.text_generation.v1".to_string(),
        is_visual_only: false,
        cache_bypass: studio_core::never_bypass,
        executor: Arc::new(TextGenerationExecutor),
    }
}

struct TextGenerationExecutor;

#[async_trait]
impl NodeExecutor for TextGenerationExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeExecutionError> {
        let prompt = crate::input::as_str(&ctx.inputs, PROMPT_PORT)
            .ok_or_else(|| NodeExecutionError::new(format!("missing required input \"{PROMPT_PORT}\"")))?;

        let provider = resolve_provider(&ctx.node.config)?;
        let system = ctx
            .node
            .config
            .get(SYSTEM_PROMPT_KEY)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        let request = TextGenerationRequest {
            run_id: ctx.run_id.clone(),
            node_id: ctx.node.id.clone(),
            system,
            user: prompt,
            provider,
        };

        let result = ctx
            .services
            .adapter
            .generate_text(request)
            .await
            .map_err(|err| NodeExecutionError::new(err.to_string()))?;

        Ok(NodeOutput {
            outputs: json!({ OUTPUT_PORT: result.text }),
            artifacts: Vec::new(),
            output_ref: None,
        })
    }
}

fn resolve_provider(config: &serde_json::Value) -> Result<TextProvider, NodeExecutionError> {
    match config.get(PROVIDER_KEY).and_then(serde_json::Value::as_str) {
        None | Some("managed") => Ok(TextProvider::Managed),
        Some("local") => {
            let model = config
                .get(MODEL_KEY)
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| NodeExecutionError::new(format!("missing required config field \"{MODEL_KEY}\" for local provider")))?;
            Ok(TextProvider::Local { model: model.to_string() })
        }
        Some(other) => Err(NodeExecutionError::new(format!("unknown provider \"{other}\""))),
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
    use studio_core::interfaces::TextGenerationResult;

    #[tokio::test]
    async fn dispatches_to_the_adapter_and_surfaces_its_text() {
        let adapter = MockAdapter::default().with_text(Ok(TextGenerationResult {
            text: "a fine answer".to_string(),
            model: "systemsculpt-managed".to_string(),
        }));
        let ctx = test_context_with(
            json!({ PROVIDER_KEY: "managed" }),
            json!({ "prompt": "say hi" }),
            Arc::new(adapter),
            Arc::new(MockSandbox::default()),
            Arc::new(crate::test_support::MemoryHost::default()),
        );

        let output = definition().executor.execute(&ctx).await.expect("execute");
        assert_eq!(output.outputs, json!({"text": "a fine answer"}));
    }

    #[tokio::test]
    async fn local_provider_without_a_model_is_a_node_error() {
        let ctx = test_context_with(
            json!({ PROVIDER_KEY: "local" }),
            json!({ "prompt": "say hi" }),
            Arc::new(MockAdapter::default()),
            Arc::new(MockSandbox::default()),
            Arc::new(crate::test_support::MemoryHost::default()),
        );
        assert!(definition().executor.execute(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn missing_prompt_input_is_a_node_error() {
        let ctx = crate::test_support::test_context(json!({ PROVIDER_KEY: "managed" }), json!({}));
        assert!(definition().executor.execute(&ctx).await.is_err());
    }
}
