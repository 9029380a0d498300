// studio-nodes/src/prompt_template.rs
// ============================================================================
// Module: Prompt Template Node
// Description: Emits a literal template string as its prompt output.
// Purpose: Implement the `studio.prompt_template` built-in.
// Dependencies: async-trait, serde_json, studio-core
// ============================================================================

//! ## Overview
//! `studio.prompt_template` has no inputs; its config carries a literal
//! `template` string, surfaced unchanged on its `"prompt"` output. The
//! `InlinePromptTemplateV1` migration removes every instance of this kind
//! from a project before it ever reaches the compiler, inlining the template
//! text directly into the downstream node's `systemPrompt` config — this
//! definition is registered purely so the kind remains inspectable (schema
//! tooling, pre-migration documents) rather than because a compiled graph
//! can ever contain one.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
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

/// The config key carrying the literal template text.
pub const TEMPLATE_KEY: &str = "template";

/// The output port carrying the template text verbatim.
pub const OUTPUT_PORT: &str = "prompt";

/// Builds the `studio.prompt_template` node definition.
#[must_use]
pub fn definition() -> NodeDefinition {
    NodeDefinition {
        kind: "studio.prompt_template".into(),
        version: 1,
        capability_class: CapabilityClass::LocalCpu,
        cache_policy: CachePolicy::ByInputs,
        input_ports: Vec::new(),
        output_ports: vec![PortSpec {
            id: OUTPUT_PORT.into(),
            port_type: PortType("text".to_string()),
            required: false,
        }],
        config_schema: vec![ConfigFieldSpec {
            key: TEMPLATE_KEY.to_string(),
            field_type: ConfigFieldType::String,
            ui_only: false,
        }],
        fingerprint_salt: "studio.prompt_template.v1".to_string(),
        is_visual_only: false,
        cache_bypass: studio_core::never_bypass,
        executor: Arc::new(PromptTemplateExecutor),
    }
}

struct PromptTemplateExecutor;

#[async_trait]
impl NodeExecutor for PromptTemplateExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeExecutionError> {
        let template = ctx
            .node
            .config
            .get(TEMPLATE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| NodeExecutionError::new(format!("missing required config field \"{TEMPLATE_KEY}\"")))?;

        Ok(NodeOutput {
            outputs: json!({ OUTPUT_PORT: template }),
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
    use serde_json::json;

    #[tokio::test]
    async fn emits_the_configured_template_verbatim() {
        let ctx = crate::test_support::test_context(json!({ TEMPLATE_KEY: "Summarize: {{input}}" }), json!({}));
        let output = definition().executor.execute(&ctx).await.expect("execute");
        assert_eq!(output.outputs, json!({"prompt": "Summarize: {{input}}"}));
    }

    #[tokio::test]
    async fn missing_template_config_is_a_node_error() {
        let ctx = crate::test_support::test_context(json!({}), json!({}));
        assert!(definition().executor.execute(&ctx).await.is_err());
    }
}
