// studio-nodes/src/value.rs
// ============================================================================
// Module: Value Node
// Description: A constant JSON value, authored directly in the node's config.
// Purpose: Implement the `studio.value` built-in: the graph's seed/literal node.
// Dependencies: async-trait, serde_json, studio-core
// ============================================================================

//! ## Overview
//! `studio.value` has no inputs; it simply echoes the JSON value sitting in
//! its config under `__studio_seed_value` as its single output. It exists so
//! a graph can carry a literal (a prompt string, a number, a flag) without a
//! dedicated node kind per JSON type.

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

/// The config key a `studio.value` node's literal lives under.
pub const SEED_VALUE_KEY: &str = "__studio_seed_value";

/// The output port a `studio.value` node exposes its literal on.
pub const OUTPUT_PORT: &str = "value";

/// Builds the `studio.value` node definition.
#[must_use]
pub fn definition() -> NodeDefinition {
    NodeDefinition {
        kind: "studio.value".into(),
        version: 1,
        capability_class: CapabilityClass::LocalCpu,
        cache_policy: CachePolicy::ByInputs,
        input_ports: Vec::new(),
        output_ports: vec![PortSpec {
            id: OUTPUT_PORT.into(),
            port_type: PortType(PortType::ANY.to_string()),
            required: false,
        }],
        config_schema: vec![ConfigFieldSpec {
            key: SEED_VALUE_KEY.to_string(),
            field_type: ConfigFieldType::Json,
            ui_only: false,
        }],
        fingerprint_salt: "studio.value.v1".to_string(),
        is_visual_only: false,
        cache_bypass: studio_core::never_bypass,
        executor: Arc::new(ValueExecutor),
    }
}

struct ValueExecutor;

#[async_trait]
impl NodeExecutor for ValueExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeExecutionError> {
        let value = ctx
            .node
            .config
            .get(SEED_VALUE_KEY)
            .cloned()
            .unwrap_or(Value::Null);
        Ok(NodeOutput {
            outputs: json!({ OUTPUT_PORT: value }),
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
    use crate::test_support::test_context;
    use serde_json::json;

    #[tokio::test]
    async fn echoes_the_seed_value_configured_on_the_node() {
        let def = definition();
        let ctx = test_context(json!({ SEED_VALUE_KEY: "hi" }), json!({}));
        let output = def.executor.execute(&ctx).await.expect("execute");
        assert_eq!(output.outputs, json!({"value": "hi"}));
    }

    #[tokio::test]
    async fn missing_seed_value_yields_null() {
        let def = definition();
        let ctx = test_context(json!({}), json!({}));
        let output = def.executor.execute(&ctx).await.expect("execute");
        assert_eq!(output.outputs, json!({"value": Value::Null}));
    }
}
