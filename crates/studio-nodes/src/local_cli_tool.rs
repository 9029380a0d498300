// studio-nodes/src/local_cli_tool.rs
// ============================================================================
// Module: Local CLI Tool Node
// Description: Wraps Sandbox::run_cli with a config-declared command/args and
//              an optional single piped-in argument.
// Purpose: Implement the `studio.local_cli_tool` built-in.
// Dependencies: async-trait, serde_json, studio-core
// ============================================================================

//! ## Overview
//! `studio.local_cli_tool` runs one external command per execution: its
//! config names the executable, a fixed argument vector, an optional working
//! directory (relative to the host's base path), and timeout/output-cap
//! overrides. Its optional `"input"` port, if wired, is appended as one
//! final argument (a string value verbatim, anything else JSON-encoded).
//! Permission enforcement lives entirely inside the
//! [`studio_core::interfaces::Sandbox`] implementation's own preflight; this
//! node only assembles the request.
//!
//! Declared `never` for cache policy: invoking an external tool is outside
//! this runtime's determinism guarantees, so every run re-executes it.

use std::collections::BTreeMap;
use std::path::Path;
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
use studio_core::interfaces::CliRequest;
use studio_core::interfaces::ExecutionContext;
use studio_core::interfaces::NodeExecutionError;
use studio_core::interfaces::NodeExecutor;
use studio_core::interfaces::NodeOutput;

/// The optional input port appended as a final CLI argument.
pub const INPUT_PORT: &str = "input";

/// The output port carrying captured standard output.
pub const STDOUT_PORT: &str = "stdout";

/// The output port carrying the process exit code.
pub const EXIT_CODE_PORT: &str = "exitCode";

/// The config key naming the executable.
pub const COMMAND_KEY: &str = "command";

/// The config key naming the fixed argument vector.
pub const ARGS_KEY: &str = "args";

/// The config key naming the working directory, relative to the host base path.
pub const WORKING_DIR_KEY: &str = "workingDir";

/// The config key overriding the subprocess timeout.
pub const TIMEOUT_MS_KEY: &str = "timeoutMs";

/// The config key overriding the per-stream output cap.
pub const MAX_OUTPUT_BYTES_KEY: &str = "maxOutputBytes";

/// Builds the `studio.local_cli_tool` node definition.
#[must_use]
pub fn definition() -> NodeDefinition {
    NodeDefinition {
        kind: "studio.local_cli_tool".into(),
        version: 1,
        capability_class: CapabilityClass::LocalIo,
        cache_policy: CachePolicy::Never,
        input_ports: vec![PortSpec {
            id: INPUT_PORT.into(),
            port_type: PortType(PortType::ANY.to_string()),
            required: false,
        }],
        output_ports: vec![
            PortSpec {
                id: STDOUT_PORT.into(),
                port_type: PortType("text".to_string()),
                required: false,
            },
            PortSpec {
                id: EXIT_CODE_PORT.into(),
                port_type: PortType(PortType::ANY.to_string()),
                required: false,
            },
        ],
        config_schema: vec![
            ConfigFieldSpec {
                key: COMMAND_KEY.to_string(),
                field_type: ConfigFieldType::String,
                ui_only: false,
            },
            ConfigFieldSpec {
                key: ARGS_KEY.to_string(),
                field_type: ConfigFieldType::Json,
                ui_only: false,
            },
            ConfigFieldSpec {
                key: WORKING_DIR_KEY.to_string(),
                field_type: ConfigFieldType::String,
                ui_only: false,
            },
            ConfigFieldSpec {
                key: TIMEOUT_MS_KEY.to_string(),
                field_type: ConfigFieldType::Number { min: Some(100.0), max: None },
                ui_only: false,
            },
            ConfigFieldSpec {
                key: MAX_OUTPUT_BYTES_KEY.to_string(),
                field_type: ConfigFieldType::Number { min: Some(1024.0), max: None },
                ui_only: false,
            },
        ],
        fingerprint_salt: "studio.local_cli_tool.v1".to_string(),
        is_visual_only: false,
        cache_bypass: studio_core::never_bypass,
        executor: Arc::new(LocalCliToolExecutor),
    }
}

struct LocalCliToolExecutor;

#[async_trait]
impl NodeExecutor for LocalCliToolExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<NodeOutput, NodeExecutionError> {
        let command = ctx
            .node
            .config
            .get(COMMAND_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| NodeExecutionError::new(format!("missing required config field \"{COMMAND_KEY}\"")))?
            .to_string();

        let mut args = match ctx.node.config.get(ARGS_KEY) {
            None => Vec::new(),
            Some(Value::Array(values)) => values
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<String>>>()
                .ok_or_else(|| NodeExecutionError::new(format!("config field \"{ARGS_KEY}\" must be an array of strings")))?,
            Some(_) => {
                return Err(NodeExecutionError::new(format!(
                    "config field \"{ARGS_KEY}\" must be an array of strings"
                )));
            }
        };

        if let Some(value) = crate::input::first(&ctx.inputs, INPUT_PORT) {
            args.push(match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            });
        }

        let working_dir_relative = ctx
            .node
            .config
            .get(WORKING_DIR_KEY)
            .and_then(Value::as_str)
            .unwrap_or(".");
        let working_dir = ctx.services.host.resolve_absolute(Path::new(working_dir_relative));

        let timeout_ms = ctx
            .node
            .config
            .get(TIMEOUT_MS_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(CliRequest::DEFAULT_TIMEOUT_MS)
            .max(CliRequest::MIN_TIMEOUT_MS);

        let max_output_bytes = ctx
            .node
            .config
            .get(MAX_OUTPUT_BYTES_KEY)
            .and_then(Value::as_u64)
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(CliRequest::DEFAULT_OUTPUT_BYTES)
            .max(CliRequest::MIN_OUTPUT_BYTES);

        let outcome = ctx
            .services
            .sandbox
            .run_cli(CliRequest {
                command,
                args,
                working_dir,
                env: BTreeMap::new(),
                timeout_ms,
                max_output_bytes,
            })
            .await
            .map_err(|err| NodeExecutionError::new(err.to_string()))?;

        Ok(NodeOutput {
            outputs: json!({
                STDOUT_PORT: String::from_utf8_lossy(&outcome.stdout),
                EXIT_CODE_PORT: outcome.exit_code,
            }),
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
    use studio_core::interfaces::CliOutcome;

    #[tokio::test]
    async fn runs_the_configured_command_and_surfaces_stdout_and_exit_code() {
        let sandbox = MockSandbox::returning(CliOutcome {
            exit_code: 0,
            stdout: b"done\n".to_vec(),
            stderr: Vec::new(),
            timed_out: false,
        });
        let ctx = test_context_with(
            json!({ COMMAND_KEY: "echo", ARGS_KEY: ["hi"] }),
            json!({}),
            Arc::new(MockAdapter::default()),
            Arc::new(sandbox),
            Arc::new(crate::test_support::MemoryHost::default()),
        );

        let output = definition().executor.execute(&ctx).await.expect("execute");
        assert_eq!(output.outputs[STDOUT_PORT], json!("done\n"));
        assert_eq!(output.outputs[EXIT_CODE_PORT], json!(0));
    }

    #[tokio::test]
    async fn appends_a_wired_input_value_as_the_final_argument() {
        let sandbox = MockSandbox::returning(CliOutcome {
            exit_code: 0,
            stdout: Vec::new(),
            stderr: Vec::new(),
            timed_out: false,
        });
        let ctx = test_context_with(
            json!({ COMMAND_KEY: "cat" }),
            json!({ INPUT_PORT: "piped-value" }),
            Arc::new(MockAdapter::default()),
            Arc::new(sandbox),
            Arc::new(crate::test_support::MemoryHost::default()),
        );
        assert!(definition().executor.execute(&ctx).await.is_ok());
    }

    #[tokio::test]
    async fn missing_command_config_is_a_node_error() {
        let ctx = crate::test_support::test_context(json!({}), json!({}));
        assert!(definition().executor.execute(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn non_string_args_entries_are_a_node_error() {
        let ctx = crate::test_support::test_context(json!({ COMMAND_KEY: "echo", ARGS_KEY: [1, 2] }), json!({}));
        assert!(definition().executor.execute(&ctx).await.is_err());
    }
}
