// studio-adapters/src/text.rs
// ============================================================================
// Module: Text Generation Adapter
// Description: Managed remote turns and local `pi` CLI text generation.
// Purpose: Implement `Adapter::generate_text` for both provider modes.
// Dependencies: reqwest, serde_json, studio-core, tokio
// ============================================================================

//! ## Overview
//! Two provider modes share the `generate_text` entry point but nothing else:
//! the managed remote provider is a single globally-serialized HTTPS "turn"
//! exchange, while the local provider shells out to the external `pi` binary,
//! serialized through its own separate global queue. Both queues are owned by
//! [`crate::HttpAdapter`]; this module holds the per-call logic only.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use studio_core::interfaces::AdapterError;
use studio_core::interfaces::CliRequest;
use studio_core::interfaces::PermissionManager;
use studio_core::interfaces::Sandbox;
use studio_core::interfaces::TextGenerationRequest;
use studio_core::interfaces::TextGenerationResult;
use studio_core::interfaces::TextProvider;

/// The managed provider's fixed model identifier, surfaced on every result.
pub const MANAGED_MODEL_ID: &str = "systemsculpt-managed";

/// Local `pi` subprocess timeout.
pub const LOCAL_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Local `pi` subprocess output cap.
pub const LOCAL_MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;

#[derive(Serialize)]
struct TurnRequestBody<'a> {
    #[serde(rename = "chatId")]
    chat_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    user: &'a str,
}

#[derive(Deserialize)]
struct TurnErrorBody {
    error: TurnErrorDetail,
}

#[derive(Deserialize)]
struct TurnErrorDetail {
    code: String,
    #[serde(default)]
    lock_until: Option<String>,
}

/// Issues a single managed-provider turn. Callers MUST hold the adapter's
/// managed-turn queue lock for the duration of this call: at most one
/// managed turn may be in flight process-wide.
///
/// # Errors
///
/// Returns [`AdapterError`] on permission denial, a `409 turn_in_flight`
/// conflict, any other non-2xx status, or a transport failure.
pub async fn run_managed_turn(
    http: &reqwest::Client,
    permissions: &Arc<dyn PermissionManager>,
    turns_url: &str,
    request: &TextGenerationRequest,
) -> Result<TextGenerationResult, AdapterError> {
    permissions.assert_network_url(turns_url)?;

    let chat_id = format!("studio:{}:{}", request.run_id, request.node_id);
    let body = TurnRequestBody {
        chat_id: &chat_id,
        system: request.system.as_deref(),
        user: &request.user,
    };

    let response = http
        .post(turns_url)
        .json(&body)
        .send()
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;

    let status = response.status();
    if status == StatusCode::CONFLICT {
        let text = response.text().await.unwrap_or_default();
        if let Ok(parsed) = serde_json::from_str::<TurnErrorBody>(&text) {
            if parsed.error.code == "turn_in_flight" {
                return Err(AdapterError::Conflict {
                    reason: parsed.error.code,
                    lock_until: parsed.error.lock_until,
                });
            }
        }
        return Err(AdapterError::Http {
            status: status.as_u16(),
            body_prefix: body_prefix(&text),
        });
    }

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(AdapterError::Http {
            status: status.as_u16(),
            body_prefix: body_prefix(&text),
        });
    }

    let text = response
        .text()
        .await
        .map_err(|e| AdapterError::Transient(format!("request failed: {e}")))?;

    Ok(TextGenerationResult {
        text: accumulate_stream_text(&text).trim().to_string(),
        model: MANAGED_MODEL_ID.to_string(),
    })
}

/// Consumes a newline-delimited stream of turn events, accumulating text
/// from `"delta"` events until a `"done"`/`"end"` event ends the stream.
/// Unparsable or unrecognized lines are skipped.
fn accumulate_stream_text(body: &str) -> String {
    let mut text = String::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        match event.get("type").and_then(Value::as_str) {
            Some("delta") => {
                if let Some(chunk) = event.get("text").and_then(Value::as_str) {
                    text.push_str(chunk);
                }
            }
            Some("done" | "end") => break,
            _ => {}
        }
    }
    text
}

fn body_prefix(body: &str) -> String {
    body.chars().take(240).collect()
}

/// Normalizes a local model selector. Accepts `provider@@model` or
/// `provider/model`; anything else is invalid.
///
/// # Errors
///
/// Returns a message describing why `input` cannot be normalized.
pub fn normalize_local_model(input: &str) -> Result<String, String> {
    if let Some((provider, model)) = input.split_once("@@") {
        if provider.is_empty() || model.is_empty() {
            return Err(format!("invalid local model selector: {input}"));
        }
        return Ok(format!("{provider}/{model}"));
    }
    if let Some((provider, model)) = input.split_once('/') {
        if provider.is_empty() || model.is_empty() {
            return Err(format!("invalid local model selector: {input}"));
        }
        return Ok(input.to_string());
    }
    Err(format!("invalid local model selector: {input}"))
}

/// Runs a single local `pi` generation. Callers MUST hold the adapter's local
/// queue lock for the duration of this call: the `pi` binary itself also
/// locks, but the adapter additionally serializes through a separate FIFO.
///
/// # Errors
///
/// Returns [`AdapterError`] on permission denial, a sandbox failure, or a
/// non-zero exit whose stdout/stderr could not be parsed into a result.
pub async fn run_local_generation(
    sandbox: &Arc<dyn Sandbox>,
    working_dir: &std::path::Path,
    request: &TextGenerationRequest,
) -> Result<TextGenerationResult, AdapterError> {
    let TextProvider::Local { model } = &request.provider else {
        return Err(AdapterError::Transient(
            "run_local_generation called with a non-local provider".to_string(),
        ));
    };
    let model_id = normalize_local_model(model).map_err(AdapterError::Transient)?;

    let mut args = vec![
        "--mode".to_string(),
        "json".to_string(),
        "--print".to_string(),
        "--no-session".to_string(),
        "--model".to_string(),
        model_id,
    ];
    if let Some(system) = &request.system {
        args.push("--system-prompt".to_string());
        args.push(system.clone());
    }
    args.push(request.user.clone());

    let outcome = sandbox
        .run_cli(CliRequest {
            command: "pi".to_string(),
            args,
            working_dir: working_dir.to_path_buf(),
            env: std::collections::BTreeMap::new(),
            timeout_ms: LOCAL_TIMEOUT_MS,
            max_output_bytes: LOCAL_MAX_OUTPUT_BYTES,
        })
        .await?;

    let stdout = String::from_utf8_lossy(&outcome.stdout);
    let stderr = String::from_utf8_lossy(&outcome.stderr);
    let parsed = parse_pi_ndjson(&stdout);

    if outcome.exit_code == 0 && !outcome.timed_out {
        if let Some(text) = parsed.text {
            return Ok(TextGenerationResult { text, model: model.clone() });
        }
    }

    if let Some(error) = parsed.error {
        return Err(AdapterError::Transient(error));
    }
    if let Some(first_stderr) = stderr.lines().find(|l| !l.trim().is_empty()) {
        return Err(AdapterError::Transient(first_stderr.to_string()));
    }
    if let Some(first_line) = stdout
        .lines()
        .find(|l| !l.trim().is_empty() && !l.trim_start().starts_with('{'))
    {
        return Err(AdapterError::Transient(first_line.to_string()));
    }
    Err(AdapterError::Transient(format!(
        "pi exited with code {}",
        outcome.exit_code
    )))
}

/// The text and/or error extracted from a `pi --mode json` NDJSON stream.
struct ParsedPiOutput {
    text: Option<String>,
    error: Option<String>,
}

/// Parses `pi`'s NDJSON stdout, collecting the last assistant text from
/// `message_end`/`agent_end` events and any error message from a
/// `stopReason == "error"` event.
fn parse_pi_ndjson(stdout: &str) -> ParsedPiOutput {
    let mut text = None;
    let mut error = None;
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let event_type = event.get("type").and_then(Value::as_str);
        if matches!(event_type, Some("message_end" | "agent_end")) {
            if let Some(t) = event.get("text").and_then(Value::as_str) {
                text = Some(t.to_string());
            }
        }
        if event.get("stopReason").and_then(Value::as_str) == Some("error") {
            if let Some(message) = event.get("message").and_then(Value::as_str) {
                error = Some(message.to_string());
            }
        }
    }
    ParsedPiOutput { text, error }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_both_accepted_separators() {
        assert_eq!(normalize_local_model("ollama@@llama3").unwrap(), "ollama/llama3");
        assert_eq!(normalize_local_model("ollama/llama3").unwrap(), "ollama/llama3");
    }

    #[test]
    fn rejects_anything_else() {
        assert!(normalize_local_model("llama3").is_err());
        assert!(normalize_local_model("").is_err());
    }

    #[test]
    fn parses_last_assistant_text_from_ndjson() {
        let stdout = concat!(
            "{\"type\":\"message_start\"}\n",
            "{\"type\":\"message_end\",\"text\":\"first\"}\n",
            "{\"type\":\"agent_end\",\"text\":\"final answer\"}\n",
        );
        let parsed = parse_pi_ndjson(stdout);
        assert_eq!(parsed.text.as_deref(), Some("final answer"));
        assert!(parsed.error.is_none());
    }

    #[test]
    fn captures_error_message_on_error_stop_reason() {
        let stdout = "{\"type\":\"agent_end\",\"stopReason\":\"error\",\"message\":\"model unavailable\"}\n";
        let parsed = parse_pi_ndjson(stdout);
        assert_eq!(parsed.error.as_deref(), Some("model unavailable"));
    }

    #[test]
    fn accumulates_streamed_deltas_until_terminal_event() {
        let body = concat!(
            "{\"type\":\"delta\",\"text\":\"Hello, \"}\n",
            "{\"type\":\"delta\",\"text\":\"world\"}\n",
            "{\"type\":\"done\"}\n",
            "{\"type\":\"delta\",\"text\":\"ignored\"}\n",
        );
        assert_eq!(accumulate_stream_text(body), "Hello, world");
    }

    #[test]
    fn body_prefix_truncates_to_240_chars() {
        let long = "x".repeat(500);
        assert_eq!(body_prefix(&long).len(), 240);
    }
}
