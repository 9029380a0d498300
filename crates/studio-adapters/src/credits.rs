// studio-adapters/src/credits.rs
// ============================================================================
// Module: Credit Preflight
// Description: Scans a scoped graph for remote-credit-consuming nodes and,
//              only if any exist, checks the remaining credit balance.
// Purpose: Implement `Adapter::estimate_run_credits`.
// Dependencies: reqwest, serde_json, studio-core
// ============================================================================

//! ## Overview
//! A run that touches no remote node (local text generation, deterministic
//! transforms, local CLI tools) never needs a credits check at all. Scanning
//! happens against the scoped graph's raw node config, since the compiled
//! graph has already discarded the JSON shape this check inspects.

use serde::Deserialize;
use serde_json::Value;
use studio_core::interfaces::CreditEstimate;
use studio_core::NodeInstance;
use studio_core::Project;

/// Node kinds that always consume remote credits regardless of config.
const ALWAYS_REMOTE_KINDS: &[&str] = &[
    "studio.image_generation",
    "studio.transcription",
];

/// Node kind whose remote-ness depends on its `provider` config field.
const TEXT_GENERATION_KIND: &str = "studio.text_generation";

/// True if `project`'s graph contains at least one node that will consume
/// remote credits when executed.
#[must_use]
pub fn needs_credit_check(project: &Project) -> bool {
    project.graph.nodes.iter().any(node_is_remote)
}

fn node_is_remote(node: &NodeInstance) -> bool {
    let kind = node.kind.as_str();
    if ALWAYS_REMOTE_KINDS.contains(&kind) {
        return true;
    }
    if kind == TEXT_GENERATION_KIND {
        return node
            .config
            .get("provider")
            .and_then(Value::as_str)
            .is_none_or(|provider| provider != "local");
    }
    false
}

#[derive(Deserialize)]
struct CreditsResponse {
    #[serde(rename = "remaining")]
    remaining: i64,
}

/// Estimates whether `project` may proceed given remaining credits. Returns
/// an unconstrained estimate without calling the network at all if the
/// scoped graph needs no remote credits.
pub async fn estimate_run_credits(
    http: &reqwest::Client,
    permissions: &std::sync::Arc<dyn studio_core::interfaces::PermissionManager>,
    credits_url: &str,
    project: &Project,
) -> CreditEstimate {
    if !needs_credit_check(project) {
        return CreditEstimate::unconstrained();
    }

    if let Err(err) = permissions.assert_network_url(credits_url) {
        return CreditEstimate {
            ok: false,
            reason: Some(err.to_string()),
        };
    }

    match http.get(credits_url).send().await {
        Ok(response) if response.status().is_success() => match response.json::<CreditsResponse>().await {
            Ok(parsed) => CreditEstimate {
                ok: parsed.remaining > 0,
                reason: if parsed.remaining > 0 {
                    None
                } else {
                    Some("no remaining credits".to_string())
                },
            },
            Err(err) => CreditEstimate {
                ok: false,
                reason: Some(format!("could not parse credits response: {err}")),
            },
        },
        Ok(response) => CreditEstimate {
            ok: false,
            reason: Some(format!("credits endpoint returned status {}", response.status())),
        },
        Err(err) => CreditEstimate {
            ok: false,
            reason: Some(format!("could not reach credits endpoint: {err}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_core::NodeId;
    use studio_core::NodeKind;
    use studio_core::Position;

    fn node(kind: &str, provider: Option<&str>) -> NodeInstance {
        let config = provider.map_or_else(|| serde_json::json!({}), |p| serde_json::json!({ "provider": p }));
        NodeInstance {
            id: NodeId::new("n1"),
            kind: NodeKind::new(kind),
            version: 1,
            title: "test".to_string(),
            position: Position { x: 0.0, y: 0.0 },
            config,
            continue_on_error: false,
            disabled: false,
        }
    }

    #[test]
    fn local_text_generation_needs_no_credit_check() {
        assert!(!node_is_remote(&node("studio.text_generation", Some("local"))));
    }

    #[test]
    fn managed_text_generation_needs_a_credit_check() {
        assert!(node_is_remote(&node("studio.text_generation", Some("managed"))));
        assert!(node_is_remote(&node("studio.text_generation", None)));
    }

    #[test]
    fn image_generation_always_needs_a_credit_check() {
        assert!(node_is_remote(&node("studio.image_generation", None)));
    }

    #[test]
    fn deterministic_transform_never_needs_a_credit_check() {
        assert!(!node_is_remote(&node("studio.transform", None)));
    }
}
