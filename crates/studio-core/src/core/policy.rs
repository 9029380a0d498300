// studio-core/src/core/policy.rs
// ============================================================================
// Module: Studio Permission Policy Document
// Description: The sibling `studio.policy.v1` document: a monotonic grant list.
// Purpose: Model grants consumed by the Permission Manager.
// Dependencies: serde, crate::core::identifiers
// ============================================================================

//! ## Overview
//! A [`PermissionPolicy`] is a monotonic grant list: the Service Facade may
//! append grants, but nothing in the Runtime ever removes one. An empty grant
//! list denies every capability.

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::GrantId;

/// The policy document schema tag.
pub const POLICY_SCHEMA_TAG: &str = "studio.policy.v1";

/// The sibling permission policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionPolicy {
    /// Schema version, currently always `1`.
    pub version: u32,
    /// ISO-8601 last-modified timestamp.
    pub updated_at: String,
    /// Monotonic grant list.
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl PermissionPolicy {
    /// Returns an empty policy at the current schema version.
    #[must_use]
    pub fn empty(updated_at: impl Into<String>) -> Self {
        Self {
            version: 1,
            updated_at: updated_at.into(),
            grants: Vec::new(),
        }
    }
}

/// A single permission grant authorizing a capability within a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// Unique identity within the policy document.
    pub id: GrantId,
    /// The capability this grant authorizes.
    pub capability: Capability,
    /// The scope within which the capability is authorized.
    pub scope: GrantScope,
    /// ISO-8601 timestamp the grant was recorded.
    pub granted_at: String,
    /// True if a human explicitly approved this grant (vs. a default/bootstrap grant).
    pub granted_by_user: bool,
}

/// The three capability surfaces the Permission Manager gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Filesystem path access.
    Filesystem,
    /// CLI subprocess invocation.
    Cli,
    /// Outbound network access.
    Network,
}

impl Capability {
    /// Returns the taxonomy name used in `PermissionDenied` error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::Cli => "cli",
            Self::Network => "network",
        }
    }
}

/// The allow-listed scope a grant authorizes, one field populated per capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantScope {
    /// Allowed filesystem path prefixes; `"*"` or `"/"` allow any path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_paths: Option<Vec<String>>,
    /// Allowed CLI command glob patterns (`*` any substring, `?` one character).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_command_patterns: Option<Vec<String>>,
    /// Allowed network domains; `"*"` or an exact/`.`-suffix match of the hostname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_policy_has_no_grants() {
        let policy = PermissionPolicy::empty("2026-01-01T00:00:00Z");
        assert!(policy.grants.is_empty());
    }

    #[test]
    fn capability_names_match_taxonomy() {
        assert_eq!(Capability::Filesystem.as_str(), "filesystem");
        assert_eq!(Capability::Cli.as_str(), "cli");
        assert_eq!(Capability::Network.as_str(), "network");
    }
}
