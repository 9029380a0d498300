// studio-sandbox/src/permissions.rs
// ============================================================================
// Module: Studio Permission Manager
// Description: Per-capability allow-list enforcement over a policy snapshot.
// Purpose: Implement the three capability assertions the runtime gates on.
// Dependencies: studio-core, url
// ============================================================================

//! ## Overview
//! [`PolicyPermissionManager`] wraps an immutable [`PermissionPolicy`] snapshot
//! captured at run start and answers the three assertions the Sandbox Runner
//! and Adapter Layer preflight against: filesystem path, CLI command pattern,
//! and network URL. An empty grant list denies every capability; the manager
//! never removes grants and never logs secrets or raw arguments.

use std::path::Component;
use std::path::Path;

use studio_core::Capability;
use studio_core::Grant;
use studio_core::GrantScope;
use studio_core::PermissionPolicy;
use studio_core::interfaces::PermissionError;
use studio_core::interfaces::PermissionManager;
use url::Url;

/// A [`PermissionManager`] backed by a fixed [`PermissionPolicy`] snapshot.
pub struct PolicyPermissionManager {
    policy: PermissionPolicy,
}

impl PolicyPermissionManager {
    /// Wraps `policy` for the life of a single run.
    #[must_use]
    pub fn new(policy: PermissionPolicy) -> Self {
        Self { policy }
    }

    fn grants_for(&self, capability: Capability) -> impl Iterator<Item = &GrantScope> {
        self.policy
            .grants
            .iter()
            .filter(move |g: &&Grant| g.capability == capability)
            .map(|g| &g.scope)
    }
}

impl PermissionManager for PolicyPermissionManager {
    fn assert_filesystem_path(&self, path: &Path) -> Result<(), PermissionError> {
        let normalized = normalize_path(path);
        let allowed = self.grants_for(Capability::Filesystem).any(|scope| {
            scope.allowed_paths.as_deref().is_some_and(|paths| {
                paths
                    .iter()
                    .any(|p| p == "*" || p == "/" || path_prefix_match(p, &normalized))
            })
        });
        if allowed {
            Ok(())
        } else {
            Err(PermissionError {
                capability: Capability::Filesystem.as_str(),
                subject: path.display().to_string(),
            })
        }
    }

    fn assert_cli_command(&self, command: &str) -> Result<(), PermissionError> {
        let allowed = self.grants_for(Capability::Cli).any(|scope| {
            scope
                .allowed_command_patterns
                .as_deref()
                .is_some_and(|patterns| patterns.iter().any(|p| glob_match(p, command)))
        });
        if allowed {
            Ok(())
        } else {
            Err(PermissionError {
                capability: Capability::Cli.as_str(),
                subject: command.to_string(),
            })
        }
    }

    fn assert_network_url(&self, url: &str) -> Result<(), PermissionError> {
        let deny = || PermissionError {
            capability: Capability::Network.as_str(),
            subject: url.to_string(),
        };
        let parsed = Url::parse(url).map_err(|_| deny())?;
        if parsed.scheme() != "https" {
            return Err(deny());
        }
        let host = parsed.host_str().ok_or_else(deny)?;
        let allowed = self.grants_for(Capability::Network).any(|scope| {
            scope.allowed_domains.as_deref().is_some_and(|domains| {
                domains
                    .iter()
                    .any(|d| d == "*" || d == host || host.ends_with(&format!(".{d}")))
            })
        });
        if allowed { Ok(()) } else { Err(deny()) }
    }
}

/// Normalizes `path` into its platform-independent component sequence, for
/// prefix comparison that doesn't treat `/vault/foobar` as under `/vault/foo`.
fn normalize_path(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            Component::RootDir => Some(String::new()),
            _ => None,
        })
        .collect()
}

/// True if `allowed` (a raw path string) is a path-separator-respecting
/// prefix of `candidate`'s normalized components.
fn path_prefix_match(allowed: &str, candidate: &[String]) -> bool {
    let allowed_components = normalize_path(Path::new(allowed));
    if allowed_components.len() > candidate.len() {
        return false;
    }
    allowed_components
        .iter()
        .zip(candidate.iter())
        .all(|(a, c)| a == c)
}

/// A minimal glob matcher supporting `*` (any substring) and `?` (one
/// character), sufficient for CLI command allow-listing.
fn glob_match(pattern: &str, subject: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    glob_match_chars(
        &pattern.chars().collect::<Vec<_>>(),
        &subject.chars().collect::<Vec<_>>(),
    )
}

fn glob_match_chars(pattern: &[char], subject: &[char]) -> bool {
    match pattern.first() {
        None => subject.is_empty(),
        Some('*') => {
            glob_match_chars(&pattern[1..], subject)
                || (!subject.is_empty() && glob_match_chars(pattern, &subject[1..]))
        }
        Some('?') => !subject.is_empty() && glob_match_chars(&pattern[1..], &subject[1..]),
        Some(c) => subject.first() == Some(c) && glob_match_chars(&pattern[1..], &subject[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with(scope: GrantScope, capability: Capability) -> PermissionPolicy {
        PermissionPolicy {
            version: 1,
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            grants: vec![Grant {
                id: studio_core::GrantId::from("g1"),
                capability,
                scope,
                granted_at: "2026-01-01T00:00:00Z".to_string(),
                granted_by_user: true,
            }],
        }
    }

    #[test]
    fn empty_grants_deny_everything() {
        let manager = PolicyPermissionManager::new(PermissionPolicy::empty("2026-01-01T00:00:00Z"));
        assert!(manager.assert_filesystem_path(Path::new("/vault")).is_err());
        assert!(manager.assert_cli_command("ffmpeg").is_err());
        assert!(manager.assert_network_url("https://api.example.com").is_err());
    }

    #[test]
    fn filesystem_prefix_does_not_false_positive_on_sibling_names() {
        let manager = PolicyPermissionManager::new(policy_with(
            GrantScope {
                allowed_paths: Some(vec!["/vault/foo".to_string()]),
                ..GrantScope::default()
            },
            Capability::Filesystem,
        ));
        assert!(manager.assert_filesystem_path(Path::new("/vault/foo/bar")).is_ok());
        assert!(manager.assert_filesystem_path(Path::new("/vault/foobar")).is_err());
    }

    #[test]
    fn cli_wildcard_matches_any_substring() {
        let manager = PolicyPermissionManager::new(policy_with(
            GrantScope {
                allowed_command_patterns: Some(vec!["ffmpeg*".to_string()]),
                ..GrantScope::default()
            },
            Capability::Cli,
        ));
        assert!(manager.assert_cli_command("ffmpeg-static").is_ok());
        assert!(manager.assert_cli_command("curl").is_err());
    }

    #[test]
    fn network_requires_https_even_when_host_allowlisted() {
        let manager = PolicyPermissionManager::new(policy_with(
            GrantScope {
                allowed_domains: Some(vec!["api.example.com".to_string()]),
                ..GrantScope::default()
            },
            Capability::Network,
        ));
        assert!(manager.assert_network_url("https://api.example.com/v1").is_ok());
        assert!(manager.assert_network_url("http://api.example.com/v1").is_err());
    }

    #[test]
    fn network_domain_matches_subdomain_suffix() {
        let manager = PolicyPermissionManager::new(policy_with(
            GrantScope {
                allowed_domains: Some(vec!["example.com".to_string()]),
                ..GrantScope::default()
            },
            Capability::Network,
        ));
        assert!(manager.assert_network_url("https://api.example.com").is_ok());
        assert!(manager.assert_network_url("https://evil-example.com").is_err());
    }
}
