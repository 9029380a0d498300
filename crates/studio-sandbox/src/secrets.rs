// studio-sandbox/src/secrets.rs
// ============================================================================
// Module: Studio Secret Store
// Description: Lookup of named secret references from the OS keychain.
// Purpose: Implement `SecretStore` as a feature-flagged, desktop-only capability.
// Dependencies: keyring, studio-core
// ============================================================================

//! ## Overview
//! [`KeychainSecretStore`] wraps the platform-native credential store
//! (macOS Keychain, Windows Credential Manager, Linux Secret Service) via the
//! `keyring` crate. Absence of a backing daemon is a feature flag rather than
//! a construction-time error: [`KeychainSecretStore::is_available`] probes the
//! backend once and callers route around missing-secret features instead of
//! failing at startup.

use studio_core::interfaces::SecretStore;
use studio_core::interfaces::SecretStoreError;

/// A fixed service namespace all Studio secret references are stored under.
const SERVICE: &str = "studio-runtime";

/// A [`SecretStore`] backed by the OS keychain via `keyring`.
pub struct KeychainSecretStore {
    available: bool,
}

impl KeychainSecretStore {
    /// Probes the platform keychain backend once at construction.
    #[must_use]
    pub fn new() -> Self {
        let available = keyring::Entry::new(SERVICE, "__studio_probe__").is_ok();
        Self { available }
    }
}

impl Default for KeychainSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeychainSecretStore {
    fn is_available(&self) -> bool {
        self.available
    }

    fn get_secret(&self, reference_id: &str) -> Result<String, SecretStoreError> {
        if !self.available {
            return Err(SecretStoreError::Unavailable);
        }
        let entry = keyring::Entry::new(SERVICE, reference_id)
            .map_err(|_| SecretStoreError::SecretUnavailable(reference_id.to_string()))?;
        entry
            .get_password()
            .map_err(|_| SecretStoreError::SecretUnavailable(reference_id.to_string()))
    }
}

/// A [`SecretStore`] that always reports unavailable, for non-desktop hosts
/// where no keychain daemon can be reached.
#[derive(Default)]
pub struct UnavailableSecretStore;

impl SecretStore for UnavailableSecretStore {
    fn is_available(&self) -> bool {
        false
    }

    fn get_secret(&self, _reference_id: &str) -> Result<String, SecretStoreError> {
        Err(SecretStoreError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_store_always_fails_without_probing_a_backend() {
        let store = UnavailableSecretStore;
        assert!(!store.is_available());
        assert!(matches!(
            store.get_secret("anything"),
            Err(SecretStoreError::Unavailable)
        ));
    }
}
