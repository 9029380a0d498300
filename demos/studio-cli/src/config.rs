// studio-cli/src/config.rs
// ============================================================================
// Module: Studio CLI Configuration
// Description: Typed, validated configuration for the demo binary's remote
//              adapter endpoints.
// Purpose: Load an optional TOML override file on top of built-in defaults,
//          via a typed struct with a validate() step, rather than reading
//          ad hoc environment variables inline.
// Dependencies: serde, toml, studio-adapters
// ============================================================================

//! ## Overview
//! None of the bundled node kinds' local-only paths ever dial out, so a
//! [`CliConfig`] built entirely from defaults is sufficient for every
//! `studio-cli` command that doesn't touch a `studio.text_generation` node
//! in managed mode, an image generation node, or a transcription node. A host
//! embedding real remote providers supplies a TOML file via `--config` to
//! override the endpoint URLs.

use std::path::Path;

use serde::Deserialize;
use studio_adapters::AdapterEndpoints;
use studio_adapters::image::ImageEndpoints;
use thiserror::Error;

/// Errors raised loading or validating [`CliConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The path that could not be read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file was not valid TOML, or failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The demo binary's configuration: remote endpoint overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CliConfig {
    /// Managed text generation "turn" endpoint.
    pub turns_url: String,
    /// Endpoint returning preflighted PUT URLs for reference image uploads.
    pub image_prepare_uploads_url: String,
    /// Endpoint accepting an image generation job submission.
    pub image_create_job_url: String,
    /// Endpoint template (containing `{job_id}`) polled for job status.
    pub image_poll_job_url_template: String,
    /// Transcription submission endpoint.
    pub transcribe_url: String,
    /// Credit balance endpoint.
    pub credits_url: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            turns_url: "https://api.systemsculpt.com/v1/turns".to_string(),
            image_prepare_uploads_url: "https://api.systemsculpt.com/v1/images/uploads".to_string(),
            image_create_job_url: "https://api.systemsculpt.com/v1/images/jobs".to_string(),
            image_poll_job_url_template: "https://api.systemsculpt.com/v1/images/jobs/{job_id}"
                .to_string(),
            transcribe_url: "https://api.systemsculpt.com/v1/transcriptions".to_string(),
            credits_url: "https://api.systemsculpt.com/v1/credits".to_string(),
        }
    }
}

impl CliConfig {
    /// Loads defaults, optionally overridden by a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `path` is given but cannot be read or
    /// parsed, or if the resulting config fails [`CliConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            None => Self::default(),
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                toml::from_str(&text).map_err(|e| ConfigError::Invalid(e.to_string()))?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates that every configured endpoint is an absolute HTTPS URL,
    /// mirroring the Permission Manager's `assertNetworkUrl` scheme check so
    /// a misconfigured endpoint fails fast at startup rather than mid-run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if any endpoint is not `https://`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("turnsUrl", &self.turns_url),
            ("imagePrepareUploadsUrl", &self.image_prepare_uploads_url),
            ("imageCreateJobUrl", &self.image_create_job_url),
            ("transcribeUrl", &self.transcribe_url),
            ("creditsUrl", &self.credits_url),
        ] {
            if !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!("{name} must be an https:// URL, got {url}")));
            }
        }
        Ok(())
    }

    /// Converts this config into the [`AdapterEndpoints`] the Facade's
    /// `HttpAdapter` is built against.
    #[must_use]
    pub fn into_adapter_endpoints(self) -> AdapterEndpoints {
        AdapterEndpoints {
            turns_url: self.turns_url,
            image: ImageEndpoints {
                prepare_uploads_url: self.image_prepare_uploads_url,
                create_job_url: self.image_create_job_url,
                poll_job_url_template: self.image_poll_job_url_template,
            },
            transcribe_url: self.transcribe_url,
            credits_url: self.credits_url,
        }
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

    #[test]
    fn defaults_validate() {
        assert!(CliConfig::default().validate().is_ok());
    }

    #[test]
    fn non_https_endpoint_fails_validation() {
        let mut config = CliConfig::default();
        config.credits_url = "http://insecure.example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_toml_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("studio-cli.toml");
        std::fs::write(&path, "creditsUrl = \"https://example.test/credits\"\n").expect("write");
        let config = CliConfig::load(Some(&path)).expect("load");
        assert_eq!(config.credits_url, "https://example.test/credits");
        assert_eq!(config.turns_url, CliConfig::default().turns_url);
    }
}
