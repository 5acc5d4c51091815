//! Credential lifecycle configuration.
//!
//! Every field has a default so the whole section can be omitted.

use crate::record::ScopeSet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Scopes needed by the Gmail tool set.
pub const DEFAULT_GMAIL_SCOPES: &[&str] = &[
    "https://mail.google.com/",
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/gmail.modify",
];

/// Configuration for obtaining and persisting delegated credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Where the current credential record is persisted.
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,

    /// Google client-secrets JSON downloaded from the cloud console.
    #[serde(default = "default_client_secrets_path")]
    pub client_secrets_path: PathBuf,

    /// Scopes every downstream tool needs, comma-separated.
    #[serde(default = "default_required_scopes")]
    pub required_scopes: String,

    /// How long the interactive flow waits for the user.
    #[serde(default = "default_flow_timeout_seconds")]
    pub flow_timeout_seconds: u64,

    /// Loopback port for the redirect listener. Zero picks a free port.
    #[serde(default)]
    pub redirect_port: u16,

    /// Tokens expiring within this window are treated as already expired.
    #[serde(default = "default_expiry_skew_seconds")]
    pub expiry_skew_seconds: i64,
}

fn default_token_path() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_client_secrets_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_required_scopes() -> String {
    DEFAULT_GMAIL_SCOPES.join(",")
}

fn default_flow_timeout_seconds() -> u64 {
    300
}

fn default_expiry_skew_seconds() -> i64 {
    60
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            token_path: default_token_path(),
            client_secrets_path: default_client_secrets_path(),
            required_scopes: default_required_scopes(),
            flow_timeout_seconds: default_flow_timeout_seconds(),
            redirect_port: 0,
            expiry_skew_seconds: default_expiry_skew_seconds(),
        }
    }
}

impl CredentialConfig {
    /// Returns the parsed required scope set.
    #[must_use]
    pub fn required_scopes(&self) -> ScopeSet {
        ScopeSet::parse_list(&self.required_scopes)
    }

    #[must_use]
    pub fn flow_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.flow_timeout_seconds)
    }

    #[must_use]
    pub fn expiry_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiry_skew_seconds.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_gmail_scopes() {
        let config = CredentialConfig::default();
        let scopes = config.required_scopes();
        assert_eq!(scopes.len(), DEFAULT_GMAIL_SCOPES.len());
        assert!(scopes.contains("https://mail.google.com/"));
        assert_eq!(config.flow_timeout().as_secs(), 300);
        assert_eq!(config.redirect_port, 0);
    }

    #[test]
    fn empty_section_deserializes_to_defaults() {
        let config: CredentialConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config.token_path, PathBuf::from("token.json"));
        assert_eq!(config.expiry_skew(), chrono::Duration::seconds(60));
    }

    #[test]
    fn negative_skew_is_clamped() {
        let config = CredentialConfig {
            expiry_skew_seconds: -5,
            ..CredentialConfig::default()
        };
        assert_eq!(config.expiry_skew(), chrono::Duration::zero());
    }
}
