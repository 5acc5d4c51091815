//! Centralized server configuration.
//!
//! Loaded via the `config` crate from an optional `courier.*` file in the
//! working directory, then environment variables prefixed `COURIER` with
//! `__` as the nesting separator (`COURIER__LLM__API_KEY`).
//!
//! See [`CredentialConfig`] and [`OpenAiConfig`] for the library sections.

use courier_ai::OpenAiConfig;
use courier_conversation::{DEFAULT_INSTRUCTIONS, DEFAULT_MAX_ITERATIONS};
use courier_credential::CredentialConfig;
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct AssistantConfig {
    /// Delegated-access credential configuration.
    #[serde(default)]
    pub credential: CredentialConfig,

    /// Model backend configuration.
    pub llm: OpenAiConfig,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub assistant: AssistantSettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Conversation behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSettings {
    /// System instructions given to the model on every turn.
    #[serde(default = "default_instructions")]
    pub instructions: String,

    /// Bound on model round trips per turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_instructions() -> String {
    DEFAULT_INSTRUCTIONS.to_string()
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            instructions: default_instructions(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl AssistantConfig {
    /// Loads configuration from the optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("courier").required(false))
            .add_source(
                config::Environment::with_prefix("COURIER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
