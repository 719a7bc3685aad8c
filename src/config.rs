//! Provider configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::provider::{DEFAULT_API_BASE, LambdaClient, ProviderError};

/// Environment variable holding the Lambda Labs API key.
pub const API_KEY_ENV: &str = "LAMBDALABS_KEY";

/// Lambda Labs settings derived from environment variables and
/// configuration files.
#[derive(Clone, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "LAMBDALABS",
    discovery(
        app_name = "cloudtrain",
        env_var = "CLOUDTRAIN_CONFIG_PATH",
        config_file_name = "cloudtrain.toml",
        dotfile_name = ".cloudtrain.toml",
        project_file_name = "cloudtrain.toml"
    )
)]
pub struct ProviderConfig {
    /// API key sent as a bearer token. Required before any provider call.
    pub key: Option<String>,
    /// Base URL of the Cloud API.
    #[ortho_config(default = DEFAULT_API_BASE.to_owned())]
    pub api_base: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn guidance(&self) -> String {
        format!(
            "missing {}: set {} or add {} to cloudtrain.toml",
            self.description, self.env_var, self.toml_key
        )
    }
}

const KEY_FIELD: FieldMetadata = FieldMetadata::new("Lambda Labs API key", API_KEY_ENV, "key");
const API_BASE_FIELD: FieldMetadata =
    FieldMetadata::new("Lambda Labs API base URL", "LAMBDALABS_API_BASE", "api_base");

impl ProviderConfig {
    /// Builds a configuration from explicit values.
    #[must_use]
    pub fn new(key: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            api_base: api_base.into(),
        }
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("cloudtrain")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the API key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] when the key is absent or
    /// blank.
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingCredential(KEY_FIELD.guidance()))
    }

    /// Checks that the credential and base URL are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] for a missing key and
    /// [`ConfigError::MissingField`] for a blank base URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_key()?;
        if self.api_base.trim().is_empty() {
            return Err(ConfigError::MissingField(API_BASE_FIELD.guidance()));
        }
        Ok(())
    }

    /// Validates the configuration and builds the API client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails or the HTTP client
    /// cannot be constructed.
    pub fn client(&self) -> Result<LambdaClient, ConfigError> {
        self.validate()?;
        let key = self.api_key()?;
        LambdaClient::new(key, self.api_base.trim()).map_err(ConfigError::from)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// The provider API key is absent or blank.
    #[error("{0}")]
    MissingCredential(String),
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<ProviderError> for ConfigError {
    fn from(value: ProviderError) -> Self {
        Self::Parse(value.to_string())
    }
}
