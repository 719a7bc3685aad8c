//! SSH client configuration and remote execution errors.
//!
//! [`SshConfig`] is loaded via `ortho-config`, merging defaults,
//! `cloudtrain.toml`, and `CLOUDTRAIN_SSH_*` environment variables. The
//! `train` command's identity-file flag overrides the loaded value.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Identity file used when nothing else is configured.
pub const DEFAULT_IDENTITY_FILE: &str = "~/.ssh/id_rsa";

/// SSH and scp client settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CLOUDTRAIN_SSH",
    discovery(
        app_name = "cloudtrain",
        env_var = "CLOUDTRAIN_CONFIG_PATH",
        config_file_name = "cloudtrain.toml",
        dotfile_name = ".cloudtrain.toml",
        project_file_name = "cloudtrain.toml"
    )
)]
pub struct SshConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Private key matching the public key registered with the provider.
    /// Supports tilde expansion.
    #[ortho_config(default = DEFAULT_IDENTITY_FILE.to_owned())]
    pub identity_file: String,
    /// Whether to force batch mode so SSH never prompts for a password.
    /// Unset means enabled; see [`SshConfig::batch_mode_enabled`].
    pub batch_mode: Option<bool>,
}

/// Errors raised when loading the SSH configuration from layered sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SshConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("ssh configuration parsing failed: {0}")]
    Parse(String),
}

impl SshConfig {
    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when any field is blank.
    pub fn validate(&self) -> Result<(), RemoteError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.scp_bin, "scp_bin")?;
        Self::require_value(&self.identity_file, "identity_file")?;
        Ok(())
    }

    /// Loads configuration using defaults, configuration files, and
    /// environment variables, ignoring the process arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SshConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SshConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("cloudtrain")])
            .map_err(|err| SshConfigLoadError::Parse(err.to_string()))
    }

    /// Resolves the batch-mode switch, which is on unless explicitly disabled.
    #[must_use]
    pub const fn batch_mode_enabled(&self) -> bool {
        !matches!(self.batch_mode, Some(false))
    }

    /// Returns a copy using `identity_file` when one is supplied.
    #[must_use]
    pub fn with_identity_override(mut self, identity_file: Option<&str>) -> Self {
        if let Some(path) = identity_file {
            path.clone_into(&mut self.identity_file);
        }
        self
    }

    fn require_value(value: &str, field: &str) -> Result<(), RemoteError> {
        if value.trim().is_empty() {
            return Err(RemoteError::InvalidConfig {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}

/// Errors surfaced while running remote commands or copying artifacts.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when configuration is missing required values. The message
    /// names the environment variable and configuration key to set.
    #[error("missing {field}: set CLOUDTRAIN_SSH_{env_suffix} or add {field} to cloudtrain.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a remote command exits non-zero or without a status.
    #[error("remote command `{command}` exited with status {status_text}: {stderr}")]
    CommandFailed {
        /// Remote command line as sent over SSH.
        command: String,
        /// Exit status reported by `ssh`, if any.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Tail of the captured stderr.
        stderr: String,
    },
    /// Raised when `scp` fails, including when the remote glob matches
    /// nothing.
    #[error("failed to copy {remote} into {local_dir} (status {status_text}): {stderr}")]
    ArtifactCopyFailed {
        /// Remote source as passed to `scp`.
        remote: String,
        /// Local destination directory.
        local_dir: Utf8PathBuf,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Tail of the captured stderr.
        stderr: String,
    },
    /// Raised when the local artifact directory cannot be created.
    #[error("cannot prepare artifact directory {path}: {message}")]
    LocalDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}
