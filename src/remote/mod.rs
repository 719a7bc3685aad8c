//! Remote command execution and artifact retrieval over the system `ssh`
//! and `scp` clients.
//!
//! Commands run strictly one after another. A failing required step stops
//! the sequence; later steps never run.

use std::ffi::OsString;

use tracing::{info, warn};

mod artifact;
mod config;
mod runner;
mod step;
mod util;

pub use artifact::ArtifactRetriever;
pub use config::{DEFAULT_IDENTITY_FILE, RemoteError, SshConfig, SshConfigLoadError};
pub use runner::{CommandOutput, CommandRunner, StreamingCommandRunner};
pub use step::{RemoteStep, StepKind};
pub use util::expand_tilde;

use util::stderr_tail;

/// Login user on provider images.
pub const REMOTE_USER: &str = "ubuntu";

/// Host key policy for freshly launched instances: trust on first use.
const HOST_KEY_POLICY: &str = "StrictHostKeyChecking=accept-new";

/// Runs commands on one remote host via SSH.
#[derive(Clone, Debug)]
pub struct RemoteExecutor<R: CommandRunner> {
    config: SshConfig,
    runner: R,
}

impl RemoteExecutor<StreamingCommandRunner> {
    /// Convenience constructor that forwards remote output to the terminal.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when validation fails.
    pub fn with_streaming_runner(config: SshConfig) -> Result<Self, RemoteError> {
        Self::new(config, StreamingCommandRunner)
    }
}

impl<R: CommandRunner> RemoteExecutor<R> {
    /// Creates an executor using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when configuration validation
    /// fails.
    pub fn new(config: SshConfig, runner: R) -> Result<Self, RemoteError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    /// Returns a reference to the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Returns an artifact retriever sharing this executor's settings.
    #[must_use]
    pub const fn artifacts(&self) -> ArtifactRetriever<'_, R> {
        ArtifactRetriever::new(self)
    }

    /// Runs `command` on `host` and returns its captured output.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] when `ssh` cannot start and
    /// [`RemoteError::CommandFailed`] when the remote exit status is not
    /// zero.
    ///
    /// # Security
    ///
    /// `command` is passed verbatim to the remote shell.
    pub fn run(&self, host: &str, command: &str) -> Result<CommandOutput, RemoteError> {
        info!(host, command, "running remote command");
        let args = self.build_ssh_args(host, command);
        let output = self.runner.run(&self.config.ssh_bin, &args)?;
        if output.is_success() {
            return Ok(output);
        }

        Err(RemoteError::CommandFailed {
            command: command.to_owned(),
            status: output.code,
            status_text: output.status_text(),
            stderr: stderr_tail(&output.stderr),
        })
    }

    /// Runs `steps` in order, stopping at the first failing required step.
    ///
    /// Diagnostic failures are logged and skipped unless
    /// `strict_diagnostics` is set. Spawn failures always abort.
    ///
    /// # Errors
    ///
    /// Returns the first [`RemoteError`] that aborts the sequence.
    pub fn run_all(
        &self,
        host: &str,
        steps: &[RemoteStep],
        strict_diagnostics: bool,
    ) -> Result<(), RemoteError> {
        for (index, step) in steps.iter().enumerate() {
            match self.run(host, &step.command) {
                Ok(_) => {}
                Err(err @ RemoteError::CommandFailed { .. })
                    if step.is_diagnostic() && !strict_diagnostics =>
                {
                    warn!(step = index + 1, error = %err, "diagnostic step failed; continuing");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    pub(crate) const fn runner(&self) -> &R {
        &self.runner
    }

    /// Options shared by `ssh` and `scp`.
    pub(crate) fn common_ssh_options(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-i"),
            OsString::from(expand_tilde(&self.config.identity_file)),
            OsString::from("-o"),
            OsString::from(HOST_KEY_POLICY),
        ];
        if self.config.batch_mode_enabled() {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }
        args
    }

    fn build_ssh_args(&self, host: &str, command: &str) -> Vec<OsString> {
        let mut args = self.common_ssh_options();
        args.push(OsString::from("-l"));
        args.push(OsString::from(REMOTE_USER));
        args.push(OsString::from(host));
        args.push(OsString::from(command));
        args
    }
}

#[cfg(test)]
mod tests;
