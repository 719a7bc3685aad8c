//! A single command in a remote command sequence.

use std::fmt;

/// How a step's failure affects the rest of the sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepKind {
    /// Failure aborts the sequence.
    Required,
    /// Environment check whose failure is reported but, unless diagnostics
    /// are strict, does not abort the sequence.
    Diagnostic,
}

/// Shell command executed on the remote host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteStep {
    /// Failure handling for this step.
    pub kind: StepKind,
    /// Command line passed verbatim to the remote shell.
    pub command: String,
}

impl RemoteStep {
    /// Builds a step whose failure aborts the sequence.
    #[must_use]
    pub fn required(command: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Required,
            command: command.into(),
        }
    }

    /// Builds a diagnostic step.
    #[must_use]
    pub fn diagnostic(command: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Diagnostic,
            command: command.into(),
        }
    }

    /// Returns `true` for diagnostic steps.
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        self.kind == StepKind::Diagnostic
    }
}

impl fmt::Display for RemoteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)
    }
}
