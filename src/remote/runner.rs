//! Command runner abstraction and the process-backed implementation.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread;

use super::RemoteError;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Renders the exit status for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError>;
}

fn spawn_error(program: &str, message: impl Into<String>) -> RemoteError {
    RemoteError::Spawn {
        program: program.to_owned(),
        message: message.into(),
    }
}

/// Command runner that forwards child output to the local terminal as it
/// arrives while still capturing it, so long training runs show progress.
#[derive(Clone, Debug, Default)]
pub struct StreamingCommandRunner;

impl CommandRunner for StreamingCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(program, err.to_string()))?;

        let child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(program, "stdout pipe unavailable"))?;
        let child_stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error(program, "stderr pipe unavailable"))?;

        let stdout_pump = thread::spawn(move || tee(child_stdout, io::stdout()));
        let stderr_pump = thread::spawn(move || tee(child_stderr, io::stderr()));

        let status = child
            .wait()
            .map_err(|err| spawn_error(program, err.to_string()))?;
        let stdout = join_pump(program, stdout_pump)?;
        let stderr = join_pump(program, stderr_pump)?;

        Ok(CommandOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

fn join_pump(
    program: &str,
    pump: thread::JoinHandle<io::Result<String>>,
) -> Result<String, RemoteError> {
    pump.join()
        .map_err(|_| spawn_error(program, "output forwarding thread panicked"))?
        .map_err(|err| spawn_error(program, err.to_string()))
}

fn tee<R: Read, W: Write>(mut source: R, mut sink: W) -> io::Result<String> {
    let mut captured = Vec::new();
    let mut buffer = [0_u8; 8192];
    loop {
        let read = match source.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let chunk = buffer.get(..read).unwrap_or_default();
        sink.write_all(chunk)?;
        sink.flush()?;
        captured.extend_from_slice(chunk);
    }
    Ok(String::from_utf8_lossy(&captured).into_owned())
}
