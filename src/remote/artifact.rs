//! Copies the packaged model from the instance to a local directory.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use tracing::info;

use super::util::stderr_tail;
use super::{CommandRunner, REMOTE_USER, RemoteError, RemoteExecutor};

/// Fetches files matching a remote glob with `scp`.
#[derive(Debug)]
pub struct ArtifactRetriever<'a, R: CommandRunner> {
    executor: &'a RemoteExecutor<R>,
}

impl<'a, R: CommandRunner> ArtifactRetriever<'a, R> {
    /// Creates a retriever that reuses `executor`'s SSH settings and runner.
    #[must_use]
    pub const fn new(executor: &'a RemoteExecutor<R>) -> Self {
        Self { executor }
    }

    /// Copies every file matching `remote_glob` on `host` into `local_dir`,
    /// creating the directory first.
    ///
    /// The glob is left unescaped so the remote side expands it. No
    /// checksum is verified.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::LocalDirectory`] when `local_dir` cannot be
    /// created, [`RemoteError::Spawn`] when `scp` cannot start, and
    /// [`RemoteError::ArtifactCopyFailed`] when it exits non-zero, which
    /// includes a glob that matches nothing.
    pub fn fetch(
        &self,
        host: &str,
        remote_glob: &str,
        local_dir: &Utf8Path,
    ) -> Result<(), RemoteError> {
        ensure_directory(local_dir)?;

        let remote = format!("{REMOTE_USER}@{host}:{remote_glob}");
        let mut args = self.executor.common_ssh_options();
        args.push(OsString::from(&remote));
        args.push(OsString::from(local_dir.as_str()));

        info!(%remote, local_dir = %local_dir, "copying artifact");
        let scp_bin = &self.executor.config().scp_bin;
        let output = self.executor.runner().run(scp_bin, &args)?;
        if output.is_success() {
            return Ok(());
        }

        Err(RemoteError::ArtifactCopyFailed {
            remote,
            local_dir: local_dir.to_path_buf(),
            status_text: output.status_text(),
            stderr: stderr_tail(&output.stderr),
        })
    }
}

fn ensure_directory(path: &Utf8Path) -> Result<(), RemoteError> {
    Dir::create_ambient_dir_all(path, ambient_authority()).map_err(|err| {
        RemoteError::LocalDirectory {
            path: Utf8PathBuf::from(path),
            message: err.to_string(),
        }
    })
}
