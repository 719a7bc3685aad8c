//! Command-line interface definitions for the `cloudtrain` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. It
//! must not depend on the library crate.

use clap::Parser;

/// Top-level CLI for the `cloudtrain` binary.
#[derive(Debug, Parser)]
#[command(
    name = "cloudtrain",
    about = "Train the topic model on a transient Lambda Labs GPU instance",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Provision an instance, train, copy the model back, and tear down.
    #[command(
        name = "train",
        about = "Provision an instance, train, copy the model back, and tear down"
    )]
    Train(TrainCommand),
    /// Report instances still running on the account.
    #[command(name = "status", about = "Report instances still running on the account")]
    Status,
}

/// Arguments for the `cloudtrain train` subcommand.
#[derive(Debug, Default, Parser)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "each flag is an independent command-line switch"
)]
pub(crate) struct TrainCommand {
    /// Private key used for `ssh` and `scp` (defaults to `~/.ssh/id_rsa`).
    #[arg(short = 'i', long, value_name = "PATH")]
    pub(crate) ssh_identity_file: Option<String>,
    /// Provider SSH key installed on the instance.
    ///
    /// When omitted the first key registered on the account is used.
    #[arg(long, value_name = "NAME")]
    pub(crate) ssh_key_name: Option<String>,
    /// Keep polling until a desired instance type has capacity.
    #[arg(long)]
    pub(crate) wait_for_capacity: bool,
    /// Leave the instance running after a successful run.
    #[arg(long)]
    pub(crate) skip_termination: bool,
    /// Instance type to try, most preferred first; repeat to add more.
    ///
    /// Replaces the built-in preference list when given.
    #[arg(long = "instance-type", value_name = "TYPE")]
    pub(crate) instance_types: Vec<String>,
    /// Local directory receiving the packaged model.
    ///
    /// Defaults to `../packages` relative to the directory holding the
    /// `cloudtrain` executable.
    #[arg(long, value_name = "DIR")]
    pub(crate) output_dir: Option<String>,
    /// Do not run the GPU diagnostic commands.
    #[arg(long, conflicts_with = "strict_diagnostics")]
    pub(crate) skip_diagnostics: bool,
    /// Abort the run when a GPU diagnostic command fails.
    #[arg(long)]
    pub(crate) strict_diagnostics: bool,
}
