//! Binary entry point for the `cloudtrain` CLI.

use std::fmt;
use std::future;
use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cloudtrain::{
    KeyName, ProviderConfig, RemoteExecutor, RunReport, SshConfig, SystemClock, TrainingWorkflow,
    WorkflowError, WorkflowOptions, WorkflowOutcome, reconcile, write_report,
};

mod cli;

use cli::{Cli, TrainCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("failed to write report: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Train(command) => train(command).await,
        Cli::Status => status().await,
    }
}

async fn train(command: TrainCommand) -> Result<i32, CliError> {
    let client = ProviderConfig::load_without_cli_args()
        .and_then(|config| config.client())
        .map_err(WorkflowError::from)?;
    let ssh_config = SshConfig::load_without_cli_args()
        .map_err(|err| CliError::Config(err.to_string()))?
        .with_identity_override(command.ssh_identity_file.as_deref());
    let executor = RemoteExecutor::with_streaming_runner(ssh_config)
        .map_err(|err| CliError::Config(err.to_string()))?;
    let clock = SystemClock;

    let options = workflow_options(&command);
    let workflow = TrainingWorkflow::new(&client, &executor, &clock);
    let report = workflow.run(&options, interrupted()).await;

    render_run(&mut io::stdout().lock(), &mut io::stderr().lock(), &report)?;
    Ok(run_exit_code(&report))
}

async fn status() -> Result<i32, CliError> {
    let client = ProviderConfig::load_without_cli_args()
        .and_then(|config| config.client())
        .map_err(WorkflowError::from)?;
    let reconciliation = reconcile(&client).await;
    write_report(&mut io::stdout().lock(), &reconciliation)?;
    Ok(i32::from(reconciliation.is_unverified()))
}

/// Resolves once the operator presses Ctrl-C.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl-C; interrupts will not be handled");
        future::pending::<()>().await;
    }
}

fn workflow_options(command: &TrainCommand) -> WorkflowOptions {
    let defaults = WorkflowOptions::default();
    WorkflowOptions {
        desired_instance_types: if command.instance_types.is_empty() {
            defaults.desired_instance_types
        } else {
            command.instance_types.clone()
        },
        ssh_key_name: command.ssh_key_name.as_deref().map(KeyName::from),
        wait_for_capacity: command.wait_for_capacity,
        skip_termination: command.skip_termination,
        output_dir: command
            .output_dir
            .as_deref()
            .map_or(defaults.output_dir, Utf8PathBuf::from),
        include_diagnostics: !command.skip_diagnostics,
        strict_diagnostics: command.strict_diagnostics,
    }
}

fn render_run(out: &mut impl Write, err: &mut impl Write, report: &RunReport) -> io::Result<()> {
    match &report.outcome {
        Ok(WorkflowOutcome::Completed { artifact_dir, .. }) => {
            writeln!(out, "Model package copied to {artifact_dir}")?;
        }
        Ok(WorkflowOutcome::NoCapacity) => {
            writeln!(out, "No desired instance type has capacity; nothing was launched.")?;
        }
        Err(failure) => write_error(&mut *err, failure),
    }
    write_report(out, &report.reconciliation)
}

fn run_exit_code(report: &RunReport) -> i32 {
    i32::from(!report.succeeded())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &dyn fmt::Display) {
    writeln!(target, "error: {err}").ok();
}
