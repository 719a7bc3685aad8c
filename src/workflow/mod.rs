//! End-to-end training run: acquire capacity, launch, train, collect the
//! model, terminate, and always reconcile.
//!
//! [`TrainingWorkflow::run`] owns the instance for the duration of a run.
//! Whatever happens inside, including an operator interrupt that cancels the
//! in-flight step, it finishes by asking the provider what is still running.
//! Failures do not terminate the instance; the reconciliation report tells
//! the operator it is still billing.

use std::cell::{Cell, OnceCell};
use std::future::Future;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::acquire::{
    CAPACITY_POLL_INTERVAL, DEFAULT_DESIRED_INSTANCE_TYPES, Placement, ResourceAcquirer,
};
use crate::clock::Clock;
use crate::config::ConfigError;
use crate::lifecycle::{ACTIVE_POLL_INTERVAL, InstanceLifecycle, LifecycleState};
use crate::provider::{InstanceId, KeyName, Provider, ProviderError};
use crate::recipe::{TrainingRecipe, version_tag};
use crate::remote::{CommandRunner, RemoteError, RemoteExecutor};

pub mod reconcile;

pub use reconcile::{Reconciliation, reconcile, write_report};

/// Name of the directory that receives the packaged model by default.
pub const PACKAGES_DIR_NAME: &str = "packages";

/// Default output directory: `../packages` relative to the running
/// executable's directory, or `packages` under the working directory when
/// the executable path cannot be resolved as UTF-8.
#[must_use]
pub fn default_output_dir() -> Utf8PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| Utf8PathBuf::from_path_buf(exe).ok())
        .map_or_else(
            || Utf8PathBuf::from(PACKAGES_DIR_NAME),
            |exe| output_dir_beside(&exe),
        )
}

fn output_dir_beside(executable: &Utf8Path) -> Utf8PathBuf {
    executable
        .parent()
        .and_then(Utf8Path::parent)
        .filter(|root| !root.as_str().is_empty())
        .map_or_else(
            || Utf8PathBuf::from(PACKAGES_DIR_NAME),
            |root| root.join(PACKAGES_DIR_NAME),
        )
}

/// Per-run choices made by the operator.
#[derive(Clone, Debug, Eq, PartialEq)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "each flag maps to an independent command-line switch"
)]
pub struct WorkflowOptions {
    /// Instance types to try, most preferred first.
    pub desired_instance_types: Vec<String>,
    /// SSH key installed on the instance; the first registered key when
    /// absent.
    pub ssh_key_name: Option<KeyName>,
    /// Keep polling until capacity appears instead of giving up.
    pub wait_for_capacity: bool,
    /// Leave the instance running after a successful run.
    pub skip_termination: bool,
    /// Local directory receiving the model package.
    pub output_dir: Utf8PathBuf,
    /// Run the GPU diagnostic commands.
    pub include_diagnostics: bool,
    /// Treat failing diagnostics as fatal.
    pub strict_diagnostics: bool,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            desired_instance_types: DEFAULT_DESIRED_INSTANCE_TYPES
                .iter()
                .map(|name| (*name).to_owned())
                .collect(),
            ssh_key_name: None,
            wait_for_capacity: false,
            skip_termination: false,
            output_dir: default_output_dir(),
            include_diagnostics: true,
            strict_diagnostics: false,
        }
    }
}

/// How a run that did not fail ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WorkflowOutcome {
    /// The model was trained and copied locally.
    Completed {
        /// Instance that ran the training.
        instance_id: InstanceId,
        /// Where it ran.
        placement: Placement,
        /// Directory holding the copied package.
        artifact_dir: Utf8PathBuf,
        /// Whether termination was requested.
        terminated: bool,
    },
    /// No desired instance type had capacity and waiting was disabled.
    NoCapacity,
}

/// Errors that abort a training run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The provider API key is not configured.
    #[error("{0}")]
    MissingCredential(String),
    /// Provider configuration is unusable for another reason.
    #[error("configuration error: {0}")]
    Config(String),
    /// The account has no registered SSH keys to install on the instance.
    #[error("no SSH keys are registered with the provider; add one or pass --ssh-key-name")]
    NoCredential,
    /// A provider call failed.
    #[error("provider call failed while {stage}: {source}")]
    ProviderCallFailed {
        /// What the workflow was doing.
        stage: &'static str,
        /// Underlying provider error.
        #[source]
        source: ProviderError,
    },
    /// A remote command failed or could not be started.
    #[error("remote command failed: {0}")]
    RemoteCommandFailed(#[source] RemoteError),
    /// The model package could not be copied back.
    #[error("artifact copy failed: {0}")]
    ArtifactCopyFailed(#[source] RemoteError),
    /// The operator interrupted the run.
    #[error("interrupted while the instance was {last_state}")]
    Interrupted {
        /// Lifecycle phase reached when the interrupt arrived.
        last_state: LifecycleState,
    },
}

impl From<ConfigError> for WorkflowError {
    fn from(value: ConfigError) -> Self {
        match value {
            ConfigError::MissingCredential(message) => Self::MissingCredential(message),
            other => Self::Config(other.to_string()),
        }
    }
}

fn provider_failure(stage: &'static str) -> impl FnOnce(ProviderError) -> WorkflowError {
    move |source| WorkflowError::ProviderCallFailed { stage, source }
}

/// Result of [`TrainingWorkflow::run`].
#[derive(Debug)]
pub struct RunReport {
    /// How the workflow ended.
    pub outcome: Result<WorkflowOutcome, WorkflowError>,
    /// What was still running afterwards.
    pub reconciliation: Reconciliation,
    /// Last lifecycle phase the instance reached.
    pub last_state: LifecycleState,
    /// Instance launched by this run, if any.
    pub instance_id: Option<InstanceId>,
}

impl RunReport {
    /// Returns `true` when the workflow ended without error and the account
    /// state was confirmed.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.outcome.is_ok() && !self.reconciliation.is_unverified()
    }
}

#[derive(Debug, Default)]
struct RunTracker {
    state: Cell<LifecycleState>,
    instance_id: OnceCell<InstanceId>,
}

impl RunTracker {
    fn advance(&self, state: LifecycleState) {
        self.state.set(state);
    }
}

/// Composes acquisition, lifecycle, remote execution, and retrieval.
#[derive(Debug)]
pub struct TrainingWorkflow<'a, P: ?Sized, R: CommandRunner, C: ?Sized> {
    provider: &'a P,
    executor: &'a RemoteExecutor<R>,
    clock: &'a C,
    recipe: TrainingRecipe,
    capacity_poll_interval: Duration,
    active_poll_interval: Duration,
}

impl<'a, P, R, C> TrainingWorkflow<'a, P, R, C>
where
    P: Provider + ?Sized,
    R: CommandRunner,
    C: Clock + ?Sized,
{
    /// Creates a workflow with the default recipe and polling intervals.
    #[must_use]
    pub fn new(provider: &'a P, executor: &'a RemoteExecutor<R>, clock: &'a C) -> Self {
        Self {
            provider,
            executor,
            clock,
            recipe: TrainingRecipe::default(),
            capacity_poll_interval: CAPACITY_POLL_INTERVAL,
            active_poll_interval: ACTIVE_POLL_INTERVAL,
        }
    }

    /// Replaces the training recipe.
    #[must_use]
    pub fn with_recipe(mut self, recipe: TrainingRecipe) -> Self {
        self.recipe = recipe;
        self
    }

    /// Overrides the capacity and readiness polling intervals.
    #[must_use]
    pub const fn with_poll_intervals(mut self, capacity: Duration, active: Duration) -> Self {
        self.capacity_poll_interval = capacity;
        self.active_poll_interval = active;
        self
    }

    /// Runs the workflow, racing it against `interrupt`, then reconciles
    /// unconditionally.
    pub async fn run<I>(&self, options: &WorkflowOptions, interrupt: I) -> RunReport
    where
        I: Future<Output = ()>,
    {
        let tracker = RunTracker::default();
        let outcome = tokio::select! {
            result = self.execute_tracked(options, &tracker) => result,
            () = interrupt => {
                let last_state = tracker.state.get();
                warn!(%last_state, "interrupted; the in-flight step was cancelled");
                Err(WorkflowError::Interrupted { last_state })
            }
        };

        if let Err(err) = &outcome {
            warn!(error = %err, "training run failed");
        }
        let reconciliation = reconcile(self.provider).await;

        RunReport {
            outcome,
            reconciliation,
            last_state: tracker.state.get(),
            instance_id: tracker.instance_id.get().cloned(),
        }
    }

    /// Runs the workflow without interrupt handling or reconciliation.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError`] for the first failing step.
    pub async fn execute(&self, options: &WorkflowOptions) -> Result<WorkflowOutcome, WorkflowError> {
        self.execute_tracked(options, &RunTracker::default()).await
    }

    async fn execute_tracked(
        &self,
        options: &WorkflowOptions,
        tracker: &RunTracker,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let key = self.resolve_credential(options).await?;
        let Some(placement) = self.acquire(options).await? else {
            info!(
                desired = ?options.desired_instance_types,
                "no desired instance type has capacity; not launching"
            );
            return Ok(WorkflowOutcome::NoCapacity);
        };

        let lifecycle = InstanceLifecycle::new(self.provider, self.clock)
            .with_poll_interval(self.active_poll_interval);

        tracker.advance(LifecycleState::Launching);
        let launched = lifecycle
            .launch(&placement, &key)
            .await
            .map_err(provider_failure("launching the instance"))?;
        let instance_id = tracker.instance_id.get_or_init(|| launched);
        tracker.advance(LifecycleState::Booting);
        info!(instance_id = %instance_id, "instance launched; waiting until active");

        lifecycle
            .wait_until_active(instance_id)
            .await
            .map_err(provider_failure("waiting for the instance to become active"))?;
        tracker.advance(LifecycleState::Active);
        let host = lifecycle
            .get_ip(instance_id)
            .await
            .map_err(provider_failure("fetching the instance address"))?;
        info!(instance_id = %instance_id, %host, "instance active");

        let version = version_tag(self.clock.now());
        let steps = self.recipe.steps(&version, options.include_diagnostics);
        self.executor
            .run_all(&host, &steps, options.strict_diagnostics)
            .map_err(WorkflowError::RemoteCommandFailed)?;

        self.executor
            .artifacts()
            .fetch(&host, &self.recipe.artifact_glob(), &options.output_dir)
            .map_err(WorkflowError::ArtifactCopyFailed)?;
        info!(output_dir = %options.output_dir, %version, "model package copied");

        let terminated = if options.skip_termination {
            warn!(
                instance_id = %instance_id,
                "skipping termination; the instance keeps running and billing"
            );
            false
        } else {
            tracker.advance(LifecycleState::Terminating);
            lifecycle
                .terminate(instance_id)
                .await
                .map_err(provider_failure("terminating the instance"))?;
            tracker.advance(LifecycleState::Terminated);
            true
        };

        Ok(WorkflowOutcome::Completed {
            instance_id: instance_id.clone(),
            placement,
            artifact_dir: options.output_dir.clone(),
            terminated,
        })
    }

    async fn resolve_credential(&self, options: &WorkflowOptions) -> Result<KeyName, WorkflowError> {
        if let Some(name) = &options.ssh_key_name {
            return Ok(name.clone());
        }
        let keys = self
            .provider
            .list_ssh_keys()
            .await
            .map_err(provider_failure("listing SSH keys"))?;
        let key = keys.into_iter().next().ok_or(WorkflowError::NoCredential)?;
        info!(key = %key.name, "no SSH key name given; using the first registered key");
        Ok(key.name)
    }

    async fn acquire(&self, options: &WorkflowOptions) -> Result<Option<Placement>, WorkflowError> {
        let acquirer = ResourceAcquirer::new(self.provider, self.clock);
        let desired = options.desired_instance_types.as_slice();
        let placement = if options.wait_for_capacity {
            acquirer
                .wait_for_available(desired, self.capacity_poll_interval)
                .await
                .map(Some)
        } else {
            acquirer.find_available(desired).await
        };
        let chosen = placement.map_err(provider_failure("checking capacity"))?;
        if let Some(found) = &chosen {
            info!(instance_type = %found.instance_type, region = %found.region, "capacity found");
        }
        Ok(chosen)
    }
}
