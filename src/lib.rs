//! Core library for the `cloudtrain` model training tool.
//!
//! The crate provisions one transient Lambda Labs GPU instance, runs the
//! training recipe on it over SSH, copies the packaged model back, and tears
//! the instance down. Whatever happens, a run ends by reconciling the
//! account so no billable instance goes unreported.

pub mod acquire;
pub mod clock;
pub mod config;
pub mod lifecycle;
pub mod provider;
pub mod recipe;
pub mod remote;
pub mod test_support;
pub mod workflow;

pub use acquire::{DEFAULT_DESIRED_INSTANCE_TYPES, Placement, ResourceAcquirer, select_placement};
pub use clock::{Clock, SystemClock};
pub use config::{API_KEY_ENV, ConfigError, ProviderConfig};
pub use lifecycle::{InstanceLifecycle, LifecycleState, instance_name};
pub use provider::{InstanceId, KeyName, LambdaClient, Provider, ProviderError};
pub use recipe::TrainingRecipe;
pub use remote::{
    ArtifactRetriever, CommandOutput, CommandRunner, RemoteError, RemoteExecutor, RemoteStep,
    SshConfig, SshConfigLoadError, StreamingCommandRunner,
};
pub use workflow::{
    Reconciliation, RunReport, TrainingWorkflow, WorkflowError, WorkflowOptions, WorkflowOutcome,
    reconcile, write_report,
};
