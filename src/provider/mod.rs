//! Capability provider abstraction for GPU instance provisioning.
//!
//! The [`Provider`] trait is the seam between the training workflow and the
//! cloud API. [`LambdaClient`] implements it against the Lambda Labs Cloud
//! API; tests substitute [`crate::test_support::ScriptedProvider`].

mod error;
mod lambda;
mod types;

use std::future::Future;
use std::pin::Pin;

pub use error::ProviderError;
pub use lambda::{DEFAULT_API_BASE, LambdaClient};
pub use types::{
    InstanceId, InstanceStatus, InstanceTypeOffering, InstanceTypeSpec, KeyName, LaunchRequest,
    Region, RunningInstance, SshKey,
};

/// Future returned by provider operations.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Operations the training workflow needs from a GPU cloud.
pub trait Provider {
    /// Lists the instance type catalogue with current regional capacity.
    fn list_instance_types(&self) -> ProviderFuture<'_, Vec<InstanceTypeOffering>>;

    /// Lists every instance on the account, whatever its status.
    fn list_instances(&self) -> ProviderFuture<'_, Vec<RunningInstance>>;

    /// Lists the SSH keys registered on the account.
    fn list_ssh_keys(&self) -> ProviderFuture<'_, Vec<SshKey>>;

    /// Submits a launch request and returns the ids the provider created.
    fn launch<'a>(&'a self, request: &'a LaunchRequest) -> ProviderFuture<'a, Vec<InstanceId>>;

    /// Fetches the current record for one instance.
    fn instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, RunningInstance>;

    /// Requests termination and returns the records the provider reports.
    fn terminate<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, Vec<RunningInstance>>;
}
