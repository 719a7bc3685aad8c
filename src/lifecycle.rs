//! Launch, readiness, and termination of the training instance.
//!
//! The provider owns the instance record; this module only issues provider
//! operations against the id returned at launch and tracks which lifecycle
//! phase the run reached so the workflow can report it.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::acquire::Placement;
use crate::clock::{Clock, poll_until};
use crate::provider::{
    InstanceId, InstanceStatus, KeyName, LaunchRequest, Provider, ProviderError,
};

/// Delay between instance detail queries while waiting for readiness.
pub const ACTIVE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Prefix of generated instance names.
pub const INSTANCE_NAME_PREFIX: &str = "ethicalads_model_trainer";

/// Phase reached by the instance owned by this run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LifecycleState {
    /// No launch has been attempted.
    #[default]
    NotCreated,
    /// The launch request is in flight.
    Launching,
    /// The provider accepted the launch; waiting for readiness.
    Booting,
    /// The instance reported `active`.
    Active,
    /// A termination request is in flight.
    Terminating,
    /// The provider accepted the termination request.
    Terminated,
}

impl LifecycleState {
    /// Returns `true` when an instance may exist and still bill.
    #[must_use]
    pub const fn may_hold_instance(self) -> bool {
        matches!(
            self,
            Self::Launching | Self::Booting | Self::Active | Self::Terminating
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotCreated => "not created",
            Self::Launching => "launching",
            Self::Booting => "booting",
            Self::Active => "active",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Renders the display name for an instance launched at `now`, for example
/// `ethicalads_model_trainer_20240102030405`.
#[must_use]
pub fn instance_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}_{}", now.format("%Y%m%d%H%M%S"))
}

/// Issues lifecycle operations for a single instance.
#[derive(Debug)]
pub struct InstanceLifecycle<'a, P: ?Sized, C: ?Sized> {
    provider: &'a P,
    clock: &'a C,
    poll_interval: Duration,
}

impl<'a, P, C> InstanceLifecycle<'a, P, C>
where
    P: Provider + ?Sized,
    C: Clock + ?Sized,
{
    /// Creates a lifecycle manager using the default readiness interval.
    #[must_use]
    pub const fn new(provider: &'a P, clock: &'a C) -> Self {
        Self {
            provider,
            clock,
            poll_interval: ACTIVE_POLL_INTERVAL,
        }
    }

    /// Overrides the readiness polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Launches one instance of `placement` with the given SSH key and
    /// returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::UnexpectedLaunchCount`] when the provider
    /// does not return exactly one id, or any error from the launch call.
    pub async fn launch(
        &self,
        placement: &Placement,
        key: &KeyName,
    ) -> Result<InstanceId, ProviderError> {
        let name = instance_name(INSTANCE_NAME_PREFIX, self.clock.now());
        let request = LaunchRequest::single(
            placement.region.as_str(),
            placement.instance_type.as_str(),
            key.clone(),
            name.as_str(),
        );
        info!(%placement, key = %key, %name, "launching instance");

        let mut ids = self.provider.launch(&request).await?;
        if ids.len() != 1 {
            warn!(returned = ids.len(), "provider returned unexpected instance ids");
            return Err(ProviderError::UnexpectedLaunchCount { count: ids.len() });
        }
        ids.pop()
            .ok_or(ProviderError::UnexpectedLaunchCount { count: 0 })
    }

    /// Polls instance details until the provider reports `active`. There is
    /// no timeout; an instance that never activates keeps the caller waiting
    /// until the operator interrupts.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when a detail query fails.
    pub async fn wait_until_active(&self, id: &InstanceId) -> Result<(), ProviderError> {
        poll_until(self.clock, self.poll_interval, || async {
            let record = self.provider.instance(id).await?;
            debug!(instance_id = %id, status = %record.status, "instance status");
            Ok((record.status == InstanceStatus::Active).then_some(()))
        })
        .await
    }

    /// Returns the public IP of an active instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingIp`] when the provider has not
    /// assigned an address, which happens before the instance is active.
    pub async fn get_ip(&self, id: &InstanceId) -> Result<String, ProviderError> {
        let record = self.provider.instance(id).await?;
        record
            .ip
            .filter(|ip| !ip.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingIp {
                instance_id: id.to_string(),
            })
    }

    /// Requests termination. The outcome is advisory; callers confirm by
    /// listing instances afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the provider rejects the request.
    pub async fn terminate(&self, id: &InstanceId) -> Result<(), ProviderError> {
        info!(instance_id = %id, "terminating instance");
        let terminated = self.provider.terminate(id).await?;
        debug!(
            instance_id = %id,
            acknowledged = terminated.iter().any(|record| &record.id == id),
            "termination requested"
        );
        Ok(())
    }
}
