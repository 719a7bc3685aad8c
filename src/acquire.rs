//! Selection of an instance type and region with spare GPU capacity.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info};

use crate::clock::{Clock, poll_until};
use crate::provider::{InstanceTypeOffering, Provider, ProviderError};

/// Instance types tried in order when the caller does not override them.
pub const DEFAULT_DESIRED_INSTANCE_TYPES: &[&str] = &[
    "gpu_1x_rtx6000", // ~50c/hr
    "gpu_1x_a6000",   // ~80c/hr
];

/// Delay between catalogue queries while waiting for capacity.
pub const CAPACITY_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Instance type and region chosen for a launch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Placement {
    /// Instance type name.
    pub instance_type: String,
    /// Region with capacity for that type.
    pub region: String,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.instance_type, self.region)
    }
}

/// Picks the first desired type, in preference order, that has capacity,
/// and the first region listed for it.
///
/// Offering order never influences the choice; only the preference list and
/// the provider's region order for the chosen type do.
#[must_use]
pub fn select_placement<S: AsRef<str>>(
    offerings: &[InstanceTypeOffering],
    desired: &[S],
) -> Option<Placement> {
    desired.iter().find_map(|wanted| {
        let wanted_name = wanted.as_ref();
        let offering = offerings
            .iter()
            .find(|offering| offering.type_name() == wanted_name)?;
        let region = offering.first_region()?;
        Some(Placement {
            instance_type: wanted_name.to_owned(),
            region: region.name.clone(),
        })
    })
}

/// Queries the provider for capacity matching a preference list.
#[derive(Debug)]
pub struct ResourceAcquirer<'a, P: ?Sized, C: ?Sized> {
    provider: &'a P,
    clock: &'a C,
}

impl<'a, P, C> ResourceAcquirer<'a, P, C>
where
    P: Provider + ?Sized,
    C: Clock + ?Sized,
{
    /// Creates an acquirer over `provider`, sleeping on `clock` when waiting.
    #[must_use]
    pub const fn new(provider: &'a P, clock: &'a C) -> Self {
        Self { provider, clock }
    }

    /// Fetches current offerings and selects a placement. `Ok(None)` means
    /// no desired type has capacity right now.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the catalogue query fails.
    pub async fn find_available<S: AsRef<str>>(
        &self,
        desired: &[S],
    ) -> Result<Option<Placement>, ProviderError> {
        let offerings = self.provider.list_instance_types().await?;
        let placement = select_placement(&offerings, desired);
        debug!(offered = offerings.len(), ?placement, "capacity check");
        Ok(placement)
    }

    /// Polls [`Self::find_available`] until capacity appears. There is no
    /// deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when any catalogue query fails.
    pub async fn wait_for_available<S: AsRef<str>>(
        &self,
        desired: &[S],
        poll_interval: Duration,
    ) -> Result<Placement, ProviderError> {
        info!(
            interval_secs = poll_interval.as_secs(),
            "waiting for GPU capacity"
        );
        poll_until(self.clock, poll_interval, || self.find_available(desired)).await
    }
}
