//! Wire types for the Lambda Labs Cloud API.
//!
//! Only the fields the training workflow reads are modelled; unknown fields
//! are ignored so catalogue additions on the provider side do not break
//! decoding.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

macro_rules! newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw provider value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrows the raw value.
            #[must_use]
            pub const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

newtype!(
    /// Opaque provider identifier of a launched instance.
    InstanceId
);
newtype!(
    /// Name of an SSH public key registered with the provider.
    KeyName
);

/// Region in which an instance type can be launched.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Region {
    /// Provider region name (for example `us-east-1`).
    pub name: String,
    /// Human readable description.
    #[serde(default)]
    pub description: String,
}

/// Hardware description of an instance type.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InstanceTypeSpec {
    /// Type name used when launching (for example `gpu_1x_a6000`).
    #[serde(default)]
    pub name: String,
    /// Human readable description.
    #[serde(default)]
    pub description: String,
    /// Hourly price in US cents.
    #[serde(default)]
    pub price_cents_per_hour: u32,
}

/// Catalogue entry describing an instance type and where it has capacity.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct InstanceTypeOffering {
    /// Hardware description.
    #[serde(default)]
    pub instance_type: InstanceTypeSpec,
    /// Regions with spare capacity, in provider order.
    #[serde(default)]
    pub regions_with_capacity_available: Vec<Region>,
}

impl InstanceTypeOffering {
    /// Builds an offering, mainly for tests and fakes.
    #[must_use]
    pub fn new(type_name: impl Into<String>, regions: &[&str]) -> Self {
        Self {
            instance_type: InstanceTypeSpec {
                name: type_name.into(),
                ..InstanceTypeSpec::default()
            },
            regions_with_capacity_available: regions
                .iter()
                .map(|name| Region {
                    name: (*name).to_owned(),
                    description: String::new(),
                })
                .collect(),
        }
    }

    /// Returns the instance type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.instance_type.name
    }

    /// Returns the first region with capacity, if any.
    #[must_use]
    pub fn first_region(&self) -> Option<&Region> {
        self.regions_with_capacity_available.first()
    }

    /// Sets the type name from the catalogue key, which is authoritative.
    #[must_use]
    pub(crate) fn named(mut self, name: String) -> Self {
        self.instance_type.name = name;
        self
    }
}

/// Provider-reported instance status.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Instance is starting.
    Booting,
    /// Instance is running and reachable.
    Active,
    /// Instance is running but failed health checks.
    Unhealthy,
    /// Termination is in progress.
    Terminating,
    /// Instance is gone.
    Terminated,
    /// Status the client does not recognise.
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    /// Returns `true` once the instance no longer bills.
    #[must_use]
    pub const fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Returns `true` while a requested termination is still in progress.
    #[must_use]
    pub const fn is_shutting_down(self) -> bool {
        matches!(self, Self::Terminating)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Booting => "booting",
            Self::Active => "active",
            Self::Unhealthy => "unhealthy",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Instance record owned by the provider.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct RunningInstance {
    /// Provider identifier.
    pub id: InstanceId,
    /// Name assigned at launch.
    #[serde(default)]
    pub name: Option<String>,
    /// Current status.
    pub status: InstanceStatus,
    /// Public IPv4 address, present once the instance is active.
    #[serde(default)]
    pub ip: Option<String>,
    /// Region hosting the instance.
    #[serde(default)]
    pub region: Option<Region>,
    /// Instance type.
    #[serde(default)]
    pub instance_type: Option<InstanceTypeSpec>,
}

impl RunningInstance {
    /// Builds a minimal record, mainly for tests and fakes.
    #[must_use]
    pub fn new(id: impl Into<InstanceId>, status: InstanceStatus, ip: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: None,
            status,
            ip: ip.map(str::to_owned),
            region: None,
            instance_type: None,
        }
    }
}

/// SSH public key registered with the provider.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct SshKey {
    /// Provider identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Key name used when launching.
    pub name: KeyName,
}

/// Body of `POST /instance-operations/launch`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LaunchRequest {
    /// Target region.
    pub region_name: String,
    /// Instance type to launch.
    pub instance_type_name: String,
    /// SSH keys installed on the instance; the API accepts exactly one.
    pub ssh_key_names: Vec<KeyName>,
    /// Number of instances; always 1 for training runs.
    pub quantity: u32,
    /// Display name.
    pub name: String,
}

impl LaunchRequest {
    /// Builds a request for a single instance.
    #[must_use]
    pub fn single(
        region_name: impl Into<String>,
        instance_type_name: impl Into<String>,
        key: KeyName,
        name: impl Into<String>,
    ) -> Self {
        Self {
            region_name: region_name.into(),
            instance_type_name: instance_type_name.into(),
            ssh_key_names: vec![key],
            quantity: 1,
            name: name.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct LaunchResponse {
    #[serde(default)]
    pub(super) instance_ids: Vec<InstanceId>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TerminateResponse {
    #[serde(default)]
    pub(super) terminated_instances: Vec<RunningInstance>,
}
