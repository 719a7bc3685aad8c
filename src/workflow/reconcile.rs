//! End-of-run check for instances that are still billing.

use std::io::{self, Write};

use tracing::{info, warn};

use crate::provider::{Provider, ProviderError, RunningInstance};

/// What the provider reported about running instances after a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reconciliation {
    /// Nothing is running on the account.
    Clear,
    /// These instances are still running and billing.
    Running(Vec<RunningInstance>),
    /// Nothing bills any more, but these instances have not finished
    /// terminating.
    ShuttingDown(Vec<RunningInstance>),
    /// The provider could not be asked.
    Unverified(ProviderError),
}

impl Reconciliation {
    /// Returns `true` when the account state could not be confirmed.
    #[must_use]
    pub const fn is_unverified(&self) -> bool {
        matches!(self, Self::Unverified(_))
    }
}

/// Lists the account's instances and keeps those not yet terminated.
///
/// Instances still `terminating` only count when nothing else is running;
/// a clean run usually ends with its own instance in that state.
/// Never fails: a provider error becomes [`Reconciliation::Unverified`].
pub async fn reconcile<P: Provider + ?Sized>(provider: &P) -> Reconciliation {
    match provider.list_instances().await {
        Ok(instances) => {
            let (shutting_down, running): (Vec<RunningInstance>, Vec<RunningInstance>) =
                instances
                    .into_iter()
                    .filter(|instance| !instance.status.is_terminated())
                    .partition(|instance| instance.status.is_shutting_down());
            if running.is_empty() && shutting_down.is_empty() {
                Reconciliation::Clear
            } else if running.is_empty() {
                info!(count = shutting_down.len(), "instances are still terminating");
                Reconciliation::ShuttingDown(shutting_down)
            } else {
                warn!(count = running.len(), "instances are still running");
                Reconciliation::Running(running)
            }
        }
        Err(err) => {
            warn!(error = %err, "could not list running instances");
            Reconciliation::Unverified(err)
        }
    }
}

fn describe(instance: &RunningInstance) -> String {
    let mut line = format!("- {} [{}]", instance.id, instance.status);
    if let Some(name) = &instance.name {
        line.push_str(&format!(" {name}"));
    }
    if let Some(instance_type) = instance
        .instance_type
        .as_ref()
        .filter(|spec| !spec.name.is_empty())
    {
        line.push_str(&format!(" {}", instance_type.name));
    }
    if let Some(region) = &instance.region {
        line.push_str(&format!(" in {}", region.name));
    }
    if let Some(ip) = &instance.ip {
        line.push_str(&format!(" at {ip}"));
    }
    line
}

/// Writes the operator-facing reconciliation report.
///
/// # Errors
///
/// Returns any error from writing to `out`.
pub fn write_report<W: Write>(out: &mut W, reconciliation: &Reconciliation) -> io::Result<()> {
    match reconciliation {
        Reconciliation::Clear => {
            writeln!(out, "👍 There are no currently running instances.")?;
        }
        Reconciliation::Running(instances) => {
            writeln!(out, "Running instances:")?;
            for instance in instances {
                writeln!(out, "{}", describe(instance))?;
            }
            writeln!(out)?;
            writeln!(out, "IMPORTANT: There are currently running instances!!")?;
            writeln!(out, "You are responsible for shutting these down.")?;
            writeln!(out, "These are being billed at an hourly rate!")?;
        }
        Reconciliation::ShuttingDown(instances) => {
            writeln!(out, "Instances still shutting down:")?;
            for instance in instances {
                writeln!(out, "{}", describe(instance))?;
            }
            writeln!(out)?;
            writeln!(
                out,
                "Termination was requested; these should disappear shortly."
            )?;
        }
        Reconciliation::Unverified(err) => {
            writeln!(out, "WARNING: Could not check for running instances: {err}")?;
            writeln!(
                out,
                "Check the Lambda Labs dashboard and terminate anything you no longer need."
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::provider::{InstanceStatus, InstanceTypeSpec, Region};
    use crate::test_support::ScriptedProvider;

    fn render(reconciliation: &Reconciliation) -> String {
        let mut buffer = Vec::new();
        write_report(&mut buffer, reconciliation).expect("write to vec");
        String::from_utf8(buffer).expect("utf8 report")
    }

    #[tokio::test]
    async fn empty_account_is_clear() {
        let provider = ScriptedProvider::new();
        assert_eq!(reconcile(&provider).await, Reconciliation::Clear);
    }

    #[tokio::test]
    async fn terminated_instances_are_ignored() {
        let provider = ScriptedProvider::new();
        provider.add_instance(RunningInstance::new("old", InstanceStatus::Terminated, None));
        provider.add_instance(RunningInstance::new("live", InstanceStatus::Active, Some("192.0.2.1")));

        let Reconciliation::Running(running) = reconcile(&provider).await else {
            panic!("expected running instances");
        };
        let ids: Vec<&str> = running.iter().map(|instance| instance.id.as_str()).collect();
        assert_eq!(ids, vec!["live"]);
    }

    #[tokio::test]
    async fn terminating_instances_are_not_reported_as_billing() {
        let provider = ScriptedProvider::new();
        provider.add_instance(RunningInstance::new("inst-1", InstanceStatus::Terminating, None));

        assert_eq!(
            reconcile(&provider).await,
            Reconciliation::ShuttingDown(vec![RunningInstance::new(
                "inst-1",
                InstanceStatus::Terminating,
                None
            )])
        );
    }

    #[tokio::test]
    async fn running_instances_take_precedence_over_terminating_ones() {
        let provider = ScriptedProvider::new();
        provider.add_instance(RunningInstance::new("done", InstanceStatus::Terminating, None));
        provider.add_instance(RunningInstance::new("live", InstanceStatus::Booting, None));

        let Reconciliation::Running(running) = reconcile(&provider).await else {
            panic!("expected running instances");
        };
        let ids: Vec<&str> = running.iter().map(|instance| instance.id.as_str()).collect();
        assert_eq!(ids, vec!["live"]);
    }

    #[tokio::test]
    async fn provider_failure_is_unverified() {
        let provider = ScriptedProvider::new();
        let failure = ProviderError::Transport {
            method: String::from("GET"),
            path: String::from("/instances"),
            message: String::from("connection reset"),
        };
        provider.fail_list_instances(failure.clone());

        assert_eq!(reconcile(&provider).await, Reconciliation::Unverified(failure));
    }

    #[rstest]
    fn clear_report_confirms_nothing_runs() {
        assert_eq!(
            render(&Reconciliation::Clear),
            "👍 There are no currently running instances.\n"
        );
    }

    #[rstest]
    fn running_report_lists_instances_and_warns() {
        let mut instance = RunningInstance::new("inst-1", InstanceStatus::Active, Some("192.0.2.10"));
        instance.name = Some(String::from("trainer"));
        instance.region = Some(Region {
            name: String::from("us-east-1"),
            description: String::new(),
        });
        instance.instance_type = Some(InstanceTypeSpec {
            name: String::from("gpu_1x_a6000"),
            ..InstanceTypeSpec::default()
        });

        let report = render(&Reconciliation::Running(vec![instance]));

        assert!(
            report.contains("- inst-1 [active] trainer gpu_1x_a6000 in us-east-1 at 192.0.2.10"),
            "{report}"
        );
        assert!(report.contains("IMPORTANT: There are currently running instances!!"));
        assert!(report.contains("You are responsible for shutting these down."));
        assert!(report.contains("billed at an hourly rate"));
    }

    #[rstest]
    fn shutting_down_report_has_no_billing_warning() {
        let report = render(&Reconciliation::ShuttingDown(vec![RunningInstance::new(
            "inst-1",
            InstanceStatus::Terminating,
            None,
        )]));

        assert!(report.contains("- inst-1 [terminating]"), "{report}");
        assert!(!report.contains("billed"), "{report}");
    }

    #[rstest]
    fn unverified_report_names_the_failure() {
        let report = render(&Reconciliation::Unverified(ProviderError::CallFailed {
            method: String::from("GET"),
            path: String::from("/instances"),
            status: 503,
            body: String::from("unavailable"),
        }));

        assert!(report.starts_with("WARNING: Could not check"), "{report}");
        assert!(report.contains("status 503"), "{report}");
    }
}
