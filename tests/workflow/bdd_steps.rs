//! BDD step definitions for the training workflow.

use std::future;

use cloudtrain::provider::{InstanceStatus, InstanceTypeOffering};
use cloudtrain::{
    Reconciliation, RemoteError, RemoteExecutor, ResourceAcquirer, TrainingWorkflow,
    WorkflowError, WorkflowOutcome,
};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::WorkflowContext;
use crate::test_constants::{DEFAULT_INSTANCE_TYPE, DEFAULT_REGION};

/// Required steps, GPU diagnostics, and the artifact copy.
const SUCCESSFUL_COMMANDS: usize = 9;

fn runtime() -> Runtime {
    Runtime::new().unwrap_or_else(|err| panic!("tokio runtime: {err}"))
}

#[given("a provider offering \"{unavailable}\" without capacity and \"{available}\" in \"{region}\"")]
fn provider_offering(
    workflow_context: &WorkflowContext,
    unavailable: String,
    available: String,
    region: String,
) {
    workflow_context.provider.push_offerings(vec![
        InstanceTypeOffering::new(unavailable, &[]),
        InstanceTypeOffering::new(available, &[region.as_str(), "spare-region"]),
    ]);
}

#[given("the desired instance types are \"{types}\"")]
fn desired_types(workflow_context: &WorkflowContext, types: String) {
    workflow_context.options.borrow_mut().desired_instance_types =
        types.split(',').map(str::to_owned).collect();
}

#[given("a provider with capacity for the default instance type")]
fn provider_with_capacity(workflow_context: &WorkflowContext) {
    workflow_context.provider.push_offerings(vec![InstanceTypeOffering::new(
        DEFAULT_INSTANCE_TYPE,
        &[DEFAULT_REGION],
    )]);
    workflow_context.provider.push_status(InstanceStatus::Booting);
    workflow_context.provider.push_status(InstanceStatus::Active);
    workflow_context.options.borrow_mut().desired_instance_types =
        vec![DEFAULT_INSTANCE_TYPE.to_owned()];
}

#[given("a provider with no capacity")]
fn provider_without_capacity(workflow_context: &WorkflowContext) {
    workflow_context
        .provider
        .push_offerings(vec![InstanceTypeOffering::new(DEFAULT_INSTANCE_TYPE, &[])]);
}

#[given("every remote command succeeds")]
fn remote_commands_succeed(workflow_context: &WorkflowContext) {
    workflow_context.runner.push_successes(SUCCESSFUL_COMMANDS);
}

#[given("remote command \"{ordinal}\" fails")]
fn remote_command_fails(workflow_context: &WorkflowContext, ordinal: usize) {
    workflow_context
        .runner
        .push_successes(ordinal.saturating_sub(1));
    workflow_context.runner.push_failure(1);
}

#[given("termination is skipped")]
fn termination_skipped(workflow_context: &WorkflowContext) {
    workflow_context.options.borrow_mut().skip_termination = true;
}

#[when("I look for available capacity")]
fn look_for_capacity(workflow_context: &WorkflowContext) {
    let desired = workflow_context.options.borrow().desired_instance_types.clone();
    let acquirer = ResourceAcquirer::new(&workflow_context.provider, &workflow_context.clock);
    let placement = runtime()
        .block_on(acquirer.find_available(desired.as_slice()))
        .unwrap_or_else(|err| panic!("capacity lookup failed: {err}"));
    *workflow_context.placement.borrow_mut() = placement;
}

#[when("I run the training workflow")]
fn run_training(workflow_context: &WorkflowContext) {
    let executor = RemoteExecutor::new(
        workflow_context.ssh_config.clone(),
        workflow_context.runner.clone(),
    )
    .unwrap_or_else(|err| panic!("executor: {err}"));
    let workflow = TrainingWorkflow::new(
        &workflow_context.provider,
        &executor,
        &workflow_context.clock,
    );
    let options = workflow_context.options.borrow().clone();
    let report = runtime().block_on(workflow.run(&options, future::pending()));
    *workflow_context.report.borrow_mut() = Some(report);
}

#[then("the chosen placement is \"{instance_type}\" in \"{region}\"")]
fn chosen_placement(workflow_context: &WorkflowContext, instance_type: String, region: String) {
    let placement = workflow_context.placement.borrow();
    let chosen = placement
        .as_ref()
        .unwrap_or_else(|| panic!("expected a placement"));
    assert_eq!(chosen.instance_type, instance_type);
    assert_eq!(chosen.region, region);
}

#[then("the workflow completes without terminating the instance")]
fn completes_without_terminating(workflow_context: &WorkflowContext) {
    let report = workflow_context.report.borrow();
    let outcome = report.as_ref().map(|run| &run.outcome);
    assert!(
        matches!(
            outcome,
            Some(Ok(WorkflowOutcome::Completed {
                terminated: false,
                ..
            }))
        ),
        "unexpected outcome: {outcome:?}"
    );
    assert!(workflow_context.provider.terminate_calls().is_empty());
}

#[then("the workflow fails with a remote command error")]
fn fails_with_remote_error(workflow_context: &WorkflowContext) {
    let report = workflow_context.report.borrow();
    let outcome = report.as_ref().map(|run| &run.outcome);
    assert!(
        matches!(
            outcome,
            Some(Err(WorkflowError::RemoteCommandFailed(
                RemoteError::CommandFailed { .. }
            )))
        ),
        "unexpected outcome: {outcome:?}"
    );
}

#[then("only \"{count}\" remote commands ran")]
fn only_commands_ran(workflow_context: &WorkflowContext, count: usize) {
    assert_eq!(workflow_context.remote_command_count(), count);
}

#[then("the workflow reports no capacity")]
fn reports_no_capacity(workflow_context: &WorkflowContext) {
    let report = workflow_context.report.borrow();
    let outcome = report.as_ref().map(|run| &run.outcome);
    assert!(
        matches!(outcome, Some(Ok(WorkflowOutcome::NoCapacity))),
        "unexpected outcome: {outcome:?}"
    );
}

#[then("no instance is launched")]
fn nothing_launched(workflow_context: &WorkflowContext) {
    assert!(workflow_context.provider.launch_requests().is_empty());
    assert_eq!(workflow_context.remote_command_count(), 0);
}

#[then("the reconciliation reports running instances")]
fn reconciliation_reports_running(workflow_context: &WorkflowContext) {
    let report = workflow_context.report.borrow();
    let reconciliation = report.as_ref().map(|run| &run.reconciliation);
    let Some(Reconciliation::Running(instances)) = reconciliation else {
        panic!("expected running instances, got {reconciliation:?}");
    };
    assert_eq!(instances.len(), 1);
    assert_eq!(
        workflow_context.provider.billable_instances().len(),
        instances.len()
    );
}

#[then("the reconciliation is clear")]
fn reconciliation_clear(workflow_context: &WorkflowContext) {
    let report = workflow_context.report.borrow();
    let reconciliation = report.as_ref().map(|run| &run.reconciliation);
    assert_eq!(reconciliation, Some(&Reconciliation::Clear));
}
