//! BDD scenarios for the training workflow.

use rstest_bdd_macros::scenario;

use super::test_helpers::{WorkflowContext, workflow_context};

#[scenario(
    path = "tests/features/workflow.feature",
    name = "Prefer the first desired type that has capacity"
)]
fn scenario_select_placement(workflow_context: WorkflowContext) {
    drop(workflow_context);
}

#[scenario(
    path = "tests/features/workflow.feature",
    name = "Skipping termination leaves the instance reported"
)]
fn scenario_skip_termination(workflow_context: WorkflowContext) {
    drop(workflow_context);
}

#[scenario(
    path = "tests/features/workflow.feature",
    name = "Give up when nothing has capacity"
)]
fn scenario_no_capacity(workflow_context: WorkflowContext) {
    drop(workflow_context);
}

#[scenario(
    path = "tests/features/workflow.feature",
    name = "Stop at the first failing training step"
)]
fn scenario_fail_fast(workflow_context: WorkflowContext) {
    drop(workflow_context);
}
