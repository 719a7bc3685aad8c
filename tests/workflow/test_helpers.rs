//! Shared fixtures for training workflow BDD scenarios.

use std::cell::RefCell;
use std::rc::Rc;

use camino::Utf8PathBuf;
use cloudtrain::test_support::{ManualClock, ScriptedProvider, ScriptedRunner};
use cloudtrain::{Placement, RunReport, SshConfig, WorkflowOptions};
use rstest::fixture;
use tempfile::TempDir;

/// Everything a scenario scripts, runs, and inspects.
#[derive(Clone, Debug)]
pub struct WorkflowContext {
    pub provider: ScriptedProvider,
    pub runner: ScriptedRunner,
    pub clock: ManualClock,
    pub ssh_config: SshConfig,
    pub options: Rc<RefCell<WorkflowOptions>>,
    pub placement: Rc<RefCell<Option<Placement>>>,
    pub report: Rc<RefCell<Option<RunReport>>>,
    _output: Rc<TempDir>,
}

impl WorkflowContext {
    /// Number of `ssh` invocations made so far.
    pub fn remote_command_count(&self) -> usize {
        self.runner
            .invocations()
            .iter()
            .filter(|invocation| invocation.program == "ssh")
            .count()
    }
}

#[fixture]
pub fn workflow_context() -> WorkflowContext {
    let output = TempDir::new().unwrap_or_else(|err| panic!("temp output dir: {err}"));
    let output_dir = Utf8PathBuf::from_path_buf(output.path().join("packages"))
        .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()));
    let provider = ScriptedProvider::new();
    provider.add_ssh_key("laptop");

    WorkflowContext {
        provider,
        runner: ScriptedRunner::new(),
        clock: ManualClock::default(),
        ssh_config: SshConfig {
            ssh_bin: String::from("ssh"),
            scp_bin: String::from("scp"),
            identity_file: String::from("/keys/id_rsa"),
            batch_mode: None,
        },
        options: Rc::new(RefCell::new(WorkflowOptions {
            output_dir,
            ..WorkflowOptions::default()
        })),
        placement: Rc::new(RefCell::new(None)),
        report: Rc::new(RefCell::new(None)),
        _output: Rc::new(output),
    }
}
