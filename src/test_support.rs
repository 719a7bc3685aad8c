//! Test support utilities shared across unit and integration tests.
//!
//! The doubles here stand in for the three external systems a training run
//! touches: the provider API ([`ScriptedProvider`]), the local SSH and scp
//! clients ([`ScriptedRunner`]), and time ([`ManualClock`]).

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::clock::{Clock, SleepFuture};
use crate::provider::{
    InstanceId, InstanceStatus, InstanceTypeOffering, KeyName, LaunchRequest, Provider,
    ProviderError, ProviderFuture, RunningInstance, SshKey,
};
use crate::remote::{CommandOutput, CommandRunner, RemoteError};

/// Address [`ScriptedProvider`] reports for active instances.
pub const SCRIPTED_INSTANCE_IP: &str = "192.0.2.10";

/// Start time of [`ManualClock::default`]: 2024-01-02T03:04:05Z.
const MANUAL_CLOCK_EPOCH_SECS: i64 = 1_704_164_645;

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns the final argument, which for `ssh` is the remote command.
    #[must_use]
    pub fn last_arg(&self) -> Option<String> {
        self.args
            .last()
            .map(|arg| arg.to_string_lossy().into_owned())
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes `count` successful exit statuses.
    pub fn push_successes(&self, count: usize) {
        for _ in 0..count {
            self.push_success();
        }
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| RemoteError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct ClockState {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

/// Clock that records requested sleeps and advances virtual time instead of
/// waiting.
///
/// Each sleep yields to the runtime once so that a racing interrupt future
/// gets a chance to complete.
#[derive(Clone, Debug)]
pub struct ManualClock {
    state: Arc<Mutex<ClockState>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(DateTime::from_timestamp(MANUAL_CLOCK_EPOCH_SECS, 0).unwrap_or_default())
    }
}

impl ManualClock {
    /// Creates a clock that starts at `start`.
    #[must_use]
    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                now: start,
                sleeps: Vec::new(),
            })),
        }
    }

    /// Returns every sleep requested so far, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.state).sleeps.clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        lock(&self.state).now
    }

    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        {
            let mut state = lock(&self.state);
            state.sleeps.push(duration);
            state.now += TimeDelta::from_std(duration).unwrap_or_default();
        }
        Box::pin(tokio::task::yield_now())
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    offerings: VecDeque<Vec<InstanceTypeOffering>>,
    statuses: VecDeque<InstanceStatus>,
    ssh_keys: Vec<SshKey>,
    account: Vec<RunningInstance>,
    launch_ids: Option<Vec<InstanceId>>,
    launch_requests: Vec<LaunchRequest>,
    terminate_calls: Vec<InstanceId>,
    detail_queries: usize,
    list_queries: usize,
    fail_launch: Option<ProviderError>,
    fail_terminate: Option<ProviderError>,
    terminate_lingers: bool,
    fail_list_instances: Option<ProviderError>,
}

/// In-memory provider that models a single account.
///
/// Catalogue responses are scripted per call and an exhausted script fails
/// the call. Launched instances join the account as `booting` and follow the
/// scripted status queue on each detail query; termination marks them
/// `terminated` (or `terminating`, see [`ScriptedProvider::terminate_lingers`])
/// so reconciliation sees exactly what the workflow left behind.
#[derive(Clone, Debug, Default)]
pub struct ScriptedProvider {
    state: Arc<Mutex<ProviderState>>,
}

fn script_exhausted(path: &str) -> ProviderError {
    ProviderError::CallFailed {
        method: String::from("GET"),
        path: path.to_owned(),
        status: 500,
        body: String::from("no scripted response available"),
    }
}

impl ScriptedProvider {
    /// Creates a provider with an empty account and no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the catalogue returned by the next `list_instance_types` call.
    pub fn push_offerings(&self, offerings: Vec<InstanceTypeOffering>) {
        lock(&self.state).offerings.push_back(offerings);
    }

    /// Queues the status reported by the next instance detail query.
    pub fn push_status(&self, status: InstanceStatus) {
        lock(&self.state).statuses.push_back(status);
    }

    /// Registers an SSH key on the account.
    pub fn add_ssh_key(&self, name: &str) {
        lock(&self.state).ssh_keys.push(SshKey {
            id: None,
            name: KeyName::from(name),
        });
    }

    /// Adds a pre-existing instance to the account.
    pub fn add_instance(&self, instance: RunningInstance) {
        lock(&self.state).account.push(instance);
    }

    /// Overrides the ids returned by the next launch.
    pub fn set_launch_ids(&self, ids: Vec<InstanceId>) {
        lock(&self.state).launch_ids = Some(ids);
    }

    /// Makes launch calls fail with `error`.
    pub fn fail_launch(&self, error: ProviderError) {
        lock(&self.state).fail_launch = Some(error);
    }

    /// Makes terminate calls fail with `error`.
    pub fn fail_terminate(&self, error: ProviderError) {
        lock(&self.state).fail_terminate = Some(error);
    }

    /// Leaves terminated instances listed as `terminating`, as the real API
    /// does right after a terminate call.
    pub fn terminate_lingers(&self) {
        lock(&self.state).terminate_lingers = true;
    }

    /// Makes `list_instances` calls fail with `error`.
    pub fn fail_list_instances(&self, error: ProviderError) {
        lock(&self.state).fail_list_instances = Some(error);
    }

    /// Returns every launch request received.
    #[must_use]
    pub fn launch_requests(&self) -> Vec<LaunchRequest> {
        lock(&self.state).launch_requests.clone()
    }

    /// Returns every instance id passed to terminate.
    #[must_use]
    pub fn terminate_calls(&self) -> Vec<InstanceId> {
        lock(&self.state).terminate_calls.clone()
    }

    /// Returns how many instance detail queries were made.
    #[must_use]
    pub fn detail_queries(&self) -> usize {
        lock(&self.state).detail_queries
    }

    /// Returns how many times the account's instances were listed.
    #[must_use]
    pub fn list_queries(&self) -> usize {
        lock(&self.state).list_queries
    }

    /// Returns account instances that have not been terminated.
    #[must_use]
    pub fn billable_instances(&self) -> Vec<RunningInstance> {
        lock(&self.state)
            .account
            .iter()
            .filter(|instance| !instance.status.is_terminated())
            .cloned()
            .collect()
    }

    fn next_offerings(&self) -> Result<Vec<InstanceTypeOffering>, ProviderError> {
        lock(&self.state)
            .offerings
            .pop_front()
            .ok_or_else(|| script_exhausted("/instance-types"))
    }

    fn record_launch(&self, request: &LaunchRequest) -> Result<Vec<InstanceId>, ProviderError> {
        let mut state = lock(&self.state);
        state.launch_requests.push(request.clone());
        if let Some(error) = state.fail_launch.clone() {
            return Err(error);
        }
        let ordinal = state.launch_requests.len();
        let ids = state
            .launch_ids
            .take()
            .unwrap_or_else(|| vec![InstanceId::new(format!("inst-{ordinal}"))]);
        for id in &ids {
            let mut instance = RunningInstance::new(id.clone(), InstanceStatus::Booting, None);
            instance.name = Some(request.name.clone());
            state.account.push(instance);
        }
        Ok(ids)
    }

    fn query_instance(&self, id: &InstanceId) -> Result<RunningInstance, ProviderError> {
        let mut state = lock(&self.state);
        state.detail_queries += 1;
        let next_status = state.statuses.pop_front();
        let instance = state
            .account
            .iter_mut()
            .find(|instance| &instance.id == id)
            .ok_or_else(|| ProviderError::CallFailed {
                method: String::from("GET"),
                path: format!("/instances/{id}"),
                status: 404,
                body: String::from("instance not found"),
            })?;
        if let Some(status) = next_status {
            instance.status = status;
            instance.ip = (status == InstanceStatus::Active)
                .then(|| SCRIPTED_INSTANCE_IP.to_owned());
        }
        Ok(instance.clone())
    }

    fn record_terminate(&self, id: &InstanceId) -> Result<Vec<RunningInstance>, ProviderError> {
        let mut state = lock(&self.state);
        state.terminate_calls.push(id.clone());
        if let Some(error) = state.fail_terminate.clone() {
            return Err(error);
        }
        let status = if state.terminate_lingers {
            InstanceStatus::Terminating
        } else {
            InstanceStatus::Terminated
        };
        let terminated = state
            .account
            .iter_mut()
            .filter(|instance| &instance.id == id)
            .map(|instance| {
                instance.status = status;
                instance.ip = None;
                instance.clone()
            })
            .collect();
        Ok(terminated)
    }

    fn snapshot_account(&self) -> Result<Vec<RunningInstance>, ProviderError> {
        let mut state = lock(&self.state);
        state.list_queries += 1;
        if let Some(error) = state.fail_list_instances.clone() {
            return Err(error);
        }
        Ok(state
            .account
            .iter()
            .filter(|instance| !instance.status.is_terminated())
            .cloned()
            .collect())
    }
}

impl Provider for ScriptedProvider {
    fn list_instance_types(&self) -> ProviderFuture<'_, Vec<InstanceTypeOffering>> {
        let result = self.next_offerings();
        Box::pin(async move { result })
    }

    fn list_instances(&self) -> ProviderFuture<'_, Vec<RunningInstance>> {
        let result = self.snapshot_account();
        Box::pin(async move { result })
    }

    fn list_ssh_keys(&self) -> ProviderFuture<'_, Vec<SshKey>> {
        let keys = lock(&self.state).ssh_keys.clone();
        Box::pin(async move { Ok(keys) })
    }

    fn launch<'a>(&'a self, request: &'a LaunchRequest) -> ProviderFuture<'a, Vec<InstanceId>> {
        let result = self.record_launch(request);
        Box::pin(async move { result })
    }

    fn instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, RunningInstance> {
        let result = self.query_instance(id);
        Box::pin(async move { result })
    }

    fn terminate<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, Vec<RunningInstance>> {
        let result = self.record_terminate(id);
        Box::pin(async move { result })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        Self::apply(pairs, &[]).await
    }

    /// Removes environment variables while holding a global mutex.
    pub async fn remove_vars(keys: &[&str]) -> Self {
        Self::apply(&[], keys).await
    }

    /// Sets `pairs` and removes `removed` while holding a global mutex.
    pub async fn apply(pairs: &[(&str, &str)], removed: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs
                    .iter()
                    .map(|(key, _)| *key)
                    .chain(removed.iter().copied())
                    .all(|key| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len() + removed.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
        }
        for key in removed {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
