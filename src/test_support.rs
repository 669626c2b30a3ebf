//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedRunner`] replays canned command outputs; [`FakeStackService`]
//! simulates the remote stack service in memory, records every call and
//! accepts one-shot failure injection.
//!
//! Compiled for unit tests and, behind the `test-support` feature, for the
//! integration tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::assets::{AssetBuilder, AssetError, AssetFuture, AssetManifest, AssetPublisher};
use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::environment::ResolvedEnvironment;
use crate::progress::{ProgressEvent, ProgressListener};
use crate::service::{
    ChangeSetDescription, ChangeSetRequest, ChangeSetStatus, ChangeSetSummary, ChangeSetType,
    ExecutionStatus, ParameterSetting, ParameterValue, Replacement, ResourceChange, ServiceError,
    ServiceFuture, StackEvent, StackRequest, StackService, TemplateSource, ValidationEvent,
};
use crate::stack::{RemoteStack, StackDescriptor, StackStatus, Tag};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// Clones share the same script so the runner can cross into blocking tasks.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
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

    /// Returns the value following `flag`, if present.
    #[must_use]
    pub fn flag_value(&self, flag: &str) -> Option<String> {
        let mut args = self.args.iter();
        args.by_ref().find(|arg| arg.as_os_str() == flag)?;
        args.next().map(|arg| arg.to_string_lossy().into_owned())
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
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status with empty output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a successful exit status with the given stdout.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        self.push_output(Some(code), "", stderr);
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Progress listener that keeps every event for later assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingProgress {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingProgress {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }
}

impl ProgressListener for RecordingProgress {
    fn notify(&self, event: &ProgressEvent) {
        lock(&self.events).push(event.clone());
    }
}

#[derive(Debug, Default)]
struct FakeAssetState {
    built: Vec<String>,
    published: Vec<String>,
    already_published: BTreeSet<String>,
    failing_builds: BTreeSet<String>,
}

/// Asset handler that records builds and publishes without running
/// anything.
#[derive(Clone, Debug, Default)]
pub struct FakeAssetHandler {
    state: Arc<Mutex<FakeAssetState>>,
}

impl FakeAssetHandler {
    /// Creates a handler for which nothing is published yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `id` as already present at its destination.
    pub fn mark_published(&self, id: &str) {
        lock(&self.state).already_published.insert(id.to_owned());
    }

    /// Makes builds of `id` fail.
    pub fn fail_build(&self, id: &str) {
        lock(&self.state).failing_builds.insert(id.to_owned());
    }

    /// Ids built so far, in order.
    #[must_use]
    pub fn built(&self) -> Vec<String> {
        lock(&self.state).built.clone()
    }

    /// Ids published so far, in order.
    #[must_use]
    pub fn published(&self) -> Vec<String> {
        lock(&self.state).published.clone()
    }
}

impl AssetBuilder for FakeAssetHandler {
    fn build<'a>(&'a self, asset: &'a AssetManifest) -> AssetFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            if state.failing_builds.contains(&asset.id) {
                return Err(AssetError::CommandFailure {
                    asset: asset.id.clone(),
                    program: String::from("build"),
                    status_text: String::from("exit status 1"),
                    stderr: String::from("build failed"),
                });
            }
            state.built.push(asset.id.clone());
            Ok(())
        })
    }
}

impl AssetPublisher for FakeAssetHandler {
    fn publish<'a>(&'a self, asset: &'a AssetManifest) -> AssetFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.published.push(asset.id.clone());
            state.already_published.insert(asset.id.clone());
            Ok(())
        })
    }

    fn is_published<'a>(&'a self, asset: &'a AssetManifest) -> AssetFuture<'a, bool> {
        Box::pin(async move { Ok(lock(&self.state).already_published.contains(&asset.id)) })
    }
}

/// Message the fake uses for change sets that would not change anything.
pub const FAKE_NO_CHANGE_REASON: &str =
    "The submitted information didn't contain changes. Submit different information to create a change set.";

/// A stack held by [`FakeStackService`].
#[derive(Clone, Debug, PartialEq)]
pub struct FakeStack {
    /// Stack identifier.
    pub stack_id: String,
    /// Raw status name.
    pub status: String,
    /// Status reason.
    pub reason: Option<String>,
    /// Deployed template.
    pub template: Value,
    /// Deployed parameter values.
    pub parameters: BTreeMap<String, String>,
    /// Deployed tags.
    pub tags: Vec<Tag>,
    /// Deployed notification targets.
    pub notification_arns: Vec<String>,
    /// Termination protection flag.
    pub termination_protection: bool,
    /// Stack outputs.
    pub outputs: BTreeMap<String, String>,
}

impl FakeStack {
    /// A stack in `status` with an empty template.
    #[must_use]
    pub fn new(name: &str, status: &str) -> Self {
        Self {
            stack_id: fake_stack_id(name),
            status: status.to_owned(),
            reason: None,
            template: Value::Object(serde_json::Map::new()),
            parameters: BTreeMap::new(),
            tags: Vec::new(),
            notification_arns: Vec::new(),
            termination_protection: false,
            outputs: BTreeMap::new(),
        }
    }

    /// Initialises the deployed state from a descriptor.
    #[must_use]
    pub fn from_descriptor(descriptor: &StackDescriptor, status: &str) -> Self {
        let mut stack = Self::new(&descriptor.name, status);
        stack.template = descriptor.template.clone();
        stack.parameters = descriptor.parameters.clone();
        stack.tags = descriptor.tags.clone();
        stack.notification_arns = descriptor.notification_arns.clone();
        stack.termination_protection = descriptor.termination_protection.unwrap_or(false);
        stack
    }

    /// Sets a stack output.
    #[must_use]
    pub fn with_output(mut self, key: &str, value: &str) -> Self {
        self.outputs.insert(key.to_owned(), value.to_owned());
        self
    }

    fn to_remote(&self, env: &ResolvedEnvironment, name: &str) -> RemoteStack {
        let mut descriptor = StackDescriptor::new(name, env.environment.clone());
        descriptor.parameters = self.parameters.clone();
        descriptor.tags = self.tags.clone();
        descriptor.notification_arns = self.notification_arns.clone();
        descriptor.termination_protection = Some(self.termination_protection);
        RemoteStack {
            stack_id: self.stack_id.clone(),
            status: StackStatus::new(self.status.clone(), self.reason.clone()),
            descriptor,
            outputs: self.outputs.clone(),
        }
    }
}

fn fake_stack_id(name: &str) -> String {
    format!("arn:aws:cloudformation:eu-west-1:123456789012:stack/{name}/fake")
}

#[derive(Clone, Debug)]
struct PendingState {
    template: Value,
    parameters: BTreeMap<String, String>,
    tags: Vec<Tag>,
    notification_arns: Vec<String>,
}

#[derive(Clone, Debug)]
struct FakeChangeSet {
    description: ChangeSetDescription,
    pending: PendingState,
    creating_polls: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    stacks: BTreeMap<String, FakeStack>,
    change_sets: BTreeMap<(String, String), FakeChangeSet>,
    calls: Vec<String>,
    failures: BTreeMap<String, VecDeque<ServiceError>>,
    outcomes: BTreeMap<String, VecDeque<String>>,
    status_queue: BTreeMap<String, VecDeque<String>>,
    replacements: BTreeSet<String>,
    creating_polls: u32,
    change_set_failures: VecDeque<String>,
    events: BTreeMap<String, Vec<StackEvent>>,
    validation_events: Vec<ValidationEvent>,
    skipped_resources: Vec<String>,
    disable_rollback: Vec<bool>,
    change_set_parameters: Vec<(String, Vec<ParameterValue>)>,
}

impl FakeState {
    fn record(&mut self, operation: &str, target: &str) -> Result<(), ServiceError> {
        self.calls.push(format!("{operation} {target}"));
        self.failures
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
            .map_or(Ok(()), Err)
    }

    fn outcome(&mut self, stack: &str) -> Option<String> {
        self.outcomes.get_mut(stack).and_then(VecDeque::pop_front)
    }

    fn resolve_parameters(
        &self,
        stack: &str,
        parameters: &[ParameterValue],
    ) -> BTreeMap<String, String> {
        let previous = self.stacks.get(stack).map(|found| &found.parameters);
        parameters
            .iter()
            .map(|param| {
                let value = match &param.setting {
                    ParameterSetting::Value(value) => value.clone(),
                    ParameterSetting::UsePrevious => previous
                        .and_then(|values| values.get(&param.key))
                        .cloned()
                        .unwrap_or_default(),
                };
                (param.key.clone(), value)
            })
            .collect()
    }

    fn changes_anything(&self, stack: &str, pending: &PendingState) -> bool {
        let Some(current) = self.stacks.get(stack) else {
            return true;
        };
        current.status == "REVIEW_IN_PROGRESS"
            || current.template != pending.template
            || current.parameters != pending.parameters
            || current.tags.iter().collect::<BTreeSet<_>>()
                != pending.tags.iter().collect::<BTreeSet<_>>()
            || current.notification_arns.iter().collect::<BTreeSet<_>>()
                != pending.notification_arns.iter().collect::<BTreeSet<_>>()
    }

    fn apply(&mut self, stack: &str, pending: PendingState, status: String) {
        let entry = self
            .stacks
            .entry(stack.to_owned())
            .or_insert_with(|| FakeStack::new(stack, "CREATE_IN_PROGRESS"));
        entry.template = pending.template;
        entry.parameters = pending.parameters;
        entry.tags = pending.tags;
        entry.notification_arns = pending.notification_arns;
        entry.status = status;
        entry.reason = None;
    }
}

fn template_value(source: &TemplateSource) -> Value {
    match source {
        TemplateSource::Body(body) => {
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.clone()))
        }
        TemplateSource::Url(url) => Value::String(url.clone()),
    }
}

/// In-memory stand-in for the remote stack service.
#[derive(Clone, Debug, Default)]
pub struct FakeStackService {
    state: Arc<Mutex<FakeState>>,
}

impl FakeStackService {
    /// Creates an empty service with no stacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a stack.
    pub fn insert_stack(&self, name: &str, stack: FakeStack) {
        lock(&self.state).stacks.insert(name.to_owned(), stack);
    }

    /// Returns a snapshot of a stack.
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<FakeStack> {
        lock(&self.state).stacks.get(name).cloned()
    }

    /// Returns every call made so far as `"<operation> <target>"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Parameter lists sent with each change set created for `stack`.
    #[must_use]
    pub fn change_set_parameters(&self, stack: &str) -> Vec<Vec<ParameterValue>> {
        lock(&self.state)
            .change_set_parameters
            .iter()
            .filter(|(name, _)| name == stack)
            .map(|(_, parameters)| parameters.clone())
            .collect()
    }

    /// Counts calls of one operation.
    #[must_use]
    pub fn count(&self, operation: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .count()
    }

    /// Makes the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: &str, error: ServiceError) {
        lock(&self.state)
            .failures
            .entry(operation.to_owned())
            .or_default()
            .push_back(error);
    }

    /// Queues the status the next mutating operation on `stack` settles in.
    pub fn push_outcome(&self, stack: &str, status: &str) {
        lock(&self.state)
            .outcomes
            .entry(stack.to_owned())
            .or_default()
            .push_back(status.to_owned());
    }

    /// Queues statuses reported by successive describe calls before the
    /// stored status is reported again.
    pub fn queue_statuses(&self, stack: &str, statuses: &[&str]) {
        lock(&self.state)
            .status_queue
            .entry(stack.to_owned())
            .or_default()
            .extend(statuses.iter().map(|status| (*status).to_owned()));
    }

    /// Makes change sets created for `stack` report a replacement.
    pub fn report_replacement(&self, stack: &str) {
        lock(&self.state).replacements.insert(stack.to_owned());
    }

    /// Number of describe calls a new change set reports as still creating.
    pub fn set_creating_polls(&self, polls: u32) {
        lock(&self.state).creating_polls = polls;
    }

    /// Makes the next created change set fail with `reason`.
    pub fn fail_next_change_set(&self, reason: &str) {
        lock(&self.state)
            .change_set_failures
            .push_back(reason.to_owned());
    }

    /// Sets the stack events returned for `stack`.
    pub fn set_events(&self, stack: &str, events: Vec<StackEvent>) {
        lock(&self.state).events.insert(stack.to_owned(), events);
    }

    /// Sets the validation events returned for any change set.
    pub fn set_validation_events(&self, events: Vec<ValidationEvent>) {
        lock(&self.state).validation_events = events;
    }

    /// Seeds a change set as if created by an earlier run.
    pub fn insert_change_set(&self, stack: &str, summary: &ChangeSetSummary) {
        let mut state = lock(&self.state);
        let pending = state.stacks.get(stack).map_or_else(
            || PendingState {
                template: Value::Null,
                parameters: BTreeMap::new(),
                tags: Vec::new(),
                notification_arns: Vec::new(),
            },
            |found| PendingState {
                template: found.template.clone(),
                parameters: found.parameters.clone(),
                tags: found.tags.clone(),
                notification_arns: found.notification_arns.clone(),
            },
        );
        let description = ChangeSetDescription {
            name: summary.name.clone(),
            id: format!("{stack}/{}", summary.name),
            stack_id: fake_stack_id(stack),
            status: summary.status.clone(),
            status_reason: None,
            execution_status: summary.execution_status.clone(),
            description: summary.description.clone(),
            changes: Vec::new(),
        };
        state.change_sets.insert(
            (stack.to_owned(), summary.name.clone()),
            FakeChangeSet {
                description,
                pending,
                creating_polls: 0,
            },
        );
    }

    /// Names of the change sets currently held for `stack`.
    #[must_use]
    pub fn change_set_names(&self, stack: &str) -> Vec<String> {
        lock(&self.state)
            .change_sets
            .keys()
            .filter(|(owner, _)| owner == stack)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Resources passed to `continue_update_rollback` so far.
    #[must_use]
    pub fn skipped_resources(&self) -> Vec<String> {
        lock(&self.state).skipped_resources.clone()
    }

    /// `disable_rollback` flags passed to each execution, in order.
    #[must_use]
    pub fn disable_rollback_flags(&self) -> Vec<bool> {
        lock(&self.state).disable_rollback.clone()
    }
}

impl StackService for FakeStackService {
    fn describe_stack<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, Option<RemoteStack>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("describe_stack", stack_name)?;
            let queued = state
                .status_queue
                .get_mut(stack_name)
                .and_then(VecDeque::pop_front);
            let Some(stack) = state.stacks.get_mut(stack_name) else {
                return Ok(None);
            };
            if let Some(status) = queued {
                stack.status = status;
            }
            if stack.status == "DELETE_COMPLETE" {
                return Ok(None);
            }
            Ok(Some(stack.to_remote(env, stack_name)))
        })
    }

    fn get_template<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, Value> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("get_template", stack_name)?;
            state
                .stacks
                .get(stack_name)
                .map(|stack| stack.template.clone())
                .ok_or_else(|| ServiceError::StackNotFound {
                    stack: stack_name.to_owned(),
                })
        })
    }

    fn create_change_set<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        request: &'a ChangeSetRequest,
    ) -> ServiceFuture<'a, String> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            let stack = request.stack_name.as_str();
            state.record(
                "create_change_set",
                &format!("{stack} {}", request.change_set_name),
            )?;
            state
                .change_set_parameters
                .push((stack.to_owned(), request.parameters.clone()));
            match (request.change_set_type, state.stacks.get(stack)) {
                (ChangeSetType::Create, Some(existing))
                    if existing.status != "REVIEW_IN_PROGRESS" =>
                {
                    return Err(ServiceError::api(
                        "create_change_set",
                        format!("Stack [{stack}] already exists"),
                    ));
                }
                (ChangeSetType::Update, None) => {
                    return Err(ServiceError::StackNotFound {
                        stack: stack.to_owned(),
                    });
                }
                (ChangeSetType::Create, None) => {
                    state.stacks.insert(
                        stack.to_owned(),
                        FakeStack::new(stack, "REVIEW_IN_PROGRESS"),
                    );
                }
                _ => {}
            }
            let key = (stack.to_owned(), request.change_set_name.clone());
            if state.change_sets.contains_key(&key) {
                return Err(ServiceError::api(
                    "create_change_set",
                    format!("ChangeSet [{}] already exists", request.change_set_name),
                ));
            }
            let pending = PendingState {
                template: template_value(&request.template),
                parameters: state.resolve_parameters(stack, &request.parameters),
                tags: request.tags.clone(),
                notification_arns: request.notification_arns.clone(),
            };
            let changes_anything = state.changes_anything(stack, &pending);
            let failure = state.change_set_failures.pop_front();
            let replacement = if state.replacements.contains(stack) {
                Replacement::True
            } else {
                Replacement::False
            };
            let mut description = ChangeSetDescription {
                name: request.change_set_name.clone(),
                id: format!("{stack}/{}", request.change_set_name),
                stack_id: fake_stack_id(stack),
                status: if changes_anything {
                    ChangeSetStatus::CreateComplete
                } else {
                    ChangeSetStatus::Failed
                },
                status_reason: (!changes_anything).then(|| FAKE_NO_CHANGE_REASON.to_owned()),
                execution_status: if changes_anything {
                    ExecutionStatus::Available
                } else {
                    ExecutionStatus::Unavailable
                },
                description: Some(request.description.clone()),
                changes: if changes_anything {
                    vec![ResourceChange {
                        logical_id: String::from("Resource"),
                        resource_type: String::from("AWS::Test::Resource"),
                        action: String::from("Modify"),
                        replacement,
                    }]
                } else {
                    Vec::new()
                },
            };
            if let Some(reason) = failure {
                description.status = ChangeSetStatus::Failed;
                description.status_reason = Some(reason);
                description.execution_status = ExecutionStatus::Unavailable;
                description.changes.clear();
            }
            let id = description.id.clone();
            let creating_polls = state.creating_polls;
            state.change_sets.insert(
                key,
                FakeChangeSet {
                    description,
                    pending,
                    creating_polls,
                },
            );
            Ok(id)
        })
    }

    fn describe_change_set<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ServiceFuture<'a, ChangeSetDescription> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(
                "describe_change_set",
                &format!("{stack_name} {change_set_name}"),
            )?;
            let key = (stack_name.to_owned(), change_set_name.to_owned());
            let Some(change_set) = state.change_sets.get_mut(&key) else {
                return Err(ServiceError::ChangeSetNotFound {
                    stack: stack_name.to_owned(),
                    change_set: change_set_name.to_owned(),
                });
            };
            if change_set.creating_polls > 0 {
                change_set.creating_polls -= 1;
                let mut creating = change_set.description.clone();
                creating.status = ChangeSetStatus::CreateInProgress;
                creating.execution_status = ExecutionStatus::Unavailable;
                creating.status_reason = None;
                return Ok(creating);
            }
            Ok(change_set.description.clone())
        })
    }

    fn list_change_sets<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, Vec<ChangeSetSummary>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("list_change_sets", stack_name)?;
            Ok(state
                .change_sets
                .iter()
                .filter(|((owner, _), _)| owner == stack_name)
                .map(|(_, change_set)| ChangeSetSummary {
                    name: change_set.description.name.clone(),
                    status: change_set.description.status.clone(),
                    execution_status: change_set.description.execution_status.clone(),
                    description: change_set.description.description.clone(),
                })
                .collect())
        })
    }

    fn execute_change_set<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        change_set_name: &'a str,
        disable_rollback: bool,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(
                "execute_change_set",
                &format!("{stack_name} {change_set_name}"),
            )?;
            state.disable_rollback.push(disable_rollback);
            let key = (stack_name.to_owned(), change_set_name.to_owned());
            let Some(change_set) = state.change_sets.get_mut(&key) else {
                return Err(ServiceError::ChangeSetNotFound {
                    stack: stack_name.to_owned(),
                    change_set: change_set_name.to_owned(),
                });
            };
            if !change_set.description.is_executable() {
                return Err(ServiceError::api(
                    "execute_change_set",
                    format!("ChangeSet [{change_set_name}] cannot be executed in its current status"),
                ));
            }
            change_set.description.execution_status = ExecutionStatus::ExecuteComplete;
            let pending = change_set.pending.clone();
            let creating = state
                .stacks
                .get(stack_name)
                .is_none_or(|stack| stack.status == "REVIEW_IN_PROGRESS");
            let default = if creating {
                "CREATE_COMPLETE"
            } else {
                "UPDATE_COMPLETE"
            };
            let status = state
                .outcome(stack_name)
                .unwrap_or_else(|| default.to_owned());
            state.apply(stack_name, pending, status);
            Ok(())
        })
    }

    fn delete_change_set<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(
                "delete_change_set",
                &format!("{stack_name} {change_set_name}"),
            )?;
            let key = (stack_name.to_owned(), change_set_name.to_owned());
            state
                .change_sets
                .remove(&key)
                .map(drop)
                .ok_or_else(|| ServiceError::ChangeSetNotFound {
                    stack: stack_name.to_owned(),
                    change_set: change_set_name.to_owned(),
                })
        })
    }

    fn create_stack<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        request: &'a StackRequest,
    ) -> ServiceFuture<'a, String> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            let stack = request.stack_name.as_str();
            state.record("create_stack", stack)?;
            if state.stacks.contains_key(stack) {
                return Err(ServiceError::api(
                    "create_stack",
                    format!("Stack [{stack}] already exists"),
                ));
            }
            let pending = PendingState {
                template: template_value(&request.template),
                parameters: state.resolve_parameters(stack, &request.parameters),
                tags: request.tags.clone(),
                notification_arns: request.notification_arns.clone(),
            };
            state.disable_rollback.push(request.disable_rollback);
            let status = state
                .outcome(stack)
                .unwrap_or_else(|| String::from("CREATE_COMPLETE"));
            state.apply(stack, pending, status);
            Ok(fake_stack_id(stack))
        })
    }

    fn update_stack<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        request: &'a StackRequest,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            let stack = request.stack_name.as_str();
            state.record("update_stack", stack)?;
            if !state.stacks.contains_key(stack) {
                return Err(ServiceError::StackNotFound {
                    stack: stack.to_owned(),
                });
            }
            let pending = PendingState {
                template: template_value(&request.template),
                parameters: state.resolve_parameters(stack, &request.parameters),
                tags: request.tags.clone(),
                notification_arns: request.notification_arns.clone(),
            };
            if !state.changes_anything(stack, &pending) {
                return Err(ServiceError::NoUpdates {
                    stack: stack.to_owned(),
                });
            }
            state.disable_rollback.push(request.disable_rollback);
            let status = state
                .outcome(stack)
                .unwrap_or_else(|| String::from("UPDATE_COMPLETE"));
            state.apply(stack, pending, status);
            Ok(())
        })
    }

    fn delete_stack<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("delete_stack", stack_name)?;
            state.stacks.remove(stack_name);
            state.change_sets.retain(|(owner, _), _| owner != stack_name);
            Ok(())
        })
    }

    fn rollback_stack<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("rollback_stack", stack_name)?;
            let queued = state.outcome(stack_name);
            let Some(stack) = state.stacks.get_mut(stack_name) else {
                return Err(ServiceError::StackNotFound {
                    stack: stack_name.to_owned(),
                });
            };
            stack.status = queued.unwrap_or_else(|| {
                if stack.status == "CREATE_FAILED" {
                    String::from("ROLLBACK_COMPLETE")
                } else {
                    String::from("UPDATE_ROLLBACK_COMPLETE")
                }
            });
            Ok(())
        })
    }

    fn continue_update_rollback<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        resources_to_skip: &'a [String],
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("continue_update_rollback", stack_name)?;
            state
                .skipped_resources
                .extend(resources_to_skip.iter().cloned());
            let queued = state.outcome(stack_name);
            let Some(stack) = state.stacks.get_mut(stack_name) else {
                return Err(ServiceError::StackNotFound {
                    stack: stack_name.to_owned(),
                });
            };
            stack.status = queued.unwrap_or_else(|| String::from("UPDATE_ROLLBACK_COMPLETE"));
            Ok(())
        })
    }

    fn update_termination_protection<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        enabled: bool,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("update_termination_protection", stack_name)?;
            let Some(stack) = state.stacks.get_mut(stack_name) else {
                return Err(ServiceError::StackNotFound {
                    stack: stack_name.to_owned(),
                });
            };
            stack.termination_protection = enabled;
            Ok(())
        })
    }

    fn describe_stack_events<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, Vec<StackEvent>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record("describe_stack_events", stack_name)?;
            Ok(state.events.get(stack_name).cloned().unwrap_or_default())
        })
    }

    fn describe_validation_events<'a>(
        &'a self,
        _env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ServiceFuture<'a, Vec<ValidationEvent>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.record(
                "describe_validation_events",
                &format!("{stack_name} {change_set_name}"),
            )?;
            Ok(state.validation_events.clone())
        })
    }
}
