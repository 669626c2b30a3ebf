//! Deployment state machine for a single stack attempt.
//!
//! An attempt runs the skip check, builds (or looks up) a change set,
//! inspects it for replacements, and either executes it or reports that the
//! stack must be rolled back first. Rolling back and retrying is left to
//! the caller; see [`roll_back_stack`].

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::decision::{
    ResolvedParameters, SkipCheck, StackPreparation, decide_skip, template_source,
    validate_notification_arns,
};
use crate::diagnostics::{
    DEFAULT_VALIDATION_BOOTSTRAP_VERSION, EarlyValidationReporter, is_early_validation_failure,
    with_recent_failures,
};
use crate::digest::generate_change_set_name;
use crate::environment::{EnvironmentResources, ResolvedEnvironment};
use crate::progress::{ProgressEvent, ProgressListener};
use crate::service::{
    ChangeSetDescription, ChangeSetRequest, ChangeSetType, StackRequest, StackService,
    TemplateSource,
};
use crate::stack::{RemoteStack, StackDescriptor, StackStatus};
use crate::tracker::{ChangeTracker, PollSettings, owned_description};

mod error;
mod rollback;

pub use error::DeployError;
pub(crate) use error::ServiceResultExt;
pub use rollback::roll_back_stack;

/// How a stack reaches the service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeploymentMethod {
    /// Create or update the stack directly, without a change set.
    Direct,
    /// Create a change set and optionally execute it.
    ChangeSet {
        /// Change-set name; generated when absent.
        name: Option<String>,
        /// Execute the change set once created.
        execute: bool,
    },
    /// Use a change set created earlier.
    ExistingChangeSet {
        /// Change-set name.
        name: String,
        /// Execute it; otherwise only confirm it exists and is executable.
        execute: bool,
    },
}

impl Default for DeploymentMethod {
    fn default() -> Self {
        Self::ChangeSet {
            name: None,
            execute: true,
        }
    }
}

impl DeploymentMethod {
    /// Whether the attempt executes what it prepares.
    #[must_use]
    pub const fn executes(&self) -> bool {
        match self {
            Self::Direct => true,
            Self::ChangeSet { execute, .. } | Self::ExistingChangeSet { execute, .. } => *execute,
        }
    }
}

/// Options for one attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeployStackOptions {
    /// Deployment method.
    pub method: DeploymentMethod,
    /// Roll back failed executions. When disabled, failed stacks pause in
    /// their failure state.
    pub rollback: bool,
    /// Deploy even when nothing changed.
    pub force: bool,
    /// Reuse deployed values for parameters that are not supplied.
    pub keep_previous_parameters: bool,
    /// Polling cadence and bounds.
    pub poll: PollSettings,
    /// Bootstrap version needed for detailed validation reports.
    pub validation_bootstrap_version: u32,
}

impl Default for DeployStackOptions {
    fn default() -> Self {
        Self {
            method: DeploymentMethod::default(),
            rollback: true,
            force: false,
            keep_previous_parameters: true,
            poll: PollSettings::default(),
            validation_bootstrap_version: DEFAULT_VALIDATION_BOOTSTRAP_VERSION,
        }
    }
}

/// Result of an attempt that reached the service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeployOutcome {
    /// Nothing was changed.
    pub no_op: bool,
    /// Stack outputs after the attempt.
    pub outputs: BTreeMap<String, String>,
    /// Stack identifier.
    pub stack_arn: String,
}

impl DeployOutcome {
    fn unchanged(stack: &RemoteStack) -> Self {
        Self {
            no_op: true,
            outputs: stack.outputs.clone(),
            stack_arn: stack.stack_id.clone(),
        }
    }

    fn deployed(stack: RemoteStack) -> Self {
        Self {
            no_op: false,
            outputs: stack.outputs,
            stack_arn: stack.stack_id,
        }
    }

    fn prepared(current: Option<&RemoteStack>, stack_arn: &str) -> Self {
        Self {
            no_op: false,
            outputs: current
                .map(|stack| stack.outputs.clone())
                .unwrap_or_default(),
            stack_arn: stack_arn.to_owned(),
        }
    }
}

/// Why a paused stack must be rolled back before deploying.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PausedReason {
    /// The pending change replaces a resource, which cannot be deployed
    /// onto a paused stack.
    Replacement,
    /// The caller asked for rollback, which a paused stack cannot honour
    /// until it is rolled back.
    RollbackRequested,
}

impl PausedReason {
    /// Explanation shown to the operator.
    #[must_use]
    pub fn motivation(self, status: &str) -> String {
        match self {
            Self::Replacement => format!(
                "stack is paused in {status} and the change includes a replacement, which cannot be deployed without rollback"
            ),
            Self::RollbackRequested => format!(
                "stack is paused in {status} and rollback is enabled for this deployment"
            ),
        }
    }
}

/// Outcome of one attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeploymentAttemptResult {
    /// The attempt finished, possibly without changing anything.
    DidDeploy(DeployOutcome),
    /// The stack is paused in a failed state and must be rolled back first.
    FailPausedNeedRollbackFirst {
        /// Why rolling back is required.
        reason: PausedReason,
        /// Status the stack is paused in.
        status: String,
    },
    /// The change replaces resources, which requires rollback to be
    /// enabled.
    ReplacementRequiresRollback,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ExecutionPlan {
    Execute { disable_rollback: bool },
    FailPaused(PausedReason),
    ReplacementNeedsRollback,
}

fn plan_execution(current: Option<&StackStatus>, has_replacement: bool, rollback: bool) -> ExecutionPlan {
    let paused = current.is_some_and(StackStatus::is_rollbackable);
    if paused {
        if has_replacement {
            return ExecutionPlan::FailPaused(PausedReason::Replacement);
        }
        if rollback {
            return ExecutionPlan::FailPaused(PausedReason::RollbackRequested);
        }
        return ExecutionPlan::Execute {
            disable_rollback: true,
        };
    }
    if has_replacement && !rollback {
        return ExecutionPlan::ReplacementNeedsRollback;
    }
    ExecutionPlan::Execute {
        disable_rollback: !rollback,
    }
}

#[derive(Clone, Copy)]
enum FreshMethod<'m> {
    Direct,
    ChangeSet { name: Option<&'m str>, execute: bool },
}

/// Deploys single stacks against a [`StackService`].
pub struct StackDeployer<'a, S: ?Sized, E: ?Sized> {
    service: &'a S,
    environments: &'a E,
    progress: &'a dyn ProgressListener,
}

impl<'a, S, E> StackDeployer<'a, S, E>
where
    S: StackService + ?Sized,
    E: EnvironmentResources + ?Sized,
{
    /// Creates a deployer.
    #[must_use]
    pub const fn new(
        service: &'a S,
        environments: &'a E,
        progress: &'a dyn ProgressListener,
    ) -> Self {
        Self {
            service,
            environments,
            progress,
        }
    }

    /// Runs one attempt for `desired`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Decision`] for configuration problems found
    /// before any mutating call, and the other [`DeployError`] variants for
    /// remote failures.
    pub async fn deploy(
        &self,
        desired: &StackDescriptor,
        env: &ResolvedEnvironment,
        options: &DeployStackOptions,
    ) -> Result<DeploymentAttemptResult, DeployError> {
        validate_notification_arns(&desired.name, &desired.notification_arns)?;
        let attempt = Attempt {
            service: self.service,
            environments: self.environments,
            progress: self.progress,
            desired,
            env,
            options,
            tracker: ChangeTracker::new(self.service, env, &desired.name, options.poll),
        };
        attempt.run().await
    }
}

struct Attempt<'a, S: ?Sized, E: ?Sized> {
    service: &'a S,
    environments: &'a E,
    progress: &'a dyn ProgressListener,
    desired: &'a StackDescriptor,
    env: &'a ResolvedEnvironment,
    options: &'a DeployStackOptions,
    tracker: ChangeTracker<'a, S>,
}

impl<S, E> Attempt<'_, S, E>
where
    S: StackService + ?Sized,
    E: EnvironmentResources + ?Sized,
{
    fn name(&self) -> &str {
        &self.desired.name
    }

    async fn run(&self) -> Result<DeploymentAttemptResult, DeployError> {
        let name = self.name();
        let method = match &self.options.method {
            DeploymentMethod::ExistingChangeSet {
                name: change_set,
                execute,
            } => {
                let current = self.tracker.wait_for_stack().await.for_stack(name)?;
                return self.run_existing(current.as_ref(), change_set, *execute).await;
            }
            DeploymentMethod::Direct => FreshMethod::Direct,
            DeploymentMethod::ChangeSet {
                name: change_set,
                execute,
            } => FreshMethod::ChangeSet {
                name: change_set.as_deref(),
                execute: *execute,
            },
        };
        // Pre-created change sets already carry their template.
        let template = template_source(self.desired)?;
        let mut current = self.tracker.wait_for_stack().await.for_stack(name)?;

        let preparation = StackPreparation::for_current(current.as_ref());
        let previous = current
            .as_ref()
            .filter(|_| !preparation.creates())
            .map(|stack| &stack.descriptor.parameters);
        let parameters = ResolvedParameters::resolve(
            name,
            &self.desired.template,
            &self.desired.parameters,
            previous,
            self.options.keep_previous_parameters,
        )?;

        let current_template = match &current {
            Some(stack) if !stack.status.is_review_in_progress() => self.fetch_template().await?,
            _ => None,
        };
        let decision = decide_skip(&SkipCheck {
            desired: self.desired,
            current: current.as_ref(),
            current_template: current_template.as_ref(),
            parameters: &parameters,
            force: self.options.force,
            execute: self.options.method.executes(),
        });
        self.progress.notify(&ProgressEvent::SkipDecided {
            stack: name.to_owned(),
            skipped: decision.is_skip(),
            reason: decision.reason().to_owned(),
        });
        if decision.is_skip()
            && let Some(stack) = &current
        {
            return Ok(DeploymentAttemptResult::DidDeploy(DeployOutcome::unchanged(
                stack,
            )));
        }

        if preparation == StackPreparation::DeleteThenCreate {
            info!(stack = name, "deleting stack left over from a failed create");
            self.tracker.delete_stack().await.for_stack(name)?;
            current = None;
        }

        if let Some(paused) = self.rollback_first(current.as_ref()) {
            return Ok(paused);
        }

        match method {
            FreshMethod::Direct => {
                self.run_direct(current.as_ref(), template, &parameters)
                    .await
            }
            FreshMethod::ChangeSet {
                name: change_set,
                execute,
            } => {
                self.run_change_set(current.as_ref(), template, &parameters, change_set, execute)
                    .await
            }
        }
    }

    /// A paused stack must be rolled back before a rollback-enabled attempt.
    fn rollback_first(&self, current: Option<&RemoteStack>) -> Option<DeploymentAttemptResult> {
        current
            .filter(|stack| self.options.rollback && stack.status.is_rollbackable())
            .map(|stack| DeploymentAttemptResult::FailPausedNeedRollbackFirst {
                reason: PausedReason::RollbackRequested,
                status: stack.status.name().to_owned(),
            })
    }

    async fn fetch_template(&self) -> Result<Option<serde_json::Value>, DeployError> {
        match self.service.get_template(self.env, self.name()).await {
            Ok(template) => Ok(Some(template)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err).for_stack(self.name()),
        }
    }

    async fn run_change_set(
        &self,
        current: Option<&RemoteStack>,
        template: TemplateSource,
        parameters: &ResolvedParameters,
        change_set: Option<&str>,
        execute: bool,
    ) -> Result<DeploymentAttemptResult, DeployError> {
        let name = self.name();
        let change_set_name = change_set.map_or_else(generate_change_set_name, str::to_owned);
        if current.is_some() {
            let removed = self
                .tracker
                .cleanup_owned(&change_set_name)
                .await
                .for_stack(name)?;
            if removed > 0 {
                debug!(stack = name, removed, "removed stale change sets");
            }
        }

        let request = ChangeSetRequest {
            stack_name: name.to_owned(),
            change_set_name: change_set_name.clone(),
            change_set_type: if current.is_some() {
                ChangeSetType::Update
            } else {
                ChangeSetType::Create
            },
            template,
            parameters: parameters.api_parameters().to_vec(),
            tags: self.desired.tags.clone(),
            notification_arns: self.desired.notification_arns.clone(),
            description: owned_description(name),
        };
        let described = self.tracker.create(&request).await.for_stack(name)?;

        if described.is_empty() {
            info!(stack = name, change_set = %change_set_name, "no changes to deploy");
            if !execute {
                return Ok(DeploymentAttemptResult::DidDeploy(DeployOutcome {
                    no_op: true,
                    ..DeployOutcome::prepared(current, &described.stack_id)
                }));
            }
            self.tracker.delete_quietly(&change_set_name).await;
            return match current {
                Some(stack) => {
                    self.reconcile_termination_protection(stack).await?;
                    Ok(DeploymentAttemptResult::DidDeploy(DeployOutcome::unchanged(
                        stack,
                    )))
                }
                None => Ok(DeploymentAttemptResult::DidDeploy(DeployOutcome {
                    no_op: true,
                    ..DeployOutcome::prepared(None, &described.stack_id)
                })),
            };
        }
        if described.is_failed() {
            return Err(self.change_set_failure(&change_set_name, &described).await);
        }

        self.progress.notify(&ProgressEvent::ChangeSetCreated {
            stack: name.to_owned(),
            change_set: change_set_name.clone(),
        });
        if !execute {
            info!(stack = name, change_set = %change_set_name, "change set created without execution");
            return Ok(DeploymentAttemptResult::DidDeploy(DeployOutcome::prepared(
                current,
                &described.stack_id,
            )));
        }
        self.execute_change_set(current, &described, true)
            .await
    }

    async fn run_existing(
        &self,
        current: Option<&RemoteStack>,
        change_set: &str,
        execute: bool,
    ) -> Result<DeploymentAttemptResult, DeployError> {
        let name = self.name();
        let described = match self.tracker.describe(change_set).await {
            Ok(described) => described,
            Err(err) if err.is_not_found() => {
                return Err(DeployError::ChangeSetNotFound {
                    stack: name.to_owned(),
                    change_set: change_set.to_owned(),
                });
            }
            Err(err) => return Err(err).for_stack(name),
        };
        if !described.is_executable() {
            return Err(DeployError::ChangeSetNotExecutable {
                stack: name.to_owned(),
                change_set: change_set.to_owned(),
                status: format!("{}/{}", described.status, described.execution_status),
            });
        }
        if !execute {
            return Ok(DeploymentAttemptResult::DidDeploy(DeployOutcome::prepared(
                current,
                &described.stack_id,
            )));
        }
        if let Some(paused) = self.rollback_first(current) {
            return Ok(paused);
        }
        self.execute_change_set(current, &described, false)
            .await
    }

    async fn execute_change_set(
        &self,
        current: Option<&RemoteStack>,
        described: &ChangeSetDescription,
        owned: bool,
    ) -> Result<DeploymentAttemptResult, DeployError> {
        let name = self.name();
        let plan = plan_execution(
            current.map(|stack| &stack.status),
            described.has_replacement(),
            self.options.rollback,
        );
        match plan {
            ExecutionPlan::FailPaused(reason) => {
                if owned {
                    self.tracker.delete_quietly(&described.name).await;
                }
                Ok(DeploymentAttemptResult::FailPausedNeedRollbackFirst {
                    reason,
                    status: current
                        .map(|stack| stack.status.name().to_owned())
                        .unwrap_or_default(),
                })
            }
            ExecutionPlan::ReplacementNeedsRollback => {
                if owned {
                    self.tracker.delete_quietly(&described.name).await;
                }
                Ok(DeploymentAttemptResult::ReplacementRequiresRollback)
            }
            ExecutionPlan::Execute { disable_rollback } => {
                self.progress.notify(&ProgressEvent::ExecutionStarted {
                    stack: name.to_owned(),
                    change_set: Some(described.name.clone()),
                });
                info!(stack = name, change_set = %described.name, disable_rollback, "executing change set");
                self.tracker
                    .execute(&described.name, disable_rollback)
                    .await
                    .for_stack(name)?;
                self.finish().await
            }
        }
    }

    async fn run_direct(
        &self,
        current: Option<&RemoteStack>,
        template: TemplateSource,
        parameters: &ResolvedParameters,
    ) -> Result<DeploymentAttemptResult, DeployError> {
        let name = self.name();
        let request = StackRequest {
            stack_name: name.to_owned(),
            template,
            parameters: parameters.api_parameters().to_vec(),
            tags: self.desired.tags.clone(),
            notification_arns: self.desired.notification_arns.clone(),
            disable_rollback: !self.options.rollback,
        };
        self.progress.notify(&ProgressEvent::ExecutionStarted {
            stack: name.to_owned(),
            change_set: None,
        });
        match current {
            None => {
                info!(stack = name, "creating stack");
                self.service
                    .create_stack(self.env, &request)
                    .await
                    .for_stack(name)?;
            }
            Some(stack) => {
                info!(stack = name, "updating stack");
                match self.service.update_stack(self.env, &request).await {
                    Ok(()) => {}
                    Err(err) if err.is_no_updates() => {
                        info!(stack = name, "no changes to deploy");
                        self.reconcile_termination_protection(stack).await?;
                        return Ok(DeploymentAttemptResult::DidDeploy(
                            DeployOutcome::unchanged(stack),
                        ));
                    }
                    Err(err) => return Err(err).for_stack(name),
                }
            }
        }
        self.finish().await
    }

    async fn finish(&self) -> Result<DeploymentAttemptResult, DeployError> {
        let name = self.name();
        let Some(stack) = self.tracker.wait_for_stack().await.for_stack(name)? else {
            return Err(DeployError::StackMissing {
                stack: name.to_owned(),
            });
        };
        self.progress.notify(&ProgressEvent::ExecutionFinished {
            stack: name.to_owned(),
            status: stack.status.name().to_owned(),
        });
        if !stack.status.is_success() {
            let message = with_recent_failures(
                self.service,
                self.env,
                name,
                format!("stack {name} finished in {}", stack.status),
            )
            .await;
            return Err(DeployError::StackFailed {
                stack: name.to_owned(),
                status: stack.status.name().to_owned(),
                message,
            });
        }
        self.reconcile_termination_protection(&stack).await?;
        info!(stack = name, status = %stack.status, "stack deployed");
        Ok(DeploymentAttemptResult::DidDeploy(DeployOutcome::deployed(
            stack,
        )))
    }

    async fn reconcile_termination_protection(&self, stack: &RemoteStack) -> Result<(), DeployError> {
        let name = self.name();
        if let Some(wanted) = self.desired.termination_protection
            && wanted != stack.termination_protection()
        {
            info!(stack = name, enabled = wanted, "updating termination protection");
            self.service
                .update_termination_protection(self.env, name, wanted)
                .await
                .for_stack(name)?;
        }
        Ok(())
    }

    async fn change_set_failure(
        &self,
        change_set: &str,
        described: &ChangeSetDescription,
    ) -> DeployError {
        let name = self.name();
        let reason = described
            .status_reason
            .clone()
            .unwrap_or_else(|| String::from("no reason reported"));
        let message = if is_early_validation_failure(&reason) {
            EarlyValidationReporter::new(
                self.service,
                self.environments,
                self.options.validation_bootstrap_version,
            )
            .report(self.env, name, change_set, &reason)
            .await
        } else {
            with_recent_failures(self.service, self.env, name, reason).await
        };
        DeployError::ChangeSetFailed {
            stack: name.to_owned(),
            change_set: change_set.to_owned(),
            message,
        }
    }
}

#[cfg(test)]
mod tests;
