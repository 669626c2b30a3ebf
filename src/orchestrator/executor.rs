//! Node executors handed to the work graph.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use tracing::{info, warn};

use super::{DeployOptions, NodeError};
use crate::assets::{AssetBuilder, AssetManifest, AssetPublisher};
use crate::decision::merge_parameters;
use crate::deployer::{
    DeployError, DeployOutcome, DeploymentAttemptResult, StackDeployer, roll_back_stack,
};
use crate::environment::EnvironmentResources;
use crate::graph::{NodeExecutor, NodeFuture, WorkNode};
use crate::manifest::StackManifest;
use crate::progress::ProgressListener;
use crate::service::StackService;
use crate::stack::StackDescriptor;

/// Attempts made for one stack before giving up.
pub const MAX_ATTEMPTS: usize = 2;

const REPLACEMENT_MOTIVATION: &str =
    "the change replaces resources, which requires rollback to be enabled";

/// Applies the run-level parameters, tags and notification targets to a
/// stack's own descriptor.
#[must_use]
pub fn desired_descriptor(stack: &StackDescriptor, options: &DeployOptions) -> StackDescriptor {
    let mut desired = stack.clone();
    desired.parameters = merge_parameters(&stack.name, &stack.parameters, &options.parameters);
    for tag in &options.tags {
        desired.tags.retain(|existing| existing.key != tag.key);
        desired.tags.push(tag.clone());
    }
    for arn in &options.notification_arns {
        if !desired.notification_arns.contains(arn) {
            desired.notification_arns.push(arn.clone());
        }
    }
    desired
}

fn lookup<'m, T>(
    entries: &BTreeMap<&str, &'m T>,
    node: &WorkNode,
) -> Result<&'m T, NodeError> {
    entries
        .get(node.subject.as_str())
        .copied()
        .ok_or_else(|| NodeError::UnknownSubject {
            node: node.id.clone(),
        })
}

pub(super) struct AssetBuildExecutor<'a, B: ?Sized> {
    builder: &'a B,
    assets: &'a BTreeMap<&'a str, &'a AssetManifest>,
}

impl<'a, B: AssetBuilder + ?Sized> AssetBuildExecutor<'a, B> {
    pub(super) const fn new(builder: &'a B, assets: &'a BTreeMap<&'a str, &'a AssetManifest>) -> Self {
        Self { builder, assets }
    }
}

impl<B: AssetBuilder + ?Sized> NodeExecutor<NodeError> for AssetBuildExecutor<'_, B> {
    fn execute<'a>(&'a self, node: &'a WorkNode) -> NodeFuture<'a, NodeError> {
        Box::pin(async move {
            let asset = lookup(self.assets, node)?;
            info!(asset = %asset.id, "building asset");
            self.builder.build(asset).await?;
            Ok(())
        })
    }
}

pub(super) struct AssetPublishExecutor<'a, P: ?Sized> {
    publisher: &'a P,
    assets: &'a BTreeMap<&'a str, &'a AssetManifest>,
}

impl<'a, P: AssetPublisher + ?Sized> AssetPublishExecutor<'a, P> {
    pub(super) const fn new(
        publisher: &'a P,
        assets: &'a BTreeMap<&'a str, &'a AssetManifest>,
    ) -> Self {
        Self { publisher, assets }
    }
}

impl<P: AssetPublisher + ?Sized> NodeExecutor<NodeError> for AssetPublishExecutor<'_, P> {
    fn execute<'a>(&'a self, node: &'a WorkNode) -> NodeFuture<'a, NodeError> {
        Box::pin(async move {
            let asset = lookup(self.assets, node)?;
            info!(asset = %asset.id, "publishing asset");
            self.publisher.publish(asset).await?;
            Ok(())
        })
    }
}

/// Deploys stack nodes, rolling paused stacks back and retrying when the
/// run allows it.
pub(super) struct StackExecutor<'a, S: ?Sized, E: ?Sized> {
    service: &'a S,
    environments: &'a E,
    progress: &'a dyn ProgressListener,
    stacks: BTreeMap<&'a str, &'a StackManifest>,
    options: &'a DeployOptions,
    outcomes: Mutex<BTreeMap<String, DeployOutcome>>,
}

impl<'a, S, E> StackExecutor<'a, S, E>
where
    S: StackService + ?Sized,
    E: EnvironmentResources + ?Sized,
{
    pub(super) fn new(
        service: &'a S,
        environments: &'a E,
        progress: &'a dyn ProgressListener,
        selected: &[&'a StackManifest],
        options: &'a DeployOptions,
    ) -> Self {
        Self {
            service,
            environments,
            progress,
            stacks: selected
                .iter()
                .map(|stack| (stack.name(), *stack))
                .collect(),
            options,
            outcomes: Mutex::new(BTreeMap::new()),
        }
    }

    pub(super) fn into_outcomes(self) -> BTreeMap<String, DeployOutcome> {
        self.outcomes
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn deploy_stack(&self, manifest: &StackManifest) -> Result<DeployOutcome, DeployError> {
        let desired = desired_descriptor(&manifest.descriptor, self.options);
        let env = self
            .environments
            .resolve(&desired.environment, self.options.role_arn.as_deref());
        let deployer = StackDeployer::new(self.service, self.environments, self.progress);
        let mut rollback = self.options.rollback;

        for attempt in 1..=MAX_ATTEMPTS {
            let stack_options = self.options.stack_options(rollback);
            let result = deployer.deploy(&desired, &env, &stack_options).await?;
            let (motivation, paused) = match result {
                DeploymentAttemptResult::DidDeploy(outcome) => return Ok(outcome),
                DeploymentAttemptResult::FailPausedNeedRollbackFirst { reason, status } => {
                    (reason.motivation(&status), true)
                }
                DeploymentAttemptResult::ReplacementRequiresRollback => {
                    (REPLACEMENT_MOTIVATION.to_owned(), false)
                }
            };
            self.require_auto_rollback(&desired.name, motivation)?;
            if attempt == MAX_ATTEMPTS {
                break;
            }
            if paused {
                roll_back_stack(
                    self.service,
                    &env,
                    &desired.name,
                    self.options.orphan_failed_resources,
                    self.options.poll,
                    self.progress,
                )
                .await?;
            }
            rollback = true;
        }
        Err(DeployError::AttemptsExhausted {
            stack: desired.name,
            attempts: MAX_ATTEMPTS,
        })
    }

    fn require_auto_rollback(&self, stack: &str, motivation: String) -> Result<(), DeployError> {
        if self.options.auto_rollback {
            warn!(stack, motivation = %motivation, "retrying with rollback enabled");
            return Ok(());
        }
        Err(DeployError::RollbackRequired {
            stack: stack.to_owned(),
            motivation,
        })
    }
}

impl<S, E> NodeExecutor<NodeError> for StackExecutor<'_, S, E>
where
    S: StackService + ?Sized,
    E: EnvironmentResources + ?Sized,
{
    fn execute<'a>(&'a self, node: &'a WorkNode) -> NodeFuture<'a, NodeError> {
        Box::pin(async move {
            let manifest = lookup(&self.stacks, node)?;
            let outcome = self.deploy_stack(manifest).await?;
            info!(
                stack = manifest.name(),
                no_op = outcome.no_op,
                "stack finished"
            );
            self.outcomes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(manifest.name().to_owned(), outcome);
            Ok(())
        })
    }
}
