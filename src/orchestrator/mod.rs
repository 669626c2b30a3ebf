//! Run-level deployment: scheduling every selected stack and its assets.
//!
//! The [`Orchestrator`] builds a [`WorkGraph`] from the manifest, removes
//! assets that are already published, runs the graph with one executor per
//! node kind and folds the per-node results into a [`RunSummary`]. Writing
//! the outputs file is a best-effort side effect of the run.

mod executor;
mod outputs;

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::info;

use crate::assets::{AssetBuilder, AssetError, AssetManifest, AssetPublisher};
use crate::deployer::{DeployError, DeployOutcome, DeployStackOptions, DeploymentMethod};
use crate::diagnostics::DEFAULT_VALIDATION_BOOTSTRAP_VERSION;
use crate::environment::EnvironmentResources;
use crate::graph::{
    ConcurrencyLimits, Executors, GraphError, NodeKind, NodeState, RunReport, WorkGraph,
    strip_published_assets,
};
use crate::manifest::{DeploymentManifest, ManifestError, StackManifest};
use crate::progress::ProgressListener;
use crate::service::StackService;
use crate::stack::Tag;
use crate::tracker::PollSettings;

use executor::{AssetBuildExecutor, AssetPublishExecutor, StackExecutor};
pub use executor::{MAX_ATTEMPTS, desired_descriptor};
pub use outputs::{OutputsError, write_outputs};

/// Options applying to every stack of a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeployOptions {
    /// Execution role used instead of each environment's default.
    pub role_arn: Option<String>,
    /// Notification targets added to every stack.
    pub notification_arns: Vec<String>,
    /// Tags applied to every stack, replacing stack tags with the same key.
    pub tags: Vec<Tag>,
    /// Parameter values keyed by stack name, or `"*"` for every stack.
    pub parameters: BTreeMap<String, BTreeMap<String, String>>,
    /// Reuse deployed values for parameters that are not supplied.
    pub keep_previous_parameters: bool,
    /// Roll back failed executions.
    pub rollback: bool,
    /// Skip still-failing resources when continuing a failed rollback.
    pub orphan_failed_resources: bool,
    /// Deploy even when nothing changed.
    pub force: bool,
    /// Publish assets even when they are already published.
    pub force_republish: bool,
    /// Build every asset up front rather than just before its stack.
    pub prebuild_assets: bool,
    /// Per-kind concurrency ceilings.
    pub concurrency: ConcurrencyLimits,
    /// How stacks reach the service.
    pub method: DeploymentMethod,
    /// Roll paused stacks back and retry with rollback enabled instead of
    /// failing.
    pub auto_rollback: bool,
    /// File receiving the outputs of every deployed stack.
    pub outputs_file: Option<Utf8PathBuf>,
    /// Polling cadence and bounds.
    pub poll: PollSettings,
    /// Bootstrap version needed for detailed validation reports.
    pub validation_bootstrap_version: u32,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            role_arn: None,
            notification_arns: Vec::new(),
            tags: Vec::new(),
            parameters: BTreeMap::new(),
            keep_previous_parameters: true,
            rollback: true,
            orphan_failed_resources: false,
            force: false,
            force_republish: false,
            prebuild_assets: true,
            concurrency: ConcurrencyLimits::default(),
            method: DeploymentMethod::default(),
            auto_rollback: false,
            outputs_file: None,
            poll: PollSettings::default(),
            validation_bootstrap_version: DEFAULT_VALIDATION_BOOTSTRAP_VERSION,
        }
    }
}

impl DeployOptions {
    /// Options for one attempt with the given rollback setting.
    #[must_use]
    pub fn stack_options(&self, rollback: bool) -> DeployStackOptions {
        DeployStackOptions {
            method: self.method.clone(),
            rollback,
            force: self.force,
            keep_previous_parameters: self.keep_previous_parameters,
            poll: self.poll,
            validation_bootstrap_version: self.validation_bootstrap_version,
        }
    }
}

/// Failure of one work-graph node.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum NodeError {
    /// Building or publishing an asset failed.
    #[error(transparent)]
    Asset(#[from] AssetError),
    /// Deploying a stack failed.
    #[error(transparent)]
    Deploy(#[from] DeployError),
    /// The node names something the manifest does not declare.
    #[error("node {node} does not match any manifest entry")]
    UnknownSubject {
        /// Node id.
        node: String,
    },
}

/// Errors that stop a run before or instead of reporting per-stack results.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum OrchestratorError {
    /// The manifest or the stack selection is invalid.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// The work graph cannot be built or run, or a node failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// What happened to one stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StackOutcome {
    /// The stack was deployed, or found to be up to date.
    Deployed(DeployOutcome),
    /// Deploying the stack failed.
    Failed(NodeError),
    /// Something the stack depends on failed.
    Skipped,
}

/// Result for one selected stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackReport {
    /// Stack name.
    pub stack: String,
    /// Outcome.
    pub outcome: StackOutcome,
}

impl StackReport {
    /// Short status label.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match &self.outcome {
            StackOutcome::Deployed(outcome) if outcome.no_op => "unchanged",
            StackOutcome::Deployed(_) => "deployed",
            StackOutcome::Failed(_) => "failed",
            StackOutcome::Skipped => "skipped",
        }
    }
}

/// Aggregated result of a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunSummary {
    /// One report per selected stack, in manifest order.
    pub stacks: Vec<StackReport>,
    /// First node failure of the run, asset or stack.
    pub failure: Option<GraphError>,
}

impl RunSummary {
    fn collect(
        selected: &[&StackManifest],
        report: &RunReport<NodeError>,
        mut outcomes: BTreeMap<String, DeployOutcome>,
    ) -> Self {
        let stacks = selected
            .iter()
            .map(|manifest| {
                let id = NodeKind::StackDeploy.node_id(manifest.name());
                let outcome = match report.state(&id) {
                    Some(NodeState::Completed) => outcomes
                        .remove(manifest.name())
                        .map_or(StackOutcome::Skipped, StackOutcome::Deployed),
                    Some(NodeState::Failed) => report
                        .failure(&id)
                        .cloned()
                        .map_or(StackOutcome::Skipped, StackOutcome::Failed),
                    _ => StackOutcome::Skipped,
                };
                StackReport {
                    stack: manifest.name().to_owned(),
                    outcome,
                }
            })
            .collect();
        Self {
            stacks,
            failure: report.check().err(),
        }
    }

    /// No node failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Report for `stack`.
    #[must_use]
    pub fn stack(&self, stack: &str) -> Option<&StackReport> {
        self.stacks.iter().find(|report| report.stack == stack)
    }

    /// Outputs of every deployed stack, keyed by stack name.
    #[must_use]
    pub fn outputs(&self) -> BTreeMap<String, BTreeMap<String, String>> {
        self.stacks
            .iter()
            .filter_map(|report| match &report.outcome {
                StackOutcome::Deployed(outcome) => {
                    Some((report.stack.clone(), outcome.outputs.clone()))
                }
                StackOutcome::Failed(_) | StackOutcome::Skipped => None,
            })
            .collect()
    }

    /// Turns a failed run into an error.
    ///
    /// # Errors
    ///
    /// Returns the first node failure as [`OrchestratorError::Graph`].
    pub fn check(&self) -> Result<(), OrchestratorError> {
        self.failure
            .clone()
            .map_or(Ok(()), |failure| Err(OrchestratorError::Graph(failure)))
    }
}

/// Deploys the stacks of a manifest.
pub struct Orchestrator<'a, S: ?Sized, E: ?Sized, B: ?Sized, P: ?Sized> {
    service: &'a S,
    environments: &'a E,
    builder: &'a B,
    publisher: &'a P,
    progress: &'a dyn ProgressListener,
}

impl<'a, S, E, B, P> Orchestrator<'a, S, E, B, P>
where
    S: StackService + ?Sized,
    E: EnvironmentResources + ?Sized,
    B: AssetBuilder + ?Sized,
    P: AssetPublisher + ?Sized,
{
    /// Creates an orchestrator.
    #[must_use]
    pub const fn new(
        service: &'a S,
        environments: &'a E,
        builder: &'a B,
        publisher: &'a P,
        progress: &'a dyn ProgressListener,
    ) -> Self {
        Self {
            service,
            environments,
            builder,
            publisher,
            progress,
        }
    }

    /// Deploys the stacks named in `selection`, or every stack when it is
    /// empty, together with the assets they reference.
    ///
    /// Stack failures do not abort the run: dependents are skipped and the
    /// failure is recorded in the returned summary.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Manifest`] for unknown stack names and
    /// [`OrchestratorError::Graph`] when the graph cannot be built, contains
    /// a cycle or has a zero concurrency ceiling.
    pub async fn deploy(
        &self,
        manifest: &DeploymentManifest,
        selection: &[String],
        options: &DeployOptions,
    ) -> Result<RunSummary, OrchestratorError> {
        let selected = manifest.select(selection)?;
        let plans: Vec<_> = selected.iter().map(|stack| stack.plan()).collect();
        let mut graph = WorkGraph::build(&plans, &manifest.assets, options.prebuild_assets)?;
        let stripped = strip_published_assets(
            &mut graph,
            self.publisher,
            &manifest.assets,
            options.force_republish,
        )
        .await;
        info!(
            stacks = selected.len(),
            nodes = graph.nodes().len(),
            stripped,
            "starting deployment run"
        );

        let assets: BTreeMap<&str, &AssetManifest> = manifest
            .assets
            .iter()
            .map(|asset| (asset.id.as_str(), asset))
            .collect();
        let build = AssetBuildExecutor::new(self.builder, &assets);
        let publish = AssetPublishExecutor::new(self.publisher, &assets);
        let stacks = StackExecutor::new(
            self.service,
            self.environments,
            self.progress,
            &selected,
            options,
        );
        let executors = Executors {
            asset_build: &build,
            asset_publish: &publish,
            stack_deploy: &stacks,
        };

        let report = graph.run(&executors, options.concurrency).await?;
        let summary = RunSummary::collect(&selected, &report, stacks.into_outcomes());
        if let Some(path) = &options.outputs_file {
            outputs::write_outputs_best_effort(path, &summary.outputs());
        }
        Ok(summary)
    }
}
