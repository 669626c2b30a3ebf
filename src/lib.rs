//! Core library for the stackdeploy deployment engine.
//!
//! The crate deploys declarative infrastructure stacks through a remote
//! stack service. A [`WorkGraph`] schedules asset builds, asset publishes and
//! stack deployments in dependency order under per-kind concurrency ceilings;
//! each stack goes through the [`StackDeployer`] state machine, which decides
//! whether anything changed, drives the change-set protocol and reports
//! whether a rollback is needed first. The [`Orchestrator`] ties both
//! together for a whole [`DeploymentManifest`].

pub mod assets;
pub mod command;
pub mod config;
pub mod decision;
pub mod deployer;
pub mod diagnostics;
pub mod digest;
pub mod environment;
pub mod graph;
pub mod manifest;
pub mod orchestrator;
pub mod progress;
pub mod service;
pub mod stack;
#[cfg(test)]
pub mod test_helpers;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tracker;

pub use assets::{AssetBuilder, AssetError, AssetManifest, AssetPublisher, CommandAssetHandler};
pub use command::{CommandError, CommandOutput, CommandRunner, CommandSpec, ProcessCommandRunner};
pub use config::{ConfigError, DeployConfig};
pub use decision::{DecisionError, GLOBAL_PARAMETER_KEY};
pub use deployer::{
    DeployError, DeployOutcome, DeployStackOptions, DeploymentAttemptResult, DeploymentMethod,
    PausedReason, StackDeployer, roll_back_stack,
};
pub use environment::{
    Environment, EnvironmentFacts, EnvironmentResources, ResolvedEnvironment,
    StaticEnvironmentResources,
};
pub use graph::{ConcurrencyLimits, GraphError, NodeKind, NodeState, WorkGraph};
pub use manifest::{DeploymentManifest, ManifestError, StackManifest};
pub use orchestrator::{
    DeployOptions, NodeError, Orchestrator, OrchestratorError, RunSummary, StackOutcome,
    StackReport,
};
pub use progress::{ProgressEvent, ProgressListener, TracingProgress};
pub use service::{CliStackService, ServiceError, StackService};
pub use stack::{RemoteStack, StackDescriptor, StackStatus, Tag};
pub use tracker::{ChangeTracker, PollSettings};
