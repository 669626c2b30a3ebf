//! Command-line interface definitions for the `stackdeploy` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `stackdeploy` binary.
#[derive(Debug, Parser)]
#[command(
    name = "stackdeploy",
    about = "Deploy declarative infrastructure stacks and their assets in dependency order",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Deploy the stacks of a deployment manifest.
    #[command(name = "deploy", about = "Deploy the stacks of a deployment manifest")]
    Deploy(DeployCommand),
}

/// Arguments for the `stackdeploy deploy` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DeployCommand {
    /// JSON deployment manifest listing stacks, assets and environments.
    #[arg(long, value_name = "PATH", default_value = "deploy.json")]
    pub(crate) manifest: String,
    /// Deploy only this stack; repeat for several. All stacks by default.
    #[arg(long = "stack", value_name = "NAME")]
    pub(crate) stacks: Vec<String>,
    /// Execution role used instead of each environment's default.
    #[arg(long, value_name = "ARN")]
    pub(crate) role_arn: Option<String>,
    /// Notification topic added to every stack; repeatable.
    #[arg(long = "notification-arn", value_name = "ARN")]
    pub(crate) notification_arns: Vec<String>,
    /// Tag applied to every stack; repeatable.
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    pub(crate) tags: Vec<String>,
    /// Parameter value; prefix with `STACK:` to target one stack, otherwise
    /// it applies to every stack. Repeatable.
    #[arg(long = "parameter", value_name = "[STACK:]KEY=VALUE")]
    pub(crate) parameters: Vec<String>,
    /// Require every parameter without a default to be supplied instead of
    /// reusing deployed values.
    #[arg(long)]
    pub(crate) no_previous_parameters: bool,
    /// Leave failed stacks paused in their failure state instead of rolling
    /// them back.
    #[arg(long)]
    pub(crate) no_rollback: bool,
    /// Roll paused stacks back and retry with rollback enabled.
    #[arg(long)]
    pub(crate) auto_rollback: bool,
    /// Skip still-failing resources when continuing a failed rollback.
    #[arg(long)]
    pub(crate) orphan_failed_resources: bool,
    /// Deploy even when nothing changed.
    #[arg(long)]
    pub(crate) force: bool,
    /// Publish assets even when they are already published.
    #[arg(long)]
    pub(crate) force_republish: bool,
    /// Build each asset just before the stack that needs it.
    #[arg(long)]
    pub(crate) no_prebuild_assets: bool,
    /// Create or update stacks directly instead of through change sets.
    #[arg(long, conflicts_with_all = ["change_set_name", "existing_change_set", "no_execute"])]
    pub(crate) direct: bool,
    /// Name for the change sets this run creates.
    #[arg(long, value_name = "NAME", conflicts_with = "existing_change_set")]
    pub(crate) change_set_name: Option<String>,
    /// Execute a change set created earlier instead of creating one.
    #[arg(long, value_name = "NAME")]
    pub(crate) existing_change_set: Option<String>,
    /// Prepare change sets without executing them.
    #[arg(long)]
    pub(crate) no_execute: bool,
    /// Stacks deployed at the same time.
    #[arg(long, value_name = "N")]
    pub(crate) concurrency: Option<usize>,
    /// Assets built at the same time.
    #[arg(long, value_name = "N")]
    pub(crate) asset_build_concurrency: Option<usize>,
    /// Assets published at the same time.
    #[arg(long, value_name = "N")]
    pub(crate) asset_publish_concurrency: Option<usize>,
    /// Write the outputs of every deployed stack to this JSON file.
    #[arg(long, value_name = "PATH")]
    pub(crate) outputs_file: Option<String>,
}
