//! Binary entry point for the stackdeploy CLI.

mod cli;

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use stackdeploy::{
    CliStackService, CommandAssetHandler, ConfigError, DeployConfig, DeployOptions,
    DeploymentManifest, DeploymentMethod, GLOBAL_PARAMETER_KEY, ManifestError, Orchestrator,
    OrchestratorError, ProcessCommandRunner, RunSummary, StackOutcome, Tag, TracingProgress,
};

use cli::{Cli, DeployCommand};

const LOG_ENV: &str = "STACKDEPLOY_LOG";

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("deployment failed: {0}")]
    Deploy(#[from] OrchestratorError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
    {
        writeln!(io::stderr(), "failed to initialise logging: {err}").ok();
    }
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Deploy(command) => run_deploy(&command).await,
    }
}

async fn run_deploy(args: &DeployCommand) -> Result<i32, CliError> {
    let config = DeployConfig::load_without_cli_args()?;
    config.validate()?;
    let options = deploy_options(args, &config)?;
    let manifest = DeploymentManifest::load(Utf8Path::new(&args.manifest))?;

    let environments = manifest.environment_resources();
    let service = CliStackService::new(config.cli_bin.clone(), ProcessCommandRunner);
    let assets = CommandAssetHandler::new(ProcessCommandRunner);
    let progress = TracingProgress;
    let summary = Orchestrator::new(&service, &environments, &assets, &assets, &progress)
        .deploy(&manifest, &args.stacks, &options)
        .await?;

    write_summary(io::stdout(), &summary);
    if let Err(err) = summary.check() {
        report_error(&CliError::from(err));
        return Ok(1);
    }
    Ok(0)
}

fn deploy_options(args: &DeployCommand, config: &DeployConfig) -> Result<DeployOptions, CliError> {
    let mut concurrency = config.concurrency();
    if let Some(stacks) = args.concurrency {
        concurrency.stack_deploy = stacks;
    }
    if let Some(builds) = args.asset_build_concurrency {
        concurrency.asset_build = builds;
    }
    if let Some(publishes) = args.asset_publish_concurrency {
        concurrency.asset_publish = publishes;
    }

    Ok(DeployOptions {
        role_arn: args.role_arn.clone(),
        notification_arns: args.notification_arns.clone(),
        tags: parse_tags(&args.tags)?,
        parameters: parse_parameters(&args.parameters)?,
        keep_previous_parameters: !args.no_previous_parameters,
        rollback: !args.no_rollback,
        orphan_failed_resources: args.orphan_failed_resources,
        force: args.force,
        force_republish: args.force_republish,
        prebuild_assets: !args.no_prebuild_assets,
        concurrency,
        method: deployment_method(args),
        auto_rollback: args.auto_rollback,
        outputs_file: args
            .outputs_file
            .clone()
            .or_else(|| config.outputs_file.clone())
            .map(Utf8PathBuf::from),
        poll: config.poll_settings(),
        validation_bootstrap_version: config.validation_bootstrap_version,
    })
}

fn deployment_method(args: &DeployCommand) -> DeploymentMethod {
    if args.direct {
        return DeploymentMethod::Direct;
    }
    let execute = !args.no_execute;
    args.existing_change_set.clone().map_or_else(
        || DeploymentMethod::ChangeSet {
            name: args.change_set_name.clone(),
            execute,
        },
        |name| DeploymentMethod::ExistingChangeSet { name, execute },
    )
}

fn split_assignment<'a>(flag: &str, raw: &'a str) -> Result<(&'a str, &'a str), CliError> {
    raw.split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .ok_or_else(|| CliError::InvalidArgument(format!("{flag} expects KEY=VALUE, got {raw:?}")))
}

fn parse_tags(raw: &[String]) -> Result<Vec<Tag>, CliError> {
    raw.iter()
        .map(|entry| split_assignment("--tag", entry).map(|(key, value)| Tag::new(key, value)))
        .collect()
}

fn parse_parameters(raw: &[String]) -> Result<BTreeMap<String, BTreeMap<String, String>>, CliError> {
    let mut parameters: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for entry in raw {
        let (target, value) = split_assignment("--parameter", entry)?;
        let (scope, key) = target
            .split_once(':')
            .unwrap_or((GLOBAL_PARAMETER_KEY, target));
        if scope.is_empty() || key.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "--parameter expects [STACK:]KEY=VALUE, got {entry:?}"
            )));
        }
        parameters
            .entry(scope.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_owned());
    }
    Ok(parameters)
}

fn write_summary(mut target: impl Write, summary: &RunSummary) {
    for report in &summary.stacks {
        let line = match &report.outcome {
            StackOutcome::Failed(err) => format!("{}: {} ({err})", report.stack, report.status()),
            StackOutcome::Deployed(_) | StackOutcome::Skipped => {
                format!("{}: {}", report.stack, report.status())
            }
        };
        writeln!(target, "{line}").ok();
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
