//! Engine configuration loaded via `ortho-config`.
//!
//! Values merge defaults, `stackdeploy.toml`, `STACKDEPLOY_*` environment
//! variables and CLI flags, in that order of precedence.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::diagnostics::DEFAULT_VALIDATION_BOOTSTRAP_VERSION;
use crate::graph::ConcurrencyLimits;
use crate::tracker::PollSettings;

/// Default provider CLI binary.
pub const DEFAULT_CLI_BIN: &str = "aws";

/// Deployment engine settings.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "STACKDEPLOY",
    discovery(
        app_name = "stackdeploy",
        env_var = "STACKDEPLOY_CONFIG_PATH",
        config_file_name = "stackdeploy.toml",
        dotfile_name = ".stackdeploy.toml",
        project_file_name = "stackdeploy.toml"
    )
)]
pub struct DeployConfig {
    /// Provider CLI used to reach the stack service.
    #[ortho_config(default = DEFAULT_CLI_BIN.to_owned())]
    pub cli_bin: String,
    /// Seconds between status polls.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Upper bound on waiting for a change set to finish creating.
    #[ortho_config(default = 600)]
    pub change_set_timeout_secs: u64,
    /// Upper bound on waiting for a stack operation to settle.
    #[ortho_config(default = 3600)]
    pub stack_timeout_secs: u64,
    /// Stacks deployed at the same time.
    #[ortho_config(default = 1)]
    pub stack_concurrency: usize,
    /// Assets built at the same time.
    #[ortho_config(default = 1)]
    pub asset_build_concurrency: usize,
    /// Assets published at the same time.
    #[ortho_config(default = 8)]
    pub asset_publish_concurrency: usize,
    /// Bootstrap version from which early-validation failures carry
    /// per-resource detail.
    #[ortho_config(default = DEFAULT_VALIDATION_BOOTSTRAP_VERSION)]
    pub validation_bootstrap_version: u32,
    /// File receiving stack outputs after a run.
    pub outputs_file: Option<String>,
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// A field holds a value the engine cannot use.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

struct Field {
    description: &'static str,
    key: &'static str,
}

impl Field {
    const fn new(description: &'static str, key: &'static str) -> Self {
        Self { description, key }
    }

    fn error(&self, problem: &str) -> ConfigError {
        ConfigError::Invalid(format!(
            "{} {problem}: set STACKDEPLOY_{} or add {} to stackdeploy.toml",
            self.description,
            self.key.to_ascii_uppercase(),
            self.key
        ))
    }

    fn require_text(&self, value: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(self.error("must not be blank"));
        }
        Ok(())
    }

    fn require_positive(&self, value: u64) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(self.error("must be at least 1"));
        }
        Ok(())
    }
}

impl DeployConfig {
    /// Loads configuration from defaults, files and the environment without
    /// parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stackdeploy")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Rejects values the engine cannot run with. Messages name the
    /// environment variable and TOML key to fix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Field::new("provider CLI binary", "cli_bin").require_text(&self.cli_bin)?;
        Field::new("poll interval", "poll_interval_secs").require_positive(self.poll_interval_secs)?;
        Field::new("change set timeout", "change_set_timeout_secs")
            .require_positive(self.change_set_timeout_secs)?;
        Field::new("stack timeout", "stack_timeout_secs").require_positive(self.stack_timeout_secs)?;
        for (value, field) in [
            (
                self.stack_concurrency,
                Field::new("stack concurrency", "stack_concurrency"),
            ),
            (
                self.asset_build_concurrency,
                Field::new("asset build concurrency", "asset_build_concurrency"),
            ),
            (
                self.asset_publish_concurrency,
                Field::new("asset publish concurrency", "asset_publish_concurrency"),
            ),
        ] {
            if value == 0 {
                return Err(field.error("must be at least 1"));
            }
        }
        if let Some(path) = &self.outputs_file {
            Field::new("outputs file", "outputs_file").require_text(path)?;
        }
        Ok(())
    }

    /// Polling cadence and bounds.
    #[must_use]
    pub const fn poll_settings(&self) -> PollSettings {
        PollSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            change_set_timeout: Duration::from_secs(self.change_set_timeout_secs),
            stack_timeout: Duration::from_secs(self.stack_timeout_secs),
        }
    }

    /// Per-kind concurrency ceilings.
    #[must_use]
    pub const fn concurrency(&self) -> ConcurrencyLimits {
        ConcurrencyLimits {
            asset_build: self.asset_build_concurrency,
            asset_publish: self.asset_publish_concurrency,
            stack_deploy: self.stack_concurrency,
        }
    }
}
