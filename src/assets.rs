//! Build and publish handlers for stack assets.
//!
//! Assets are declared in the deployment manifest as host commands. The
//! work graph drives them through the [`AssetBuilder`] and
//! [`AssetPublisher`] traits; [`CommandAssetHandler`] runs the declared
//! commands through a [`CommandRunner`].

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::command::{CommandError, CommandOutput, CommandRunner, CommandSpec, run_blocking};

/// Future returned by asset operations.
pub type AssetFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AssetError>> + Send + 'a>>;

/// A build artifact referenced by one or more stack templates.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct AssetManifest {
    /// Stable asset identifier, usually a content hash.
    pub id: String,
    /// Command producing the artifact; assets without one are published as is.
    #[serde(default)]
    pub build: Option<CommandSpec>,
    /// Command uploading the artifact.
    pub publish: CommandSpec,
    /// Command exiting with status zero when the artifact is already
    /// published.
    #[serde(default)]
    pub published_check: Option<CommandSpec>,
}

/// Errors raised while building or publishing assets.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AssetError {
    /// Raised when an asset command returns a non-zero exit status.
    #[error("asset {asset}: {program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Asset being processed.
        asset: String,
        /// Program that failed.
        program: String,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when an asset command cannot be run at all.
    #[error(transparent)]
    Runner(#[from] CommandError),
}

/// Produces asset artifacts.
pub trait AssetBuilder: Send + Sync {
    /// Builds `asset`.
    fn build<'a>(&'a self, asset: &'a AssetManifest) -> AssetFuture<'a, ()>;
}

/// Uploads asset artifacts to where stacks read them from.
pub trait AssetPublisher: Send + Sync {
    /// Publishes `asset`.
    fn publish<'a>(&'a self, asset: &'a AssetManifest) -> AssetFuture<'a, ()>;

    /// Reports whether `asset` is already published.
    fn is_published<'a>(&'a self, asset: &'a AssetManifest) -> AssetFuture<'a, bool>;
}

/// Runs the commands declared on each [`AssetManifest`].
#[derive(Clone, Debug)]
pub struct CommandAssetHandler<R> {
    runner: R,
}

impl<R> CommandAssetHandler<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    /// Creates a handler that runs commands through `runner`.
    #[must_use]
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, AssetError> {
        debug!(command = %spec.display(), "running asset command");
        Ok(run_blocking(&self.runner, &spec.program, spec.os_args()).await?)
    }

    async fn run_checked(&self, asset: &AssetManifest, spec: &CommandSpec) -> Result<(), AssetError> {
        let output = self.run(spec).await?;
        if output.is_success() {
            return Ok(());
        }
        Err(AssetError::CommandFailure {
            asset: asset.id.clone(),
            program: spec.program.clone(),
            status_text: output.status_text(),
            stderr: output.stderr.trim().to_owned(),
        })
    }
}

impl<R> AssetBuilder for CommandAssetHandler<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    fn build<'a>(&'a self, asset: &'a AssetManifest) -> AssetFuture<'a, ()> {
        Box::pin(async move {
            let Some(spec) = &asset.build else {
                debug!(asset = %asset.id, "asset has no build step");
                return Ok(());
            };
            info!(asset = %asset.id, "building asset");
            self.run_checked(asset, spec).await
        })
    }
}

impl<R> AssetPublisher for CommandAssetHandler<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    fn publish<'a>(&'a self, asset: &'a AssetManifest) -> AssetFuture<'a, ()> {
        Box::pin(async move {
            info!(asset = %asset.id, "publishing asset");
            self.run_checked(asset, &asset.publish).await
        })
    }

    fn is_published<'a>(&'a self, asset: &'a AssetManifest) -> AssetFuture<'a, bool> {
        Box::pin(async move {
            let Some(spec) = &asset.published_check else {
                return Ok(false);
            };
            let output = self.run(spec).await?;
            Ok(output.is_success())
        })
    }
}
