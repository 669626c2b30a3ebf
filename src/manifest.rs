//! Deployment manifest: the stacks, assets and environments of one run.
//!
//! The manifest is a JSON document produced by whatever synthesises the
//! templates. It is read through `cap-std` and parsed with `serde_json`.

use std::collections::BTreeSet;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Deserialize;
use thiserror::Error;

use crate::assets::AssetManifest;
use crate::environment::{Environment, EnvironmentFacts, StaticEnvironmentResources};
use crate::graph::StackPlan;
use crate::stack::StackDescriptor;

/// One stack entry.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StackManifest {
    /// Desired descriptor.
    #[serde(flatten)]
    pub descriptor: StackDescriptor,
    /// Stacks that must deploy before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Ids of the assets the template references.
    #[serde(default)]
    pub assets: Vec<String>,
}

impl StackManifest {
    /// Stack name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Scheduling view of this stack.
    #[must_use]
    pub fn plan(&self) -> StackPlan {
        StackPlan {
            name: self.descriptor.name.clone(),
            assets: self.assets.clone(),
            depends_on: self.depends_on.clone(),
        }
    }
}

/// Facts about one target environment.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct EnvironmentManifest {
    /// Account and region.
    #[serde(flatten)]
    pub environment: Environment,
    /// Bootstrap version, profile and default execution role.
    #[serde(flatten)]
    pub facts: EnvironmentFacts,
}

/// Everything one run may deploy.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct DeploymentManifest {
    /// Stacks in declaration order.
    #[serde(default)]
    pub stacks: Vec<StackManifest>,
    /// Assets referenced by the stacks.
    #[serde(default)]
    pub assets: Vec<AssetManifest>,
    /// Known environments.
    #[serde(default)]
    pub environments: Vec<EnvironmentManifest>,
}

/// Errors raised while loading a manifest.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ManifestError {
    /// Raised when the manifest cannot be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the manifest is not valid JSON of the expected shape.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Parser error message.
        message: String,
    },
    /// Two stacks share a name.
    #[error("stack {name} is declared more than once")]
    DuplicateStack {
        /// Repeated name.
        name: String,
    },
    /// Two assets share an id.
    #[error("asset {id} is declared more than once")]
    DuplicateAsset {
        /// Repeated id.
        id: String,
    },
    /// A selected stack is not in the manifest.
    #[error("no stack named {name} in the manifest")]
    UnknownStack {
        /// Requested name.
        name: String,
    },
}

impl DeploymentManifest {
    /// Reads and validates the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] when the file cannot be read and the
    /// other variants when its content is invalid.
    pub fn load(path: &Utf8Path) -> Result<Self, ManifestError> {
        let contents = read_manifest(path)?;
        Self::parse(path, &contents)
    }

    /// Parses and validates manifest `contents`; `path` labels errors.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] for malformed JSON and the duplicate
    /// variants for repeated names.
    pub fn parse(path: &Utf8Path, contents: &str) -> Result<Self, ManifestError> {
        let manifest: Self =
            serde_json::from_str(contents).map_err(|err| ManifestError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ManifestError> {
        let mut stacks = BTreeSet::new();
        if let Some(stack) = self.stacks.iter().find(|stack| !stacks.insert(stack.name())) {
            return Err(ManifestError::DuplicateStack {
                name: stack.name().to_owned(),
            });
        }
        let mut assets = BTreeSet::new();
        if let Some(asset) = self.assets.iter().find(|asset| !assets.insert(asset.id.as_str())) {
            return Err(ManifestError::DuplicateAsset {
                id: asset.id.clone(),
            });
        }
        Ok(())
    }

    /// Stacks named in `selection`, in manifest order. An empty selection
    /// selects every stack.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnknownStack`] for names not in the
    /// manifest.
    pub fn select(&self, selection: &[String]) -> Result<Vec<&StackManifest>, ManifestError> {
        if let Some(missing) = selection
            .iter()
            .find(|name| !self.stacks.iter().any(|stack| stack.name() == name.as_str()))
        {
            return Err(ManifestError::UnknownStack {
                name: missing.clone(),
            });
        }
        Ok(self
            .stacks
            .iter()
            .filter(|stack| selection.is_empty() || selection.iter().any(|name| name == stack.name()))
            .collect())
    }

    /// Environment facts as an injectable resource store.
    #[must_use]
    pub fn environment_resources(&self) -> StaticEnvironmentResources {
        self.environments
            .iter()
            .fold(StaticEnvironmentResources::new(), |store, entry| {
                store.with_facts(entry.environment.clone(), entry.facts.clone())
            })
    }
}

fn read_manifest(path: &Utf8Path) -> Result<String, ManifestError> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| ManifestError::Io {
        path: path.to_path_buf(),
        message: String::from("manifest path is missing a filename"),
    })?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ManifestError::Io {
        path: parent.to_path_buf(),
        message: err.to_string(),
    })?;
    dir.read_to_string(file_name).map_err(|err| ManifestError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}
