//! Stack descriptors and remote stack status handling.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::environment::Environment;

/// A single stack tag.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Tag {
    /// Tag key.
    #[serde(rename = "Key")]
    pub key: String,
    /// Tag value.
    #[serde(rename = "Value")]
    pub value: String,
}

impl Tag {
    /// Creates a tag from a key and value.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Declarative description of a stack.
///
/// The same shape describes both the locally synthesised ("desired") stack
/// and the remote ("current") stack. For the desired snapshot `parameters`
/// holds explicitly supplied values; for the current snapshot it holds the
/// deployed values.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct StackDescriptor {
    /// Stack name as known to the remote service.
    pub name: String,
    /// Template document.
    #[serde(default)]
    pub template: Value,
    /// Pre-uploaded template location used instead of an inline body.
    #[serde(default)]
    pub template_url: Option<String>,
    /// Parameter values keyed by parameter name.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Ordered stack tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Notification target identifiers.
    #[serde(default)]
    pub notification_arns: Vec<String>,
    /// Termination protection. `None` leaves the remote flag untouched.
    #[serde(default)]
    pub termination_protection: Option<bool>,
    /// Target account and region.
    pub environment: Environment,
}

impl StackDescriptor {
    /// Creates a descriptor with an empty template and no extras.
    #[must_use]
    pub fn new(name: impl Into<String>, environment: Environment) -> Self {
        Self {
            name: name.into(),
            template: Value::Object(serde_json::Map::new()),
            template_url: None,
            parameters: BTreeMap::new(),
            tags: Vec::new(),
            notification_arns: Vec::new(),
            termination_protection: None,
            environment,
        }
    }

    /// Tags as an unordered set.
    #[must_use]
    pub fn tag_set(&self) -> BTreeSet<&Tag> {
        self.tags.iter().collect()
    }

    /// Notification targets as an unordered set.
    #[must_use]
    pub fn notification_set(&self) -> BTreeSet<&str> {
        self.notification_arns.iter().map(String::as_str).collect()
    }
}

/// Remote stack status with the predicates the deployment engine relies on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackStatus {
    name: String,
    reason: Option<String>,
}

impl StackStatus {
    /// Wraps a raw status string.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            name: name.into(),
            reason,
        }
    }

    /// Raw status name (for example `UPDATE_COMPLETE`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reason reported alongside the status.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Stack was never successfully created and rolled back.
    #[must_use]
    pub fn is_creation_failure(&self) -> bool {
        matches!(self.name.as_str(), "ROLLBACK_COMPLETE" | "ROLLBACK_FAILED")
    }

    /// Stack no longer exists.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.name == "DELETE_COMPLETE"
    }

    /// An operation is running against the stack.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.name.ends_with("_IN_PROGRESS") && !self.is_review_in_progress()
    }

    /// Stack was created by a change set that has not been executed.
    #[must_use]
    pub fn is_review_in_progress(&self) -> bool {
        self.name == "REVIEW_IN_PROGRESS"
    }

    /// Last operation failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.name.ends_with("_FAILED")
    }

    /// A rollback finished.
    #[must_use]
    pub fn is_rollback_success(&self) -> bool {
        matches!(
            self.name.as_str(),
            "ROLLBACK_COMPLETE" | "UPDATE_ROLLBACK_COMPLETE" | "IMPORT_ROLLBACK_COMPLETE"
        )
    }

    /// Last operation succeeded without rolling back.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.name.ends_with("_COMPLETE") && !self.is_rollback_success() && !self.is_deleted()
    }

    /// Stack is paused in a failed state and can be rolled back.
    #[must_use]
    pub fn is_rollbackable(&self) -> bool {
        matches!(
            self.name.as_str(),
            "UPDATE_FAILED" | "UPDATE_ROLLBACK_FAILED" | "CREATE_FAILED" | "IMPORT_ROLLBACK_FAILED"
        )
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} ({reason})", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Snapshot of a deployed stack as reported by the remote service.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteStack {
    /// Stack identifier (ARN).
    pub stack_id: String,
    /// Current status.
    pub status: StackStatus,
    /// Deployed descriptor. The template is left empty; fetch it separately.
    pub descriptor: StackDescriptor,
    /// Stack outputs.
    pub outputs: BTreeMap<String, String>,
}

impl RemoteStack {
    /// Termination protection as deployed; absent flags read as disabled.
    #[must_use]
    pub fn termination_protection(&self) -> bool {
        self.descriptor.termination_protection.unwrap_or(false)
    }
}
