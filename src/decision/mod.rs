//! Skip-versus-deploy decisions and change-set type selection.
//!
//! Everything here is pure: it compares the desired descriptor with the
//! remote snapshot and never calls the service.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::digest::{MAX_INLINE_TEMPLATE_BYTES, canonical_json, is_valid_notification_arn, template_digest};
use crate::service::TemplateSource;
use crate::stack::{RemoteStack, StackDescriptor};

mod params;

pub use params::{ResolvedParameters, TemplateParameter, template_parameters};

/// Key of the parameter map entry applied to every stack.
pub const GLOBAL_PARAMETER_KEY: &str = "*";

/// Configuration problems detected before any mutating call.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DecisionError {
    /// Declared parameters without a value.
    #[error("stack {stack} is missing values for parameters: {}", names.join(", "))]
    MissingParameters {
        /// Stack name.
        stack: String,
        /// Parameter names without a value.
        names: Vec<String>,
    },
    /// Inline template exceeds the service limit.
    #[error(
        "template for stack {stack} is {size} bytes which exceeds the inline limit of {limit} bytes; publish it and supply template_url"
    )]
    TemplateTooLarge {
        /// Stack name.
        stack: String,
        /// Canonical template size in bytes.
        size: usize,
        /// Inline limit in bytes.
        limit: usize,
    },
    /// Notification target is not a topic identifier.
    #[error("stack {stack} has an invalid notification target: {arn}")]
    InvalidNotificationArn {
        /// Stack name.
        stack: String,
        /// Offending identifier.
        arn: String,
    },
}

/// Outcome of the skip check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SkipDecision {
    /// Nothing would change.
    Skip {
        /// Why the deployment can be skipped.
        reason: String,
    },
    /// An attempt is required.
    Deploy {
        /// What forced the attempt.
        reason: String,
    },
}

impl SkipDecision {
    fn deploy(reason: impl Into<String>) -> Self {
        Self::Deploy {
            reason: reason.into(),
        }
    }

    /// Whether the deployment is skipped.
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }

    /// Human-readable reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Skip { reason } | Self::Deploy { reason } => reason,
        }
    }
}

/// Inputs of [`decide_skip`].
#[derive(Clone, Copy, Debug)]
pub struct SkipCheck<'a> {
    /// Locally synthesised descriptor.
    pub desired: &'a StackDescriptor,
    /// Remote snapshot, `None` when the stack is absent.
    pub current: Option<&'a RemoteStack>,
    /// Deployed template, when the stack exists.
    pub current_template: Option<&'a Value>,
    /// Parameters resolved against the desired template.
    pub parameters: &'a ResolvedParameters,
    /// Caller asked to deploy regardless.
    pub force: bool,
    /// The attempt will execute what it prepares. Create-only change sets
    /// are always prepared.
    pub execute: bool,
}

/// Decides whether deploying `check.desired` would change anything.
#[must_use]
pub fn decide_skip(check: &SkipCheck<'_>) -> SkipDecision {
    if check.force {
        return SkipDecision::deploy("forced deployment");
    }
    if !check.execute {
        return SkipDecision::deploy("change set requested without execution");
    }
    let Some(current) = check.current else {
        return SkipDecision::deploy("stack does not exist");
    };
    if current.status.is_review_in_progress() {
        return SkipDecision::deploy("stack is in review from an unexecuted change set");
    }
    if current.status.is_failure() || current.status.is_creation_failure() {
        return SkipDecision::deploy(format!("stack is in a failure state ({})", current.status));
    }
    let template_changed = check
        .current_template
        .is_none_or(|deployed| template_digest(deployed) != template_digest(&check.desired.template));
    if template_changed {
        return SkipDecision::deploy("template has changed");
    }
    if check.desired.tag_set() != current.descriptor.tag_set() {
        return SkipDecision::deploy("tags have changed");
    }
    if check.desired.notification_set() != current.descriptor.notification_set() {
        return SkipDecision::deploy("notification targets have changed");
    }
    if let Some(desired) = check.desired.termination_protection
        && desired != current.termination_protection()
    {
        return SkipDecision::deploy("termination protection has changed");
    }
    if let Some(reason) = check
        .parameters
        .change_reason(&current.descriptor.parameters)
    {
        return SkipDecision::deploy(reason);
    }
    SkipDecision::Skip {
        reason: String::from("no changes detected"),
    }
}

/// What must happen to the remote stack before a change set is created.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StackPreparation {
    /// Stack is absent; create it.
    Create,
    /// Stack never finished creating; delete it and create afresh.
    DeleteThenCreate,
    /// Stack exists; update it.
    Update,
}

impl StackPreparation {
    /// Chooses the preparation for the current remote snapshot.
    #[must_use]
    pub fn for_current(current: Option<&RemoteStack>) -> Self {
        match current {
            None => Self::Create,
            Some(stack) if stack.status.is_creation_failure() => Self::DeleteThenCreate,
            Some(_) => Self::Update,
        }
    }

    /// Whether the resulting change set creates the stack.
    #[must_use]
    pub const fn creates(self) -> bool {
        matches!(self, Self::Create | Self::DeleteThenCreate)
    }
}

/// Layers run-level parameters over a stack's own: the descriptor values
/// first, then the `"*"` entry, then the entry named after the stack.
#[must_use]
pub fn merge_parameters(
    stack: &str,
    base: &BTreeMap<String, String>,
    run: &BTreeMap<String, BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    for scope in [GLOBAL_PARAMETER_KEY, stack] {
        if let Some(values) = run.get(scope) {
            merged.extend(values.iter().map(|(key, value)| (key.clone(), value.clone())));
        }
    }
    merged
}

/// Rejects notification targets that are not topic identifiers.
///
/// # Errors
///
/// Returns [`DecisionError::InvalidNotificationArn`] for the first invalid
/// entry.
pub fn validate_notification_arns(stack: &str, arns: &[String]) -> Result<(), DecisionError> {
    arns.iter()
        .find(|arn| !is_valid_notification_arn(arn))
        .map_or(Ok(()), |arn| {
            Err(DecisionError::InvalidNotificationArn {
                stack: stack.to_owned(),
                arn: arn.clone(),
            })
        })
}

/// Chooses how the template reaches the service.
///
/// # Errors
///
/// Returns [`DecisionError::TemplateTooLarge`] when an inline body would
/// exceed the service limit and no URL was supplied.
pub fn template_source(desired: &StackDescriptor) -> Result<TemplateSource, DecisionError> {
    if let Some(url) = &desired.template_url {
        return Ok(TemplateSource::Url(url.clone()));
    }
    let body = canonical_json(&desired.template);
    if body.len() > MAX_INLINE_TEMPLATE_BYTES {
        return Err(DecisionError::TemplateTooLarge {
            stack: desired.name.clone(),
            size: body.len(),
            limit: MAX_INLINE_TEMPLATE_BYTES,
        });
    }
    Ok(TemplateSource::Body(body))
}
