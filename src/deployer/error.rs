//! Errors raised while deploying a single stack.

use thiserror::Error;

use crate::decision::DecisionError;
use crate::service::ServiceError;

/// Errors raised by [`super::StackDeployer`] and the rollback helper.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DeployError {
    /// The stack is misconfigured; nothing was changed remotely.
    #[error(transparent)]
    Decision(#[from] DecisionError),
    /// A remote call failed.
    #[error("stack {stack}: {source}")]
    Service {
        /// Stack being deployed.
        stack: String,
        /// Underlying service error.
        source: ServiceError,
    },
    /// The change set could not be created.
    #[error("change set {change_set} for stack {stack} failed: {message}")]
    ChangeSetFailed {
        /// Stack name.
        stack: String,
        /// Change-set name.
        change_set: String,
        /// Most specific explanation available.
        message: String,
    },
    /// A named change set does not exist.
    #[error("change set {change_set} does not exist on stack {stack}")]
    ChangeSetNotFound {
        /// Stack name.
        stack: String,
        /// Change-set name.
        change_set: String,
    },
    /// A named change set exists but cannot be executed.
    #[error("change set {change_set} on stack {stack} is not executable ({status})")]
    ChangeSetNotExecutable {
        /// Stack name.
        stack: String,
        /// Change-set name.
        change_set: String,
        /// Status and execution status of the change set.
        status: String,
    },
    /// Execution finished in a failure or rollback status.
    #[error("{message}")]
    StackFailed {
        /// Stack name.
        stack: String,
        /// Final status.
        status: String,
        /// Explanation including recent failure events.
        message: String,
    },
    /// The stack disappeared while being deployed.
    #[error("stack {stack} no longer exists")]
    StackMissing {
        /// Stack name.
        stack: String,
    },
    /// Rolling back did not return the stack to a stable state.
    #[error("rollback of stack {stack} failed: {message}")]
    RollbackFailed {
        /// Stack name.
        stack: String,
        /// Explanation including recent failure events.
        message: String,
    },
    /// A rollback is needed but automatic rollback is disabled.
    #[error("stack {stack} needs a rollback before deploying: {motivation}; rerun with automatic rollback enabled")]
    RollbackRequired {
        /// Stack name.
        stack: String,
        /// Why the rollback is needed.
        motivation: String,
    },
    /// The attempt, rollback and retry loop did not converge.
    #[error("deployment of stack {stack} did not stabilise within {attempts} attempts")]
    AttemptsExhausted {
        /// Stack name.
        stack: String,
        /// Attempts made.
        attempts: usize,
    },
}

impl DeployError {
    /// Name of the stack the error concerns.
    #[must_use]
    pub fn stack(&self) -> &str {
        match self {
            Self::Decision(
                DecisionError::MissingParameters { stack, .. }
                | DecisionError::TemplateTooLarge { stack, .. }
                | DecisionError::InvalidNotificationArn { stack, .. },
            )
            | Self::Service { stack, .. }
            | Self::ChangeSetFailed { stack, .. }
            | Self::ChangeSetNotFound { stack, .. }
            | Self::ChangeSetNotExecutable { stack, .. }
            | Self::StackFailed { stack, .. }
            | Self::StackMissing { stack }
            | Self::RollbackFailed { stack, .. }
            | Self::RollbackRequired { stack, .. }
            | Self::AttemptsExhausted { stack, .. } => stack,
        }
    }
}

/// Attaches the stack name to service failures.
pub(crate) trait ServiceResultExt<T> {
    /// Wraps the error in [`DeployError::Service`].
    fn for_stack(self, stack: &str) -> Result<T, DeployError>;
}

impl<T> ServiceResultExt<T> for Result<T, ServiceError> {
    fn for_stack(self, stack: &str) -> Result<T, DeployError> {
        self.map_err(|source| DeployError::Service {
            stack: stack.to_owned(),
            source,
        })
    }
}
