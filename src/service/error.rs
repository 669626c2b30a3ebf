//! Errors raised by remote stack service calls.

use thiserror::Error;

use crate::command::CommandError;

/// Errors raised by [`super::StackService`] implementations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ServiceError {
    /// The stack does not exist.
    #[error("stack {stack} does not exist")]
    StackNotFound {
        /// Stack name used for the lookup.
        stack: String,
    },
    /// The change set does not exist.
    #[error("change set {change_set} does not exist on stack {stack}")]
    ChangeSetNotFound {
        /// Stack name.
        stack: String,
        /// Change-set name.
        change_set: String,
    },
    /// An update call found nothing to change.
    #[error("no updates are to be performed on stack {stack}")]
    NoUpdates {
        /// Stack name.
        stack: String,
    },
    /// Raised when waiting for the service exceeds the configured bound.
    #[error("timeout waiting for {action} on {target}")]
    Timeout {
        /// Action being waited on.
        action: String,
        /// Stack or change set being waited on.
        target: String,
    },
    /// Any other failure reported by the service.
    #[error("{operation} failed: {message}")]
    Api {
        /// Remote operation.
        operation: String,
        /// Message returned by the service.
        message: String,
    },
    /// The response could not be understood.
    #[error("failed to parse {operation} response: {message}")]
    Parse {
        /// Remote operation.
        operation: String,
        /// Parser error message.
        message: String,
    },
    /// The transport command could not be run.
    #[error(transparent)]
    Command(#[from] CommandError),
}

impl ServiceError {
    /// The addressed stack or change set does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StackNotFound { .. } | Self::ChangeSetNotFound { .. }
        )
    }

    /// The call was rejected because nothing would change.
    #[must_use]
    pub const fn is_no_updates(&self) -> bool {
        matches!(self, Self::NoUpdates { .. })
    }

    /// Builds an [`ServiceError::Api`] error.
    #[must_use]
    pub fn api(operation: &str, message: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.to_owned(),
            message: message.into(),
        }
    }
}
