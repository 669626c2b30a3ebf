//! Advisory progress notifications.
//!
//! Listeners observe the engine; nothing they do feeds back into
//! deployment decisions.

use tracing::info;

/// Something noteworthy happened while deploying a stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProgressEvent {
    /// The skip check finished.
    SkipDecided {
        /// Stack name.
        stack: String,
        /// Whether the deployment is skipped.
        skipped: bool,
        /// Human-readable reason for the decision.
        reason: String,
    },
    /// A change set was created and described.
    ChangeSetCreated {
        /// Stack name.
        stack: String,
        /// Change-set name.
        change_set: String,
    },
    /// Execution started.
    ExecutionStarted {
        /// Stack name.
        stack: String,
        /// Change set being executed; `None` for direct deployments.
        change_set: Option<String>,
    },
    /// Execution finished and the stack settled.
    ExecutionFinished {
        /// Stack name.
        stack: String,
        /// Final stack status.
        status: String,
    },
    /// A rollback is being performed before retrying.
    RollbackStarted {
        /// Stack name.
        stack: String,
        /// Status the stack was in.
        status: String,
    },
}

/// Receives [`ProgressEvent`]s.
pub trait ProgressListener: Send + Sync {
    /// Handles one event.
    fn notify(&self, event: &ProgressEvent);
}

/// Listener that logs every event through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProgress;

impl ProgressListener for TracingProgress {
    fn notify(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::SkipDecided {
                stack,
                skipped: true,
                reason,
            } => info!(stack = %stack, reason = %reason, "skipping deployment"),
            ProgressEvent::SkipDecided { stack, reason, .. } => {
                info!(stack = %stack, reason = %reason, "deploying");
            }
            ProgressEvent::ChangeSetCreated { stack, change_set } => {
                info!(stack = %stack, change_set = %change_set, "change set created");
            }
            ProgressEvent::ExecutionStarted { stack, change_set } => info!(
                stack = %stack,
                change_set = change_set.as_deref().unwrap_or("-"),
                "execution started"
            ),
            ProgressEvent::ExecutionFinished { stack, status } => {
                info!(stack = %stack, status = %status, "execution finished");
            }
            ProgressEvent::RollbackStarted { stack, status } => {
                info!(stack = %stack, status = %status, "rolling back before retry");
            }
        }
    }
}
