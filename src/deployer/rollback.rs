//! Rolls a paused stack back to its last stable state.

use std::collections::BTreeSet;

use tracing::{info, warn};

use super::{DeployError, ServiceResultExt};
use crate::diagnostics::with_recent_failures;
use crate::environment::ResolvedEnvironment;
use crate::progress::{ProgressEvent, ProgressListener};
use crate::service::{StackEvent, StackService};
use crate::tracker::{ChangeTracker, PollSettings};

/// Rolls `stack` back when it is paused in a rollbackable status.
///
/// A stack whose previous rollback failed is resumed instead; with
/// `orphan_failed` the resources that are still failing are skipped and
/// left out of the stack. Stacks that are absent or already stable are left
/// alone.
///
/// # Errors
///
/// Returns [`DeployError::RollbackFailed`] when the stack does not reach a
/// stable status, or the service failure.
pub async fn roll_back_stack<S>(
    service: &S,
    env: &ResolvedEnvironment,
    stack: &str,
    orphan_failed: bool,
    poll: PollSettings,
    progress: &dyn ProgressListener,
) -> Result<(), DeployError>
where
    S: StackService + ?Sized,
{
    let tracker = ChangeTracker::new(service, env, stack, poll);
    let Some(current) = tracker.wait_for_stack().await.for_stack(stack)? else {
        return Ok(());
    };
    if !current.status.is_rollbackable() {
        return Ok(());
    }

    progress.notify(&ProgressEvent::RollbackStarted {
        stack: stack.to_owned(),
        status: current.status.name().to_owned(),
    });
    if current.status.name() == "UPDATE_ROLLBACK_FAILED" {
        let skip = if orphan_failed {
            failing_resources(service, env, stack).await
        } else {
            Vec::new()
        };
        info!(stack, skipped = skip.len(), "continuing failed rollback");
        service
            .continue_update_rollback(env, stack, &skip)
            .await
            .for_stack(stack)?;
    } else {
        info!(stack, status = %current.status, "rolling back stack");
        service.rollback_stack(env, stack).await.for_stack(stack)?;
    }

    let settled = tracker.wait_for_stack().await.for_stack(stack)?;
    match settled {
        Some(found) if found.status.is_rollback_success() || found.status.is_success() => Ok(()),
        Some(found) => {
            let message = with_recent_failures(
                service,
                env,
                stack,
                format!("stack finished in {}", found.status),
            )
            .await;
            Err(DeployError::RollbackFailed {
                stack: stack.to_owned(),
                message,
            })
        }
        None => Err(DeployError::StackMissing {
            stack: stack.to_owned(),
        }),
    }
}

/// Logical ids whose most recent event is a failure, excluding the stack
/// itself.
async fn failing_resources<S>(service: &S, env: &ResolvedEnvironment, stack: &str) -> Vec<String>
where
    S: StackService + ?Sized,
{
    match service.describe_stack_events(env, stack).await {
        Ok(events) => latest_failures(stack, &events),
        Err(err) => {
            warn!(stack, error = %err, "could not list failed resources to orphan");
            Vec::new()
        }
    }
}

fn latest_failures(stack: &str, events: &[StackEvent]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut failing = Vec::new();
    for event in events {
        if event.logical_id == stack || !seen.insert(event.logical_id.as_str()) {
            continue;
        }
        if event.is_failure() {
            failing.push(event.logical_id.clone());
        }
    }
    failing
}
