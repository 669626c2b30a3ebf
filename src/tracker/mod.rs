//! Change-set protocol for one stack and one attempt.
//!
//! Wraps create, describe, execute and delete, and polls the service until
//! change sets and stacks leave their transient states.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::environment::ResolvedEnvironment;
use crate::service::{ChangeSetDescription, ChangeSetRequest, ServiceError, StackService};
use crate::stack::RemoteStack;

/// Description prefix marking change sets created by this engine.
pub const CHANGE_SET_DESCRIPTION_PREFIX: &str = "stackdeploy change set";

/// Polling cadence and bounds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollSettings {
    /// Delay between describe calls.
    pub poll_interval: Duration,
    /// Bound on waiting for a change set to finish creating.
    pub change_set_timeout: Duration,
    /// Bound on waiting for a stack operation to finish.
    pub stack_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            change_set_timeout: Duration::from_secs(600),
            stack_timeout: Duration::from_secs(3600),
        }
    }
}

/// Point after which polling gives up. Timeouts too large to represent
/// never expire.
#[derive(Clone, Copy, Debug)]
struct Deadline(Option<Instant>);

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    fn has_passed(self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

/// Builds the ownership description recorded on a change set.
#[must_use]
pub fn owned_description(stack: &str) -> String {
    format!("{CHANGE_SET_DESCRIPTION_PREFIX} for {stack}")
}

/// Drives the change-set protocol against one stack.
pub struct ChangeTracker<'a, S: ?Sized> {
    service: &'a S,
    env: &'a ResolvedEnvironment,
    stack: &'a str,
    poll: PollSettings,
}

impl<'a, S> ChangeTracker<'a, S>
where
    S: StackService + ?Sized,
{
    /// Creates a tracker for `stack`.
    #[must_use]
    pub const fn new(
        service: &'a S,
        env: &'a ResolvedEnvironment,
        stack: &'a str,
        poll: PollSettings,
    ) -> Self {
        Self {
            service,
            env,
            stack,
            poll,
        }
    }

    /// Deletes unexecuted change sets this engine created earlier, plus any
    /// set already called `change_set_name`. Returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when listing or deleting fails.
    pub async fn cleanup_owned(&self, change_set_name: &str) -> Result<usize, ServiceError> {
        let summaries = match self.service.list_change_sets(self.env, self.stack).await {
            Ok(found) => found,
            Err(err) if err.is_not_found() => return Ok(0),
            Err(err) => return Err(err),
        };
        let mut deleted = 0;
        for summary in summaries {
            let owned = summary
                .description
                .as_deref()
                .is_some_and(|text| text.starts_with(CHANGE_SET_DESCRIPTION_PREFIX));
            if summary.name != change_set_name && !(owned && summary.is_unexecuted()) {
                continue;
            }
            debug!(stack = self.stack, change_set = %summary.name, "deleting stale change set");
            self.delete(&summary.name).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Creates a change set and waits until the service finishes computing
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError`] when creation fails or polling times out.
    /// A change set that failed to create is returned, not an error.
    pub async fn create(
        &self,
        request: &ChangeSetRequest,
    ) -> Result<ChangeSetDescription, ServiceError> {
        self.service.create_change_set(self.env, request).await?;
        self.wait_for_change_set(&request.change_set_name).await
    }

    /// Polls a change set until it leaves the creating states.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Timeout`] once the change-set timeout
    /// elapses, or the describe failure.
    pub async fn wait_for_change_set(
        &self,
        change_set_name: &str,
    ) -> Result<ChangeSetDescription, ServiceError> {
        let deadline = Deadline::after(self.poll.change_set_timeout);
        loop {
            let described = self.describe(change_set_name).await?;
            if !described.is_creating() {
                return Ok(described);
            }
            if deadline.has_passed() {
                return Err(ServiceError::Timeout {
                    action: String::from("change set creation"),
                    target: format!("{}/{change_set_name}", self.stack),
                });
            }
            sleep(self.poll.poll_interval).await;
        }
    }

    /// Describes a change set.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ChangeSetNotFound`] when it does not exist.
    pub async fn describe(
        &self,
        change_set_name: &str,
    ) -> Result<ChangeSetDescription, ServiceError> {
        self.service
            .describe_change_set(self.env, self.stack, change_set_name)
            .await
    }

    /// Starts executing a change set.
    ///
    /// # Errors
    ///
    /// Returns the service failure.
    pub async fn execute(
        &self,
        change_set_name: &str,
        disable_rollback: bool,
    ) -> Result<(), ServiceError> {
        self.service
            .execute_change_set(self.env, self.stack, change_set_name, disable_rollback)
            .await
    }

    /// Deletes a change set; one that is already gone counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns any other service failure.
    pub async fn delete(&self, change_set_name: &str) -> Result<(), ServiceError> {
        match self
            .service
            .delete_change_set(self.env, self.stack, change_set_name)
            .await
        {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Deletes a change set, logging rather than failing.
    pub async fn delete_quietly(&self, change_set_name: &str) {
        if let Err(err) = self.delete(change_set_name).await {
            warn!(
                stack = self.stack,
                change_set = change_set_name,
                error = %err,
                "failed to delete change set"
            );
        }
    }

    /// Polls the stack until no operation is in progress. Returns `None`
    /// when the stack is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Timeout`] once the stack timeout elapses, or
    /// the describe failure.
    pub async fn wait_for_stack(&self) -> Result<Option<RemoteStack>, ServiceError> {
        let deadline = Deadline::after(self.poll.stack_timeout);
        loop {
            let current = self.service.describe_stack(self.env, self.stack).await?;
            match current {
                Some(stack) if stack.status.is_in_progress() => {
                    debug!(stack = self.stack, status = %stack.status, "waiting for stack to settle");
                }
                settled => return Ok(settled),
            }
            if deadline.has_passed() {
                return Err(ServiceError::Timeout {
                    action: String::from("stack operation"),
                    target: self.stack.to_owned(),
                });
            }
            sleep(self.poll.poll_interval).await;
        }
    }

    /// Deletes the stack and waits until it is gone.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Api`] when deletion ends in a failure
    /// status, [`ServiceError::Timeout`] when it does not finish in time.
    pub async fn delete_stack(&self) -> Result<(), ServiceError> {
        self.service.delete_stack(self.env, self.stack).await?;
        match self.wait_for_stack().await? {
            None => Ok(()),
            Some(stack) => Err(ServiceError::api(
                "delete-stack",
                format!("stack {} is {} after deletion", self.stack, stack.status),
            )),
        }
    }
}

#[cfg(test)]
mod tests;
