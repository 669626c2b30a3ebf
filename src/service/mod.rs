//! Remote stack service abstraction.
//!
//! The engine never talks to the provider directly; every remote call goes
//! through [`StackService`], which keeps the deployer and tracker testable
//! with in-memory fakes. [`CliStackService`] is the production adapter.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::environment::ResolvedEnvironment;
use crate::stack::RemoteStack;

mod cli;
mod error;
mod types;

pub use cli::CliStackService;
pub use error::ServiceError;
pub use types::{
    ChangeSetDescription, ChangeSetRequest, ChangeSetStatus, ChangeSetSummary, ChangeSetType,
    ExecutionStatus, ParameterSetting, ParameterValue, Replacement, ResourceChange, StackEvent,
    StackRequest, TemplateSource, ValidationEvent,
};

/// Future returned by service operations.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ServiceError>> + Send + 'a>>;

/// Operations of the remote declarative resource-management service.
///
/// Every call takes the already-resolved environment of the stack it acts
/// on.
pub trait StackService: Send + Sync {
    /// Describes a stack. Returns `Ok(None)` when the stack does not exist
    /// or has been deleted.
    fn describe_stack<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, Option<RemoteStack>>;

    /// Fetches the deployed template.
    fn get_template<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, Value>;

    /// Creates a change set and returns its identifier.
    fn create_change_set<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        request: &'a ChangeSetRequest,
    ) -> ServiceFuture<'a, String>;

    /// Describes a change set including its resource changes.
    fn describe_change_set<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ServiceFuture<'a, ChangeSetDescription>;

    /// Lists the change sets of a stack.
    fn list_change_sets<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, Vec<ChangeSetSummary>>;

    /// Starts executing a change set.
    fn execute_change_set<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        change_set_name: &'a str,
        disable_rollback: bool,
    ) -> ServiceFuture<'a, ()>;

    /// Deletes a change set.
    fn delete_change_set<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ServiceFuture<'a, ()>;

    /// Creates a stack directly and returns its identifier.
    fn create_stack<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        request: &'a StackRequest,
    ) -> ServiceFuture<'a, String>;

    /// Updates a stack directly. Fails with [`ServiceError::NoUpdates`] when
    /// nothing would change.
    fn update_stack<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        request: &'a StackRequest,
    ) -> ServiceFuture<'a, ()>;

    /// Starts deleting a stack.
    fn delete_stack<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, ()>;

    /// Rolls a paused stack back to its last stable state.
    fn rollback_stack<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, ()>;

    /// Resumes a rollback that failed, skipping (orphaning) the given
    /// resources.
    fn continue_update_rollback<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        resources_to_skip: &'a [String],
    ) -> ServiceFuture<'a, ()>;

    /// Sets the termination-protection flag.
    fn update_termination_protection<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        enabled: bool,
    ) -> ServiceFuture<'a, ()>;

    /// Lists stack events, newest first.
    fn describe_stack_events<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, Vec<StackEvent>>;

    /// Lists failed early-validation checks for a change set.
    fn describe_validation_events<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ServiceFuture<'a, Vec<ValidationEvent>>;
}
