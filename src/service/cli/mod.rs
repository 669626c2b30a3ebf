//! [`StackService`] implementation that shells out to the provider CLI.
//!
//! Each operation maps to `<cli> cloudformation <operation> ... --output
//! json`. Non-zero exits are classified by their stderr so expected
//! conditions ("does not exist", "No updates are to be performed") reach
//! the engine as typed errors.

use std::collections::BTreeMap;
use std::ffi::OsString;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::command::{CommandRunner, run_blocking};
use crate::environment::ResolvedEnvironment;
use crate::stack::{RemoteStack, StackDescriptor, StackStatus, Tag};

use super::{
    ChangeSetDescription, ChangeSetRequest, ChangeSetStatus, ChangeSetSummary, ExecutionStatus,
    Replacement, ResourceChange, ServiceError, ServiceFuture, StackEvent, StackRequest,
    StackService, TemplateSource, ValidationEvent,
};

const SERVICE_NAMESPACE: &str = "cloudformation";
const CAPABILITIES: [&str; 3] = [
    "CAPABILITY_IAM",
    "CAPABILITY_NAMED_IAM",
    "CAPABILITY_AUTO_EXPAND",
];

/// Talks to the remote service through its command-line client.
#[derive(Clone, Debug)]
pub struct CliStackService<R> {
    program: String,
    runner: R,
}

/// What an operation addresses, used to classify "does not exist" errors.
#[derive(Clone, Copy)]
struct Target<'a> {
    stack: &'a str,
    change_set: Option<&'a str>,
}

impl<'a> Target<'a> {
    const fn stack(stack: &'a str) -> Self {
        Self {
            stack,
            change_set: None,
        }
    }

    const fn change_set(stack: &'a str, change_set: &'a str) -> Self {
        Self {
            stack,
            change_set: Some(change_set),
        }
    }
}

impl<R> CliStackService<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    /// Creates an adapter invoking `program` (typically `aws`).
    #[must_use]
    pub fn new(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    fn base_args(env: &ResolvedEnvironment, operation: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(SERVICE_NAMESPACE),
            OsString::from(operation),
            OsString::from("--region"),
            OsString::from(&env.environment.region),
            OsString::from("--output"),
            OsString::from("json"),
        ];
        if let Some(profile) = &env.profile {
            args.push(OsString::from("--profile"));
            args.push(OsString::from(profile));
        }
        args
    }

    async fn invoke(
        &self,
        env: &ResolvedEnvironment,
        operation: &str,
        target: Target<'_>,
        extra: Vec<OsString>,
    ) -> Result<String, ServiceError> {
        let mut args = Self::base_args(env, operation);
        args.extend(extra);
        debug!(operation, stack = target.stack, "invoking provider CLI");
        let output = run_blocking(&self.runner, &self.program, args).await?;
        if output.is_success() {
            return Ok(output.stdout);
        }
        Err(classify_failure(operation, target, &output.stderr))
    }

    async fn invoke_json<T: DeserializeOwned>(
        &self,
        env: &ResolvedEnvironment,
        operation: &str,
        target: Target<'_>,
        extra: Vec<OsString>,
    ) -> Result<T, ServiceError> {
        let stdout = self.invoke(env, operation, target, extra).await?;
        parse_json(operation, &stdout)
    }
}

fn classify_failure(operation: &str, target: Target<'_>, stderr: &str) -> ServiceError {
    let message = stderr.trim();
    if message.contains("No updates are to be performed") {
        return ServiceError::NoUpdates {
            stack: target.stack.to_owned(),
        };
    }
    if message.contains("ChangeSetNotFound")
        && let Some(change_set) = target.change_set
    {
        return ServiceError::ChangeSetNotFound {
            stack: target.stack.to_owned(),
            change_set: change_set.to_owned(),
        };
    }
    if message.contains("does not exist") {
        return ServiceError::StackNotFound {
            stack: target.stack.to_owned(),
        };
    }
    ServiceError::api(operation, message)
}

fn parse_json<T: DeserializeOwned>(operation: &str, stdout: &str) -> Result<T, ServiceError> {
    let body = if stdout.trim().is_empty() {
        "{}"
    } else {
        stdout
    };
    serde_json::from_str(body).map_err(|err| ServiceError::Parse {
        operation: operation.to_owned(),
        message: err.to_string(),
    })
}

fn to_json_arg<T: serde::Serialize + ?Sized>(
    operation: &str,
    value: &T,
) -> Result<OsString, ServiceError> {
    serde_json::to_string(value)
        .map(OsString::from)
        .map_err(|err| ServiceError::Parse {
            operation: operation.to_owned(),
            message: err.to_string(),
        })
}

fn template_args(template: &TemplateSource) -> [OsString; 2] {
    match template {
        TemplateSource::Body(body) => [OsString::from("--template-body"), OsString::from(body)],
        TemplateSource::Url(url) => [OsString::from("--template-url"), OsString::from(url)],
    }
}

fn role_args(env: &ResolvedEnvironment) -> Vec<OsString> {
    env.execution_role_arn
        .as_ref()
        .map(|role| vec![OsString::from("--role-arn"), OsString::from(role)])
        .unwrap_or_default()
}

fn capability_args() -> Vec<OsString> {
    let mut args = vec![OsString::from("--capabilities")];
    args.extend(CAPABILITIES.iter().map(OsString::from));
    args
}

fn rollback_flag(disable_rollback: bool) -> OsString {
    if disable_rollback {
        OsString::from("--disable-rollback")
    } else {
        OsString::from("--no-disable-rollback")
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacksOutput {
    #[serde(default)]
    stacks: Vec<WireStack>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireStack {
    stack_id: String,
    stack_name: String,
    stack_status: String,
    #[serde(default)]
    stack_status_reason: Option<String>,
    #[serde(default)]
    parameters: Vec<WireParameter>,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default, rename = "NotificationARNs")]
    notification_arns: Vec<String>,
    #[serde(default)]
    enable_termination_protection: Option<bool>,
    #[serde(default)]
    outputs: Vec<WireOutput>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireParameter {
    parameter_key: String,
    #[serde(default)]
    parameter_value: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireOutput {
    output_key: String,
    #[serde(default)]
    output_value: Option<String>,
}

impl WireStack {
    fn into_remote(self, env: &ResolvedEnvironment) -> RemoteStack {
        let parameters = self
            .parameters
            .into_iter()
            .map(|param| (param.parameter_key, param.parameter_value.unwrap_or_default()))
            .collect();
        let outputs = self
            .outputs
            .into_iter()
            .map(|output| (output.output_key, output.output_value.unwrap_or_default()))
            .collect::<BTreeMap<_, _>>();
        let mut descriptor = StackDescriptor::new(self.stack_name, env.environment.clone());
        descriptor.parameters = parameters;
        descriptor.tags = self.tags;
        descriptor.notification_arns = self.notification_arns;
        descriptor.termination_protection = Some(self.enable_termination_protection.unwrap_or(false));
        RemoteStack {
            stack_id: self.stack_id,
            status: StackStatus::new(self.stack_status, self.stack_status_reason),
            descriptor,
            outputs,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetTemplateOutput {
    #[serde(default)]
    template_body: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateChangeSetOutput {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateStackOutput {
    stack_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeChangeSetOutput {
    change_set_name: String,
    #[serde(default)]
    change_set_id: String,
    #[serde(default)]
    stack_id: String,
    status: String,
    #[serde(default)]
    status_reason: Option<String>,
    #[serde(default)]
    execution_status: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    changes: Vec<WireChange>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireChange {
    #[serde(default)]
    resource_change: Option<WireResourceChange>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireResourceChange {
    #[serde(default)]
    action: Option<String>,
    logical_resource_id: String,
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default)]
    replacement: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListChangeSetsOutput {
    #[serde(default)]
    summaries: Vec<WireSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireSummary {
    change_set_name: String,
    status: String,
    #[serde(default)]
    execution_status: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStackEventsOutput {
    #[serde(default)]
    stack_events: Vec<WireEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireEvent {
    #[serde(default)]
    logical_resource_id: String,
    #[serde(default)]
    resource_type: String,
    #[serde(default)]
    resource_status: String,
    #[serde(default)]
    resource_status_reason: Option<String>,
    #[serde(default)]
    timestamp: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeEventsOutput {
    #[serde(default)]
    operation_events: Vec<WireOperationEvent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireOperationEvent {
    #[serde(default)]
    logical_resource_id: Option<String>,
    #[serde(default)]
    validation_name: Option<String>,
    #[serde(default)]
    validation_status: Option<String>,
    #[serde(default)]
    validation_status_reason: Option<String>,
    #[serde(default)]
    validation_path: Option<String>,
}

fn parse_template_body(body: Value) -> Value {
    match body {
        Value::String(text) => {
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text))
        }
        other => other,
    }
}

impl<R> StackService for CliStackService<R>
where
    R: CommandRunner + Clone + Send + Sync + 'static,
{
    fn describe_stack<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, Option<RemoteStack>> {
        Box::pin(async move {
            let extra = vec![OsString::from("--stack-name"), OsString::from(stack_name)];
            let result: Result<DescribeStacksOutput, ServiceError> = self
                .invoke_json(env, "describe-stacks", Target::stack(stack_name), extra)
                .await;
            match result {
                Ok(output) => Ok(output
                    .stacks
                    .into_iter()
                    .next()
                    .map(|stack| stack.into_remote(env))
                    .filter(|stack| !stack.status.is_deleted())),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(err),
            }
        })
    }

    fn get_template<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, Value> {
        Box::pin(async move {
            let extra = vec![
                OsString::from("--stack-name"),
                OsString::from(stack_name),
                OsString::from("--template-stage"),
                OsString::from("Original"),
            ];
            let output: GetTemplateOutput = self
                .invoke_json(env, "get-template", Target::stack(stack_name), extra)
                .await?;
            Ok(parse_template_body(output.template_body))
        })
    }

    fn create_change_set<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        request: &'a ChangeSetRequest,
    ) -> ServiceFuture<'a, String> {
        Box::pin(async move {
            let operation = "create-change-set";
            let mut extra = vec![
                OsString::from("--stack-name"),
                OsString::from(&request.stack_name),
                OsString::from("--change-set-name"),
                OsString::from(&request.change_set_name),
                OsString::from("--change-set-type"),
                OsString::from(request.change_set_type.as_api()),
                OsString::from("--description"),
                OsString::from(&request.description),
                OsString::from("--parameters"),
                to_json_arg(operation, &request.parameters)?,
                OsString::from("--tags"),
                to_json_arg(operation, &request.tags)?,
                OsString::from("--notification-arns"),
                to_json_arg(operation, &request.notification_arns)?,
            ];
            extra.extend(template_args(&request.template));
            extra.extend(capability_args());
            extra.extend(role_args(env));
            let output: CreateChangeSetOutput = self
                .invoke_json(
                    env,
                    operation,
                    Target::change_set(&request.stack_name, &request.change_set_name),
                    extra,
                )
                .await?;
            Ok(output.id)
        })
    }

    fn describe_change_set<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ServiceFuture<'a, ChangeSetDescription> {
        Box::pin(async move {
            let extra = vec![
                OsString::from("--stack-name"),
                OsString::from(stack_name),
                OsString::from("--change-set-name"),
                OsString::from(change_set_name),
            ];
            let output: DescribeChangeSetOutput = self
                .invoke_json(
                    env,
                    "describe-change-set",
                    Target::change_set(stack_name, change_set_name),
                    extra,
                )
                .await?;
            let changes = output
                .changes
                .into_iter()
                .filter_map(|change| change.resource_change)
                .map(|change| ResourceChange {
                    logical_id: change.logical_resource_id,
                    resource_type: change.resource_type.unwrap_or_default(),
                    action: change.action.unwrap_or_default(),
                    replacement: change
                        .replacement
                        .as_deref()
                        .map_or(Replacement::False, Replacement::parse),
                })
                .collect();
            Ok(ChangeSetDescription {
                name: output.change_set_name,
                id: output.change_set_id,
                stack_id: output.stack_id,
                status: ChangeSetStatus::parse(&output.status),
                status_reason: output.status_reason,
                execution_status: output
                    .execution_status
                    .as_deref()
                    .map_or(ExecutionStatus::Unavailable, ExecutionStatus::parse),
                description: output.description,
                changes,
            })
        })
    }

    fn list_change_sets<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, Vec<ChangeSetSummary>> {
        Box::pin(async move {
            let extra = vec![OsString::from("--stack-name"), OsString::from(stack_name)];
            let output: ListChangeSetsOutput = self
                .invoke_json(env, "list-change-sets", Target::stack(stack_name), extra)
                .await?;
            Ok(output
                .summaries
                .into_iter()
                .map(|summary| ChangeSetSummary {
                    name: summary.change_set_name,
                    status: ChangeSetStatus::parse(&summary.status),
                    execution_status: summary
                        .execution_status
                        .as_deref()
                        .map_or(ExecutionStatus::Unavailable, ExecutionStatus::parse),
                    description: summary.description,
                })
                .collect())
        })
    }

    fn execute_change_set<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        change_set_name: &'a str,
        disable_rollback: bool,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let extra = vec![
                OsString::from("--stack-name"),
                OsString::from(stack_name),
                OsString::from("--change-set-name"),
                OsString::from(change_set_name),
                rollback_flag(disable_rollback),
            ];
            self.invoke(
                env,
                "execute-change-set",
                Target::change_set(stack_name, change_set_name),
                extra,
            )
            .await
            .map(drop)
        })
    }

    fn delete_change_set<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let extra = vec![
                OsString::from("--stack-name"),
                OsString::from(stack_name),
                OsString::from("--change-set-name"),
                OsString::from(change_set_name),
            ];
            self.invoke(
                env,
                "delete-change-set",
                Target::change_set(stack_name, change_set_name),
                extra,
            )
            .await
            .map(drop)
        })
    }

    fn create_stack<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        request: &'a StackRequest,
    ) -> ServiceFuture<'a, String> {
        Box::pin(async move {
            let operation = "create-stack";
            let mut extra = stack_request_args(operation, request)?;
            extra.extend(role_args(env));
            let output: CreateStackOutput = self
                .invoke_json(env, operation, Target::stack(&request.stack_name), extra)
                .await?;
            Ok(output.stack_id)
        })
    }

    fn update_stack<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        request: &'a StackRequest,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let operation = "update-stack";
            let mut extra = stack_request_args(operation, request)?;
            extra.extend(role_args(env));
            self.invoke(env, operation, Target::stack(&request.stack_name), extra)
                .await
                .map(drop)
        })
    }

    fn delete_stack<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let mut extra = vec![OsString::from("--stack-name"), OsString::from(stack_name)];
            extra.extend(role_args(env));
            self.invoke(env, "delete-stack", Target::stack(stack_name), extra)
                .await
                .map(drop)
        })
    }

    fn rollback_stack<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let mut extra = vec![OsString::from("--stack-name"), OsString::from(stack_name)];
            extra.extend(role_args(env));
            self.invoke(env, "rollback-stack", Target::stack(stack_name), extra)
                .await
                .map(drop)
        })
    }

    fn continue_update_rollback<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        resources_to_skip: &'a [String],
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let mut extra = vec![OsString::from("--stack-name"), OsString::from(stack_name)];
            if !resources_to_skip.is_empty() {
                extra.push(OsString::from("--resources-to-skip"));
                extra.extend(resources_to_skip.iter().map(OsString::from));
            }
            extra.extend(role_args(env));
            self.invoke(env, "continue-update-rollback", Target::stack(stack_name), extra)
                .await
                .map(drop)
        })
    }

    fn update_termination_protection<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        enabled: bool,
    ) -> ServiceFuture<'a, ()> {
        Box::pin(async move {
            let flag = if enabled {
                "--enable-termination-protection"
            } else {
                "--no-enable-termination-protection"
            };
            let extra = vec![
                OsString::from("--stack-name"),
                OsString::from(stack_name),
                OsString::from(flag),
            ];
            self.invoke(
                env,
                "update-termination-protection",
                Target::stack(stack_name),
                extra,
            )
            .await
            .map(drop)
        })
    }

    fn describe_stack_events<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
    ) -> ServiceFuture<'a, Vec<StackEvent>> {
        Box::pin(async move {
            let extra = vec![
                OsString::from("--stack-name"),
                OsString::from(stack_name),
                OsString::from("--max-items"),
                OsString::from("100"),
            ];
            let output: DescribeStackEventsOutput = self
                .invoke_json(env, "describe-stack-events", Target::stack(stack_name), extra)
                .await?;
            Ok(output
                .stack_events
                .into_iter()
                .map(|event| StackEvent {
                    logical_id: event.logical_resource_id,
                    resource_type: event.resource_type,
                    status: event.resource_status,
                    reason: event.resource_status_reason,
                    timestamp: event.timestamp,
                })
                .collect())
        })
    }

    fn describe_validation_events<'a>(
        &'a self,
        env: &'a ResolvedEnvironment,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ServiceFuture<'a, Vec<ValidationEvent>> {
        Box::pin(async move {
            let extra = vec![
                OsString::from("--stack-name"),
                OsString::from(stack_name),
                OsString::from("--change-set-name"),
                OsString::from(change_set_name),
            ];
            let output: DescribeEventsOutput = self
                .invoke_json(
                    env,
                    "describe-events",
                    Target::change_set(stack_name, change_set_name),
                    extra,
                )
                .await?;
            Ok(output
                .operation_events
                .into_iter()
                .filter(|event| event.validation_status.as_deref() == Some("FAILED"))
                .map(|event| ValidationEvent {
                    logical_id: event.logical_resource_id,
                    validation_name: event.validation_name.unwrap_or_default(),
                    status: event.validation_status.unwrap_or_default(),
                    reason: event.validation_status_reason,
                    path: event.validation_path,
                })
                .collect())
        })
    }
}

fn stack_request_args(
    operation: &str,
    request: &StackRequest,
) -> Result<Vec<OsString>, ServiceError> {
    let mut extra = vec![
        OsString::from("--stack-name"),
        OsString::from(&request.stack_name),
        OsString::from("--parameters"),
        to_json_arg(operation, &request.parameters)?,
        OsString::from("--tags"),
        to_json_arg(operation, &request.tags)?,
        OsString::from("--notification-arns"),
        to_json_arg(operation, &request.notification_arns)?,
        rollback_flag(request.disable_rollback),
    ];
    extra.extend(template_args(&request.template));
    extra.extend(capability_args());
    Ok(extra)
}
