//! Unit tests for the single-stack deployment state machine.

use std::time::Duration;

use super::*;
use crate::decision::DecisionError;
use crate::digest::MAX_INLINE_TEMPLATE_BYTES;
use crate::environment::{Environment, StaticEnvironmentResources};
use crate::service::{
    ChangeSetStatus, ChangeSetSummary, ExecutionStatus, ServiceError, StackEvent,
};
use crate::stack::Tag;
use crate::test_support::{FakeStack, FakeStackService, RecordingProgress};
use rstest::{fixture, rstest};
use serde_json::json;

#[fixture]
fn env() -> ResolvedEnvironment {
    ResolvedEnvironment::bare(Environment::new("123456789012", "eu-west-1"))
}

#[fixture]
fn desired() -> StackDescriptor {
    let mut descriptor = StackDescriptor::new("app", Environment::new("123456789012", "eu-west-1"));
    descriptor.template = json!({"Resources": {"Queue": {"Type": "AWS::SQS::Queue"}}});
    descriptor.tags = vec![Tag::new("team", "infra")];
    descriptor
}

#[fixture]
fn options() -> DeployStackOptions {
    DeployStackOptions {
        poll: PollSettings {
            poll_interval: Duration::from_millis(1),
            change_set_timeout: Duration::from_millis(500),
            stack_timeout: Duration::from_millis(500),
        },
        ..DeployStackOptions::default()
    }
}

async fn deploy(
    service: &FakeStackService,
    desired: &StackDescriptor,
    env: &ResolvedEnvironment,
    options: &DeployStackOptions,
) -> Result<DeploymentAttemptResult, DeployError> {
    let environments = StaticEnvironmentResources::new();
    let progress = RecordingProgress::new();
    StackDeployer::new(service, &environments, &progress)
        .deploy(desired, env, options)
        .await
}

fn outcome(result: Result<DeploymentAttemptResult, DeployError>) -> DeployOutcome {
    match result {
        Ok(DeploymentAttemptResult::DidDeploy(outcome)) => outcome,
        other => panic!("expected a deployment, got {other:?}"),
    }
}

#[rstest]
#[case(None, false, true, ExecutionPlan::Execute { disable_rollback: false })]
#[case(None, false, false, ExecutionPlan::Execute { disable_rollback: true })]
#[case(Some("UPDATE_COMPLETE"), true, true, ExecutionPlan::Execute { disable_rollback: false })]
#[case(Some("UPDATE_COMPLETE"), true, false, ExecutionPlan::ReplacementNeedsRollback)]
#[case(Some("UPDATE_FAILED"), false, false, ExecutionPlan::Execute { disable_rollback: true })]
#[case(Some("UPDATE_FAILED"), true, false, ExecutionPlan::FailPaused(PausedReason::Replacement))]
#[case(Some("UPDATE_FAILED"), false, true, ExecutionPlan::FailPaused(PausedReason::RollbackRequested))]
#[case(Some("UPDATE_FAILED"), true, true, ExecutionPlan::FailPaused(PausedReason::Replacement))]
fn rollback_and_replacement_matrix(
    #[case] status: Option<&str>,
    #[case] replacement: bool,
    #[case] rollback: bool,
    #[case] expected: ExecutionPlan,
) {
    let current = status.map(|name| StackStatus::new(name, None));
    assert_eq!(plan_execution(current.as_ref(), replacement, rollback), expected);
}

#[rstest]
#[tokio::test]
async fn absent_stack_is_created_then_skipped(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();

    let first = outcome(deploy(&service, &desired, &env, &options).await);
    assert!(!first.no_op);
    assert_eq!(
        service.stack("app").map(|stack| stack.status),
        Some(String::from("CREATE_COMPLETE"))
    );

    let second = outcome(deploy(&service, &desired, &env, &options).await);
    assert!(second.no_op);
    assert_eq!(second.stack_arn, first.stack_arn);
    assert_eq!(service.count("create_change_set"), 1);
    assert_eq!(service.count("execute_change_set"), 1);
}

#[rstest]
#[tokio::test]
async fn failed_create_is_deleted_before_recreating(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::new("app", "ROLLBACK_COMPLETE"));

    let result = outcome(deploy(&service, &desired, &env, &options).await);

    assert!(!result.no_op);
    let calls = service.calls();
    let deleted = calls.iter().position(|call| call == "delete_stack app");
    let created = calls
        .iter()
        .position(|call| call.starts_with("create_change_set app"));
    assert!(deleted.is_some() && deleted < created, "calls: {calls:?}");
    assert_eq!(
        service.stack("app").map(|stack| stack.status),
        Some(String::from("CREATE_COMPLETE"))
    );
}

#[rstest]
#[tokio::test]
async fn stable_stack_is_updated(
    mut desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    desired.tags.push(Tag::new("env", "prod"));

    let result = outcome(deploy(&service, &desired, &env, &options).await);

    assert!(!result.no_op);
    let stack = service.stack("app").expect("stack exists");
    assert_eq!(stack.status, "UPDATE_COMPLETE");
    assert_eq!(stack.tags.len(), 2);
}

#[rstest]
#[tokio::test]
async fn empty_change_set_is_deleted_when_executing(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    let forced = DeployStackOptions {
        force: true,
        ..options
    };

    let result = outcome(deploy(&service, &desired, &env, &forced).await);

    assert!(result.no_op);
    assert!(service.change_set_names("app").is_empty());
    assert_eq!(service.count("execute_change_set"), 0);
}

#[rstest]
#[tokio::test]
async fn empty_change_set_is_kept_when_only_creating(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    let create_only = DeployStackOptions {
        method: DeploymentMethod::ChangeSet {
            name: Some(String::from("review")),
            execute: false,
        },
        ..options
    };

    let result = outcome(deploy(&service, &desired, &env, &create_only).await);

    assert!(result.no_op);
    assert_eq!(service.change_set_names("app"), vec![String::from("review")]);
}

#[rstest]
#[tokio::test]
async fn create_only_change_set_is_not_executed(
    mut desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    desired.template = json!({"Resources": {}});
    let create_only = DeployStackOptions {
        method: DeploymentMethod::ChangeSet {
            name: Some(String::from("review")),
            execute: false,
        },
        ..options
    };

    let result = outcome(deploy(&service, &desired, &env, &create_only).await);

    assert!(!result.no_op);
    assert_eq!(service.count("execute_change_set"), 0);
    assert_eq!(service.change_set_names("app"), vec![String::from("review")]);
}

#[rstest]
#[tokio::test]
async fn replacement_without_rollback_is_reported(
    mut desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    service.report_replacement("app");
    desired.template = json!({"Resources": {"Table": {"Type": "AWS::DynamoDB::Table"}}});
    let no_rollback = DeployStackOptions {
        rollback: false,
        ..options
    };

    let result = deploy(&service, &desired, &env, &no_rollback).await;

    assert_eq!(result, Ok(DeploymentAttemptResult::ReplacementRequiresRollback));
    assert!(service.change_set_names("app").is_empty());
    assert_eq!(service.count("execute_change_set"), 0);
}

#[rstest]
#[tokio::test]
async fn paused_stack_with_rollback_needs_rollback_first(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_FAILED"));

    let result = deploy(&service, &desired, &env, &options).await;

    assert_eq!(
        result,
        Ok(DeploymentAttemptResult::FailPausedNeedRollbackFirst {
            reason: PausedReason::RollbackRequested,
            status: String::from("UPDATE_FAILED"),
        })
    );
    assert_eq!(service.count("create_change_set"), 0);
}

#[rstest]
#[tokio::test]
async fn paused_stack_is_not_executed_from_existing_change_set(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_FAILED"));
    service.insert_change_set(
        "app",
        &ChangeSetSummary {
            name: String::from("approved"),
            status: ChangeSetStatus::CreateComplete,
            execution_status: ExecutionStatus::Available,
            description: None,
        },
    );
    let existing = DeployStackOptions {
        method: DeploymentMethod::ExistingChangeSet {
            name: String::from("approved"),
            execute: true,
        },
        ..options
    };

    let result = deploy(&service, &desired, &env, &existing).await;

    assert_eq!(
        result,
        Ok(DeploymentAttemptResult::FailPausedNeedRollbackFirst {
            reason: PausedReason::RollbackRequested,
            status: String::from("UPDATE_FAILED"),
        })
    );
    assert_eq!(service.count("execute_change_set"), 0);
}

#[rstest]
#[tokio::test]
async fn paused_stack_without_rollback_executes_with_rollback_disabled(
    mut desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_FAILED"));
    desired.template = json!({"Resources": {"Fixed": {"Type": "AWS::SQS::Queue"}}});
    let no_rollback = DeployStackOptions {
        rollback: false,
        ..options
    };

    let result = outcome(deploy(&service, &desired, &env, &no_rollback).await);

    assert!(!result.no_op);
    assert_eq!(service.disable_rollback_flags(), vec![true]);
}

#[rstest]
#[tokio::test]
async fn termination_protection_is_reconciled_without_template_changes(
    mut desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    desired.termination_protection = Some(true);

    let result = outcome(deploy(&service, &desired, &env, &options).await);

    assert!(result.no_op);
    assert_eq!(
        service.stack("app").map(|stack| stack.termination_protection),
        Some(true)
    );
    assert_eq!(service.count("update_termination_protection"), 1);
}

#[rstest]
#[tokio::test]
async fn failed_execution_reports_failure_events(
    mut desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    service.push_outcome("app", "UPDATE_ROLLBACK_COMPLETE");
    service.set_events(
        "app",
        vec![StackEvent {
            logical_id: String::from("Queue"),
            resource_type: String::from("AWS::SQS::Queue"),
            status: String::from("UPDATE_FAILED"),
            reason: Some(String::from("visibility timeout too large")),
            timestamp: String::from("2026-01-01T00:00:00Z"),
        }],
    );
    desired.template = json!({"Resources": {"Queue": {"Type": "AWS::SQS::Queue", "Properties": {"VisibilityTimeout": 99999}}}});

    let err = deploy(&service, &desired, &env, &options)
        .await
        .expect_err("execution should fail");

    match err {
        DeployError::StackFailed { status, message, .. } => {
            assert_eq!(status, "UPDATE_ROLLBACK_COMPLETE");
            assert!(message.contains("visibility timeout too large"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn change_set_failures_surface_the_remote_reason(
    mut desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    service.fail_next_change_set("Template format error: unresolved resource dependencies");
    desired.template = json!({"Resources": {}});

    let err = deploy(&service, &desired, &env, &options)
        .await
        .expect_err("change set should fail");

    assert!(matches!(
        err,
        DeployError::ChangeSetFailed { ref message, .. } if message.contains("Template format error")
    ));
}

#[rstest]
#[tokio::test]
async fn early_validation_failures_are_summarised(
    mut desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    service.fail_next_change_set("The following hook(s)/validation failed: [AWS::EarlyValidation::ResourceExistenceCheck]");
    service.set_validation_events(vec![crate::service::ValidationEvent {
        logical_id: Some(String::from("Bucket")),
        validation_name: String::from("ResourceExistenceCheck"),
        status: String::from("FAILED"),
        reason: Some(String::from("bucket exists")),
        path: None,
    }]);
    desired.template = json!({"Resources": {"Bucket": {"Type": "AWS::S3::Bucket"}}});

    let err = deploy(&service, &desired, &env, &options)
        .await
        .expect_err("change set should fail");

    assert!(err.to_string().contains("ResourceExistenceCheck on Bucket: bucket exists"), "{err}");
}

#[rstest]
#[tokio::test]
async fn missing_parameters_fail_before_mutating_calls(
    mut desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    desired.template = json!({"Parameters": {"Size": {"Type": "Number"}}, "Resources": {}});

    let err = deploy(&service, &desired, &env, &options)
        .await
        .expect_err("parameters are missing");

    assert!(matches!(err, DeployError::Decision(_)));
    assert_eq!(service.calls(), vec![String::from("describe_stack app")]);
}

#[rstest]
#[tokio::test]
async fn existing_change_set_errors_are_distinct(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    service.insert_change_set(
        "app",
        &ChangeSetSummary {
            name: String::from("broken"),
            status: ChangeSetStatus::Failed,
            execution_status: ExecutionStatus::Unavailable,
            description: None,
        },
    );
    let existing = |name: &str| DeployStackOptions {
        method: DeploymentMethod::ExistingChangeSet {
            name: name.to_owned(),
            execute: true,
        },
        ..options.clone()
    };

    let missing = deploy(&service, &desired, &env, &existing("absent")).await;
    assert!(matches!(missing, Err(DeployError::ChangeSetNotFound { .. })));

    let broken = deploy(&service, &desired, &env, &existing("broken")).await;
    assert!(matches!(broken, Err(DeployError::ChangeSetNotExecutable { .. })));
}

#[rstest]
#[tokio::test]
async fn existing_change_set_is_executed(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    service.insert_change_set(
        "app",
        &ChangeSetSummary {
            name: String::from("approved"),
            status: ChangeSetStatus::CreateComplete,
            execution_status: ExecutionStatus::Available,
            description: Some(String::from("reviewed by hand")),
        },
    );
    let existing = DeployStackOptions {
        method: DeploymentMethod::ExistingChangeSet {
            name: String::from("approved"),
            execute: true,
        },
        ..options
    };

    let result = outcome(deploy(&service, &desired, &env, &existing).await);

    assert!(!result.no_op);
    assert_eq!(service.count("execute_change_set"), 1);
    assert_eq!(service.count("create_change_set"), 0);
}

#[rstest]
#[tokio::test]
async fn existing_change_set_ignores_inline_template_limit(
    mut desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    service.insert_change_set(
        "app",
        &ChangeSetSummary {
            name: String::from("approved"),
            status: ChangeSetStatus::CreateComplete,
            execution_status: ExecutionStatus::Available,
            description: None,
        },
    );
    desired.template = json!({"Description": "x".repeat(MAX_INLINE_TEMPLATE_BYTES + 1)});
    let existing = DeployStackOptions {
        method: DeploymentMethod::ExistingChangeSet {
            name: String::from("approved"),
            execute: true,
        },
        ..options
    };

    let result = outcome(deploy(&service, &desired, &env, &existing).await);

    assert!(!result.no_op);
    assert_eq!(service.count("describe_change_set"), 1);
    assert_eq!(service.count("execute_change_set"), 1);
}

#[rstest]
#[tokio::test]
async fn oversized_inline_templates_are_rejected_for_new_change_sets(
    mut desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    desired.template = json!({"Description": "x".repeat(MAX_INLINE_TEMPLATE_BYTES + 1)});

    let result = deploy(&service, &desired, &env, &options).await;

    assert!(
        matches!(
            result,
            Err(DeployError::Decision(DecisionError::TemplateTooLarge { .. }))
        ),
        "{result:?}"
    );
    assert!(service.calls().is_empty());
}

#[rstest]
#[tokio::test]
async fn direct_updates_treat_no_updates_as_no_op(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    let direct = DeployStackOptions {
        method: DeploymentMethod::Direct,
        force: true,
        ..options
    };

    let result = outcome(deploy(&service, &desired, &env, &direct).await);

    assert!(result.no_op);
    assert_eq!(service.count("update_stack"), 1);
}

#[rstest]
#[tokio::test]
async fn direct_creates_absent_stacks(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    let direct = DeployStackOptions {
        method: DeploymentMethod::Direct,
        ..options
    };

    let result = outcome(deploy(&service, &desired, &env, &direct).await);

    assert!(!result.no_op);
    assert_eq!(service.count("create_stack"), 1);
    assert_eq!(service.count("create_change_set"), 0);
}

#[rstest]
#[tokio::test]
async fn waits_for_in_progress_stacks_before_acting(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::from_descriptor(&desired, "UPDATE_COMPLETE"));
    service.queue_statuses("app", &["UPDATE_IN_PROGRESS", "UPDATE_COMPLETE"]);

    let result = outcome(deploy(&service, &desired, &env, &options).await);

    assert!(result.no_op);
    assert_eq!(service.count("describe_stack"), 2);
}

#[rstest]
#[tokio::test]
async fn progress_events_follow_the_attempt(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    let environments = StaticEnvironmentResources::new();
    let progress = RecordingProgress::new();

    StackDeployer::new(&service, &environments, &progress)
        .deploy(&desired, &env, &options)
        .await
        .expect("deploy should succeed");

    let kinds: Vec<&str> = progress
        .events()
        .iter()
        .map(|event| match event {
            ProgressEvent::SkipDecided { .. } => "skip",
            ProgressEvent::ChangeSetCreated { .. } => "created",
            ProgressEvent::ExecutionStarted { .. } => "started",
            ProgressEvent::ExecutionFinished { .. } => "finished",
            ProgressEvent::RollbackStarted { .. } => "rollback",
        })
        .collect();
    assert_eq!(kinds, ["skip", "created", "started", "finished"]);
}

#[rstest]
#[tokio::test]
async fn failed_rollback_is_continued_with_orphans(env: ResolvedEnvironment, options: DeployStackOptions) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::new("app", "UPDATE_ROLLBACK_FAILED"));
    service.set_events(
        "app",
        vec![
            event("app", "UPDATE_ROLLBACK_FAILED"),
            event("Table", "UPDATE_FAILED"),
            event("Queue", "UPDATE_COMPLETE"),
            event("Queue", "UPDATE_FAILED"),
        ],
    );
    let progress = RecordingProgress::new();

    roll_back_stack(&service, &env, "app", true, options.poll, &progress)
        .await
        .expect("rollback should succeed");

    assert_eq!(service.skipped_resources(), vec![String::from("Table")]);
    assert_eq!(
        service.stack("app").map(|stack| stack.status),
        Some(String::from("UPDATE_ROLLBACK_COMPLETE"))
    );
}

#[rstest]
#[tokio::test]
async fn paused_update_is_rolled_back(env: ResolvedEnvironment, options: DeployStackOptions) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::new("app", "UPDATE_FAILED"));
    let progress = RecordingProgress::new();

    roll_back_stack(&service, &env, "app", false, options.poll, &progress)
        .await
        .expect("rollback should succeed");

    assert_eq!(service.count("rollback_stack"), 1);
    assert!(service.skipped_resources().is_empty());
}

#[rstest]
#[tokio::test]
async fn rollback_that_does_not_stabilise_fails(env: ResolvedEnvironment, options: DeployStackOptions) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::new("app", "UPDATE_FAILED"));
    service.push_outcome("app", "UPDATE_ROLLBACK_FAILED");
    let progress = RecordingProgress::new();

    let result = roll_back_stack(&service, &env, "app", false, options.poll, &progress).await;

    assert!(matches!(result, Err(DeployError::RollbackFailed { .. })));
}

#[rstest]
#[tokio::test]
async fn stable_stacks_are_not_rolled_back(env: ResolvedEnvironment, options: DeployStackOptions) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::new("app", "UPDATE_COMPLETE"));
    let progress = RecordingProgress::new();

    roll_back_stack(&service, &env, "app", false, options.poll, &progress)
        .await
        .expect("nothing to roll back");

    assert_eq!(service.count("rollback_stack"), 0);
    assert!(progress.events().is_empty());
}

#[rstest]
#[tokio::test]
async fn service_failures_name_the_stack(
    desired: StackDescriptor,
    env: ResolvedEnvironment,
    options: DeployStackOptions,
) {
    let service = FakeStackService::new();
    service.fail_next("describe_stack", ServiceError::api("describe-stacks", "throttled"));

    let err = deploy(&service, &desired, &env, &options)
        .await
        .expect_err("describe fails");

    assert_eq!(err.stack(), "app");
    assert_eq!(err.to_string(), "stack app: describe-stacks failed: throttled");
}

fn event(logical_id: &str, status: &str) -> StackEvent {
    StackEvent {
        logical_id: logical_id.to_owned(),
        resource_type: String::from("AWS::Test::Resource"),
        status: status.to_owned(),
        reason: Some(String::from("failed")),
        timestamp: String::from("2026-01-01T00:00:00Z"),
    }
}
