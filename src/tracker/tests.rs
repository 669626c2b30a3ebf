//! Unit tests for the change-set tracker.

use std::time::Duration;

use super::*;
use crate::environment::Environment;
use crate::service::{ChangeSetStatus, ChangeSetSummary, ChangeSetType, ExecutionStatus, TemplateSource};
use crate::test_support::{FakeStack, FakeStackService};
use rstest::{fixture, rstest};

#[fixture]
fn env() -> ResolvedEnvironment {
    ResolvedEnvironment::bare(Environment::new("123456789012", "eu-west-1"))
}

const fn fast_poll() -> PollSettings {
    PollSettings {
        poll_interval: Duration::from_millis(1),
        change_set_timeout: Duration::from_millis(200),
        stack_timeout: Duration::from_millis(200),
    }
}

fn summary(name: &str, description: Option<&str>, execution: ExecutionStatus) -> ChangeSetSummary {
    ChangeSetSummary {
        name: name.to_owned(),
        status: ChangeSetStatus::CreateComplete,
        execution_status: execution,
        description: description.map(str::to_owned),
    }
}

fn request(name: &str) -> ChangeSetRequest {
    ChangeSetRequest {
        stack_name: String::from("app"),
        change_set_name: name.to_owned(),
        change_set_type: ChangeSetType::Create,
        template: TemplateSource::Body(String::from(r#"{"Resources":{}}"#)),
        parameters: Vec::new(),
        tags: Vec::new(),
        notification_arns: Vec::new(),
        description: owned_description("app"),
    }
}

#[rstest]
#[tokio::test]
async fn cleanup_only_removes_owned_unexecuted_sets(env: ResolvedEnvironment) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::new("app", "UPDATE_COMPLETE"));
    let owned = owned_description("app");
    service.insert_change_set("app", &summary("ours", Some(&owned), ExecutionStatus::Available));
    service.insert_change_set("app", &summary("theirs", Some("manual review"), ExecutionStatus::Available));
    service.insert_change_set("app", &summary("done", Some(&owned), ExecutionStatus::ExecuteComplete));

    let tracker = ChangeTracker::new(&service, &env, "app", fast_poll());
    let deleted = tracker.cleanup_owned("next").await.expect("cleanup");

    assert_eq!(deleted, 1);
    assert_eq!(service.change_set_names("app"), vec![String::from("done"), String::from("theirs")]);
}

#[rstest]
#[tokio::test]
async fn cleanup_removes_same_named_set(env: ResolvedEnvironment) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::new("app", "UPDATE_COMPLETE"));
    service.insert_change_set("app", &summary("release", None, ExecutionStatus::Available));

    let tracker = ChangeTracker::new(&service, &env, "app", fast_poll());
    let deleted = tracker.cleanup_owned("release").await.expect("cleanup");

    assert_eq!(deleted, 1);
    assert!(service.change_set_names("app").is_empty());
}

#[rstest]
#[tokio::test]
async fn cleanup_on_absent_stack_is_a_no_op(env: ResolvedEnvironment) {
    let service = FakeStackService::new();
    service.fail_next(
        "list_change_sets",
        ServiceError::StackNotFound {
            stack: String::from("app"),
        },
    );

    let tracker = ChangeTracker::new(&service, &env, "app", fast_poll());
    assert_eq!(tracker.cleanup_owned("next").await, Ok(0));
}

#[rstest]
#[tokio::test]
async fn create_polls_until_change_set_is_computed(env: ResolvedEnvironment) {
    let service = FakeStackService::new();
    service.set_creating_polls(2);

    let tracker = ChangeTracker::new(&service, &env, "app", fast_poll());
    let described = tracker.create(&request("cs")).await.expect("create");

    assert!(described.is_executable());
    assert_eq!(service.count("describe_change_set"), 3);
}

#[rstest]
#[tokio::test]
async fn change_set_polling_times_out(env: ResolvedEnvironment) {
    let service = FakeStackService::new();
    service.set_creating_polls(u32::MAX);
    let poll = PollSettings {
        change_set_timeout: Duration::from_millis(5),
        ..fast_poll()
    };

    let tracker = ChangeTracker::new(&service, &env, "app", poll);
    let err = tracker.create(&request("cs")).await.expect_err("should time out");

    assert!(matches!(err, ServiceError::Timeout { .. }));
}

#[rstest]
#[tokio::test]
async fn wait_for_stack_skips_in_progress_statuses(env: ResolvedEnvironment) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::new("app", "UPDATE_COMPLETE"));
    service.queue_statuses("app", &["UPDATE_IN_PROGRESS", "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS", "UPDATE_COMPLETE"]);

    let tracker = ChangeTracker::new(&service, &env, "app", fast_poll());
    let settled = tracker
        .wait_for_stack()
        .await
        .expect("wait")
        .expect("stack exists");

    assert_eq!(settled.status.name(), "UPDATE_COMPLETE");
    assert_eq!(service.count("describe_stack"), 3);
}

#[rstest]
#[tokio::test]
async fn unrepresentable_timeouts_never_expire(env: ResolvedEnvironment) {
    let poll = PollSettings {
        change_set_timeout: Duration::MAX,
        stack_timeout: Duration::MAX,
        ..fast_poll()
    };
    let deployed = FakeStackService::new();
    deployed.insert_stack("app", FakeStack::new("app", "UPDATE_COMPLETE"));
    deployed.queue_statuses("app", &["UPDATE_IN_PROGRESS", "UPDATE_COMPLETE"]);
    let fresh = FakeStackService::new();
    fresh.set_creating_polls(1);

    let settled = ChangeTracker::new(&deployed, &env, "app", poll)
        .wait_for_stack()
        .await
        .expect("wait")
        .expect("stack exists");
    let described = ChangeTracker::new(&fresh, &env, "app", poll)
        .create(&request("cs"))
        .await
        .expect("create");

    assert_eq!(settled.status.name(), "UPDATE_COMPLETE");
    assert!(described.is_executable());
}

#[rstest]
fn deadlines_expire_once_the_timeout_elapses() {
    assert!(Deadline::after(Duration::ZERO).has_passed());
    assert!(!Deadline::after(Duration::from_secs(3600)).has_passed());
    assert!(!Deadline::after(Duration::MAX).has_passed());
}

#[rstest]
#[tokio::test]
async fn delete_stack_waits_until_gone(env: ResolvedEnvironment) {
    let service = FakeStackService::new();
    service.insert_stack("app", FakeStack::new("app", "ROLLBACK_COMPLETE"));

    let tracker = ChangeTracker::new(&service, &env, "app", fast_poll());
    tracker.delete_stack().await.expect("delete");

    assert!(service.stack("app").is_none());
}

#[rstest]
#[tokio::test]
async fn deleting_a_missing_change_set_succeeds(env: ResolvedEnvironment) {
    let service = FakeStackService::new();
    let tracker = ChangeTracker::new(&service, &env, "app", fast_poll());
    assert_eq!(tracker.delete("gone").await, Ok(()));
}
