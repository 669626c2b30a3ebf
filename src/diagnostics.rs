//! Human-readable explanations for failed change sets and stacks.
//!
//! Both helpers are best effort: when the service cannot supply detail they
//! fall back to the raw remote message instead of failing.

use tracing::debug;

use crate::environment::{EnvironmentResources, ResolvedEnvironment};
use crate::service::{StackService, ValidationEvent};

/// Marker the service puts in status reasons of early-validation failures.
pub const EARLY_VALIDATION_MARKER: &str = "AWS::EarlyValidation";

/// Default minimum bootstrap version that grants access to validation
/// events.
pub const DEFAULT_VALIDATION_BOOTSTRAP_VERSION: u32 = 30;

/// Number of failure events quoted in stack failure messages.
const MAX_FAILURE_EVENTS: usize = 5;

/// Whether a change-set failure reason comes from early validation.
#[must_use]
pub fn is_early_validation_failure(reason: &str) -> bool {
    reason.contains(EARLY_VALIDATION_MARKER)
}

/// Summarises early-validation failures of a change set.
pub struct EarlyValidationReporter<'a, S: ?Sized, E: ?Sized> {
    service: &'a S,
    environments: &'a E,
    min_bootstrap_version: u32,
}

impl<'a, S, E> EarlyValidationReporter<'a, S, E>
where
    S: StackService + ?Sized,
    E: EnvironmentResources + ?Sized,
{
    /// Creates a reporter.
    #[must_use]
    pub const fn new(service: &'a S, environments: &'a E, min_bootstrap_version: u32) -> Self {
        Self {
            service,
            environments,
            min_bootstrap_version,
        }
    }

    /// Builds the message reported for a change set that failed early
    /// validation with `raw_error`.
    pub async fn report(
        &self,
        env: &ResolvedEnvironment,
        stack: &str,
        change_set: &str,
        raw_error: &str,
    ) -> String {
        let mut message = match self
            .service
            .describe_validation_events(env, stack, change_set)
            .await
        {
            Ok(events) if !events.is_empty() => summarise_validation(stack, &events),
            Ok(_) => format!("stack {stack} failed early validation: {raw_error}"),
            Err(err) => {
                debug!(stack, change_set, error = %err, "validation events unavailable");
                format!(
                    "stack {stack} failed early validation checks and the details could not be retrieved ({err}); remote error: {raw_error}"
                )
            }
        };

        match self.environments.bootstrap_version(&env.environment).await {
            Ok(Some(version)) if version < self.min_bootstrap_version => {
                message.push_str(&format!(
                    "\nenvironment {} is bootstrapped at version {version}; re-bootstrap to version {} or later for per-resource validation details",
                    env.environment, self.min_bootstrap_version
                ));
            }
            Ok(_) => {}
            Err(err) => {
                debug!(stack, error = %err, "bootstrap version lookup failed");
            }
        }
        message
    }
}

fn summarise_validation(stack: &str, events: &[ValidationEvent]) -> String {
    let mut message = format!("stack {stack} failed early validation:");
    for event in events {
        message.push_str(&format!("\n  - {}", event.validation_name));
        if let Some(logical_id) = &event.logical_id {
            message.push_str(&format!(" on {logical_id}"));
        }
        if let Some(path) = &event.path {
            message.push_str(&format!(" at {path}"));
        }
        if let Some(reason) = &event.reason {
            message.push_str(&format!(": {reason}"));
        }
    }
    message
}

/// Appends the reasons of the most recent failure events of `stack` to
/// `message`. Event lookup failures leave the message unchanged.
pub async fn with_recent_failures<S>(
    service: &S,
    env: &ResolvedEnvironment,
    stack: &str,
    message: String,
) -> String
where
    S: StackService + ?Sized,
{
    let events = match service.describe_stack_events(env, stack).await {
        Ok(events) => events,
        Err(err) => {
            debug!(stack, error = %err, "stack events unavailable");
            return message;
        }
    };
    let failures: Vec<String> = events
        .iter()
        .filter(|event| event.is_failure())
        .filter_map(|event| {
            event
                .reason
                .as_ref()
                .map(|reason| format!("{} ({}): {reason}", event.logical_id, event.status))
        })
        .take(MAX_FAILURE_EVENTS)
        .collect();
    if failures.is_empty() {
        return message;
    }
    let mut augmented = message;
    augmented.push_str("\nrecent failures:");
    for failure in failures {
        augmented.push_str(&format!("\n  - {failure}"));
    }
    augmented
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Environment, EnvironmentFacts, StaticEnvironmentResources};
    use crate::service::{ServiceError, StackEvent};
    use crate::test_support::FakeStackService;
    use rstest::{fixture, rstest};

    #[fixture]
    fn env() -> ResolvedEnvironment {
        ResolvedEnvironment::bare(Environment::new("123456789012", "eu-west-1"))
    }

    fn environments(version: Option<u32>) -> StaticEnvironmentResources {
        StaticEnvironmentResources::new().with_facts(
            Environment::new("123456789012", "eu-west-1"),
            EnvironmentFacts {
                bootstrap_version: version,
                ..EnvironmentFacts::default()
            },
        )
    }

    #[rstest]
    fn detects_early_validation_reasons() {
        assert!(is_early_validation_failure(
            "The following hook(s)/validation failed: [AWS::EarlyValidation::ResourceExistenceCheck]"
        ));
        assert!(!is_early_validation_failure("Template format error"));
    }

    #[rstest]
    #[tokio::test]
    async fn summarises_validation_events(env: ResolvedEnvironment) {
        let service = FakeStackService::new();
        service.set_validation_events(vec![ValidationEvent {
            logical_id: Some(String::from("Bucket")),
            validation_name: String::from("ResourceExistenceCheck"),
            status: String::from("FAILED"),
            reason: Some(String::from("bucket already exists")),
            path: Some(String::from("/Resources/Bucket")),
        }]);
        let resources = environments(Some(31));
        let reporter = EarlyValidationReporter::new(&service, &resources, 30);

        let message = reporter.report(&env, "app", "cs", "raw").await;

        assert_eq!(
            message,
            "stack app failed early validation:\n  - ResourceExistenceCheck on Bucket at /Resources/Bucket: bucket already exists"
        );
    }

    #[rstest]
    #[tokio::test]
    async fn degrades_when_events_cannot_be_read(env: ResolvedEnvironment) {
        let service = FakeStackService::new();
        service.fail_next(
            "describe_validation_events",
            ServiceError::api("describe-events", "AccessDenied"),
        );
        let resources = environments(Some(20));
        let reporter = EarlyValidationReporter::new(&service, &resources, 30);

        let message = reporter.report(&env, "app", "cs", "hook failed").await;

        assert!(message.contains("could not be retrieved"));
        assert!(message.contains("remote error: hook failed"));
        assert!(message.contains("bootstrapped at version 20"));
    }

    #[rstest]
    #[tokio::test]
    async fn appends_recent_failure_events(env: ResolvedEnvironment) {
        let service = FakeStackService::new();
        service.set_events(
            "app",
            vec![
                StackEvent {
                    logical_id: String::from("Queue"),
                    resource_type: String::from("AWS::SQS::Queue"),
                    status: String::from("CREATE_FAILED"),
                    reason: Some(String::from("quota exceeded")),
                    timestamp: String::from("2026-01-01T00:00:00Z"),
                },
                StackEvent {
                    logical_id: String::from("Topic"),
                    resource_type: String::from("AWS::SNS::Topic"),
                    status: String::from("CREATE_COMPLETE"),
                    reason: None,
                    timestamp: String::from("2026-01-01T00:00:00Z"),
                },
            ],
        );

        let message = with_recent_failures(&service, &env, "app", String::from("failed")).await;

        assert_eq!(
            message,
            "failed\nrecent failures:\n  - Queue (CREATE_FAILED): quota exceeded"
        );
    }

    #[rstest]
    #[tokio::test]
    async fn tolerates_event_lookup_failure(env: ResolvedEnvironment) {
        let service = FakeStackService::new();
        service.fail_next(
            "describe_stack_events",
            ServiceError::api("describe-stack-events", "throttled"),
        );

        let message = with_recent_failures(&service, &env, "app", String::from("failed")).await;

        assert_eq!(message, "failed");
    }
}
