//! Target environments and the per-environment facts injected into the engine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::service::{ServiceError, ServiceFuture};

/// Account and region a stack is deployed into.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Environment {
    /// Account identifier.
    pub account: String,
    /// Region name (for example `eu-west-1`).
    pub region: String,
}

impl Environment {
    /// Creates an environment.
    #[must_use]
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aws://{}/{}", self.account, self.region)
    }
}

/// Everything a remote call needs to act on one stack's environment.
///
/// Values are resolved once per stack before the deployer runs; nothing in
/// the engine looks credentials or roles up on its own.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedEnvironment {
    /// Target environment.
    pub environment: Environment,
    /// Named credential profile handed to the provider CLI.
    pub profile: Option<String>,
    /// Role the remote service assumes while applying the stack.
    pub execution_role_arn: Option<String>,
}

impl ResolvedEnvironment {
    /// Resolves an environment with no profile or execution role.
    #[must_use]
    pub const fn bare(environment: Environment) -> Self {
        Self {
            environment,
            profile: None,
            execution_role_arn: None,
        }
    }
}

/// Cached facts about a bootstrapped environment.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct EnvironmentFacts {
    /// Version of the bootstrap resources deployed in the environment.
    #[serde(default)]
    pub bootstrap_version: Option<u32>,
    /// Default execution role for stacks in this environment.
    #[serde(default)]
    pub execution_role_arn: Option<String>,
    /// Credential profile used to reach the environment.
    #[serde(default)]
    pub profile: Option<String>,
}

/// Source of per-environment facts.
pub trait EnvironmentResources: Send + Sync {
    /// Looks up the bootstrap version, `None` when the environment is not
    /// bootstrapped or the version is unknown.
    fn bootstrap_version<'a>(&'a self, environment: &'a Environment)
    -> ServiceFuture<'a, Option<u32>>;

    /// Resolves the profile and execution role used for `environment`,
    /// preferring `role_override` when supplied.
    fn resolve(&self, environment: &Environment, role_override: Option<&str>)
    -> ResolvedEnvironment;
}

/// Environment facts supplied up front, typically from the deployment
/// manifest.
#[derive(Clone, Debug, Default)]
pub struct StaticEnvironmentResources {
    facts: BTreeMap<Environment, EnvironmentFacts>,
}

impl StaticEnvironmentResources {
    /// Creates an empty fact store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            facts: BTreeMap::new(),
        }
    }

    /// Records facts for an environment.
    #[must_use]
    pub fn with_facts(mut self, environment: Environment, facts: EnvironmentFacts) -> Self {
        self.facts.insert(environment, facts);
        self
    }
}

impl EnvironmentResources for StaticEnvironmentResources {
    fn bootstrap_version<'a>(
        &'a self,
        environment: &'a Environment,
    ) -> ServiceFuture<'a, Option<u32>> {
        Box::pin(async move {
            Ok::<_, ServiceError>(
                self.facts
                    .get(environment)
                    .and_then(|facts| facts.bootstrap_version),
            )
        })
    }

    fn resolve(
        &self,
        environment: &Environment,
        role_override: Option<&str>,
    ) -> ResolvedEnvironment {
        let facts = self.facts.get(environment);
        ResolvedEnvironment {
            environment: environment.clone(),
            profile: facts.and_then(|found| found.profile.clone()),
            execution_role_arn: role_override
                .map(str::to_owned)
                .or_else(|| facts.and_then(|found| found.execution_role_arn.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn resolve_prefers_role_override() {
        let env = Environment::new("123456789012", "eu-west-1");
        let resources = StaticEnvironmentResources::new().with_facts(
            env.clone(),
            EnvironmentFacts {
                bootstrap_version: Some(21),
                execution_role_arn: Some(String::from("arn:aws:iam::123456789012:role/exec")),
                profile: Some(String::from("dev")),
            },
        );

        let resolved = resources.resolve(&env, Some("arn:aws:iam::123456789012:role/override"));
        assert_eq!(
            resolved.execution_role_arn.as_deref(),
            Some("arn:aws:iam::123456789012:role/override")
        );
        assert_eq!(resolved.profile.as_deref(), Some("dev"));
    }

    #[tokio::test]
    async fn bootstrap_version_is_none_for_unknown_environment() {
        let resources = StaticEnvironmentResources::new();
        let env = Environment::new("1", "us-east-1");
        let version = resources
            .bootstrap_version(&env)
            .await
            .expect("lookup should succeed");
        assert_eq!(version, None);
    }

    #[rstest]
    fn environment_display_uses_uri_form() {
        assert_eq!(
            Environment::new("1", "us-east-1").to_string(),
            "aws://1/us-east-1"
        );
    }
}
