//! Request and response shapes exchanged with the remote stack service.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::stack::Tag;

/// Status reasons the service uses for a change set that would not change
/// anything.
const NO_CHANGE_REASONS: [&str; 2] = [
    "The submitted information didn't contain changes.",
    "No updates are to be performed.",
];

/// Whether a change set creates a new stack or updates an existing one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeSetType {
    /// Creates the stack.
    Create,
    /// Updates an existing stack.
    Update,
}

impl ChangeSetType {
    /// Value expected by the remote API.
    #[must_use]
    pub const fn as_api(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
        }
    }
}

/// How a parameter is supplied to the service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParameterSetting {
    /// An explicit value.
    Value(String),
    /// Keep whatever value the stack currently has.
    UsePrevious,
}

/// One entry of the parameter list sent to the service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParameterValue {
    /// Parameter name.
    pub key: String,
    /// Supplied value or reuse marker.
    pub setting: ParameterSetting,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ApiParameter<'a> {
    parameter_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameter_value: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_previous_value: Option<bool>,
}

impl Serialize for ParameterValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let api = match &self.setting {
            ParameterSetting::Value(value) => ApiParameter {
                parameter_key: &self.key,
                parameter_value: Some(value),
                use_previous_value: None,
            },
            ParameterSetting::UsePrevious => ApiParameter {
                parameter_key: &self.key,
                parameter_value: None,
                use_previous_value: Some(true),
            },
        };
        api.serialize(serializer)
    }
}

/// Where the service reads the template from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TemplateSource {
    /// Inline template body.
    Body(String),
    /// Previously uploaded template.
    Url(String),
}

/// Request to create a change set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeSetRequest {
    /// Target stack.
    pub stack_name: String,
    /// Change-set name, unique per stack.
    pub change_set_name: String,
    /// Create or update.
    pub change_set_type: ChangeSetType,
    /// Template to deploy.
    pub template: TemplateSource,
    /// Parameter list.
    pub parameters: Vec<ParameterValue>,
    /// Stack tags.
    pub tags: Vec<Tag>,
    /// Notification targets.
    pub notification_arns: Vec<String>,
    /// Description recorded on the change set; marks engine ownership.
    pub description: String,
}

/// Request for the direct create/update stack calls.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackRequest {
    /// Target stack.
    pub stack_name: String,
    /// Template to deploy.
    pub template: TemplateSource,
    /// Parameter list.
    pub parameters: Vec<ParameterValue>,
    /// Stack tags.
    pub tags: Vec<Tag>,
    /// Notification targets.
    pub notification_arns: Vec<String>,
    /// Leave failed resources in place instead of rolling back.
    pub disable_rollback: bool,
}

macro_rules! api_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub enum $name {
            $(
                #[doc = concat!("`", $text, "`")]
                $variant,
            )+
            /// A value this engine does not recognise.
            Other(String),
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Ok(match value {
                    $($text => Self::$variant,)+
                    other => Self::Other(other.to_owned()),
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($text),)+
                    Self::Other(other) => f.write_str(other),
                }
            }
        }

        impl $name {
            /// Parses a raw API value.
            #[must_use]
            pub fn parse(value: &str) -> Self {
                match value.parse() {
                    Ok(parsed) => parsed,
                    Err(never) => match never {},
                }
            }
        }
    };
}

api_enum!(
    /// Lifecycle status of a change set.
    ChangeSetStatus {
        CreatePending => "CREATE_PENDING",
        CreateInProgress => "CREATE_IN_PROGRESS",
        CreateComplete => "CREATE_COMPLETE",
        DeletePending => "DELETE_PENDING",
        DeleteInProgress => "DELETE_IN_PROGRESS",
        DeleteComplete => "DELETE_COMPLETE",
        DeleteFailed => "DELETE_FAILED",
        Failed => "FAILED",
    }
);

api_enum!(
    /// Whether a change set can be executed.
    ExecutionStatus {
        Unavailable => "UNAVAILABLE",
        Available => "AVAILABLE",
        ExecuteInProgress => "EXECUTE_IN_PROGRESS",
        ExecuteComplete => "EXECUTE_COMPLETE",
        ExecuteFailed => "EXECUTE_FAILED",
        Obsolete => "OBSOLETE",
    }
);

api_enum!(
    /// Replacement indicator of a resource change.
    Replacement {
        True => "True",
        False => "False",
        Conditional => "Conditional",
    }
);

/// A per-resource entry of a described change set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceChange {
    /// Logical resource id.
    pub logical_id: String,
    /// Resource type.
    pub resource_type: String,
    /// Add, Modify, Remove, ...
    pub action: String,
    /// Replacement indicator.
    pub replacement: Replacement,
}

/// A described change set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeSetDescription {
    /// Change-set name.
    pub name: String,
    /// Change-set identifier.
    pub id: String,
    /// Identifier of the stack the change set belongs to.
    pub stack_id: String,
    /// Lifecycle status.
    pub status: ChangeSetStatus,
    /// Reason attached to the status.
    pub status_reason: Option<String>,
    /// Executability.
    pub execution_status: ExecutionStatus,
    /// Free-form description supplied at creation.
    pub description: Option<String>,
    /// Per-resource changes.
    pub changes: Vec<ResourceChange>,
}

impl ChangeSetDescription {
    /// The service is still computing the change set.
    #[must_use]
    pub const fn is_creating(&self) -> bool {
        matches!(
            self.status,
            ChangeSetStatus::CreatePending | ChangeSetStatus::CreateInProgress
        )
    }

    /// Creation failed only because nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.status, ChangeSetStatus::Failed)
            && self
                .status_reason
                .as_deref()
                .is_some_and(|reason| NO_CHANGE_REASONS.iter().any(|known| reason.contains(known)))
    }

    /// Creation failed for a real reason.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ChangeSetStatus::Failed) && !self.is_empty()
    }

    /// The change set can be executed now.
    #[must_use]
    pub const fn is_executable(&self) -> bool {
        matches!(self.status, ChangeSetStatus::CreateComplete)
            && matches!(self.execution_status, ExecutionStatus::Available)
    }

    /// Any resource change is an unconditional replacement.
    #[must_use]
    pub fn has_replacement(&self) -> bool {
        self.changes
            .iter()
            .any(|change| change.replacement == Replacement::True)
    }
}

/// Entry of a change-set listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeSetSummary {
    /// Change-set name.
    pub name: String,
    /// Lifecycle status.
    pub status: ChangeSetStatus,
    /// Executability.
    pub execution_status: ExecutionStatus,
    /// Free-form description supplied at creation.
    pub description: Option<String>,
}

impl ChangeSetSummary {
    /// The change set was never executed and can still be deleted.
    #[must_use]
    pub const fn is_unexecuted(&self) -> bool {
        matches!(
            self.execution_status,
            ExecutionStatus::Available | ExecutionStatus::Unavailable
        )
    }
}

/// A stack event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackEvent {
    /// Logical resource id.
    pub logical_id: String,
    /// Resource type.
    pub resource_type: String,
    /// Resource status.
    pub status: String,
    /// Reason attached to the status.
    pub reason: Option<String>,
    /// Event timestamp as reported by the service.
    pub timestamp: String,
}

impl StackEvent {
    /// The event records a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.ends_with("_FAILED")
    }
}

/// A failed early-validation check reported for a change set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationEvent {
    /// Resource the check failed for, if any.
    pub logical_id: Option<String>,
    /// Name of the validation.
    pub validation_name: String,
    /// Validation status.
    pub status: String,
    /// Failure explanation.
    pub reason: Option<String>,
    /// Template path the failure refers to.
    pub path: Option<String>,
}
