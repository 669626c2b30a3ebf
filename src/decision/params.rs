//! Template parameter resolution.
//!
//! Every declared parameter ends up with an explicit value, a "use previous
//! value" marker, or the template default; anything else is reported before
//! the service is asked to change the stack.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::DecisionError;
use crate::service::{ParameterSetting, ParameterValue};

const SSM_PARAMETER_TYPE_PREFIX: &str = "AWS::SSM::Parameter::";

/// A parameter declared in a template's `Parameters` section.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TemplateParameter {
    /// Parameter name.
    pub name: String,
    /// Declared type, for example `String`.
    pub kind: String,
    /// Declared default rendered as a string.
    pub default: Option<String>,
    /// Whether the service masks the deployed value.
    pub no_echo: bool,
}

impl TemplateParameter {
    fn from_declaration(name: &str, declaration: &Value) -> Self {
        let default = declaration.get("Default").map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        });
        let no_echo = match declaration.get("NoEcho") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(text)) => text.eq_ignore_ascii_case("true"),
            _ => false,
        };
        Self {
            name: name.to_owned(),
            kind: declaration
                .get("Type")
                .and_then(Value::as_str)
                .unwrap_or("String")
                .to_owned(),
            default,
            no_echo,
        }
    }

    /// Value is resolved from the parameter store at deploy time.
    #[must_use]
    pub fn is_ssm(&self) -> bool {
        self.kind.starts_with(SSM_PARAMETER_TYPE_PREFIX)
    }
}

/// Lists the parameters declared by `template`.
#[must_use]
pub fn template_parameters(template: &Value) -> Vec<TemplateParameter> {
    template
        .get("Parameters")
        .and_then(Value::as_object)
        .map(|declared| {
            declared
                .iter()
                .map(|(name, declaration)| TemplateParameter::from_declaration(name, declaration))
                .collect()
        })
        .unwrap_or_default()
}

/// Parameters resolved against a template and the deployed values.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedParameters {
    declared: Vec<TemplateParameter>,
    api: Vec<ParameterValue>,
    values: BTreeMap<String, String>,
    explicit: BTreeSet<String>,
}

impl ResolvedParameters {
    /// Resolves `explicit` values against the parameters `template`
    /// declares.
    ///
    /// With `keep_previous`, parameters that are not supplied reuse the
    /// value in `previous`. Explicit values for undeclared parameters are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DecisionError::MissingParameters`] naming every declared
    /// parameter that ends up with neither a value nor a default.
    pub fn resolve(
        stack: &str,
        template: &Value,
        explicit: &BTreeMap<String, String>,
        previous: Option<&BTreeMap<String, String>>,
        keep_previous: bool,
    ) -> Result<Self, DecisionError> {
        let declared = template_parameters(template);
        let mut api = Vec::new();
        let mut values = BTreeMap::new();
        let mut supplied = BTreeSet::new();
        let mut missing = Vec::new();

        for param in &declared {
            let reusable = previous
                .filter(|_| keep_previous)
                .and_then(|found| found.get(&param.name));
            match (explicit.get(&param.name), reusable, &param.default) {
                (Some(value), _, _) => {
                    api.push(ParameterValue {
                        key: param.name.clone(),
                        setting: ParameterSetting::Value(value.clone()),
                    });
                    values.insert(param.name.clone(), value.clone());
                    supplied.insert(param.name.clone());
                }
                (None, Some(previous_value), _) => {
                    api.push(ParameterValue {
                        key: param.name.clone(),
                        setting: ParameterSetting::UsePrevious,
                    });
                    values.insert(param.name.clone(), previous_value.clone());
                }
                (None, None, Some(default)) => {
                    values.insert(param.name.clone(), default.clone());
                }
                (None, None, None) => missing.push(param.name.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(DecisionError::MissingParameters {
                stack: stack.to_owned(),
                names: missing,
            });
        }

        Ok(Self {
            declared,
            api,
            values,
            explicit: supplied,
        })
    }

    /// Parameter list sent to the service.
    #[must_use]
    pub fn api_parameters(&self) -> &[ParameterValue] {
        &self.api
    }

    /// Effective value of every declared parameter.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Explains why deploying these parameters would change `current`, or
    /// `None` when every value is already deployed.
    #[must_use]
    pub fn change_reason(&self, current: &BTreeMap<String, String>) -> Option<&'static str> {
        if self.declared.iter().any(TemplateParameter::is_ssm) {
            return Some("parameters are read from the parameter store and may have changed");
        }
        if self
            .declared
            .iter()
            .any(|param| param.no_echo && self.explicit.contains(&param.name))
        {
            return Some("a masked parameter was supplied explicitly");
        }
        let changed_or_removed = current
            .iter()
            .any(|(key, value)| self.values.get(key) != Some(value));
        let added = self.values.keys().any(|key| !current.contains_key(key));
        (changed_or_removed || added).then_some("parameters have changed")
    }
}
