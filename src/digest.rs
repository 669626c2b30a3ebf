//! Identity helpers: canonical template digests, change-set names and
//! notification target validation.

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Largest template body the service accepts inline.
pub const MAX_INLINE_TEMPLATE_BYTES: usize = 51_200;

/// Prefix of change-set names generated by this engine.
pub const CHANGE_SET_NAME_PREFIX: &str = "stackdeploy-";

/// Renders `value` as compact JSON with object keys sorted at every level.
///
/// `serde_json` is built without `preserve_order`, so its maps are ordered
/// by key.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    value.to_string()
}

/// SHA-256 hex digest of the canonical form of a template.
#[must_use]
pub fn template_digest(template: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(template).as_bytes());
    hex::encode(hasher.finalize())
}

/// Generates a change-set name that will not collide with earlier attempts.
#[must_use]
pub fn generate_change_set_name() -> String {
    format!("{CHANGE_SET_NAME_PREFIX}{}", Uuid::new_v4().simple())
}

/// Checks a notification target identifier has the shape of a topic ARN
/// (`arn:<partition>:sns:<region>:<account>:<topic>`).
#[must_use]
pub fn is_valid_notification_arn(arn: &str) -> bool {
    let parts: Vec<&str> = arn.split(':').collect();
    let [prefix, partition, service, region, account, topic] = parts.as_slice() else {
        return false;
    };
    *prefix == "arn"
        && !partition.is_empty()
        && *service == "sns"
        && !region.is_empty()
        && !account.is_empty()
        && account.chars().all(|ch| ch.is_ascii_digit())
        && !topic.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn canonical_json_ignores_key_order() {
        let lhs = json!({"Resources": {"B": {"Type": "x"}, "A": {"Type": "y"}}, "Outputs": {}});
        let rhs = json!({"Outputs": {}, "Resources": {"A": {"Type": "y"}, "B": {"Type": "x"}}});
        assert_eq!(canonical_json(&lhs), canonical_json(&rhs));
        assert_eq!(template_digest(&lhs), template_digest(&rhs));
    }

    #[rstest]
    fn canonical_json_keeps_array_order() {
        let lhs = json!({"List": [1, 2]});
        let rhs = json!({"List": [2, 1]});
        assert_ne!(template_digest(&lhs), template_digest(&rhs));
    }

    #[rstest]
    fn canonical_json_renders_compact_form() {
        let value = json!({"b": [true, null], "a": "x\"y"});
        assert_eq!(canonical_json(&value), r#"{"a":"x\"y","b":[true,null]}"#);
    }

    #[rstest]
    fn generated_names_are_unique_and_prefixed() {
        let first = generate_change_set_name();
        let second = generate_change_set_name();
        assert!(first.starts_with(CHANGE_SET_NAME_PREFIX));
        assert_ne!(first, second);
    }

    #[rstest]
    #[case("arn:aws:sns:eu-west-1:123456789012:alerts", true)]
    #[case("arn:aws-cn:sns:cn-north-1:123456789012:alerts", true)]
    #[case("arn:aws:sqs:eu-west-1:123456789012:queue", false)]
    #[case("arn:aws:sns:eu-west-1:account:alerts", false)]
    #[case("alerts", false)]
    fn notification_arn_validation(#[case] arn: &str, #[case] expected: bool) {
        assert_eq!(is_valid_notification_arn(arn), expected);
    }
}
