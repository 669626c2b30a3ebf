//! Unit tests for the `stackdeploy` CLI binary implementation.

use super::*;
use rstest::{fixture, rstest};
use stackdeploy::{DeployOutcome, NodeError, StackReport};

fn parse_deploy(args: &[&str]) -> DeployCommand {
    let argv = ["stackdeploy", "deploy"].iter().chain(args.iter());
    match Cli::try_parse_from(argv).expect("arguments parse") {
        Cli::Deploy(command) => command,
    }
}

#[fixture]
fn config() -> DeployConfig {
    DeployConfig {
        cli_bin: String::from("aws"),
        poll_interval_secs: 5,
        change_set_timeout_secs: 600,
        stack_timeout_secs: 3600,
        stack_concurrency: 1,
        asset_build_concurrency: 1,
        asset_publish_concurrency: 8,
        validation_bootstrap_version: 30,
        outputs_file: Some(String::from("from-config.json")),
    }
}

#[rstest]
fn parameters_are_scoped_globally_or_per_stack() {
    let parsed = parse_parameters(&[
        String::from("Env=prod"),
        String::from("api:Size=3"),
        String::from("api:Url=https://x?a=b"),
    ])
    .expect("parameters parse");

    assert_eq!(
        parsed,
        BTreeMap::from([
            (
                String::from("*"),
                BTreeMap::from([(String::from("Env"), String::from("prod"))]),
            ),
            (
                String::from("api"),
                BTreeMap::from([
                    (String::from("Size"), String::from("3")),
                    (String::from("Url"), String::from("https://x?a=b")),
                ]),
            ),
        ])
    );
}

#[rstest]
#[case("Env")]
#[case("=prod")]
#[case(":Size=3")]
#[case("api:=3")]
fn malformed_parameters_are_rejected(#[case] raw: &str) {
    let err = parse_parameters(&[raw.to_owned()]).expect_err("malformed parameter");

    assert!(matches!(err, CliError::InvalidArgument(_)), "{err}");
}

#[rstest]
fn tags_require_a_key() {
    assert_eq!(
        parse_tags(&[String::from("team=infra")]).expect("tag parses"),
        [Tag::new("team", "infra")]
    );
    assert!(parse_tags(&[String::from("team")]).is_err());
}

#[rstest]
#[case(&[], DeploymentMethod::ChangeSet { name: None, execute: true })]
#[case(&["--direct"], DeploymentMethod::Direct)]
#[case(&["--change-set-name", "release", "--no-execute"], DeploymentMethod::ChangeSet { name: Some(String::from("release")), execute: false })]
#[case(&["--existing-change-set", "release"], DeploymentMethod::ExistingChangeSet { name: String::from("release"), execute: true })]
fn flags_select_the_deployment_method(#[case] args: &[&str], #[case] expected: DeploymentMethod) {
    assert_eq!(deployment_method(&parse_deploy(args)), expected);
}

#[rstest]
fn direct_conflicts_with_change_set_flags() {
    let result = Cli::try_parse_from(["stackdeploy", "deploy", "--direct", "--no-execute"]);

    assert!(result.is_err());
}

#[rstest]
fn cli_flags_override_configuration(config: DeployConfig) {
    let args = parse_deploy(&[
        "--concurrency",
        "4",
        "--no-rollback",
        "--outputs-file",
        "out.json",
        "--stack",
        "api",
        "--stack",
        "web",
    ]);

    let options = deploy_options(&args, &config).expect("options build");

    assert_eq!(options.concurrency.stack_deploy, 4);
    assert_eq!(options.concurrency.asset_publish, 8);
    assert!(!options.rollback);
    assert!(options.keep_previous_parameters);
    assert_eq!(options.outputs_file, Some(Utf8PathBuf::from("out.json")));
    assert_eq!(args.stacks, ["api", "web"]);
}

#[rstest]
fn configuration_supplies_the_outputs_file(config: DeployConfig) {
    let options = deploy_options(&parse_deploy(&[]), &config).expect("options build");

    assert_eq!(options.outputs_file, Some(Utf8PathBuf::from("from-config.json")));
    assert_eq!(options.poll, config.poll_settings());
}

#[rstest]
fn summary_lists_each_stack() {
    let summary = RunSummary {
        stacks: vec![
            StackReport {
                stack: String::from("network"),
                outcome: StackOutcome::Deployed(DeployOutcome {
                    no_op: true,
                    outputs: BTreeMap::new(),
                    stack_arn: String::from("arn:network"),
                }),
            },
            StackReport {
                stack: String::from("api"),
                outcome: StackOutcome::Failed(NodeError::UnknownSubject {
                    node: String::from("stack:api"),
                }),
            },
            StackReport {
                stack: String::from("edge"),
                outcome: StackOutcome::Skipped,
            },
        ],
        failure: None,
    };
    let mut buf = Vec::new();

    write_summary(&mut buf, &summary);

    let rendered = String::from_utf8(buf).expect("utf8");
    assert_eq!(
        rendered,
        "network: unchanged\napi: failed (node stack:api does not match any manifest entry)\nedge: skipped\n"
    );
}

#[rstest]
fn write_error_writes_cli_error() {
    let mut buf = Vec::new();
    write_error(&mut buf, &CliError::InvalidArgument(String::from("bad flag")));

    let rendered = String::from_utf8(buf).expect("utf8");
    assert!(rendered.contains("invalid argument: bad flag"), "{rendered}");
}
