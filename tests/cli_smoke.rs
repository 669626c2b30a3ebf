//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn help_lists_the_deploy_command() {
    let mut cmd = cargo_bin_cmd!("stackdeploy");
    cmd.arg("--help");

    cmd.assert().success().stdout(contains("deploy"));
}

#[test]
fn missing_manifest_is_reported() {
    let tmp = TempDir::new().expect("temp dir");
    let mut cmd = cargo_bin_cmd!("stackdeploy");
    cmd.current_dir(tmp.path());
    cmd.args(["deploy", "--manifest", "absent.json"]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("manifest error"));
}

#[test]
fn malformed_tags_are_rejected() {
    let tmp = TempDir::new().expect("temp dir");
    let mut cmd = cargo_bin_cmd!("stackdeploy");
    cmd.current_dir(tmp.path());
    cmd.args(["deploy", "--tag", "team"]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("--tag expects KEY=VALUE"));
}

#[test]
fn conflicting_methods_are_usage_errors() {
    let mut cmd = cargo_bin_cmd!("stackdeploy");
    cmd.args(["deploy", "--direct", "--existing-change-set", "release"]);

    cmd.assert().failure().code(2);
}

#[test]
fn empty_manifest_deploys_nothing() {
    let tmp = TempDir::new().expect("temp dir");
    std::fs::write(tmp.path().join("deploy.json"), r#"{"stacks": []}"#).expect("write manifest");
    let mut cmd = cargo_bin_cmd!("stackdeploy");
    cmd.current_dir(tmp.path());
    cmd.env("STACKDEPLOY_LOG", "off");
    cmd.arg("deploy");

    cmd.assert().success().stdout("");
}

#[test]
fn invalid_configuration_is_reported() {
    let tmp = TempDir::new().expect("temp dir");
    let mut cmd = cargo_bin_cmd!("stackdeploy");
    cmd.current_dir(tmp.path());
    cmd.env("STACKDEPLOY_STACK_CONCURRENCY", "0");
    cmd.arg("deploy");

    cmd.assert()
        .failure()
        .stderr(contains("STACKDEPLOY_STACK_CONCURRENCY"));
}
