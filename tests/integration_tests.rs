mod common;

use common::{CommandOutput, TestContext};
use std::fs;

// A source that is never contacted by these tests; anything that does reach
// it fails fast with a refused connection.
const LOCAL_SOURCE: &str = "config:\n  releasepath: {rp}\n  sources:\n    - name: local\n      apitype: gitlab\n      url: http://127.0.0.1:9\nreleases:\n";

fn local_config(ctx: &TestContext, releases: &str) {
    let content = LOCAL_SOURCE.replace("{rp}", &ctx.release_path.display().to_string());
    fs::write(&ctx.config_path, format!("{}{}", content, releases))
        .expect("Failed to write config");
}

#[test]
fn test_help_and_version() {
    let ctx = TestContext::new();

    let output: CommandOutput = ctx
        .cmd()
        .arg("--help")
        .output()
        .expect("Failed to run binward")
        .into();

    output
        .assert_success()
        .assert_stdout_contains("Keeps release binaries")
        .assert_stdout_contains("Usage: binward");

    let output: CommandOutput = ctx
        .cmd()
        .arg("version")
        .output()
        .expect("Failed to run binward")
        .into();

    output.assert_success();

    let flag: CommandOutput = ctx
        .cmd()
        .arg("--version")
        .output()
        .expect("Failed to run binward")
        .into();

    flag.assert_success();
    assert_eq!(output.stdout.trim(), flag.stdout.trim());
    assert!(output.stdout.starts_with("binward "));
}

#[test]
fn test_config_get_writes_default() {
    let ctx = TestContext::new();
    assert!(!ctx.config_path.exists());

    let output: CommandOutput = ctx
        .cmd()
        .args(["config", "get"])
        .output()
        .expect("Failed to run binward")
        .into();

    output
        .assert_success()
        .assert_stdout_contains("releasepath:")
        .assert_stdout_contains("github.com");
    assert!(ctx.config_path.is_file());

    let _: serde_yaml::Value = serde_yaml::from_str(&output.stdout).expect("Output was not valid YAML");
}

#[test]
fn test_config_flag_overrides_env() {
    let ctx = TestContext::new();
    let other = ctx.temp_dir.path().join("other.yaml");

    ctx.cmd()
        .args(["--config", other.to_str().unwrap(), "config", "get"])
        .output()
        .expect("Failed to run binward");

    assert!(other.is_file());
    assert!(!ctx.config_path.exists());
}

#[test]
fn test_sync_without_releases() {
    let ctx = TestContext::new();
    ctx.write_config("  []\n");

    let output: CommandOutput = ctx
        .cmd()
        .arg("sync")
        .output()
        .expect("Failed to run binward")
        .into();

    output
        .assert_success()
        .assert_stdout_contains("No releases configured");
}

#[test]
fn test_sync_reports_excluded_release() {
    let ctx = TestContext::new();
    local_config(
        &ctx,
        "  - repo: org/tool\n    source: local\n    supportedos: [plan9]\n",
    );

    let output: CommandOutput = ctx
        .cmd()
        .arg("sync")
        .output()
        .expect("Failed to run binward")
        .into();

    output
        .assert_success()
        .assert_stdout_contains("1 release(s)")
        .assert_stdout_contains("org/tool");
    assert!(!ctx.release_path.join("repos").exists());
}

#[test]
fn test_sync_rejects_unknown_source() {
    let ctx = TestContext::new();
    local_config(&ctx, "  - repo: org/tool\n    source: nowhere\n");

    let output: CommandOutput = ctx
        .cmd()
        .arg("sync")
        .output()
        .expect("Failed to run binward")
        .into();

    output
        .assert_failure()
        .assert_stderr_contains("Unknown source 'nowhere'");
}

#[test]
fn test_sync_rejects_conflicting_modes() {
    let ctx = TestContext::new();
    local_config(
        &ctx,
        "  - repo: org/tool\n    source: local\n    postonly: true\n    downloadonly: true\n",
    );

    let output: CommandOutput = ctx
        .cmd()
        .arg("sync")
        .output()
        .expect("Failed to run binward")
        .into();

    output.assert_failure().assert_stderr_contains("cannot both be set");
}

#[test]
fn test_invalid_config_is_fatal() {
    let ctx = TestContext::new();
    fs::write(&ctx.config_path, "releases: [unclosed\n").unwrap();

    let output: CommandOutput = ctx
        .cmd()
        .arg("sync")
        .output()
        .expect("Failed to run binward")
        .into();

    output
        .assert_failure()
        .assert_stderr_contains("Could not parse config file");
}

#[test]
fn test_config_edit_requires_editor() {
    let ctx = TestContext::new();

    let output: CommandOutput = ctx
        .cmd()
        .env_remove("VISUAL")
        .env_remove("EDITOR")
        .args(["config", "edit"])
        .output()
        .expect("Failed to run binward")
        .into();
    output.assert_failure().assert_stderr_contains("EDITOR");

    let output: CommandOutput = ctx
        .cmd()
        .env_remove("VISUAL")
        .env("EDITOR", "true")
        .args(["config", "edit"])
        .output()
        .expect("Failed to run binward")
        .into();
    output.assert_success();
    assert!(ctx.config_path.is_file());
}

#[test]
fn test_get_fails_when_source_unreachable() {
    let ctx = TestContext::new();
    local_config(&ctx, "  []\n");

    let output: CommandOutput = ctx
        .cmd()
        .args([
            "get",
            "org/tool",
            "--source",
            "local",
            "--dir",
            ctx.temp_dir.path().join("out").to_str().unwrap(),
        ])
        .output()
        .expect("Failed to run binward")
        .into();

    output.assert_failure();
    assert!(!ctx.temp_dir.path().join("out").exists());
}
