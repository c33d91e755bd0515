//! Integration tests for the image-build binary
//!
//! These only exercise paths that fail before any container tool runs.

mod common;

use common::{TestProject, SAMPLE_BASE_CONFIG};

#[test]
fn test_help() {
    let project = TestProject::new();
    let output = project.run(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--config"));
    assert!(stdout.contains("--publish-registry"));
}

#[test]
fn test_missing_config_exits_non_zero() {
    let project = TestProject::new();
    let output = project.run(&[]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does not exist"), "stderr: {stderr}");
}

#[test]
fn test_unknown_layer_type_exits_non_zero() {
    let project = TestProject::new();
    project.create_file("config.yaml", SAMPLE_BASE_CONFIG);
    let output = project.run(&["--layer-type", "kernel"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("layer_type"));
}

#[test]
fn test_s3_publishing_is_rejected() {
    let project = TestProject::new();
    project.create_file("config.yaml", SAMPLE_BASE_CONFIG);
    let output = project.run(&["--publish-s3", "http://s3.local"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("publish_s3"));
}

#[test]
fn test_invalid_ansible_verbosity() {
    let project = TestProject::new();
    project.create_file("config.yaml", SAMPLE_BASE_CONFIG);
    let output = project.run(&[
        "--layer-type",
        "ansible",
        "--pb",
        "site.yaml",
        "--ansible-verbosity",
        "7",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ansible_verbosity"));
}
