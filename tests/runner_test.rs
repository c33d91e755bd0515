//! Integration tests for the process runner against real child processes

use image_build::error::RunError;
use image_build::infra::runner::{Capture, ExitPolicy, Invocation, LineSink, ProcessRunner, Runner};

fn sh(script: &str) -> Invocation {
    Invocation::new(["sh", "-c", script])
}

#[tokio::test]
async fn test_streams_are_captured_separately_in_order() {
    let out = Capture::new();
    let err = Capture::new();
    let inv = sh("echo one; echo two; echo oops >&2; echo three")
        .stdout(LineSink::Capture(out.clone()))
        .stderr(LineSink::Capture(err.clone()));

    let code = ProcessRunner::new().run(&inv).await.unwrap();

    assert_eq!(code, 0);
    assert_eq!(out.lines(), vec!["one", "two", "three"]);
    assert_eq!(err.lines(), vec!["oops"]);
}

#[tokio::test]
async fn test_large_output_on_both_streams_does_not_deadlock() {
    let out = Capture::new();
    let err = Capture::new();
    let inv = sh("i=0; while [ $i -lt 20000 ]; do echo out$i; echo err$i >&2; i=$((i+1)); done")
        .stdout(LineSink::Capture(out.clone()))
        .stderr(LineSink::Capture(err.clone()));

    ProcessRunner::new().run(&inv).await.unwrap();

    assert_eq!(out.lines().len(), 20000);
    assert_eq!(err.lines().len(), 20000);
    assert_eq!(out.lines()[19999], "out19999");
}

#[tokio::test]
async fn test_exit_policies() {
    let runner = ProcessRunner::new();

    let err = runner.run(&sh("exit 104").policy(ExitPolicy::PackageInstall)).await.unwrap_err();
    assert_eq!(err.exit_code(), Some(104));

    let code = runner.run(&sh("exit 107").policy(ExitPolicy::PackageInstall)).await.unwrap();
    assert_eq!(code, 107);

    assert!(runner.run(&sh("exit 107")).await.is_err());
    assert!(runner.run(&sh("exit 3").policy(ExitPolicy::PackageInstall)).await.is_err());
}

#[tokio::test]
async fn test_no_implicit_shell() {
    let out = Capture::new();
    let inv = Invocation::new(["echo", "$HOME", "a|b"]).stdout(LineSink::Capture(out.clone()));
    ProcessRunner::new().run(&inv).await.unwrap();
    assert_eq!(out.lines(), vec!["$HOME a|b"]);
}

#[tokio::test]
async fn test_environment_is_passed() {
    let out = Capture::new();
    let inv = sh("echo $https_proxy")
        .env("https_proxy", "http://proxy:3128")
        .stdout(LineSink::Capture(out.clone()));
    ProcessRunner::new().run(&inv).await.unwrap();
    assert_eq!(out.first().as_deref(), Some("http://proxy:3128"));
}

#[tokio::test]
async fn test_missing_program() {
    let err = ProcessRunner::new()
        .run(&Invocation::new(["image-build-no-such-program"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Spawn { .. }));
}

#[tokio::test]
async fn test_invalid_utf8_is_replaced() {
    let out = Capture::new();
    let inv = sh("printf 'a\\377b\\n'").stdout(LineSink::Capture(out.clone()));
    ProcessRunner::new().run(&inv).await.unwrap();
    assert_eq!(out.lines(), vec!["a\u{FFFD}b"]);
}
