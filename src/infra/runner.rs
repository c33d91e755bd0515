//! External command execution
//!
//! Runs one external process, streams its stdout and stderr line by line to
//! caller-supplied sinks, and maps the exit code through an [`ExitPolicy`].
//!
//! Both streams are drained on their own tasks so a command that fills one
//! pipe can never block the other.

use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::config::defaults::{EXIT_INSTALL_FAILED, EXIT_POSTSCRIPT_FAILED};
use crate::error::RunError;

/// Log severity a line sink writes at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    #[default]
    Error,
}

impl Severity {
    /// Parse a user-facing log level tag
    ///
    /// Accepts INFO, WARN and ERROR in any case. Anything else maps to
    /// [`Severity::Error`] so unknown tags never hide output.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "INFO" => Self::Info,
            "WARN" | "WARNING" => Self::Warn,
            _ => Self::Error,
        }
    }

    /// Emit a line at this severity
    pub fn log(self, line: &str) {
        match self {
            Self::Debug => tracing::debug!("{line}"),
            Self::Info => tracing::info!("{line}"),
            Self::Warn => tracing::warn!("{line}"),
            Self::Error => tracing::error!("{line}"),
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// Shared buffer of captured output lines
#[derive(Debug, Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<String>>>);

impl Capture {
    /// Create an empty capture buffer
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.0.lock() {
            lines.push(line);
        }
    }

    /// All lines captured so far
    pub fn lines(&self) -> Vec<String> {
        self.0.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    /// First captured line
    ///
    /// buildah prints the container id (for `from`) or the mount path (for
    /// `mount`) as its first stdout line.
    pub fn first(&self) -> Option<String> {
        self.0
            .lock()
            .ok()
            .and_then(|lines| lines.first().cloned())
    }
}

/// Destination for the lines of one output stream
#[derive(Debug, Clone)]
pub enum LineSink {
    /// Forward each line to the log at a fixed severity
    Log(Severity),
    /// Keep each line for the caller
    Capture(Capture),
}

impl LineSink {
    /// Deliver one line
    pub fn accept(&self, line: String) {
        match self {
            Self::Log(severity) => severity.log(&line),
            Self::Capture(capture) => capture.push(line),
        }
    }
}

/// Interpretation of a process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Warning,
    Fatal,
}

/// Per-call mapping from exit code to [`Outcome`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitPolicy {
    /// 0 succeeds, everything else is fatal
    #[default]
    Strict,
    /// Package manager installs: 104 is fatal, 107 (post-install script
    /// failure) is only a warning, everything else as [`ExitPolicy::Strict`]
    PackageInstall,
}

impl ExitPolicy {
    /// Classify an exit code
    pub fn classify(self, code: i32) -> Outcome {
        match (self, code) {
            (_, 0) => Outcome::Success,
            (Self::PackageInstall, EXIT_INSTALL_FAILED) => Outcome::Fatal,
            (Self::PackageInstall, EXIT_POSTSCRIPT_FAILED) => Outcome::Warning,
            _ => Outcome::Fatal,
        }
    }

    fn warning_message(self, code: i32) -> String {
        match (self, code) {
            (Self::PackageInstall, EXIT_POSTSCRIPT_FAILED) => {
                "one or more RPM postscripts failed to run".to_string()
            }
            _ => format!("command exited with code {code}"),
        }
    }
}

/// One external command with its output routing and exit policy
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Program followed by its arguments
    pub argv: Vec<String>,
    /// Extra environment variables
    pub env: Vec<(String, String)>,
    /// Where stdout lines go
    pub stdout: LineSink,
    /// Where stderr lines go
    pub stderr: LineSink,
    /// How the exit code is interpreted
    pub policy: ExitPolicy,
}

impl Invocation {
    /// Create an invocation with the default sinks (info/error) and strict policy
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            stdout: LineSink::Log(Severity::Info),
            stderr: LineSink::Log(Severity::Error),
            policy: ExitPolicy::Strict,
        }
    }

    /// Route stdout to a sink
    #[must_use]
    pub fn stdout(mut self, sink: LineSink) -> Self {
        self.stdout = sink;
        self
    }

    /// Route stderr to a sink
    #[must_use]
    pub fn stderr(mut self, sink: LineSink) -> Self {
        self.stderr = sink;
        self
    }

    /// Set the exit policy
    #[must_use]
    pub fn policy(mut self, policy: ExitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

/// Executes invocations
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run the process to completion and return its raw exit code
    async fn exec(&self, invocation: &Invocation) -> Result<i32, RunError>;

    /// Run the process and apply the invocation's exit policy
    ///
    /// Warnings are logged and returned as `Ok` with the exit code.
    async fn run(&self, invocation: &Invocation) -> Result<i32, RunError> {
        let code = self.exec(invocation).await?;
        match invocation.policy.classify(code) {
            Outcome::Success => Ok(code),
            Outcome::Warning => {
                tracing::warn!("{}", invocation.policy.warning_message(code));
                Ok(code)
            }
            Outcome::Fatal => Err(RunError::Fatal {
                code,
                argv: invocation.argv.clone(),
            }),
        }
    }
}

/// [`Runner`] backed by real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a process runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn exec(&self, invocation: &Invocation) -> Result<i32, RunError> {
        let (program, args) = invocation
            .argv
            .split_first()
            .ok_or(RunError::EmptyCommand)?;

        tracing::debug!("Running: {invocation}");

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunError::Spawn {
                program: program.clone(),
                error: e.to_string(),
            })?;

        let io_error = |error: String| RunError::Io {
            argv: invocation.argv.clone(),
            error,
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io_error("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io_error("stderr not captured".to_string()))?;

        let stdout_task = tokio::spawn(drain(stdout, invocation.stdout.clone()));
        let stderr_task = tokio::spawn(drain(stderr, invocation.stderr.clone()));

        let status = child.wait().await.map_err(|e| io_error(e.to_string()))?;

        for task in [stdout_task, stderr_task] {
            task.await
                .map_err(|e| io_error(e.to_string()))?
                .map_err(|e| io_error(e.to_string()))?;
        }

        status.code().ok_or_else(|| RunError::Terminated {
            argv: invocation.argv.clone(),
        })
    }
}

/// Forward every line of a stream to a sink, newline stripped
async fn drain<R>(reader: R, sink: LineSink) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        sink.accept(String::from_utf8_lossy(&buf).into_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strict_policy() {
        assert_eq!(ExitPolicy::Strict.classify(0), Outcome::Success);
        assert_eq!(ExitPolicy::Strict.classify(1), Outcome::Fatal);
        assert_eq!(ExitPolicy::Strict.classify(107), Outcome::Fatal);
    }

    #[test]
    fn test_package_install_policy() {
        let policy = ExitPolicy::PackageInstall;
        assert_eq!(policy.classify(0), Outcome::Success);
        assert_eq!(policy.classify(104), Outcome::Fatal);
        assert_eq!(policy.classify(107), Outcome::Warning);
        assert_eq!(policy.classify(1), Outcome::Fatal);
    }

    #[test]
    fn test_severity_from_tag() {
        assert_eq!(Severity::from_tag("info"), Severity::Info);
        assert_eq!(Severity::from_tag("WARN"), Severity::Warn);
        assert_eq!(Severity::from_tag("Error"), Severity::Error);
        assert_eq!(Severity::from_tag("DEBUG"), Severity::Error);
        assert_eq!(Severity::default(), Severity::Error);
    }

    #[test]
    fn test_capture_sink_keeps_order() {
        let capture = Capture::new();
        let sink = LineSink::Capture(capture.clone());
        sink.accept("cid-1234".to_string());
        sink.accept("second".to_string());
        assert_eq!(capture.first().as_deref(), Some("cid-1234"));
        assert_eq!(capture.lines(), vec!["cid-1234", "second"]);
    }

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new(["dnf", "install", "curl"])
            .policy(ExitPolicy::PackageInstall)
            .env("https_proxy", "http://proxy:3128");
        assert_eq!(inv.to_string(), "dnf install curl");
        assert_eq!(inv.policy, ExitPolicy::PackageInstall);
        assert_eq!(inv.env.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_argv_is_rejected() {
        let inv = Invocation::new(Vec::<String>::new());
        assert_eq!(ProcessRunner.exec(&inv).await, Err(RunError::EmptyCommand));
    }

    proptest! {
        #[test]
        fn test_policies_agree_outside_special_codes(code in any::<i32>()) {
            prop_assume!(code != EXIT_INSTALL_FAILED && code != EXIT_POSTSCRIPT_FAILED);
            prop_assert_eq!(
                ExitPolicy::Strict.classify(code),
                ExitPolicy::PackageInstall.classify(code)
            );
        }

        #[test]
        fn test_only_zero_succeeds(code in any::<i32>()) {
            let success = ExitPolicy::PackageInstall.classify(code) == Outcome::Success;
            prop_assert_eq!(success, code == 0);
        }
    }
}
