//! buildah container tool
//!
//! Thin wrappers around the buildah sub-commands the pipeline and publisher
//! use. Every call goes through a [`Runner`], so the whole tool can be
//! scripted in tests.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};

use crate::config::defaults::{CONTAINER_TOOL, SCRATCH_PARENT};
use crate::error::RunError;
use crate::infra::runner::{Capture, Invocation, LineSink, Runner, Severity};

/// A live build container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Identifier printed by `buildah from`
    pub id: String,
    /// Host path of the mounted root filesystem, scratch builds only
    pub mount: Option<PathBuf>,
    /// Image the container was created from
    pub parent: String,
    /// When the container was created
    pub created: DateTime<Local>,
}

impl ContainerHandle {
    /// Whether the container started from the empty base image
    pub fn is_scratch(&self) -> bool {
        self.parent == SCRATCH_PARENT
    }
}

/// buildah invocations
#[derive(Clone)]
pub struct Buildah {
    runner: Arc<dyn Runner>,
}

impl std::fmt::Debug for Buildah {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buildah").finish_non_exhaustive()
    }
}

impl Buildah {
    /// Create a wrapper using the given runner
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self { runner }
    }

    /// `buildah from [pull opts] --name <name> <parent>`
    pub async fn from_image(
        &self,
        parent: &str,
        name: &str,
        pull_opts: &[String],
    ) -> Result<ContainerHandle, RunError> {
        let mut argv = vec![CONTAINER_TOOL.to_string(), "from".to_string()];
        argv.extend(pull_opts.iter().cloned());
        argv.extend(["--name".to_string(), name.to_string(), parent.to_string()]);

        let id = self.first_line(argv).await?;
        Ok(ContainerHandle {
            id,
            mount: None,
            parent: parent.to_string(),
            created: Local::now(),
        })
    }

    /// `buildah mount <container>`
    pub async fn mount(&self, container: &str) -> Result<PathBuf, RunError> {
        let argv = vec![
            CONTAINER_TOOL.to_string(),
            "mount".to_string(),
            container.to_string(),
        ];
        self.first_line(argv).await.map(PathBuf::from)
    }

    /// `buildah rm <container>`
    pub async fn remove(&self, container: &str) -> Result<(), RunError> {
        self.quiet([CONTAINER_TOOL, "rm", container]).await
    }

    /// `buildah rmi <image>`
    pub async fn remove_image(&self, image: &str) -> Result<(), RunError> {
        self.quiet([CONTAINER_TOOL, "rmi", image]).await
    }

    /// `buildah config --label k=v ... <container>`
    pub async fn label(
        &self,
        container: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<(), RunError> {
        if labels.is_empty() {
            return Ok(());
        }
        let mut argv = vec![CONTAINER_TOOL.to_string(), "config".to_string()];
        for (key, value) in labels {
            argv.push("--label".to_string());
            argv.push(format!("{key}={value}"));
        }
        argv.push(container.to_string());
        self.quiet(argv).await
    }

    /// `buildah commit <container> <image>`
    pub async fn commit(&self, container: &str, image: &str) -> Result<(), RunError> {
        self.quiet([CONTAINER_TOOL, "commit", container, image]).await
    }

    /// `buildah tag <image> <new name>`
    pub async fn tag(&self, image: &str, name: &str) -> Result<(), RunError> {
        self.quiet([CONTAINER_TOOL, "tag", image, name]).await
    }

    /// `buildah push [opts] <image> <destination>`
    pub async fn push(
        &self,
        image: &str,
        destination: &str,
        push_opts: &[String],
    ) -> Result<(), RunError> {
        let mut argv = vec![CONTAINER_TOOL.to_string(), "push".to_string()];
        argv.extend(push_opts.iter().cloned());
        argv.extend([image.to_string(), destination.to_string()]);
        self.quiet(argv).await
    }

    /// Run an invocation and return its first stdout line
    async fn first_line(&self, argv: Vec<String>) -> Result<String, RunError> {
        let capture = Capture::new();
        let invocation = Invocation::new(argv).stdout(LineSink::Capture(capture.clone()));
        self.runner.run(&invocation).await?;
        capture
            .first()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .ok_or(RunError::MissingOutput {
                argv: invocation.argv,
            })
    }

    /// Run a publish/cleanup invocation with stderr demoted to warnings
    async fn quiet<I, S>(&self, argv: I) -> Result<(), RunError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let invocation = Invocation::new(argv).stderr(LineSink::Log(Severity::Warn));
        self.runner.run(&invocation).await.map(|_| ())
    }
}

/// `buildah run [extra] <container> -- <argv...>`
pub fn run_args(container: &str, extra: &[String], argv: &[String]) -> Vec<String> {
    let mut args = vec![CONTAINER_TOOL.to_string(), "run".to_string()];
    args.extend(extra.iter().cloned());
    args.push(container.to_string());
    args.push("--".to_string());
    args.extend(argv.iter().cloned());
    args
}

/// `buildah copy [opts] <container> <src> <dest>`
///
/// Each option string is split on whitespace, so `"--chown root:root"`
/// becomes two arguments.
pub fn copy_args(container: &str, opts: &[String], src: &str, dest: &str) -> Vec<String> {
    let mut args = vec![CONTAINER_TOOL.to_string(), "copy".to_string()];
    args.extend(
        opts.iter()
            .flat_map(|opt| opt.split_whitespace())
            .map(str::to_string),
    );
    args.extend([container.to_string(), src.to_string(), dest.to_string()]);
    args
}
