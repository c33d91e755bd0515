//! Target addressing
//!
//! Scratch builds manipulate the mounted root filesystem from the host;
//! builds from an existing image run every tool inside the container. The
//! choice is made once per build and every installer operation goes through
//! it.

use std::path::{Path, PathBuf};

use crate::infra::buildah::{self, ContainerHandle};
use crate::infra::runner::Invocation;

/// Where installer operations are aimed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Host tools operate on the mounted root
    Mounted { container: String, root: PathBuf },
    /// Tools run inside the container via `buildah run`
    Container { container: String },
}

impl Target {
    /// Choose the addressing mode for a container
    pub fn for_handle(handle: &ContainerHandle) -> Self {
        match &handle.mount {
            Some(root) => Self::Mounted {
                container: handle.id.clone(),
                root: root.clone(),
            },
            None => Self::Container {
                container: handle.id.clone(),
            },
        }
    }

    /// Container id
    pub fn container(&self) -> &str {
        match self {
            Self::Mounted { container, .. } | Self::Container { container } => container,
        }
    }

    /// Mounted root, if any
    pub fn root(&self) -> Option<&Path> {
        match self {
            Self::Mounted { root, .. } => Some(root),
            Self::Container { .. } => None,
        }
    }

    /// `rpm` argv scoped to the target's root
    pub fn rpm(&self, args: &[&str]) -> Vec<String> {
        let mut argv = vec!["rpm".to_string()];
        if let Some(root) = self.root() {
            argv.push(format!("--root={}", root.display()));
        }
        argv.extend(args.iter().map(ToString::to_string));
        argv
    }

    /// Build the invocation that runs `argv` against this target
    ///
    /// Environment variables are passed to the host process for mounted
    /// targets and through `buildah run --env` for container targets.
    pub fn invocation(&self, argv: Vec<String>, env: &[(String, String)]) -> Invocation {
        match self {
            Self::Mounted { .. } => env
                .iter()
                .fold(Invocation::new(argv), |inv, (k, v)| inv.env(k, v)),
            Self::Container { container } => {
                let extra: Vec<String> = env
                    .iter()
                    .flat_map(|(k, v)| ["--env".to_string(), format!("{k}={v}")])
                    .collect();
                Invocation::new(buildah::run_args(container, &extra, &argv))
            }
        }
    }
}
