//! Layer build pipeline
//!
//! Drives one layer from `buildah from` to publish. Base layers go through
//! the installer stages in a fixed order; ansible layers hand the container
//! to a playbook runner.
//!
//! Any stage failure or interrupt after the container exists ends in the
//! same place: [`Layer::build`] logs the error, removes the container and
//! returns the error.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::defaults::{
    DNF_REPO_DIR, DNF_SCRATCH_REPO_DIR, RESOLV_LINK_REMOVAL, ZYPPER_REPO_DIR,
};
use crate::core::ansible::{InventoryHost, PlaybookRunner};
use crate::core::args::{AnsibleArgs, BaseArgs, BuildArgs, LayerKind};
use crate::core::config::ImageConfig;
use crate::core::installer::{Backend, Installer, Target};
use crate::core::publish::Publisher;
use crate::core::scanner::{ScanError, ScapOptions, Scanner};
use crate::error::{FilesystemError, InstallerError, PlaybookError, PublishError, RunError};
use crate::infra::buildah::{Buildah, ContainerHandle};
use crate::infra::filesystem;
use crate::infra::runner::Runner;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to create container from {parent}: {source}")]
    Acquire {
        parent: String,
        #[source]
        source: RunError,
    },

    #[error("Failed to mount container {container}: {source}")]
    Mount {
        container: String,
        #[source]
        source: RunError,
    },

    #[error("Error preparing package manager environment: {source}")]
    Environment {
        #[source]
        source: FilesystemError,
    },

    #[error("Error preparing installer: {source}")]
    InstallerSetup {
        #[source]
        source: InstallerError,
    },

    #[error("Error installing repos: {source}")]
    Repos {
        #[source]
        source: InstallerError,
    },

    #[error("Error installing packages: {source}")]
    Packages {
        #[source]
        source: InstallerError,
    },

    #[error("Error copying files: {source}")]
    CopyFiles {
        #[source]
        source: InstallerError,
    },

    #[error("Error running commands: {source}")]
    Commands {
        #[source]
        source: InstallerError,
    },

    #[error("Error removing resolv.conf link: {source}")]
    Resolv {
        #[source]
        source: FilesystemError,
    },

    #[error("Error removing resolv.conf link in container: {source}")]
    ResolvInContainer {
        #[source]
        source: RunError,
    },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Playbook(#[from] PlaybookError),

    #[error("Error publishing layer: {source}")]
    Publish {
        #[source]
        source: PublishError,
    },

    #[error("Keyboard interrupt during {stage}")]
    Interrupted { stage: String },
}

/// Progress of one build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Created,
    Mounted,
    RepoConfigured,
    PackagesInstalled,
    FilesAndCommandsApplied,
    Scanned,
    InventoryRegistered,
    PlaybookApplied,
    Published,
    Removed,
}

/// One layer build
pub struct Layer {
    runner: Arc<dyn Runner>,
    publisher: Arc<dyn Publisher>,
    playbooks: Arc<dyn PlaybookRunner>,
    cancel: CancellationToken,
    args: BuildArgs,
    config: ImageConfig,
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl Layer {
    pub fn new(
        runner: Arc<dyn Runner>,
        publisher: Arc<dyn Publisher>,
        playbooks: Arc<dyn PlaybookRunner>,
        cancel: CancellationToken,
        args: BuildArgs,
        config: ImageConfig,
    ) -> Self {
        Self {
            runner,
            publisher,
            playbooks,
            cancel,
            args,
            config,
        }
    }

    /// Build, publish and release the layer
    pub async fn build(&self) -> Result<LayerState, PipelineError> {
        tracing::info!("{:-^50}", "BUILD LAYER");
        let buildah = Buildah::new(self.runner.clone());

        let name = match &self.args.layer {
            LayerKind::Base(_) => {
                format!("{}{}", self.args.name, Local::now().format("%Y%m%d%H%M%S"))
            }
            LayerKind::Ansible(_) => self.args.name.clone(),
        };
        let mut handle = self
            .guard(
                "container creation",
                buildah.from_image(&self.args.parent, &name, &self.args.registry_opts_pull),
                |source| PipelineError::Acquire {
                    parent: self.args.parent.clone(),
                    source,
                },
            )
            .await?;
        tracing::info!("Container: {} created from {}", handle.id, handle.parent);

        let mut state = LayerState::Created;
        let result = self.run_stages(&buildah, &mut handle, &mut state).await;

        match result {
            Ok(()) => Ok(LayerState::Removed),
            Err(e) => {
                tracing::error!("{e}");
                tracing::error!("Build stopped after reaching {state:?}, removing {}", handle.id);
                if let Err(rm) = buildah.remove(&handle.id).await {
                    tracing::error!("Failed to remove container {}: {rm}", handle.id);
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        buildah: &Buildah,
        handle: &mut ContainerHandle,
        state: &mut LayerState,
    ) -> Result<(), PipelineError> {
        match &self.args.layer {
            LayerKind::Base(base) => self.build_base(buildah, handle, base, state).await?,
            LayerKind::Ansible(ansible) => self.build_ansible(handle, ansible, state).await?,
        }

        tracing::info!("Publishing Layer");
        self.guard(
            "publish",
            self.publisher.publish(handle, &self.args, &self.config),
            |source| PipelineError::Publish { source },
        )
        .await?;
        *state = LayerState::Published;
        Ok(())
    }

    async fn build_base(
        &self,
        buildah: &Buildah,
        handle: &mut ContainerHandle,
        base: &BaseArgs,
        state: &mut LayerState,
    ) -> Result<(), PipelineError> {
        let config = &self.config;
        let proxy = self.args.proxy.as_deref();

        if handle.is_scratch() {
            let root = self
                .guard("mount", buildah.mount(&handle.id), |source| {
                    PipelineError::Mount {
                        container: handle.id.clone(),
                        source,
                    }
                })
                .await?;
            tracing::info!("Container: {} mounted at {}", handle.id, root.display());
            handle.mount = Some(root);
            *state = LayerState::Mounted;
        }

        let target = Target::for_handle(handle);
        let repo_dir = repo_destination(base.backend, target.root())
            .map_err(|source| PipelineError::Environment { source })?;

        let installer = Installer::new(self.runner.clone(), base.backend, target, base.gpgcheck)
            .map_err(|source| PipelineError::InstallerSetup { source })?;

        let repos = async {
            if base.exclusive_repos {
                installer
                    .install_exclusive_repos(&config.repos, &repo_dir, proxy)
                    .await
            } else {
                installer.install_repos(&config.repos, &repo_dir, proxy).await
            }
        };
        self.guard("repo install", repos, |source| PipelineError::Repos { source })
            .await?;
        *state = LayerState::RepoConfigured;

        let packages = async {
            installer
                .install_modules(&config.modules, &repo_dir, proxy)
                .await?;
            installer
                .install_package_groups(&config.package_groups, &repo_dir, proxy)
                .await?;
            installer
                .install_packages(&config.packages, &repo_dir, proxy)
                .await?;
            installer.remove_packages(&config.remove_packages).await;
            Ok::<(), InstallerError>(())
        };
        self.guard("package install", packages, |source| {
            PipelineError::Packages { source }
        })
        .await?;
        *state = LayerState::PackagesInstalled;

        self.guard(
            "file copy",
            installer.install_copyfiles(&config.copyfiles),
            |source| PipelineError::CopyFiles { source },
        )
        .await?;

        self.guard(
            "commands",
            installer.install_commands(&config.cmds),
            |source| PipelineError::Commands { source },
        )
        .await?;

        self.guard(
            "resolv.conf cleanup",
            self.remove_resolv_link(installer.target()),
            |e| e,
        )
        .await?;
        *state = LayerState::FilesAndCommandsApplied;

        if self.args.scan.any() {
            let scanner = Scanner::new(&installer, ScapOptions::merged(&config.openscap));
            self.guard(
                "scan",
                scanner.run(self.args.scan, &repo_dir, proxy),
                PipelineError::Scan,
            )
            .await?;
            *state = LayerState::Scanned;
        }

        Ok(())
    }

    async fn build_ansible(
        &self,
        handle: &ContainerHandle,
        ansible: &AnsibleArgs,
        state: &mut LayerState,
    ) -> Result<(), PipelineError> {
        let host = InventoryHost {
            name: handle.id.clone(),
            groups: ansible.groups.clone(),
            playbooks: ansible.playbooks.clone(),
            vars: ansible.vars.clone(),
        };
        *state = LayerState::InventoryRegistered;

        self.guard(
            "playbook run",
            self.playbooks
                .run_playbooks(&[host], &ansible.inventory, ansible.verbosity),
            PipelineError::Playbook,
        )
        .await?;
        *state = LayerState::PlaybookApplied;
        Ok(())
    }

    /// Drop a symlinked `/etc/resolv.conf`, which breaks running the image
    async fn remove_resolv_link(&self, target: &Target) -> Result<(), PipelineError> {
        match target.root() {
            Some(root) => {
                if filesystem::remove_resolv_symlink(root)
                    .map_err(|source| PipelineError::Resolv { source })?
                {
                    tracing::info!("removing resolv.conf link (this link breaks running a container)");
                }
            }
            None => {
                tracing::debug!("checking for a resolv.conf link in {}", target.container());
                let argv = vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    RESOLV_LINK_REMOVAL.to_string(),
                ];
                self.runner
                    .run(&target.invocation(argv, &[]))
                    .await
                    .map_err(|source| PipelineError::ResolvInContainer { source })?;
            }
        }
        Ok(())
    }

    /// Run a stage, abandoning it if the build is cancelled
    ///
    /// Dropping the stage future kills any child process it was waiting on.
    async fn guard<T, E, F>(
        &self,
        stage: &str,
        fut: F,
        wrap: impl FnOnce(E) -> PipelineError,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, E>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(PipelineError::Interrupted {
                stage: stage.to_string(),
            }),
            result = fut => result.map_err(wrap),
        }
    }
}

/// Repository directory the package manager writes to
///
/// For mounted dnf roots this also prepares `dnf.conf` inside the image.
fn repo_destination(
    backend: Backend,
    root: Option<&std::path::Path>,
) -> Result<PathBuf, FilesystemError> {
    match (backend, root) {
        (Backend::Zypper, Some(root)) => Ok(filesystem::within_root(
            root,
            std::path::Path::new(ZYPPER_REPO_DIR),
        )),
        (Backend::Zypper, None) => Ok(PathBuf::from(ZYPPER_REPO_DIR)),
        (Backend::Dnf, Some(root)) => {
            let image_dir = scratch_repo_dir();
            filesystem::prepare_dnf_root(root, &image_dir)
        }
        (Backend::Dnf, None) => Ok(PathBuf::from(DNF_REPO_DIR)),
    }
}

/// In-image repo directory for scratch dnf builds
fn scratch_repo_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/root"))
        .join(DNF_SCRATCH_REPO_DIR)
}
