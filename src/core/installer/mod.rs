//! Package-manager installer
//!
//! Turns the declarative repo, module, package, command and copy-file
//! collections of a layer into ordered invocations against one container.
//!
//! Backend differences live behind [`PackageManager`]: each backend only
//! builds argument vectors. Whether those run on the host against a mounted
//! root or inside the container is decided once by the [`Target`].
//!
//! Every operation is a logged no-op when handed an empty collection.

pub mod dnf;
pub mod target;
pub mod zypper;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use tempfile::TempDir;

use crate::core::model::{Command, CopyFile, ModuleRequest, ModuleSet, Repo};
use crate::error::{ConfigError, InstallerError};
use crate::infra::buildah;
use crate::infra::runner::{ExitPolicy, Invocation, LineSink, Runner, Severity};

pub use target::Target;

/// Package-manager family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Dnf,
    Zypper,
}

impl Backend {
    /// Name as written in configs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dnf => "dnf",
            Self::Zypper => "zypper",
        }
    }

    /// Argument builder for this backend
    pub fn package_manager(self) -> Box<dyn PackageManager> {
        match self {
            Self::Dnf => Box::new(dnf::Dnf),
            Self::Zypper => Box::new(zypper::Zypper),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dnf" => Ok(Self::Dnf),
            "zypper" => Ok(Self::Zypper),
            other => Err(ConfigError::InvalidValue {
                field: "pkg_manager".to_string(),
                value: other.to_string(),
                expected: "dnf or zypper".to_string(),
            }),
        }
    }
}

/// Per-call inputs a backend needs to build an argv
#[derive(Debug, Clone, Copy)]
pub struct BackendContext<'a> {
    /// Repository directory as seen by the invoked tool
    pub repo_dir: &'a Path,
    /// Root to install into, mounted targets only
    pub install_root: Option<&'a Path>,
    /// Directory for backend logs and caches, mounted targets only
    pub scratch: Option<&'a Path>,
    pub proxy: Option<&'a str>,
    pub gpgcheck: bool,
}

/// Backend-specific argument construction
///
/// `None` means the backend does not support the operation.
pub trait PackageManager: Send + Sync + fmt::Debug {
    fn backend(&self) -> Backend;

    fn add_repo(&self, ctx: &BackendContext<'_>, repo: &Repo) -> Vec<String>;

    /// `None` when the backend carries the proxy through [`Self::proxy_env`]
    /// instead of binding it to the repo
    fn bind_proxy(
        &self,
        ctx: &BackendContext<'_>,
        repo_name: &str,
        proxy: &str,
    ) -> Option<Vec<String>>;

    fn module(&self, ctx: &BackendContext<'_>, request: &ModuleRequest) -> Option<Vec<String>>;

    fn install_groups(&self, ctx: &BackendContext<'_>, groups: &[String]) -> Option<Vec<String>>;

    fn install(&self, ctx: &BackendContext<'_>, packages: &[String]) -> Vec<String>;

    /// Environment the backend needs to reach the network through a proxy
    fn proxy_env(&self, _proxy: &str) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Result of a removal pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// Installer bound to one container for one build
pub struct Installer {
    runner: Arc<dyn Runner>,
    backend: Box<dyn PackageManager>,
    target: Target,
    scratch: TempDir,
    gpgcheck: bool,
}

impl fmt::Debug for Installer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Installer")
            .field("backend", &self.backend)
            .field("target", &self.target)
            .field("scratch", &self.scratch.path())
            .field("gpgcheck", &self.gpgcheck)
            .finish_non_exhaustive()
    }
}

impl Installer {
    /// Create an installer and its scratch directory
    pub fn new(
        runner: Arc<dyn Runner>,
        backend: Backend,
        target: Target,
        gpgcheck: bool,
    ) -> Result<Self, InstallerError> {
        let scratch = tempfile::Builder::new()
            .prefix("image-build-")
            .tempdir()
            .map_err(|e| InstallerError::Scratch {
                error: e.to_string(),
            })?;
        tracing::debug!("Installer scratch directory: {}", scratch.path().display());

        Ok(Self {
            runner,
            backend: backend.package_manager(),
            target,
            scratch,
            gpgcheck,
        })
    }

    /// Active backend
    pub fn backend(&self) -> Backend {
        self.backend.backend()
    }

    /// Addressing mode
    pub fn target(&self) -> &Target {
        &self.target
    }

    fn context<'a>(&'a self, destination: &'a Path, proxy: Option<&'a str>) -> BackendContext<'a> {
        let root = self.target.root();
        BackendContext {
            repo_dir: destination,
            install_root: root,
            scratch: root.map(|_| self.scratch.path()),
            proxy,
            gpgcheck: self.gpgcheck,
        }
    }

    fn backend_invocation(&self, argv: Vec<String>, proxy: Option<&str>) -> Invocation {
        let env = proxy
            .map(|p| self.backend.proxy_env(p))
            .unwrap_or_default();
        self.target.invocation(argv, &env)
    }

    /// Register repositories in order
    ///
    /// Stops at the first failure; repos added before it stay added.
    pub async fn install_repos(
        &self,
        repos: &[Repo],
        destination: &Path,
        proxy: Option<&str>,
    ) -> Result<(), InstallerError> {
        if repos.is_empty() {
            tracing::info!("REPOS: no repos passed to install");
            return Ok(());
        }

        tracing::info!("REPOS: Installing these repos to {}", self.target.container());
        let ctx = self.context(destination, proxy);

        for repo in repos {
            tracing::info!("{}: {}", repo.alias, repo.url);

            let add = self.backend_invocation(self.backend.add_repo(&ctx, repo), proxy);
            self.runner
                .run(&add)
                .await
                .map_err(|source| InstallerError::Repo {
                    alias: repo.alias.clone(),
                    url: repo.url.clone(),
                    source,
                })?;

            if let Some(proxy) = proxy {
                let name = crate::core::model::repo_match_name(&repo.url);
                if let Some(argv) = self.backend.bind_proxy(&ctx, &name, proxy) {
                    let bind = self.backend_invocation(argv, Some(proxy));
                    self.runner
                        .run(&bind)
                        .await
                        .map_err(|source| InstallerError::Proxy {
                            alias: repo.alias.clone(),
                            url: repo.url.clone(),
                            proxy: proxy.to_string(),
                            source,
                        })?;
                }
            }

            if let Some(key) = &repo.gpg {
                let env: Vec<(String, String)> = proxy
                    .map(|p| vec![("https_proxy".to_string(), p.to_string())])
                    .unwrap_or_default();
                let import = self
                    .target
                    .invocation(self.target.rpm(&["--import", key]), &env);
                self.runner
                    .run(&import)
                    .await
                    .map_err(|source| InstallerError::GpgKey {
                        alias: repo.alias.clone(),
                        key: key.clone(),
                        source,
                    })?;
            }
        }
        Ok(())
    }

    /// Replace every existing repository definition with `repos`
    ///
    /// An empty list returns before anything is deleted.
    pub async fn install_exclusive_repos(
        &self,
        repos: &[Repo],
        destination: &Path,
        proxy: Option<&str>,
    ) -> Result<(), InstallerError> {
        if repos.is_empty() {
            tracing::info!("REPOS: no repos passed to install");
            return Ok(());
        }

        tracing::info!(
            "REPOS: removing existing repo definitions in {}",
            destination.display()
        );
        let argv = vec![
            "find".to_string(),
            destination.display().to_string(),
            "-mindepth".to_string(),
            "1".to_string(),
            "-delete".to_string(),
        ];
        self.runner
            .run(&self.target.invocation(argv, &[]))
            .await
            .map_err(|source| InstallerError::ClearRepos {
                path: destination.to_path_buf(),
                source,
            })?;

        self.install_repos(repos, destination, proxy).await
    }

    /// Run module sub-commands in declaration order
    pub async fn install_modules(
        &self,
        modules: &ModuleSet,
        destination: &Path,
        proxy: Option<&str>,
    ) -> Result<(), InstallerError> {
        if modules.is_empty() {
            tracing::info!("MODULES: no modules passed");
            return Ok(());
        }

        let ctx = self.context(destination, proxy);
        for request in modules.iter() {
            let Some(argv) = self.backend.module(&ctx, request) else {
                tracing::warn!("{} does not support modules", self.backend());
                return Ok(());
            };
            tracing::info!(
                "MODULES: running {} on {}",
                request.action,
                request.modules.join(", ")
            );
            self.runner
                .run(&self.backend_invocation(argv, proxy))
                .await
                .map_err(|source| InstallerError::Modules {
                    action: request.action.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Install package groups in one invocation
    pub async fn install_package_groups(
        &self,
        groups: &[String],
        destination: &Path,
        proxy: Option<&str>,
    ) -> Result<(), InstallerError> {
        if groups.is_empty() {
            tracing::warn!("PACKAGE GROUPS: no package groups passed to install");
            return Ok(());
        }

        let ctx = self.context(destination, proxy);
        let Some(argv) = self.backend.install_groups(&ctx, groups) else {
            tracing::warn!("{} does not support package groups", self.backend());
            return Ok(());
        };

        tracing::info!(
            "PACKAGE GROUPS: Installing these package groups to {}",
            self.target.container()
        );
        tracing::info!("{}", groups.join("\n"));

        let invocation = self
            .backend_invocation(argv, proxy)
            .policy(ExitPolicy::PackageInstall);
        self.runner
            .run(&invocation)
            .await
            .map(|_| ())
            .map_err(|source| InstallerError::PackageGroups { source })
    }

    /// Install packages in one invocation
    ///
    /// Exit code 107 (post-install script failure) is logged and tolerated.
    pub async fn install_packages(
        &self,
        packages: &[String],
        destination: &Path,
        proxy: Option<&str>,
    ) -> Result<(), InstallerError> {
        if packages.is_empty() {
            tracing::warn!("PACKAGES: no packages passed to install");
            return Ok(());
        }

        tracing::info!(
            "PACKAGES: Installing these packages to {}",
            self.target.container()
        );
        tracing::info!("{}", packages.join("\n"));

        let ctx = self.context(destination, proxy);
        let invocation = self
            .backend_invocation(self.backend.install(&ctx, packages), proxy)
            .policy(ExitPolicy::PackageInstall);
        self.runner
            .run(&invocation)
            .await
            .map(|_| ())
            .map_err(|source| InstallerError::Packages { source })
    }

    /// Remove packages one at a time with `rpm -e --nodeps`
    ///
    /// Every package is attempted. Failures are collected into the report
    /// and logged, never raised.
    pub async fn remove_packages(&self, packages: &[String]) -> RemovalReport {
        let mut report = RemovalReport::default();
        if packages.is_empty() {
            tracing::warn!("REMOVE PACKAGES: no package passed to remove");
            return report;
        }

        tracing::info!(
            "REMOVE PACKAGES: removing these packages from container {}",
            self.target.container()
        );
        tracing::info!("{}", packages.join("\n"));

        for package in packages {
            let argv = self.target.rpm(&["-e", "--nodeps", package]);
            match self.runner.run(&self.target.invocation(argv, &[])).await {
                Ok(_) => report.removed.push(package.clone()),
                Err(e) => {
                    tracing::warn!("Failed to remove {package}: {e}");
                    report.failed.push(package.clone());
                }
            }
        }

        if !report.failed.is_empty() {
            tracing::warn!(
                "REMOVE PACKAGES: {} of {} packages could not be removed: {}",
                report.failed.len(),
                packages.len(),
                report.failed.join(", ")
            );
        }
        report
    }

    /// Run shell commands inside the container, in order
    pub async fn install_commands(&self, commands: &[Command]) -> Result<(), InstallerError> {
        if commands.is_empty() {
            tracing::warn!("COMMANDS: no commands passed to run");
            return Ok(());
        }

        tracing::info!(
            "COMMANDS: running these commands in {}",
            self.target.container()
        );
        for command in commands {
            tracing::info!("{}", command.cmd);
            let argv = buildah::run_args(
                self.target.container(),
                &command.extra_args,
                &["bash".to_string(), "-c".to_string(), command.cmd.clone()],
            );
            let invocation = Invocation::new(argv)
                .stdout(LineSink::Log(Severity::Info))
                .stderr(LineSink::Log(command.severity));
            self.runner
                .run(&invocation)
                .await
                .map_err(|source| InstallerError::Command {
                    command: command.cmd.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Copy files into the container, in order
    pub async fn install_copyfiles(&self, copyfiles: &[CopyFile]) -> Result<(), InstallerError> {
        if copyfiles.is_empty() {
            tracing::warn!("COPYFILES: no files to copy");
            return Ok(());
        }

        tracing::info!("COPYFILES: copying these files to {}", self.target.container());
        for file in copyfiles {
            tracing::info!("{} -> {}", file.src, file.dest);
            let argv = buildah::copy_args(self.target.container(), &file.opts, &file.src, &file.dest);
            self.runner
                .run(&Invocation::new(argv))
                .await
                .map_err(|source| InstallerError::CopyFile {
                    src: file.src.clone(),
                    dest: file.dest.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}
