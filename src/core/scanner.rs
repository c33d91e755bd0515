//! OpenSCAP compliance scanning
//!
//! Runs inside the built container through the installer's command stage.
//! The evaluation commands are allowed to report findings (`|| true`); the
//! OVAL definition download is not.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::core::installer::Installer;
use crate::core::model::Command;
use crate::error::InstallerError;
use crate::infra::runner::Severity;

/// Packages providing `oscap` and the SCAP content
pub const SCANNER_PACKAGES: [&str; 3] = ["openscap-utils", "scap-security-guide", "bzip2"];

/// Scanner errors
#[derive(Error, Debug)]
pub enum ScanError {
    /// A value the requested stage needs was never configured
    #[error("OpenSCAP option '{option}' is required for {stage}")]
    MissingOption { option: String, stage: String },

    /// Installing the scanner packages failed
    #[error(
        "Issues installing openscap with repos available, typically available via distro appstream repo: {source}"
    )]
    Install {
        #[source]
        source: InstallerError,
    },

    /// `oscap` is not runnable inside the container
    #[error(
        "openscap not found, install openscap-utils and scap-security-guide or pass --install-scap: {source}"
    )]
    NotInstalled {
        #[source]
        source: InstallerError,
    },

    /// Benchmark evaluation or remediation generation failed
    #[error("Error with SCAP benchmark and generation of remediation script: {source}")]
    Benchmark {
        #[source]
        source: InstallerError,
    },

    /// OVAL download or evaluation failed
    #[error("Error with SCAP OVAL eval: {source}")]
    Oval {
        #[source]
        source: InstallerError,
    },
}

/// One partial `openscap` mapping from the image config
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScapOverrides {
    pub profile: Option<String>,
    pub benchmark_path: Option<String>,
    pub results_path: Option<String>,
    pub remediate_path: Option<String>,
    pub oval_url: Option<String>,
    pub oval_xml: Option<String>,
    pub oval_path: Option<String>,
}

/// Fully merged scanner options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScapOptions {
    pub profile: Option<String>,
    pub benchmark_path: Option<String>,
    pub results_path: String,
    pub remediate_path: String,
    pub oval_url: Option<String>,
    pub oval_xml: String,
    /// OVAL report output
    pub oval_path: String,
}

impl Default for ScapOptions {
    fn default() -> Self {
        Self {
            profile: None,
            benchmark_path: None,
            results_path: "/root/scan.xml".to_string(),
            remediate_path: "/root/remediate.sh".to_string(),
            oval_url: None,
            oval_xml: "/root/oval.xml".to_string(),
            oval_path: "/root/vulnerabilities.xml".to_string(),
        }
    }
}

impl ScapOptions {
    /// Apply partial mappings over the defaults, later entries winning
    pub fn merged(overrides: &[ScapOverrides]) -> Self {
        overrides.iter().fold(Self::default(), |mut opts, o| {
            if let Some(v) = &o.profile {
                opts.profile = Some(v.clone());
            }
            if let Some(v) = &o.benchmark_path {
                opts.benchmark_path = Some(v.clone());
            }
            if let Some(v) = &o.results_path {
                opts.results_path.clone_from(v);
            }
            if let Some(v) = &o.remediate_path {
                opts.remediate_path.clone_from(v);
            }
            if let Some(v) = &o.oval_url {
                opts.oval_url = Some(v.clone());
            }
            if let Some(v) = &o.oval_xml {
                opts.oval_xml.clone_from(v);
            }
            if let Some(v) = &o.oval_path {
                opts.oval_path.clone_from(v);
            }
            opts
        })
    }

    fn require<'a>(value: Option<&'a String>, option: &str, stage: &str) -> Result<&'a str, ScanError> {
        value.map(String::as_str).ok_or_else(|| ScanError::MissingOption {
            option: option.to_string(),
            stage: stage.to_string(),
        })
    }

    /// `oscap xccdf eval` followed by remediation script generation
    pub fn benchmark_commands(&self) -> Result<[String; 2], ScanError> {
        let profile = Self::require(self.profile.as_ref(), "profile", "benchmark")?;
        let benchmark = Self::require(self.benchmark_path.as_ref(), "benchmark_path", "benchmark")?;
        Ok([
            format!(
                "oscap xccdf eval --fetch-remote-resources --profile {profile} --results {} {benchmark} || true",
                self.results_path
            ),
            format!(
                "oscap xccdf generate fix --output {} --profile {profile} {}",
                self.remediate_path, self.results_path
            ),
        ])
    }

    /// OVAL definition download followed by `oscap oval eval`
    pub fn oval_commands(&self) -> Result<[String; 2], ScanError> {
        let url = Self::require(self.oval_url.as_ref(), "oval_url", "OVAL evaluation")?;
        Ok([
            format!(
                "curl -L -o - {url} | bzip2 --decompress > {}",
                self.oval_xml
            ),
            format!(
                "oscap oval eval --report {} {} || true",
                self.oval_path, self.oval_xml
            ),
        ])
    }
}

/// Which scan stages to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanFlags {
    pub install: bool,
    pub benchmark: bool,
    pub oval: bool,
}

impl ScanFlags {
    /// Whether any stage was requested
    pub fn any(self) -> bool {
        self.install || self.benchmark || self.oval
    }
}

/// Compliance scan over one container
#[derive(Debug)]
pub struct Scanner<'a> {
    installer: &'a Installer,
    options: ScapOptions,
}

impl<'a> Scanner<'a> {
    pub fn new(installer: &'a Installer, options: ScapOptions) -> Self {
        Self { installer, options }
    }

    /// Run the requested stages in order: install, version check, benchmark, OVAL
    ///
    /// Missing options for a requested stage are reported before anything
    /// runs.
    pub async fn run(
        &self,
        flags: ScanFlags,
        destination: &Path,
        proxy: Option<&str>,
    ) -> Result<(), ScanError> {
        if !flags.any() {
            return Ok(());
        }

        let benchmark = if flags.benchmark {
            Some(self.options.benchmark_commands()?)
        } else {
            None
        };
        let oval = if flags.oval {
            Some(self.options.oval_commands()?)
        } else {
            None
        };

        tracing::info!("OPENSCAP: scanning {}", self.installer.target().container());

        if flags.install {
            let packages: Vec<String> = SCANNER_PACKAGES.iter().map(ToString::to_string).collect();
            self.installer
                .install_packages(&packages, destination, proxy)
                .await
                .map_err(|source| ScanError::Install { source })?;
        }

        self.installer
            .install_commands(&[scan_command("oscap --version")])
            .await
            .map_err(|source| ScanError::NotInstalled { source })?;

        if let Some(commands) = benchmark {
            self.installer
                .install_commands(&commands.map(|c| scan_command(&c)))
                .await
                .map_err(|source| ScanError::Benchmark { source })?;
        }

        if let Some(commands) = oval {
            self.installer
                .install_commands(&commands.map(|c| scan_command(&c)))
                .await
                .map_err(|source| ScanError::Oval { source })?;
        }

        Ok(())
    }
}

fn scan_command(cmd: &str) -> Command {
    Command::new(cmd).with_severity(Severity::Error)
}
