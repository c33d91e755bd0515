//! Build argument resolution
//!
//! Merges command-line overrides with the config file's `options` section
//! into the [`BuildArgs`] one build runs with. Command-line values win.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::defaults::{
    DEFAULT_LAYER_NAME, DEFAULT_PUBLISH_TAG, MAX_ANSIBLE_VERBOSITY, SCRATCH_PARENT,
};
use crate::core::config::{ConfigOptions, OneOrMany};
use crate::core::installer::Backend;
use crate::core::scanner::ScanFlags;
use crate::error::ConfigError;

/// Values given on the command line
///
/// Flags are `true` only when passed; `false` means "defer to the config".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgOverrides {
    pub layer_type: Option<String>,
    pub pkg_manager: Option<String>,
    pub name: Option<String>,
    pub parent: Option<String>,
    pub proxy: Option<String>,
    pub no_gpgcheck: bool,
    pub exclusive_repos: bool,
    pub publish_local: bool,
    pub publish_registry: Option<String>,
    pub publish_s3: Option<String>,
    pub publish_tags: Vec<String>,
    pub registry_opts_push: Vec<String>,
    pub registry_opts_pull: Vec<String>,
    pub scap_benchmark: bool,
    pub oval_eval: bool,
    pub install_scap: bool,
    pub groups: Vec<String>,
    pub playbooks: Vec<String>,
    pub inventory: Vec<String>,
    pub ansible_verbosity: Option<u8>,
    pub labels: Vec<(String, String)>,
}

/// Settings for a package-manager layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseArgs {
    pub backend: Backend,
    pub gpgcheck: bool,
    pub exclusive_repos: bool,
}

/// Settings for a playbook layer
#[derive(Debug, Clone, PartialEq)]
pub struct AnsibleArgs {
    pub groups: Vec<String>,
    pub playbooks: Vec<String>,
    pub inventory: Vec<String>,
    pub vars: BTreeMap<String, serde_json::Value>,
    pub verbosity: u8,
}

/// What kind of layer is built
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    Base(BaseArgs),
    Ansible(AnsibleArgs),
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base(_) => "base",
            Self::Ansible(_) => "ansible",
        }
    }
}

/// Where the finished image goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTargets {
    pub local: bool,
    pub registry: Option<String>,
    pub registry_opts_push: Vec<String>,
    /// Never empty
    pub tags: Vec<String>,
}

impl PublishTargets {
    /// Whether the image is stored anywhere
    pub fn any(&self) -> bool {
        self.local || self.registry.is_some()
    }
}

/// Fully resolved arguments for one build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildArgs {
    pub layer: LayerKind,
    pub name: String,
    pub parent: String,
    pub proxy: Option<String>,
    pub registry_opts_pull: Vec<String>,
    pub publish: PublishTargets,
    pub scan: ScanFlags,
    pub labels: BTreeMap<String, String>,
}

impl BuildArgs {
    /// Backend of a base layer
    pub fn backend(&self) -> Option<Backend> {
        match &self.layer {
            LayerKind::Base(base) => Some(base.backend),
            LayerKind::Ansible(_) => None,
        }
    }

    /// Whether the build starts from the empty image
    pub fn is_scratch(&self) -> bool {
        self.parent == SCRATCH_PARENT
    }

    /// Log the resolved arguments, credentials masked
    pub fn log_summary(&self) {
        tracing::info!("{:-^50}", "ARGUMENTS");
        for line in self.to_string().lines() {
            tracing::info!("{line}");
        }
    }
}

impl fmt::Display for BuildArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "layer_type : {}", self.layer.as_str())?;
        writeln!(f, "name : {}", self.name)?;
        writeln!(f, "parent : {}", self.parent)?;
        match &self.layer {
            LayerKind::Base(base) => {
                writeln!(f, "pkg_manager : {}", base.backend)?;
                writeln!(f, "gpgcheck : {}", base.gpgcheck)?;
                writeln!(f, "exclusive_repos : {}", base.exclusive_repos)?;
            }
            LayerKind::Ansible(ansible) => {
                writeln!(f, "groups : {}", ansible.groups.join(", "))?;
                writeln!(f, "playbooks : {}", ansible.playbooks.join(", "))?;
                writeln!(f, "inventory : {}", ansible.inventory.join(", "))?;
                writeln!(f, "ansible_verbosity : {}", ansible.verbosity)?;
            }
        }
        writeln!(f, "proxy : {}", self.proxy.as_deref().unwrap_or(""))?;
        writeln!(f, "publish_local : {}", self.publish.local)?;
        writeln!(
            f,
            "publish_registry : {}",
            self.publish.registry.as_deref().unwrap_or("")
        )?;
        writeln!(f, "publish_tags : {}", self.publish.tags.join(", "))?;
        writeln!(
            f,
            "registry_opts_push : {}",
            mask_credentials(&self.publish.registry_opts_push).join(" ")
        )?;
        writeln!(
            f,
            "registry_opts_pull : {}",
            mask_credentials(&self.registry_opts_pull).join(" ")
        )?;
        writeln!(f, "scap_benchmark : {}", self.scan.benchmark)?;
        writeln!(f, "oval_eval : {}", self.scan.oval)?;
        write!(f, "install_scap : {}", self.scan.install)
    }
}

/// Replace the value of `--creds` options with a placeholder
pub fn mask_credentials(opts: &[String]) -> Vec<String> {
    let mut masked = Vec::with_capacity(opts.len());
    let mut hide_next = false;
    for opt in opts {
        if hide_next {
            masked.push("****".to_string());
            hide_next = false;
        } else if opt == "--creds" {
            masked.push(opt.clone());
            hide_next = true;
        } else if opt.starts_with("--creds=") {
            masked.push("--creds=****".to_string());
        } else {
            masked.push(opt.clone());
        }
    }
    masked
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn first_non_empty(cli: &[String], config: Option<&OneOrMany<String>>) -> Vec<String> {
    if !cli.is_empty() {
        return cli.to_vec();
    }
    config.cloned().map(OneOrMany::into_vec).unwrap_or_default()
}

/// Merge command-line overrides with config options
pub fn resolve(cli: &ArgOverrides, config: &ConfigOptions) -> Result<BuildArgs, ConfigError> {
    let layer_type = non_empty(cli.layer_type.clone().or_else(|| config.layer_type.clone()))
        .ok_or_else(|| ConfigError::MissingField {
            field: "layer_type".to_string(),
        })?;

    let layer = match layer_type.as_str() {
        "base" => {
            let backend = non_empty(cli.pkg_manager.clone().or_else(|| config.pkg_manager.clone()))
                .ok_or_else(|| ConfigError::MissingField {
                    field: "pkg_manager".to_string(),
                })?
                .parse::<Backend>()?;
            LayerKind::Base(BaseArgs {
                backend,
                gpgcheck: !cli.no_gpgcheck && config.gpgcheck.unwrap_or(true),
                exclusive_repos: cli.exclusive_repos || config.exclusive_repos.unwrap_or(false),
            })
        }
        "ansible" => {
            let playbooks = first_non_empty(&cli.playbooks, config.playbooks.as_ref());
            if playbooks.is_empty() {
                return Err(ConfigError::MissingField {
                    field: "playbooks".to_string(),
                });
            }
            let verbosity = cli
                .ansible_verbosity
                .or(config.ansible_verbosity)
                .unwrap_or(0);
            if verbosity > MAX_ANSIBLE_VERBOSITY {
                return Err(ConfigError::InvalidValue {
                    field: "ansible_verbosity".to_string(),
                    value: verbosity.to_string(),
                    expected: format!("0 to {MAX_ANSIBLE_VERBOSITY}"),
                });
            }
            LayerKind::Ansible(AnsibleArgs {
                groups: if cli.groups.is_empty() {
                    config.groups.clone()
                } else {
                    cli.groups.clone()
                },
                playbooks,
                inventory: first_non_empty(&cli.inventory, config.inventory.as_ref()),
                vars: config.vars.clone(),
                verbosity,
            })
        }
        other => {
            return Err(ConfigError::InvalidValue {
                field: "layer_type".to_string(),
                value: other.to_string(),
                expected: "base or ansible".to_string(),
            })
        }
    };

    if non_empty(cli.publish_s3.clone().or_else(|| config.publish_s3.clone())).is_some() {
        return Err(ConfigError::Unsupported {
            field: "publish_s3".to_string(),
        });
    }

    let mut tags = first_non_empty(&cli.publish_tags, config.publish_tags.as_ref());
    if tags.is_empty() {
        tags.push(DEFAULT_PUBLISH_TAG.to_string());
    }

    let registry = non_empty(
        cli.publish_registry
            .clone()
            .or_else(|| config.publish_registry.clone()),
    );
    let publish = PublishTargets {
        local: cli.publish_local || config.publish_local.unwrap_or(false),
        registry_opts_push: if cli.registry_opts_push.is_empty() {
            config.registry_opts_push.clone()
        } else {
            cli.registry_opts_push.clone()
        },
        registry,
        tags,
    };

    if !publish.any() {
        tracing::warn!("No publish options passed, not storing image anywhere!");
        tracing::warn!("Use one or both of --publish-local or --publish-registry");
        tracing::warn!("to store in one or more of those locations.");
    }

    let mut labels = config.labels.clone();
    labels.extend(cli.labels.iter().cloned());

    Ok(BuildArgs {
        layer,
        name: non_empty(cli.name.clone().or_else(|| config.name.clone()))
            .unwrap_or_else(|| DEFAULT_LAYER_NAME.to_string()),
        parent: non_empty(cli.parent.clone().or_else(|| config.parent.clone()))
            .unwrap_or_else(|| SCRATCH_PARENT.to_string()),
        proxy: non_empty(cli.proxy.clone().or_else(|| config.proxy.clone())),
        registry_opts_pull: if cli.registry_opts_pull.is_empty() {
            config.registry_opts_pull.clone()
        } else {
            cli.registry_opts_pull.clone()
        },
        publish,
        scan: ScanFlags {
            install: cli.install_scap || config.install_scap.unwrap_or(false),
            benchmark: cli.scap_benchmark || config.scap_benchmark.unwrap_or(false),
            oval: cli.oval_eval || config.oval_eval.unwrap_or(false),
        },
        labels,
    })
}
