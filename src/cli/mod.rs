//! Command-line interface module
//!
//! This module handles argument parsing. It contains no build logic; that
//! belongs in the [`crate::core`] module.

pub mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::defaults::{DEFAULT_CONFIG_FILE, DEFAULT_LOG_LEVEL};
use crate::core::args::ArgOverrides;

/// image-build - container image layer builder
///
/// Builds one image layer with buildah from a YAML config. Every option
/// below overrides the matching key in the config's `options` section.
#[derive(Parser, Debug)]
#[command(name = "image-build")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level (DEBUG, INFO, WARN, ERROR); RUST_LOG takes precedence
    #[arg(long, env = "IMAGE_BUILD_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    /// Image config file
    #[arg(long, env = "IMAGE_BUILD_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Layer type: base or ansible
    #[arg(long)]
    pub layer_type: Option<String>,

    /// Package manager for base layers: dnf or zypper
    #[arg(long = "pkg-man")]
    pub pkg_manager: Option<String>,

    /// Parent image, or "scratch" for an empty root
    #[arg(long)]
    pub parent: Option<String>,

    /// Layer name
    #[arg(long)]
    pub name: Option<String>,

    /// Proxy used by the package manager
    #[arg(long)]
    pub proxy: Option<String>,

    /// Skip GPG signature checks on packages
    #[arg(long)]
    pub no_gpgcheck: bool,

    /// Remove existing repo definitions before adding the configured repos
    #[arg(long)]
    pub exclusive_repos: bool,

    /// Commit the image to local container storage
    #[arg(long)]
    pub publish_local: bool,

    /// Registry to push the image to
    #[arg(long)]
    pub publish_registry: Option<String>,

    /// S3 endpoint (not supported, rejected when set)
    #[arg(long, hide = true)]
    pub publish_s3: Option<String>,

    /// Tags to publish the image under
    #[arg(long, num_args = 1..)]
    pub publish_tags: Vec<String>,

    /// Options passed to `buildah push`, split on whitespace
    #[arg(long, allow_hyphen_values = true)]
    pub registry_opts_push: Vec<String>,

    /// Options passed to `buildah from`, split on whitespace
    #[arg(long, allow_hyphen_values = true)]
    pub registry_opts_pull: Vec<String>,

    /// Run an OpenSCAP benchmark against the image
    #[arg(long)]
    pub scap_benchmark: bool,

    /// Run an OpenSCAP OVAL evaluation against the image
    #[arg(long)]
    pub oval_eval: bool,

    /// Install the OpenSCAP packages before scanning
    #[arg(long)]
    pub install_scap: bool,

    /// Inventory groups for ansible layers
    #[arg(long = "group-list", num_args = 1..)]
    pub groups: Vec<String>,

    /// Playbooks for ansible layers
    #[arg(long = "pb", num_args = 1..)]
    pub playbooks: Vec<String>,

    /// Extra inventory sources for ansible layers
    #[arg(long, num_args = 1..)]
    pub inventory: Vec<String>,

    /// Ansible verbosity, 0 to 4
    #[arg(long)]
    pub ansible_verbosity: Option<u8>,

    /// Extra image label, KEY=VALUE
    #[arg(long = "label", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,
}

impl Cli {
    /// Command-line values as overrides for the config file
    pub fn overrides(&self) -> ArgOverrides {
        let split = |opts: &[String]| -> Vec<String> {
            opts.iter()
                .flat_map(|o| o.split_whitespace())
                .map(str::to_string)
                .collect()
        };
        ArgOverrides {
            layer_type: self.layer_type.clone(),
            pkg_manager: self.pkg_manager.clone(),
            name: self.name.clone(),
            parent: self.parent.clone(),
            proxy: self.proxy.clone(),
            no_gpgcheck: self.no_gpgcheck,
            exclusive_repos: self.exclusive_repos,
            publish_local: self.publish_local,
            publish_registry: self.publish_registry.clone(),
            publish_s3: self.publish_s3.clone(),
            publish_tags: self.publish_tags.clone(),
            registry_opts_push: split(&self.registry_opts_push),
            registry_opts_pull: split(&self.registry_opts_pull),
            scap_benchmark: self.scap_benchmark,
            oval_eval: self.oval_eval,
            install_scap: self.install_scap,
            groups: self.groups.clone(),
            playbooks: self.playbooks.clone(),
            inventory: self.inventory.clone(),
            ansible_verbosity: self.ansible_verbosity,
            labels: self.labels.clone(),
        }
    }

    /// Execute the build
    pub async fn run(self) -> Result<()> {
        commands::build::execute(&self.config, &self.overrides()).await?;
        Ok(())
    }
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["image-build"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert_eq!(cli.log_level, "INFO");
        assert_eq!(cli.overrides(), ArgOverrides::default());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "image-build",
            "--config",
            "rocky.yaml",
            "--layer-type",
            "base",
            "--pkg-man",
            "dnf",
            "--publish-tags",
            "9.4",
            "latest",
            "--registry-opts-push",
            "--tls-verify=false --retry 3",
            "--label",
            "team=hpc",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.pkg_manager.as_deref(), Some("dnf"));
        assert_eq!(overrides.publish_tags, vec!["9.4", "latest"]);
        assert_eq!(
            overrides.registry_opts_push,
            vec!["--tls-verify=false", "--retry", "3"]
        );
        assert_eq!(overrides.labels, vec![("team".to_string(), "hpc".to_string())]);
    }

    #[test]
    fn test_bad_label_is_rejected() {
        assert!(Cli::try_parse_from(["image-build", "--label", "novalue"]).is_err());
    }
}
