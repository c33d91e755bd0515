//! Image configuration file
//!
//! The YAML document describing one layer: build options plus the repos,
//! modules, packages, commands and files that go into it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::core::model::{Command, CopyFile, ModuleSet, Repo};
use crate::core::scanner::ScapOverrides;
use crate::error::ConfigError;
use crate::infra::filesystem;

/// A single value or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(v) => vec![v],
            Self::Many(v) => v,
        }
    }
}

/// Treat an explicit YAML `null` like an absent key
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The `options` section
///
/// Every field is optional here; defaults and validation happen when the
/// options are merged with the command line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigOptions {
    pub layer_type: Option<String>,
    pub pkg_manager: Option<String>,
    pub name: Option<String>,
    pub parent: Option<String>,
    pub proxy: Option<String>,
    pub gpgcheck: Option<bool>,
    /// Wipe existing repo definitions before adding the configured ones
    pub exclusive_repos: Option<bool>,

    pub publish_local: Option<bool>,
    pub publish_registry: Option<String>,
    pub publish_s3: Option<String>,
    pub publish_tags: Option<OneOrMany<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub registry_opts_push: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub registry_opts_pull: Vec<String>,

    pub scap_benchmark: Option<bool>,
    pub oval_eval: Option<bool>,
    pub install_scap: Option<bool>,

    #[serde(default, deserialize_with = "nullable")]
    pub groups: Vec<String>,
    pub playbooks: Option<OneOrMany<String>>,
    pub inventory: Option<OneOrMany<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub vars: BTreeMap<String, serde_json::Value>,
    pub ansible_verbosity: Option<u8>,

    #[serde(default, deserialize_with = "nullable")]
    pub labels: BTreeMap<String, String>,
}

/// A parsed image config file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageConfig {
    #[serde(default, deserialize_with = "nullable")]
    pub options: ConfigOptions,
    #[serde(default, deserialize_with = "nullable")]
    pub repos: Vec<Repo>,
    #[serde(default)]
    pub modules: ModuleSet,
    #[serde(default, deserialize_with = "nullable")]
    pub packages: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub package_groups: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub remove_packages: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub cmds: Vec<Command>,
    #[serde(default, deserialize_with = "nullable")]
    pub copyfiles: Vec<CopyFile>,
    #[serde(default, deserialize_with = "nullable")]
    pub openscap: Vec<ScapOverrides>,
}

impl ImageConfig {
    /// Load and parse a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = filesystem::read_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::parse(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse config text
    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }
}
