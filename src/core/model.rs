//! Declarative layer content
//!
//! The repo, module, command and copy-file entries an image config
//! describes. They carry no behaviour of their own; the installer turns
//! them into invocations.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::config::defaults::DEFAULT_REPO_PRIORITY;
use crate::infra::runner::Severity;

/// A package repository
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repo {
    /// Unique name within one layer
    pub alias: String,
    /// Repository or `.repo` file URL
    pub url: String,
    /// GPG key to import for this repository
    #[serde(default)]
    pub gpg: Option<String>,
    /// zypper priority, ignored by dnf
    #[serde(default)]
    pub priority: Option<u32>,
}

impl Repo {
    /// Create a repo with no key and default priority
    pub fn new(alias: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            url: url.into(),
            gpg: None,
            priority: None,
        }
    }

    /// Priority with the default applied
    pub fn priority(&self) -> u32 {
        self.priority.unwrap_or(DEFAULT_REPO_PRIORITY)
    }
}

/// Name dnf knows a freshly added repository by
///
/// `.repo` files contribute every repo they define, so their file stem
/// becomes a glob. Plain URLs become the id dnf derives from them: the
/// scheme dropped and slashes turned into underscores.
pub fn repo_match_name(url: &str) -> String {
    if let Some(stem) = url.strip_suffix(".repo") {
        let file = stem.rsplit('/').next().unwrap_or(stem);
        return format!("{file}*");
    }
    let bare = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    bare.replace('/', "_")
}

/// A shell command run inside the container
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Command {
    /// Shell text passed to `bash -c`
    pub cmd: String,
    /// Where the command's stderr is logged
    #[serde(default, rename = "loglevel")]
    pub severity: Severity,
    /// Extra `buildah run` flags
    #[serde(default, alias = "buildah_extra_args")]
    pub extra_args: Vec<String>,
}

impl Command {
    /// Create a command logging stderr as errors
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            severity: Severity::default(),
            extra_args: Vec::new(),
        }
    }

    /// Set the stderr severity
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// A file copied into the container
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CopyFile {
    pub src: String,
    pub dest: String,
    /// `buildah copy` options, each split on whitespace
    #[serde(default)]
    pub opts: Vec<String>,
}

/// dnf module sub-command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleAction {
    Enable,
    Disable,
    Install,
}

impl ModuleAction {
    /// Sub-command as passed to `dnf module`
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Install => "install",
        }
    }
}

impl fmt::Display for ModuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One module sub-command and the modules it applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    pub action: ModuleAction,
    pub modules: Vec<String>,
}

/// Module requests in the order the config declares them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSet(pub Vec<ModuleRequest>);

impl ModuleSet {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleRequest> {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for ModuleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ModuleSetVisitor;

        impl<'de> Visitor<'de> for ModuleSetVisitor {
            type Value = ModuleSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of module sub-commands to module lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ModuleSet, A::Error> {
                let mut requests = Vec::new();
                while let Some((action, modules)) = map.next_entry::<ModuleAction, Vec<String>>()? {
                    requests.push(ModuleRequest { action, modules });
                }
                Ok(ModuleSet(requests))
            }

            // An absent `modules:` value is written as an empty list in older configs
            fn visit_seq<A: serde::de::SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> Result<ModuleSet, A::Error> {
                if seq.next_element::<serde::de::IgnoredAny>()?.is_some() {
                    return Err(serde::de::Error::custom(
                        "modules must be a mapping of sub-commands to module lists",
                    ));
                }
                Ok(ModuleSet::default())
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<ModuleSet, E> {
                Ok(ModuleSet::default())
            }
        }

        deserializer.deserialize_any(ModuleSetVisitor)
    }
}
