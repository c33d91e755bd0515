//! Error types for image-build
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// External command errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// No program was given
    #[error("Empty command line")]
    EmptyCommand,

    /// The program could not be started
    #[error("Failed to start '{program}': {error}")]
    Spawn { program: String, error: String },

    /// Exit code mapped to a fatal outcome
    #[error("'{}' exited with code {code}", argv.join(" "))]
    Fatal { code: i32, argv: Vec<String> },

    /// The process was killed by a signal
    #[error("'{}' was terminated by a signal", argv.join(" "))]
    Terminated { argv: Vec<String> },

    /// Output streams could not be read
    #[error("I/O error while running '{}': {error}", argv.join(" "))]
    Io { argv: Vec<String>, error: String },

    /// The command succeeded but printed nothing where a value was expected
    #[error("'{}' produced no output", argv.join(" "))]
    MissingOutput { argv: Vec<String> },
}

impl RunError {
    /// Exit code of the failed command, if it ran to completion
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Fatal { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to remove file
    #[error("Failed to remove '{path}': {error}")]
    RemoveFile { path: PathBuf, error: String },
}

/// Configuration and argument resolution errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file does not exist
    #[error("The file '{path}' does not exist")]
    NotFound { path: PathBuf },

    /// Config file could not be read
    #[error("Failed to read config file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Config file is not valid YAML for the image DSL
    #[error("Failed to parse config file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Required value missing from both CLI and config
    #[error("'{field}' required in config file or as an argument")]
    MissingField { field: String },

    /// Value present but not acceptable
    #[error("Invalid value '{value}' for '{field}': expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    /// Feature recognised but not handled by this tool
    #[error("'{field}' is not supported by this build of image-build")]
    Unsupported { field: String },
}

/// Package-manager installer errors
#[derive(Error, Debug)]
pub enum InstallerError {
    /// Scratch directory for backend state could not be created
    #[error("Failed to create scratch directory: {error}")]
    Scratch { error: String },

    /// Adding a repository failed
    #[error("Failed to install repo {alias} ({url}): {source}")]
    Repo {
        alias: String,
        url: String,
        #[source]
        source: RunError,
    },

    /// Binding a proxy to a repository failed
    #[error("Failed to set proxy {proxy} for repo {alias} ({url}): {source}")]
    Proxy {
        alias: String,
        url: String,
        proxy: String,
        #[source]
        source: RunError,
    },

    /// Importing a repository's GPG key failed
    #[error("Failed to install gpg key for {alias} at URL {key}: {source}")]
    GpgKey {
        alias: String,
        key: String,
        #[source]
        source: RunError,
    },

    /// Wiping existing repository configuration failed
    #[error("Failed to clear repo directory '{path}': {source}")]
    ClearRepos {
        path: PathBuf,
        #[source]
        source: RunError,
    },

    /// A module sub-command failed
    #[error("Failed to {action} modules: {source}")]
    Modules {
        action: String,
        #[source]
        source: RunError,
    },

    /// Package group installation failed
    #[error("Installing package groups failed: {source}")]
    PackageGroups {
        #[source]
        source: RunError,
    },

    /// Package installation failed
    #[error("Installing packages failed: {source}")]
    Packages {
        #[source]
        source: RunError,
    },

    /// A command inside the container failed
    #[error("Command '{command}' failed: {source}")]
    Command {
        command: String,
        #[source]
        source: RunError,
    },

    /// Copying a file into the container failed
    #[error("Failed to copy {src} -> {dest}: {source}")]
    CopyFile {
        src: String,
        dest: String,
        #[source]
        source: RunError,
    },
}

/// Publish errors
#[derive(Error, Debug)]
pub enum PublishError {
    /// Applying labels to the container failed
    #[error("Failed to label container {container}: {source}")]
    Label {
        container: String,
        #[source]
        source: RunError,
    },

    /// Committing the container to an image failed
    #[error("Failed to commit {image}: {source}")]
    Commit {
        image: String,
        #[source]
        source: RunError,
    },

    /// Tagging the committed image failed
    #[error("Failed to tag {image}: {source}")]
    Tag {
        image: String,
        #[source]
        source: RunError,
    },

    /// Pushing to a registry failed
    #[error("Failed to push {image} to {registry}: {source}")]
    Push {
        image: String,
        registry: String,
        #[source]
        source: RunError,
    },

    /// A registry publish was requested without any tag
    #[error("No tags given to publish {image} to {registry}")]
    NoTags { image: String, registry: String },
}

/// Playbook runner errors
#[derive(Error, Debug)]
pub enum PlaybookError {
    /// No playbook was given for the target hosts
    #[error("No playbooks given for hosts: {}", hosts.join(", "))]
    NoPlaybooks { hosts: Vec<String> },

    /// The generated inventory could not be written
    #[error("Failed to write inventory: {error}")]
    Inventory { error: String },

    /// The playbook run returned a failure
    #[error("Ansible playbook failed to run: {source}")]
    Failed {
        #[source]
        source: RunError,
    },
}

/// Top-level image-build error type
#[derive(Error, Debug)]
pub enum ImageBuildError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Required external tool is missing
    #[error("Required tool '{tool}' not found in PATH")]
    ToolNotFound { tool: String },

    /// Pipeline error
    #[error("Build failed: {0}")]
    Pipeline(#[from] crate::core::layer::PipelineError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_error_names_argv_and_code() {
        let err = RunError::Fatal {
            code: 104,
            argv: vec!["dnf".into(), "install".into(), "curl".into()],
        };
        assert_eq!(err.to_string(), "'dnf install curl' exited with code 104");
        assert_eq!(err.exit_code(), Some(104));
    }

    #[test]
    fn test_spawn_error_has_no_exit_code() {
        let err = RunError::Spawn {
            program: "buildah".into(),
            error: "No such file or directory".into(),
        };
        assert_eq!(err.exit_code(), None);
        assert!(err.to_string().contains("buildah"));
    }

    #[test]
    fn test_installer_error_chains_source() {
        use std::error::Error as _;
        let err = InstallerError::Packages {
            source: RunError::Fatal {
                code: 104,
                argv: vec!["zypper".into()],
            },
        };
        assert!(err.source().is_some());
    }
}
