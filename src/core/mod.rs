//! Core build logic
//!
//! Everything here talks to the outside world only through the
//! [`crate::infra::runner::Runner`] trait or the helpers in
//! [`crate::infra::filesystem`].
//!
//! # Submodules
//!
//! - [`model`] - Repos, modules, commands and copy-files from the config
//! - [`config`] - Image config file parsing
//! - [`args`] - Merging CLI overrides with config options
//! - [`installer`] - Package-manager installer with dnf and zypper backends
//! - [`scanner`] - OpenSCAP compliance scanning
//! - [`ansible`] - Inventory generation for ansible layers
//! - [`publish`] - Labelling, committing and pushing the finished image
//! - [`layer`] - The build pipeline

pub mod ansible;
pub mod args;
pub mod config;
pub mod installer;
pub mod layer;
pub mod model;
pub mod publish;
pub mod scanner;
