//! image-build - container image layer builder
//!
//! This library drives buildah, dnf/zypper, OpenSCAP and ansible-playbook to
//! build one container image layer from a declarative YAML config.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing
//! - [`core`] - Build pipeline, installer, scanner and publishing logic
//! - [`infra`] - Infrastructure layer (external processes, filesystem)
//! - [`config`] - Configuration constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
