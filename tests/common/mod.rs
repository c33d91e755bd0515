//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test workspace context
///
/// Creates a temporary directory holding image configs and provides
/// utilities for running image-build against them.
pub struct TestProject {
    /// Temporary directory for the test workspace
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test workspace in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test workspace directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test workspace
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Read a file from the test workspace
    #[allow(dead_code)]
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Run the image-build binary in the workspace
    #[allow(dead_code)]
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_image-build"))
            .current_dir(self.path())
            .env_remove("RUST_LOG")
            .env_remove("IMAGE_BUILD_CONFIG")
            .env_remove("IMAGE_BUILD_LOG_LEVEL")
            .args(args)
            .output()
            .expect("Failed to execute image-build")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Sample base layer config for testing
#[allow(dead_code)]
pub const SAMPLE_BASE_CONFIG: &str = r#"
options:
  layer_type: base
  name: rocky-base
  publish_tags:
    - "9.4"
  pkg_manager: dnf
  parent: scratch
  publish_local: true

repos:
  - alias: rocky-baseos
    url: https://dl.rockylinux.org/pub/rocky/9/BaseOS/x86_64/os
    gpg: https://dl.rockylinux.org/pub/rocky/RPM-GPG-KEY-Rocky-9

package_groups:
  - Minimal Install

packages:
  - kernel
  - dracut-live

cmds:
  - cmd: dracut --add "dmsquash-live livenet" --regenerate-all -f
    loglevel: INFO
"#;

/// Sample ansible layer config for testing
#[allow(dead_code)]
pub const SAMPLE_ANSIBLE_CONFIG: &str = r"
options:
  layer_type: ansible
  name: compute
  parent: registry.local/openchami/rocky-base:9.4
  groups:
    - compute
  playbooks: playbooks/compute.yaml
  inventory:
    - inventory/
  vars:
    cluster_name: demo
  ansible_verbosity: 1
  publish_registry: registry.local/openchami
";
