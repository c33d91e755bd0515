//! Infrastructure layer
//!
//! Handles all I/O operations: external processes and the filesystem.
//! This module is the only place where side effects occur.

pub mod buildah;
pub mod filesystem;
pub mod playbook;
pub mod runner;
