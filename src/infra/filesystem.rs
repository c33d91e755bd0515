//! Filesystem operations
//!
//! Host-side edits to a mounted image root.

use std::path::{Component, Path, PathBuf};

use crate::config::defaults::{DNF_CONF, RESOLV_CONF};
use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Write content to a file
pub fn write_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Resolve an absolute in-image path against the mounted root
pub fn within_root(root: &Path, path: &Path) -> PathBuf {
    let relative: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    root.join(relative)
}

/// Add `reposdir=<dir>` to dnf.conf contents
///
/// Goes directly under an existing `[main]` header, or a new `[main]`
/// section is appended. Contents already declaring the directory are
/// returned unchanged.
pub fn declare_reposdir(contents: &str, repo_dir: &str) -> String {
    let entry = format!("reposdir={repo_dir}");
    if contents.lines().any(|line| line.trim() == entry) {
        return contents.to_string();
    }

    let mut out = String::with_capacity(contents.len() + entry.len() + 8);
    let mut inserted = false;
    for line in contents.lines() {
        out.push_str(line);
        out.push('\n');
        if !inserted && line.trim() == "[main]" {
            out.push_str(&entry);
            out.push('\n');
            inserted = true;
        }
    }
    if !inserted {
        out.push_str("[main]\n");
        out.push_str(&entry);
        out.push('\n');
    }
    out
}

/// Prepare a mounted root for dnf: create the repo directory and point
/// `etc/dnf/dnf.conf` at it
///
/// Returns the host path of the repo directory.
pub fn prepare_dnf_root(root: &Path, image_repo_dir: &Path) -> Result<PathBuf, FilesystemError> {
    let host_repo_dir = within_root(root, image_repo_dir);
    create_dir_all(&host_repo_dir)?;

    let conf = root.join(DNF_CONF);
    let contents = if conf.exists() {
        read_file(&conf)?
    } else {
        String::new()
    };
    let updated = declare_reposdir(&contents, &image_repo_dir.display().to_string());
    if updated != contents {
        write_file(&conf, &updated)?;
    }
    Ok(host_repo_dir)
}

/// Remove `etc/resolv.conf` from a mounted root if it is a symlink
///
/// A dangling resolver link breaks name resolution when the image runs.
pub fn remove_resolv_symlink(root: &Path) -> Result<bool, FilesystemError> {
    let path = root.join(RESOLV_CONF);
    match std::fs::symlink_metadata(&path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            std::fs::remove_file(&path).map_err(|e| FilesystemError::RemoveFile {
                path: path.clone(),
                error: e.to_string(),
            })?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_within_root_strips_leading_separator() {
        assert_eq!(
            within_root(Path::new("/mnt/c1"), Path::new("/root/.pkg_repos/yum.repos.d")),
            PathBuf::from("/mnt/c1/root/.pkg_repos/yum.repos.d")
        );
    }

    #[test]
    fn test_declare_reposdir_under_main() {
        let out = declare_reposdir("[main]\ngpgcheck=1\n", "/r");
        assert_eq!(out, "[main]\nreposdir=/r\ngpgcheck=1\n");
    }

    #[test]
    fn test_declare_reposdir_appends_section() {
        assert_eq!(declare_reposdir("", "/r"), "[main]\nreposdir=/r\n");
        assert_eq!(
            declare_reposdir("[other]\nx=1\n", "/r"),
            "[other]\nx=1\n[main]\nreposdir=/r\n"
        );
    }

    #[test]
    fn test_declare_reposdir_is_idempotent() {
        let once = declare_reposdir("[main]\n", "/r");
        assert_eq!(declare_reposdir(&once, "/r"), once);
    }

    #[test]
    fn test_prepare_dnf_root() {
        let root = TempDir::new().unwrap();
        let repo_dir = Path::new("/root/.pkg_repos/yum.repos.d");

        let host = prepare_dnf_root(root.path(), repo_dir).unwrap();
        prepare_dnf_root(root.path(), repo_dir).unwrap();

        assert!(host.is_dir());
        let conf = read_file(&root.path().join(DNF_CONF)).unwrap();
        assert_eq!(conf, "[main]\nreposdir=/root/.pkg_repos/yum.repos.d\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_resolv_symlink() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("etc")).unwrap();
        std::os::unix::fs::symlink("/run/systemd/resolve/stub-resolv.conf", root.path().join(RESOLV_CONF))
            .unwrap();

        assert!(remove_resolv_symlink(root.path()).unwrap());
        assert!(!root.path().join(RESOLV_CONF).exists());
        assert!(!remove_resolv_symlink(root.path()).unwrap());
    }

    #[test]
    fn test_regular_resolv_conf_is_kept() {
        let root = TempDir::new().unwrap();
        write_file(&root.path().join(RESOLV_CONF), "nameserver 1.1.1.1\n").unwrap();
        assert!(!remove_resolv_symlink(root.path()).unwrap());
        assert!(root.path().join(RESOLV_CONF).exists());
    }
}
