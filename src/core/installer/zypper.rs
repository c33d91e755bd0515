//! zypper backend
//!
//! zypper has no per-repo proxy setting, no modules and no package groups.
//! Proxies are handed to it through the environment instead.

use super::{Backend, BackendContext, PackageManager};
use crate::core::model::{ModuleRequest, Repo};

/// zypper argument builder
#[derive(Debug, Clone, Copy, Default)]
pub struct Zypper;

impl PackageManager for Zypper {
    fn backend(&self) -> Backend {
        Backend::Zypper
    }

    fn add_repo(&self, ctx: &BackendContext<'_>, repo: &Repo) -> Vec<String> {
        vec![
            "zypper".to_string(),
            "-n".to_string(),
            "-D".to_string(),
            ctx.repo_dir.display().to_string(),
            "addrepo".to_string(),
            "-f".to_string(),
            "-p".to_string(),
            repo.priority().to_string(),
            repo.url.clone(),
            repo.alias.clone(),
        ]
    }

    fn bind_proxy(
        &self,
        _ctx: &BackendContext<'_>,
        _repo_name: &str,
        _proxy: &str,
    ) -> Option<Vec<String>> {
        None
    }

    fn module(&self, _ctx: &BackendContext<'_>, _request: &ModuleRequest) -> Option<Vec<String>> {
        None
    }

    fn install_groups(
        &self,
        _ctx: &BackendContext<'_>,
        _groups: &[String],
    ) -> Option<Vec<String>> {
        None
    }

    fn install(&self, ctx: &BackendContext<'_>, packages: &[String]) -> Vec<String> {
        let mut args = vec![
            "zypper".to_string(),
            "-n".to_string(),
            "-D".to_string(),
            ctx.repo_dir.display().to_string(),
        ];
        if let Some(scratch) = ctx.scratch {
            args.push("-C".to_string());
            args.push(scratch.join("cache").display().to_string());
        }
        if !ctx.gpgcheck {
            args.push("--no-gpg-checks".to_string());
        }
        if let Some(root) = ctx.install_root {
            args.push("--installroot".to_string());
            args.push(root.display().to_string());
        }
        args.push("install".to_string());
        args.push("-l".to_string());
        args.extend(packages.iter().cloned());
        args
    }

    fn proxy_env(&self, proxy: &str) -> Vec<(String, String)> {
        ["http_proxy", "https_proxy"]
            .iter()
            .map(|key| ((*key).to_string(), proxy.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn ctx() -> BackendContext<'static> {
        BackendContext {
            repo_dir: Path::new("/mnt/etc/zypp/repos.d"),
            install_root: Some(Path::new("/mnt")),
            scratch: Some(Path::new("/tmp/ib")),
            proxy: None,
            gpgcheck: false,
        }
    }

    #[test]
    fn test_add_repo_uses_priority() {
        let mut repo = Repo::new("oss", "https://download.opensuse.org/distribution/leap/15.5/repo/oss");
        repo.priority = Some(10);
        let args = Zypper.add_repo(&ctx(), &repo);
        assert_eq!(
            args,
            vec![
                "zypper",
                "-n",
                "-D",
                "/mnt/etc/zypp/repos.d",
                "addrepo",
                "-f",
                "-p",
                "10",
                "https://download.opensuse.org/distribution/leap/15.5/repo/oss",
                "oss"
            ]
        );
    }

    #[test]
    fn test_add_repo_default_priority() {
        let args = Zypper.add_repo(&ctx(), &Repo::new("oss", "http://x"));
        assert_eq!(args[7], "99");
    }

    #[test]
    fn test_install() {
        let args = Zypper.install(&ctx(), &["curl".to_string()]);
        assert_eq!(
            args,
            vec![
                "zypper",
                "-n",
                "-D",
                "/mnt/etc/zypp/repos.d",
                "-C",
                "/tmp/ib/cache",
                "--no-gpg-checks",
                "--installroot",
                "/mnt",
                "install",
                "-l",
                "curl"
            ]
        );
    }

    #[test]
    fn test_unsupported_operations() {
        assert!(Zypper.install_groups(&ctx(), &["base".to_string()]).is_none());
        assert!(Zypper.bind_proxy(&ctx(), "oss", "http://p").is_none());
    }

    #[test]
    fn test_proxy_env() {
        let env = Zypper.proxy_env("http://p:3128");
        assert_eq!(env.len(), 2);
        assert!(env.iter().all(|(_, v)| v == "http://p:3128"));
    }
}
