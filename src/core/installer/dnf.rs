//! dnf backend

use super::{Backend, BackendContext, PackageManager};
use crate::core::model::{ModuleRequest, Repo};

/// dnf argument builder
#[derive(Debug, Clone, Copy, Default)]
pub struct Dnf;

impl Dnf {
    /// Options every dnf invocation carries
    fn base(ctx: &BackendContext<'_>) -> Vec<String> {
        let mut args = vec![
            "dnf".to_string(),
            format!("--setopt=reposdir={}", ctx.repo_dir.display()),
        ];
        if let Some(scratch) = ctx.scratch {
            args.push(format!("--setopt=logdir={}", scratch.join("log").display()));
            args.push(format!(
                "--setopt=cachedir={}",
                scratch.join("cache").display()
            ));
        }
        if let Some(proxy) = ctx.proxy {
            args.push(format!("--setopt=proxy={proxy}"));
        }
        args
    }

    fn install_flags(ctx: &BackendContext<'_>, args: &mut Vec<String>) {
        args.push("-y".to_string());
        if !ctx.gpgcheck {
            args.push("--nogpgcheck".to_string());
        }
        if let Some(root) = ctx.install_root {
            args.push("--installroot".to_string());
            args.push(root.display().to_string());
        }
    }
}

impl PackageManager for Dnf {
    fn backend(&self) -> Backend {
        Backend::Dnf
    }

    fn add_repo(&self, ctx: &BackendContext<'_>, repo: &Repo) -> Vec<String> {
        let mut args = Self::base(ctx);
        args.extend(
            ["config-manager", "--save", "--add-repo", repo.url.as_str()]
                .iter()
                .map(ToString::to_string),
        );
        args
    }

    fn bind_proxy(
        &self,
        ctx: &BackendContext<'_>,
        repo_name: &str,
        proxy: &str,
    ) -> Option<Vec<String>> {
        let mut args = Self::base(ctx);
        args.push("config-manager".to_string());
        args.push("--save".to_string());
        args.push(format!("--setopt=*.proxy={proxy}"));
        args.push(repo_name.to_string());
        Some(args)
    }

    fn module(&self, ctx: &BackendContext<'_>, request: &ModuleRequest) -> Option<Vec<String>> {
        let mut args = Self::base(ctx);
        args.push("module".to_string());
        args.push(request.action.to_string());
        Self::install_flags(ctx, &mut args);
        args.extend(request.modules.iter().cloned());
        Some(args)
    }

    fn install_groups(&self, ctx: &BackendContext<'_>, groups: &[String]) -> Option<Vec<String>> {
        let mut args = Self::base(ctx);
        args.push("groupinstall".to_string());
        Self::install_flags(ctx, &mut args);
        args.extend(groups.iter().cloned());
        Some(args)
    }

    fn install(&self, ctx: &BackendContext<'_>, packages: &[String]) -> Vec<String> {
        let mut args = Self::base(ctx);
        args.push("install".to_string());
        Self::install_flags(ctx, &mut args);
        args.extend(packages.iter().cloned());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ModuleAction;
    use std::path::Path;

    fn scratch_ctx<'a>(proxy: Option<&'a str>) -> BackendContext<'a> {
        BackendContext {
            repo_dir: Path::new("/mnt/root/.pkg_repos/yum.repos.d"),
            install_root: Some(Path::new("/mnt")),
            scratch: Some(Path::new("/tmp/ib")),
            proxy,
            gpgcheck: false,
        }
    }

    #[test]
    fn test_add_repo() {
        let args = Dnf.add_repo(&scratch_ctx(None), &Repo::new("r1", "http://x/repo"));
        assert_eq!(
            args,
            vec![
                "dnf",
                "--setopt=reposdir=/mnt/root/.pkg_repos/yum.repos.d",
                "--setopt=logdir=/tmp/ib/log",
                "--setopt=cachedir=/tmp/ib/cache",
                "config-manager",
                "--save",
                "--add-repo",
                "http://x/repo"
            ]
        );
    }

    #[test]
    fn test_add_repo_with_proxy() {
        let args = Dnf.add_repo(&scratch_ctx(Some("http://p:3128")), &Repo::new("r1", "http://x"));
        assert!(args.contains(&"--setopt=proxy=http://p:3128".to_string()));
    }

    #[test]
    fn test_bind_proxy_targets_repo_name() {
        let args = Dnf
            .bind_proxy(&scratch_ctx(None), "x_repo", "http://p:3128")
            .unwrap();
        assert_eq!(args[args.len() - 2], "--setopt=*.proxy=http://p:3128");
        assert_eq!(args.last().unwrap(), "x_repo");
    }

    #[test]
    fn test_install_into_root_without_gpgcheck() {
        let args = Dnf.install(&scratch_ctx(None), &["curl".to_string(), "vim".to_string()]);
        let tail: Vec<&str> = args[4..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec!["install", "-y", "--nogpgcheck", "--installroot", "/mnt", "curl", "vim"]
        );
    }

    #[test]
    fn test_install_in_container_keeps_gpgcheck() {
        let ctx = BackendContext {
            repo_dir: Path::new("/etc/yum.repos.d"),
            install_root: None,
            scratch: None,
            proxy: None,
            gpgcheck: true,
        };
        let args = Dnf.install(&ctx, &["curl".to_string()]);
        assert_eq!(
            args,
            vec!["dnf", "--setopt=reposdir=/etc/yum.repos.d", "install", "-y", "curl"]
        );
    }

    #[test]
    fn test_module_subcommand() {
        let request = ModuleRequest {
            action: ModuleAction::Enable,
            modules: vec!["nodejs:20".to_string()],
        };
        let args = Dnf.module(&scratch_ctx(None), &request).unwrap();
        assert_eq!(args[4], "module");
        assert_eq!(args[5], "enable");
        assert_eq!(args.last().unwrap(), "nodejs:20");
    }

    #[test]
    fn test_group_install() {
        let args = Dnf
            .install_groups(&scratch_ctx(None), &["Minimal Install".to_string()])
            .unwrap();
        assert_eq!(args[4], "groupinstall");
        assert_eq!(args.last().unwrap(), "Minimal Install");
    }
}
