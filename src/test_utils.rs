//! Test utilities
//!
//! Scripted stand-ins for the external collaborators plus proptest
//! generators.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::ansible::{InventoryHost, PlaybookRunner};
use crate::core::args::BuildArgs;
use crate::core::config::ImageConfig;
use crate::core::publish::Publisher;
use crate::error::{PlaybookError, PublishError, RunError};
use crate::infra::buildah::ContainerHandle;
use crate::infra::runner::{Invocation, Runner};

/// One scripted response
#[derive(Debug, Clone)]
struct Rule {
    needle: Vec<String>,
    code: i32,
    stdout: Vec<String>,
}

impl Rule {
    /// Every needle token appears in the argv, in order
    fn matches(&self, argv: &[String]) -> bool {
        let mut rest = argv.iter();
        self.needle
            .iter()
            .all(|token| rest.any(|arg| arg == token))
    }
}

/// Records every invocation and answers from a script
///
/// Unscripted invocations exit 0 with no output.
#[derive(Debug, Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<Vec<String>>>,
    rules: Mutex<Vec<Rule>>,
    interrupts: Mutex<Vec<(Rule, CancellationToken)>>,
}

impl FakeRunner {
    /// Create a runner with an empty script
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer invocations containing `needle` with `code` and `stdout`
    ///
    /// Earlier rules win.
    pub fn respond(&self, needle: &[&str], code: i32, stdout: &[&str]) {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.iter().map(ToString::to_string).collect(),
            code,
            stdout: stdout.iter().map(ToString::to_string).collect(),
        });
    }

    /// Cancel `token` when an invocation containing `needle` starts, then
    /// never finish that invocation
    pub fn interrupt_on(&self, needle: &[&str], token: &CancellationToken) {
        let rule = Rule {
            needle: needle.iter().map(ToString::to_string).collect(),
            code: 0,
            stdout: Vec::new(),
        };
        self.interrupts.lock().unwrap().push((rule, token.clone()));
    }

    /// Every argv seen so far, in order
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of invocations containing `needle`
    pub fn count(&self, needle: &[&str]) -> usize {
        let rule = Rule {
            needle: needle.iter().map(ToString::to_string).collect(),
            code: 0,
            stdout: Vec::new(),
        };
        self.calls().iter().filter(|argv| rule.matches(argv)).count()
    }

    /// Index of the first invocation containing `needle`
    pub fn position(&self, needle: &[&str]) -> Option<usize> {
        let rule = Rule {
            needle: needle.iter().map(ToString::to_string).collect(),
            code: 0,
            stdout: Vec::new(),
        };
        self.calls().iter().position(|argv| rule.matches(argv))
    }
}

#[async_trait]
impl Runner for FakeRunner {
    async fn exec(&self, invocation: &Invocation) -> Result<i32, RunError> {
        if invocation.argv.is_empty() {
            return Err(RunError::EmptyCommand);
        }
        self.calls.lock().unwrap().push(invocation.argv.clone());

        let interrupt = self
            .interrupts
            .lock()
            .unwrap()
            .iter()
            .find(|(rule, _)| rule.matches(&invocation.argv))
            .map(|(_, token)| token.clone());
        if let Some(token) = interrupt {
            token.cancel();
            std::future::pending::<()>().await;
        }

        let rule = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|rule| rule.matches(&invocation.argv))
            .cloned();

        match rule {
            Some(rule) => {
                for line in rule.stdout {
                    invocation.stdout.accept(line);
                }
                Ok(rule.code)
            }
            None => Ok(0),
        }
    }
}

/// Publisher that records which containers it was handed
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<String>>,
}

impl RecordingPublisher {
    /// Create an empty publisher
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Container ids handed off so far
    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        container: &ContainerHandle,
        _args: &BuildArgs,
        _config: &ImageConfig,
    ) -> Result<(), PublishError> {
        self.published.lock().unwrap().push(container.id.clone());
        Ok(())
    }
}

/// Playbook runner that records hosts and returns a fixed result
#[derive(Debug, Default)]
pub struct FakePlaybooks {
    fail: bool,
    hosts: Mutex<Vec<InventoryHost>>,
}

impl FakePlaybooks {
    /// A runner whose playbooks always succeed
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A runner whose playbooks always fail
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            hosts: Mutex::default(),
        })
    }

    /// Hosts passed to the last run
    pub fn hosts(&self) -> Vec<InventoryHost> {
        self.hosts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaybookRunner for FakePlaybooks {
    async fn run_playbooks(
        &self,
        hosts: &[InventoryHost],
        _inventory: &[String],
        _verbosity: u8,
    ) -> Result<(), PlaybookError> {
        *self.hosts.lock().unwrap() = hosts.to_vec();
        if self.fail {
            return Err(PlaybookError::Failed {
                source: RunError::Fatal {
                    code: 2,
                    argv: vec!["ansible-playbook".to_string()],
                },
            });
        }
        Ok(())
    }
}

pub mod generators {
    use proptest::prelude::*;

    /// Generate a repository URL in one of the shapes seen in image configs
    pub fn repo_url() -> impl Strategy<Value = String> {
        (
            prop_oneof!["https", "http"],
            "[a-z]{3,10}",
            "[a-z]{2,5}",
            "[a-z0-9/_-]{0,30}",
            any::<bool>(),
        )
            .prop_map(|(scheme, domain, tld, path, repo_file)| {
                if repo_file {
                    format!("{scheme}://{domain}.{tld}/{path}/{domain}.repo")
                } else {
                    format!("{scheme}://{domain}.{tld}/{path}")
                }
            })
    }

    /// Generate a package name
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,30}[a-z0-9]?".prop_filter("Name must not be empty", |s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rule_matches_tokens_in_order() {
        let rule = Rule {
            needle: vec!["dnf".to_string(), "install".to_string()],
            code: 0,
            stdout: Vec::new(),
        };
        let argv: Vec<String> = ["dnf", "--setopt=x", "install", "-y"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert!(rule.matches(&argv));
        let reversed: Vec<String> = ["install", "dnf"].iter().map(ToString::to_string).collect();
        assert!(!rule.matches(&reversed));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_repo_url_generator(url in repo_url()) {
            prop_assert!(url.starts_with("http"));
        }

        #[test]
        fn test_package_name_generator(name in package_name()) {
            prop_assert!(!name.is_empty());
        }
    }
}
