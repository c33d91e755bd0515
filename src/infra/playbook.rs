//! ansible-playbook runner

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::defaults::PLAYBOOK_TOOL;
use crate::core::ansible::{inventory_document, playbook_list, verbosity_flag, InventoryHost, PlaybookRunner};
use crate::error::PlaybookError;
use crate::infra::runner::{Invocation, Runner};

/// [`PlaybookRunner`] invoking `ansible-playbook`
pub struct AnsiblePlaybook {
    runner: Arc<dyn Runner>,
}

impl std::fmt::Debug for AnsiblePlaybook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnsiblePlaybook").finish_non_exhaustive()
    }
}

impl AnsiblePlaybook {
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self { runner }
    }
}

/// `ansible-playbook` argv
pub fn playbook_args(
    hosts: &[InventoryHost],
    inventory: &[String],
    generated: &str,
    verbosity: u8,
) -> Vec<String> {
    let mut argv = vec![PLAYBOOK_TOOL.to_string()];
    for source in inventory.iter().map(String::as_str).chain([generated]) {
        argv.push("-i".to_string());
        argv.push(source.to_string());
    }
    argv.push("--limit".to_string());
    argv.push(
        hosts
            .iter()
            .map(|h| h.name.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );
    argv.extend(verbosity_flag(verbosity));
    argv.extend(playbook_list(hosts));
    argv
}

#[async_trait]
impl PlaybookRunner for AnsiblePlaybook {
    async fn run_playbooks(
        &self,
        hosts: &[InventoryHost],
        inventory: &[String],
        verbosity: u8,
    ) -> Result<(), PlaybookError> {
        if playbook_list(hosts).is_empty() {
            return Err(PlaybookError::NoPlaybooks {
                hosts: hosts.iter().map(|h| h.name.clone()).collect(),
            });
        }

        for host in hosts {
            tracing::info!("Vars for host {}:", host.name);
            let vars = serde_json::to_string_pretty(&host.host_vars())
                .map_err(|e| PlaybookError::Inventory {
                    error: e.to_string(),
                })?;
            tracing::info!("{vars}");
        }

        let inventory_error = |e: std::io::Error| PlaybookError::Inventory {
            error: e.to_string(),
        };
        let mut file = tempfile::Builder::new()
            .prefix("image-build-inventory-")
            .suffix(".json")
            .tempfile()
            .map_err(inventory_error)?;
        serde_json::to_writer_pretty(&mut file, &inventory_document(hosts)).map_err(|e| {
            PlaybookError::Inventory {
                error: e.to_string(),
            }
        })?;
        file.flush().map_err(inventory_error)?;

        let generated = file.path().display().to_string();
        let argv = playbook_args(hosts, inventory, &generated, verbosity);
        self.runner
            .run(&Invocation::new(argv))
            .await
            .map(|_| ())
            .map_err(|source| PlaybookError::Failed { source })
    }
}
