//! Ansible layer inventory
//!
//! A built container becomes one inventory host reached through the
//! `buildah` connection plugin. The playbook run itself is delegated to a
//! [`PlaybookRunner`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::PlaybookError;

/// One container registered as an inventory host
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryHost {
    /// Container id
    pub name: String,
    pub groups: Vec<String>,
    pub playbooks: Vec<String>,
    pub vars: BTreeMap<String, Value>,
}

impl InventoryHost {
    /// Host variables including the connection setting
    pub fn host_vars(&self) -> Map<String, Value> {
        let mut vars: Map<String, Value> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.insert("ansible_connection".to_string(), json!("buildah"));
        vars
    }
}

/// Runs playbooks against a set of container hosts
#[async_trait]
pub trait PlaybookRunner: Send + Sync {
    /// Apply every host's playbooks, limited to those hosts
    ///
    /// `inventory` lists extra inventory sources merged with the generated
    /// one.
    async fn run_playbooks(
        &self,
        hosts: &[InventoryHost],
        inventory: &[String],
        verbosity: u8,
    ) -> Result<(), PlaybookError>;
}

/// YAML/JSON inventory document for `hosts`
///
/// Every host sits under `all` with its variables and is listed under each
/// of its groups.
pub fn inventory_document(hosts: &[InventoryHost]) -> Value {
    let mut all_hosts = Map::new();
    let mut children: BTreeMap<&str, Map<String, Value>> = BTreeMap::new();

    for host in hosts {
        all_hosts.insert(host.name.clone(), Value::Object(host.host_vars()));
        for group in &host.groups {
            children
                .entry(group.as_str())
                .or_default()
                .insert(host.name.clone(), json!({}));
        }
    }

    let children: Map<String, Value> = children
        .into_iter()
        .map(|(group, members)| (group.to_string(), json!({ "hosts": members })))
        .collect();

    json!({
        "all": {
            "hosts": all_hosts,
            "children": children,
        }
    })
}

/// Playbooks of all hosts, first occurrence order, without duplicates
pub fn playbook_list(hosts: &[InventoryHost]) -> Vec<String> {
    let mut playbooks: Vec<String> = Vec::new();
    for playbook in hosts.iter().flat_map(|h| h.playbooks.iter()) {
        if !playbooks.contains(playbook) {
            playbooks.push(playbook.clone());
        }
    }
    playbooks
}

/// `-v` flag for a verbosity level, none for 0
pub fn verbosity_flag(verbosity: u8) -> Option<String> {
    (verbosity > 0).then(|| format!("-{}", "v".repeat(usize::from(verbosity))))
}
