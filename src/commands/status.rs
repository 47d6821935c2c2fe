//! Status command implementation.

use anyhow::Result;
use std::path::Path;

use super::{connect, load_config};
use crate::store::{GroupNames, ListStore};
use crate::utils::format_count;

/// Remote state of one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStatus {
    pub name: String,
    pub lists: usize,
    pub domains: usize,
    pub policies: usize,
}

impl GroupStatus {
    /// Single-line state label
    pub fn state(&self) -> &'static str {
        match (self.lists, self.policies) {
            (0, 0) => "NOT SYNCED",
            (_, 1) if self.lists > 0 => "ACTIVE",
            (_, 0) => "NO POLICY",
            (0, _) => "NO LISTS",
            _ => "CONFLICT",
        }
    }
}

/// Run the status command
pub async fn run(group: Option<String>, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let groups = config.select_groups(group.as_deref())?;
    let store = connect(&config)?;

    println!();
    for group in groups {
        let status = collect(&store, &group.name).await?;
        println!("{}: {}", status.name, status.state());
        println!("  Lists: {}", status.lists);
        println!("  Domains: {}", format_count(status.domains));
        println!("  Policies: {}", status.policies);
        println!();
    }
    Ok(())
}

/// Read the remote lists and policies owned by `group`
pub async fn collect<S: ListStore + ?Sized>(store: &S, group: &str) -> Result<GroupStatus> {
    let names = GroupNames::new(group);
    let lists = store.list_lists(names.prefix()).await?;
    let policies = store.list_policies(names.prefix()).await?;

    Ok(GroupStatus {
        name: group.to_string(),
        lists: lists.len(),
        domains: lists.iter().map(|list| list.count).sum(),
        policies: policies.len(),
    })
}
