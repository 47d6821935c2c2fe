//! Remote list storage (Cloudflare Gateway lists and DNS policies).

mod cloudflare;

use anyhow::Result;
use async_trait::async_trait;

pub use cloudflare::CloudflareStore;

#[cfg(test)]
use mockall::automock;

use crate::normalizer::CanonicalDomain;

/// A named chunk of domains stored remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteList {
    pub id: String,
    pub name: String,
    pub count: usize,
}

/// A blocking policy referencing remote lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePolicy {
    pub id: String,
    pub name: String,
    pub list_ids: Vec<String>,
}

/// Remote names owned by one group.
///
/// Lists are `"[AdBlock-<group>] <n>"` (1-based) and the policy is
/// `"[AdBlock-<group>] Block Ads"`. These must stay byte-identical to what is
/// already stored remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupNames {
    prefix: String,
    policy: String,
}

impl GroupNames {
    pub fn new(group: &str) -> Self {
        let prefix = format!("[AdBlock-{}]", group);
        let policy = format!("{} Block Ads", prefix);
        Self { prefix, policy }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn policy_name(&self) -> &str {
        &self.policy
    }

    /// Name of the list holding chunk `index` (0-based).
    pub fn list_name(&self, index: usize) -> String {
        format!("{} {}", self.prefix, index + 1)
    }
}

/// Trait for remote list stores
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ListStore: Send + Sync {
    /// All lists whose name starts with `prefix`
    async fn list_lists(&self, prefix: &str) -> Result<Vec<RemoteList>>;

    /// Create a list holding `domains`
    async fn create_list(&self, name: &str, domains: &[CanonicalDomain]) -> Result<RemoteList>;

    /// Delete one list
    async fn delete_list(&self, name: &str, id: &str) -> Result<()>;

    /// All policies whose name starts with `prefix`
    async fn list_policies(&self, prefix: &str) -> Result<Vec<RemotePolicy>>;

    /// Create a policy blocking every list in `list_ids`, returning its id
    async fn create_policy(&self, name: &str, list_ids: &[String]) -> Result<String>;

    /// Point an existing policy at `list_ids`
    async fn update_policy(&self, name: &str, id: &str, list_ids: &[String]) -> Result<()>;

    /// Delete every policy whose name starts with `prefix`, returning how many
    async fn delete_policy(&self, prefix: &str) -> Result<usize>;
}
