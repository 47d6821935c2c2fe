//! Reconciliation of a computed domain list against the remote store.
//!
//! There is no local state: every run observes the remote lists under the
//! group's prefix and decides from their summed domain count alone.
//!
//! ```text
//! plan:  empty ─────────────────────────────► Skip(Empty)
//!        > max_domains ─────────────────────► Skip(Oversize)
//!        Σ remote counts == len ────────────► PolicyOnly
//!        otherwise ─────────────────────────► FullRebuild
//!
//! apply: PolicyOnly   0 policies → create      1 → nothing     n → fault
//!        FullRebuild  delete policy, delete lists, create chunks,
//!                     then 0 policies → create 1 → update      n → fault
//! ```
//!
//! Equal counts are taken to mean equal content. Out-of-band edits that keep
//! the count unchanged go unnoticed until the computed count moves.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{error, info, warn};

use crate::chunker::{chunk, chunk_count, DEFAULT_CHUNK_SIZE};
use crate::config::DEFAULT_MAX_DOMAINS;
use crate::error::SyncError;
use crate::normalizer::CanonicalDomain;
use crate::store::{GroupNames, ListStore, RemoteList, RemotePolicy};
use crate::utils::format_count;

/// Limits applied to one reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub chunk_size: usize,
    pub max_domains: usize,
    pub max_concurrent_requests: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_domains: DEFAULT_MAX_DOMAINS,
            max_concurrent_requests: 8,
        }
    }
}

/// Why a run stopped without touching the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing to block, most likely a broken source
    Empty,
    /// More domains than the account can hold
    Oversize { count: usize, limit: usize },
}

/// What a run will do, decided from read-only observations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Skip(SkipReason),
    /// Remote lists already hold the right number of domains
    PolicyOnly { lists: Vec<RemoteList> },
    /// Remote lists must be replaced
    FullRebuild {
        existing: Vec<RemoteList>,
        remote_count: usize,
        lists_to_create: usize,
    },
}

/// How the policy ended up pointing at the new lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyAction {
    Created(String),
    Updated(String),
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    /// Lists matched and the policy exists
    Unchanged,
    /// Lists matched but the policy was missing
    PolicyCreated { policy_id: String },
    Rebuilt {
        policies_deleted: usize,
        lists_deleted: usize,
        list_ids: Vec<String>,
        policy: PolicyAction,
    },
}

/// Result of tearing a group down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeardownReport {
    pub policies_deleted: usize,
    pub lists_deleted: usize,
}

/// Drives one group's remote lists and policy towards a domain list
pub struct Reconciler<'a, S: ListStore + ?Sized> {
    store: &'a S,
    names: GroupNames,
    settings: ReconcileSettings,
}

impl<'a, S: ListStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a S, names: GroupNames, settings: ReconcileSettings) -> Self {
        Self {
            store,
            names,
            settings,
        }
    }

    pub fn names(&self) -> &GroupNames {
        &self.names
    }

    /// Make the remote store mirror `domains`
    pub async fn reconcile(&self, domains: &[CanonicalDomain]) -> Result<Outcome> {
        let plan = self.plan(domains).await?;
        self.apply(plan, domains).await
    }

    /// Decide what to do without mutating anything
    pub async fn plan(&self, domains: &[CanonicalDomain]) -> Result<Plan> {
        let prefix = self.names.prefix();

        if domains.is_empty() {
            warn!("No domains found for {}, leaving remote lists untouched", prefix);
            return Ok(Plan::Skip(SkipReason::Empty));
        }

        if domains.len() > self.settings.max_domains {
            warn!(
                "{} has {} domains, more than the limit of {}, leaving remote lists untouched",
                prefix,
                format_count(domains.len()),
                format_count(self.settings.max_domains)
            );
            return Ok(Plan::Skip(SkipReason::Oversize {
                count: domains.len(),
                limit: self.settings.max_domains,
            }));
        }

        let lists = self
            .store
            .list_lists(prefix)
            .await
            .with_context(|| format!("Failed to list remote lists for {}", prefix))?;
        let remote_count: usize = lists.iter().map(|list| list.count).sum();
        info!(
            "{}: {} remote lists holding {} domains, {} computed",
            prefix,
            lists.len(),
            format_count(remote_count),
            format_count(domains.len())
        );

        if remote_count == domains.len() {
            Ok(Plan::PolicyOnly { lists })
        } else {
            Ok(Plan::FullRebuild {
                existing: lists,
                remote_count,
                lists_to_create: chunk_count(domains.len(), self.settings.chunk_size),
            })
        }
    }

    /// Carry out a plan produced by [`Reconciler::plan`]
    pub async fn apply(&self, plan: Plan, domains: &[CanonicalDomain]) -> Result<Outcome> {
        match plan {
            Plan::Skip(reason) => Ok(Outcome::Skipped(reason)),
            Plan::PolicyOnly { lists } => self.ensure_policy(&lists).await,
            Plan::FullRebuild { existing, .. } => self.rebuild(&existing, domains).await,
        }
    }

    /// Remove the group's policy and every list under its prefix
    pub async fn teardown(&self) -> Result<TeardownReport> {
        // Lists referenced by a policy cannot be deleted, so the policy goes first
        let policies_deleted = self
            .store
            .delete_policy(self.names.policy_name())
            .await
            .context("Failed to delete policy")?;
        info!("Deleted {} gateway policies", policies_deleted);

        let lists = self
            .store
            .list_lists(self.names.prefix())
            .await
            .context("Failed to list remote lists")?;
        let lists_deleted = self.delete_lists(&lists).await?;

        info!("Deletion completed for {}", self.names.prefix());
        Ok(TeardownReport {
            policies_deleted,
            lists_deleted,
        })
    }

    async fn ensure_policy(&self, lists: &[RemoteList]) -> Result<Outcome> {
        info!("{}: lists are the same size, checking policy", self.names.prefix());
        let policies = self.policies().await?;

        match policies.as_slice() {
            [] => {
                info!("No policy found, creating {}", self.names.policy_name());
                let ids: Vec<String> = lists.iter().map(|list| list.id.clone()).collect();
                let policy_id = self
                    .store
                    .create_policy(self.names.policy_name(), &ids)
                    .await
                    .context("Failed to create policy")?;
                Ok(Outcome::PolicyCreated { policy_id })
            }
            [_] => {
                info!("Policy already exists, nothing to do");
                Ok(Outcome::Unchanged)
            }
            many => Err(self.cardinality_fault(many.len())),
        }
    }

    async fn rebuild(&self, existing: &[RemoteList], domains: &[CanonicalDomain]) -> Result<Outcome> {
        let policies_deleted = self
            .store
            .delete_policy(self.names.policy_name())
            .await
            .context("Failed to delete policy")?;
        info!("Deleted {} gateway policies", policies_deleted);

        let lists_deleted = self.delete_lists(existing).await?;
        let created = self.create_lists(domains).await?;
        let list_ids: Vec<String> = created.into_iter().map(|list| list.id).collect();

        let policies = self.policies().await?;
        let policy = match policies.as_slice() {
            [] => {
                info!("Creating policy {}", self.names.policy_name());
                let id = self
                    .store
                    .create_policy(self.names.policy_name(), &list_ids)
                    .await
                    .context("Failed to create policy")?;
                PolicyAction::Created(id)
            }
            [policy] => {
                info!("Updating policy {} - ID:{}", policy.name, policy.id);
                self.store
                    .update_policy(self.names.policy_name(), &policy.id, &list_ids)
                    .await
                    .context("Failed to update policy")?;
                PolicyAction::Updated(policy.id.clone())
            }
            many => return Err(self.cardinality_fault(many.len())),
        };

        info!(
            "{}: synced {} domains into {} lists",
            self.names.prefix(),
            format_count(domains.len()),
            list_ids.len()
        );
        Ok(Outcome::Rebuilt {
            policies_deleted,
            lists_deleted,
            list_ids,
            policy,
        })
    }

    async fn policies(&self) -> Result<Vec<RemotePolicy>> {
        let policies = self
            .store
            .list_policies(self.names.prefix())
            .await
            .context("Failed to list policies")?;
        info!("Number of policies in Cloudflare: {}", policies.len());
        Ok(policies)
    }

    /// Delete lists concurrently, stopping at the first failure
    async fn delete_lists(&self, lists: &[RemoteList]) -> Result<usize> {
        stream::iter(lists.iter().map(|list| async move {
            info!("Deleting list {} - ID:{}", list.name, list.id);
            self.store
                .delete_list(&list.name, &list.id)
                .await
                .with_context(|| format!("Failed to delete list {}", list.name))
        }))
        .buffer_unordered(self.concurrency())
        .try_collect::<Vec<()>>()
        .await?;

        Ok(lists.len())
    }

    /// Create one list per chunk concurrently; ids come back in chunk order
    async fn create_lists(&self, domains: &[CanonicalDomain]) -> Result<Vec<RemoteList>> {
        stream::iter(
            chunk(domains, self.settings.chunk_size)
                .enumerate()
                .map(|(index, items)| {
                    let name = self.names.list_name(index);
                    async move {
                        info!("Creating list {}", name);
                        self.store
                            .create_list(&name, items)
                            .await
                            .with_context(|| format!("Failed to create list {}", name))
                    }
                }),
        )
        .buffered(self.concurrency())
        .try_collect()
        .await
    }

    fn concurrency(&self) -> usize {
        self.settings.max_concurrent_requests.max(1)
    }

    fn cardinality_fault(&self, count: usize) -> anyhow::Error {
        error!(
            "More than one policy found under {} ({}), refusing to guess",
            self.names.prefix(),
            count
        );
        SyncError::PolicyCardinality {
            prefix: self.names.prefix().to_string(),
            count,
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::{Call, MemoryStore};
    use crate::store::MockListStore;

    const GROUP: &str = "ads";

    fn domains(count: usize) -> Vec<CanonicalDomain> {
        let mut domains: Vec<CanonicalDomain> = (0..count)
            .map(|i| CanonicalDomain::parse(&format!("host{}.example.com", i)).unwrap())
            .collect();
        domains.sort();
        domains
    }

    fn reconciler(store: &MemoryStore) -> Reconciler<'_, MemoryStore> {
        Reconciler::new(store, GroupNames::new(GROUP), ReconcileSettings::default())
    }

    /// Store already holding `domains` in correctly sized lists
    fn synced_store(domains: &[CanonicalDomain]) -> (MemoryStore, Vec<String>) {
        let store = MemoryStore::new();
        let names = GroupNames::new(GROUP);
        let ids = chunk(domains, DEFAULT_CHUNK_SIZE)
            .enumerate()
            .map(|(i, c)| store.seed_list(&names.list_name(i), c.to_vec()))
            .collect();
        (store, ids)
    }

    fn is_mutation(call: &Call) -> bool {
        matches!(
            call,
            Call::CreateList(_)
                | Call::DeleteList(_)
                | Call::CreatePolicy(_)
                | Call::UpdatePolicy(_)
                | Call::DeletePolicy(_)
        )
    }

    #[tokio::test]
    async fn test_noop_when_counts_match_and_policy_exists() {
        let wanted = domains(1500);
        let (store, ids) = synced_store(&wanted);
        store.seed_policy("[AdBlock-ads] Block Ads", ids);

        let outcome = reconciler(&store).reconcile(&wanted).await.unwrap();

        assert_eq!(outcome, Outcome::Unchanged);
        assert!(store.calls().iter().all(|c| !is_mutation(c)));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_policy_created_when_counts_match_without_policy() {
        let wanted = domains(1500);
        let (store, ids) = synced_store(&wanted);

        let outcome = reconciler(&store).reconcile(&wanted).await.unwrap();

        assert!(matches!(outcome, Outcome::PolicyCreated { .. }));
        assert_eq!(store.calls(), vec![Call::CreatePolicy("[AdBlock-ads] Block Ads".to_string())]);
        let policies = store.policies();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].list_ids, ids);
    }

    #[tokio::test]
    async fn test_rebuild_2500_domains() {
        let store = MemoryStore::new();
        let old_a = store.seed_list("[AdBlock-ads] 1", domains(1000));
        let old_b = store.seed_list("[AdBlock-ads] 2", domains(200));
        store.seed_policy("[AdBlock-ads] Block Ads", vec![old_a.clone(), old_b.clone()]);
        store.seed_list("[AdBlock-other] 1", domains(10));

        let wanted = domains(2500);
        let outcome = reconciler(&store).reconcile(&wanted).await.unwrap();

        let Outcome::Rebuilt {
            policies_deleted,
            lists_deleted,
            list_ids,
            policy,
        } = outcome
        else {
            panic!("expected a rebuild");
        };
        assert_eq!(policies_deleted, 1);
        assert_eq!(lists_deleted, 2);
        assert_eq!(list_ids.len(), 3);
        assert!(matches!(policy, PolicyAction::Created(_)));

        let calls = store.calls();
        let created: Vec<&Call> = calls.iter().filter(|c| matches!(c, Call::CreateList(_))).collect();
        let deleted: Vec<&Call> = calls.iter().filter(|c| matches!(c, Call::DeleteList(_))).collect();
        assert_eq!(created.len(), 3);
        assert_eq!(deleted.len(), 2);
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::CreatePolicy(_))).count(),
            1
        );
        assert!(!calls.iter().any(|c| matches!(c, Call::UpdatePolicy(_))));

        // Old lists are gone, the other group is untouched
        let remaining = store.lists();
        assert!(!remaining.iter().any(|l| l.id == old_a || l.id == old_b));
        assert!(remaining.iter().any(|l| l.name == "[AdBlock-other] 1"));

        let policies = store.policies();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].list_ids, list_ids);
    }

    #[tokio::test]
    async fn test_rebuild_chunks_in_order() {
        let store = MemoryStore::new();
        let wanted = domains(2500);

        reconciler(&store).reconcile(&wanted).await.unwrap();

        let first = store.list_domains("[AdBlock-ads] 1").unwrap();
        let second = store.list_domains("[AdBlock-ads] 2").unwrap();
        let third = store.list_domains("[AdBlock-ads] 3").unwrap();
        assert_eq!(first.len(), 1000);
        assert_eq!(third.len(), 500);
        let rejoined: Vec<CanonicalDomain> = first.into_iter().chain(second).chain(third).collect();
        assert_eq!(rejoined, wanted);
    }

    #[tokio::test]
    async fn test_rebuild_policy_ids_follow_list_names() {
        let store = MemoryStore::new();
        let wanted = domains(2500);

        let outcome = reconciler(&store).reconcile(&wanted).await.unwrap();
        let Outcome::Rebuilt { list_ids, .. } = outcome else {
            panic!("expected a rebuild");
        };

        let lists = store.lists();
        let names: Vec<String> = list_ids
            .iter()
            .map(|id| lists.iter().find(|l| &l.id == id).unwrap().name.clone())
            .collect();
        assert_eq!(names, vec!["[AdBlock-ads] 1", "[AdBlock-ads] 2", "[AdBlock-ads] 3"]);
    }

    #[tokio::test]
    async fn test_rebuild_updates_policy_that_survived_deletion() {
        // A policy whose name carries the prefix but not the policy name is
        // not removed by the delete step and gets updated in place
        let store = MemoryStore::new();
        let survivor = store.seed_policy("[AdBlock-ads] Custom", Vec::new());

        let outcome = reconciler(&store).reconcile(&domains(10)).await.unwrap();

        let Outcome::Rebuilt { policy, list_ids, .. } = outcome else {
            panic!("expected a rebuild");
        };
        assert_eq!(policy, PolicyAction::Updated(survivor.clone()));
        let policies = store.policies();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].list_ids, list_ids);
        assert!(store.calls().contains(&Call::UpdatePolicy("[AdBlock-ads] Block Ads".to_string())));
    }

    #[tokio::test]
    async fn test_empty_list_skips_without_remote_calls() {
        let mut store = MockListStore::new();
        store.expect_list_lists().never();
        store.expect_list_policies().never();

        let reconciler = Reconciler::new(&store, GroupNames::new(GROUP), ReconcileSettings::default());
        let outcome = reconciler.reconcile(&[]).await.unwrap();

        assert_eq!(outcome, Outcome::Skipped(SkipReason::Empty));
    }

    #[tokio::test]
    async fn test_oversize_list_skips_without_remote_calls() {
        let mut store = MockListStore::new();
        store.expect_list_lists().never();

        let settings = ReconcileSettings {
            max_domains: 100,
            ..Default::default()
        };
        let reconciler = Reconciler::new(&store, GroupNames::new(GROUP), settings);
        let outcome = reconciler.reconcile(&domains(101)).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::Skipped(SkipReason::Oversize {
                count: 101,
                limit: 100
            })
        );
    }

    #[tokio::test]
    async fn test_exactly_max_domains_is_allowed() {
        let store = MemoryStore::new();
        let settings = ReconcileSettings {
            max_domains: 50,
            chunk_size: 20,
            ..Default::default()
        };
        let reconciler = Reconciler::new(&store, GroupNames::new(GROUP), settings);

        let outcome = reconciler.reconcile(&domains(50)).await.unwrap();

        let Outcome::Rebuilt { list_ids, .. } = outcome else {
            panic!("expected a rebuild");
        };
        assert_eq!(list_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_two_policies_fault_in_policy_only_path() {
        let wanted = domains(20);
        let (store, ids) = synced_store(&wanted);
        store.seed_policy("[AdBlock-ads] Block Ads", ids.clone());
        store.seed_policy("[AdBlock-ads] Block Ads", ids);

        let err = reconciler(&store).reconcile(&wanted).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::PolicyCardinality { count: 2, .. })
        ));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_two_policies_after_rebuild_fault_without_policy_write() {
        let mut store = MockListStore::new();
        store.expect_list_lists().times(1).returning(|_| Ok(Vec::new()));
        store.expect_delete_policy().times(1).returning(|_| Ok(0));
        store.expect_create_list().times(1).returning(|name, items| {
            Ok(RemoteList {
                id: "new-1".to_string(),
                name: name.to_string(),
                count: items.len(),
            })
        });
        store.expect_list_policies().times(1).returning(|prefix| {
            Ok((0..2)
                .map(|i| RemotePolicy {
                    id: format!("p{}", i),
                    name: format!("{} Block Ads", prefix),
                    list_ids: Vec::new(),
                })
                .collect())
        });
        store.expect_create_policy().never();
        store.expect_update_policy().never();

        let reconciler = Reconciler::new(&store, GroupNames::new(GROUP), ReconcileSettings::default());
        let err = reconciler.reconcile(&domains(5)).await.unwrap_err();

        match err.downcast_ref::<SyncError>() {
            Some(SyncError::PolicyCardinality { prefix, count }) => {
                assert_eq!(prefix, "[AdBlock-ads]");
                assert_eq!(*count, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_failure_stops_before_policy() {
        let store = MemoryStore::new();
        store.fail_create_list("[AdBlock-ads] 2");

        let err = reconciler(&store).reconcile(&domains(1500)).await.unwrap_err();

        assert!(format!("{:#}", err).contains("[AdBlock-ads] 2"));
        assert!(!store
            .calls()
            .iter()
            .any(|c| matches!(c, Call::CreatePolicy(_) | Call::UpdatePolicy(_))));
    }

    #[tokio::test]
    async fn test_delete_failure_stops_before_create() {
        let mut store = MockListStore::new();
        store.expect_list_lists().returning(|_| {
            Ok(vec![RemoteList {
                id: "old".to_string(),
                name: "[AdBlock-ads] 1".to_string(),
                count: 3,
            }])
        });
        store.expect_delete_policy().returning(|_| Ok(1));
        store
            .expect_delete_list()
            .returning(|_, _| Err(anyhow::anyhow!("list is in use")));
        store.expect_create_list().never();
        store.expect_create_policy().never();

        let reconciler = Reconciler::new(&store, GroupNames::new(GROUP), ReconcileSettings::default());
        let err = reconciler.reconcile(&domains(5)).await.unwrap_err();

        assert!(format!("{:#}", err).contains("list is in use"));
    }

    #[tokio::test]
    async fn test_plan_is_read_only() {
        let store = MemoryStore::new();
        store.seed_list("[AdBlock-ads] 1", domains(3));

        let plan = reconciler(&store).plan(&domains(2500)).await.unwrap();

        assert_eq!(
            plan,
            Plan::FullRebuild {
                existing: store.lists(),
                remote_count: 3,
                lists_to_create: 3,
            }
        );
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_removes_policy_and_lists() {
        let store = MemoryStore::new();
        let a = store.seed_list("[AdBlock-ads] 1", domains(5));
        let b = store.seed_list("[AdBlock-ads] 2", domains(5));
        store.seed_policy("[AdBlock-ads] Block Ads", vec![a, b]);
        store.seed_list("[AdBlock-other] 1", domains(5));

        let report = reconciler(&store).teardown().await.unwrap();

        assert_eq!(
            report,
            TeardownReport {
                policies_deleted: 1,
                lists_deleted: 2
            }
        );
        assert!(store.policies().is_empty());
        assert_eq!(store.lists().len(), 1);
        assert_eq!(
            store.calls()[0],
            Call::DeletePolicy("[AdBlock-ads] Block Ads".to_string())
        );
    }

    #[tokio::test]
    async fn test_teardown_of_empty_group() {
        let store = MemoryStore::new();
        let report = reconciler(&store).teardown().await.unwrap();
        assert_eq!(report, TeardownReport::default());
    }
}
