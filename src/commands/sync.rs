//! Sync command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{error, info};

use super::{connect, load_config};
use crate::aggregator::{build_blocklist, build_whitelist};
use crate::config::GroupConfig;
use crate::fetcher::{fetch_all, HttpFetcher, SourceFetcher};
use crate::lock::LockGuard;
use crate::normalizer::CanonicalDomain;
use crate::reconciler::{Outcome, Plan, PolicyAction, ReconcileSettings, Reconciler, SkipReason};
use crate::store::ListStore;
use crate::utils::format_count;

/// What happened to one group
#[derive(Debug)]
pub enum GroupReport {
    /// Dry run: the plan and the number of computed domains
    Planned { plan: Plan, domains: usize },
    Synced { outcome: Outcome, domains: usize },
}

/// Run the sync command
pub async fn run(group: Option<String>, dry_run: bool, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let groups = config.select_groups(group.as_deref())?;
    let store = connect(&config)?;

    // Dry runs only read, so they may overlap with a real run
    let _lock = if dry_run {
        None
    } else {
        Some(LockGuard::acquire(&config.settings.lock_file)?)
    };

    let fetcher = HttpFetcher::new()?;
    let settings = ReconcileSettings::from(&config.settings);

    let mut failed = Vec::new();
    for group in &groups {
        info!("Processing group {}", group.name);
        match sync_group(&fetcher, &store, group, settings, dry_run).await {
            Ok(report) => println!("{}", describe(&group.name, &report)),
            Err(e) => {
                error!("Group {} failed: {:#}", group.name, e);
                println!("[FAIL] {}: {:#}", group.name, e);
                failed.push(group.name.as_str());
            }
        }
    }

    info!(
        "Downloaded {} in total",
        crate::utils::format_bytes(fetcher.total_downloaded() as u64)
    );

    if !failed.is_empty() {
        anyhow::bail!(
            "{} of {} groups failed: {}",
            failed.len(),
            groups.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

/// Download a group's sources and compute its final domain list
pub async fn prepare_domains<F>(
    fetcher: &F,
    group: &GroupConfig,
    concurrency: usize,
) -> Result<Vec<CanonicalDomain>>
where
    F: SourceFetcher + ?Sized,
{
    // Both source sets download at once; the first failure cancels the other
    let (white_body, block_body) = futures::try_join!(
        async {
            fetch_all(fetcher, &group.whitelist_urls, concurrency)
                .await
                .context("Failed to download whitelists")
        },
        async {
            fetch_all(fetcher, &group.adlist_urls, concurrency)
                .await
                .context("Failed to download adlists")
        },
    )?;

    let whitelist = build_whitelist(&white_body);
    Ok(build_blocklist(&block_body, &whitelist))
}

/// Fetch, aggregate and reconcile one group
pub async fn sync_group<F, S>(
    fetcher: &F,
    store: &S,
    group: &GroupConfig,
    settings: ReconcileSettings,
    dry_run: bool,
) -> Result<GroupReport>
where
    F: SourceFetcher + ?Sized,
    S: ListStore + ?Sized,
{
    let domains = prepare_domains(fetcher, group, settings.max_concurrent_requests).await?;
    let reconciler = Reconciler::new(store, group.names(), settings);

    if dry_run {
        let plan = reconciler.plan(&domains).await?;
        return Ok(GroupReport::Planned {
            plan,
            domains: domains.len(),
        });
    }

    let outcome = reconciler.reconcile(&domains).await?;
    Ok(GroupReport::Synced {
        outcome,
        domains: domains.len(),
    })
}

/// One summary line per group
pub fn describe(group: &str, report: &GroupReport) -> String {
    match report {
        GroupReport::Planned { plan, domains } => {
            let action = match plan {
                Plan::Skip(reason) => format!("would skip ({})", describe_skip(reason)),
                Plan::PolicyOnly { lists } => {
                    format!("lists up to date ({} lists), would ensure policy", lists.len())
                }
                Plan::FullRebuild {
                    existing,
                    remote_count,
                    lists_to_create,
                } => format!(
                    "would replace {} lists ({} domains) with {}",
                    existing.len(),
                    format_count(*remote_count),
                    lists_to_create
                ),
            };
            format!("[DRY-RUN] {}: {} domains, {}", group, format_count(*domains), action)
        }
        GroupReport::Synced { outcome, domains } => {
            let (tag, action) = match outcome {
                Outcome::Skipped(reason) => ("[SKIP]", describe_skip(reason)),
                Outcome::Unchanged => ("[OK]", "unchanged".to_string()),
                Outcome::PolicyCreated { policy_id } => {
                    ("[OK]", format!("policy created ({})", policy_id))
                }
                Outcome::Rebuilt {
                    lists_deleted,
                    list_ids,
                    policy,
                    ..
                } => {
                    let policy = match policy {
                        PolicyAction::Created(_) => "created",
                        PolicyAction::Updated(_) => "updated",
                    };
                    (
                        "[OK]",
                        format!(
                            "replaced {} lists with {}, policy {}",
                            lists_deleted,
                            list_ids.len(),
                            policy
                        ),
                    )
                }
            };
            format!("{} {}: {} domains, {}", tag, group, format_count(*domains), action)
        }
    }
}

fn describe_skip(reason: &SkipReason) -> String {
    match reason {
        SkipReason::Empty => "no domains".to_string(),
        SkipReason::Oversize { count, limit } => format!(
            "{} domains exceed the limit of {}",
            format_count(*count),
            format_count(*limit)
        ),
    }
}
