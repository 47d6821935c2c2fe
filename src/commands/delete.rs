//! Delete command implementation.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use super::{connect, load_config};
use crate::config::is_valid_group_name;
use crate::error::SyncError;
use crate::lock::LockGuard;
use crate::reconciler::{ReconcileSettings, Reconciler, TeardownReport};
use crate::store::{GroupNames, ListStore};

/// Run the delete command
///
/// The group does not have to be configured any more, so stale groups can
/// still be cleaned up after removing them from the config.
pub async fn run(group: &str, config_path: &Path) -> Result<()> {
    if !is_valid_group_name(group) {
        anyhow::bail!(SyncError::Config(format!("Invalid group name '{}'", group)));
    }

    let config = load_config(config_path)?;
    let store = connect(&config)?;
    let _lock = LockGuard::acquire(&config.settings.lock_file)?;

    info!("Deleting remote lists and policy of group {}", group);
    let report = delete_group(&store, group, ReconcileSettings::from(&config.settings)).await?;

    println!(
        "[OK] {}: removed {} lists and {} policies",
        group, report.lists_deleted, report.policies_deleted
    );
    Ok(())
}

/// Remove every remote object owned by `group`
pub async fn delete_group<S>(
    store: &S,
    group: &str,
    settings: ReconcileSettings,
) -> Result<TeardownReport>
where
    S: ListStore + ?Sized,
{
    Reconciler::new(store, GroupNames::new(group), settings)
        .teardown()
        .await
}
