//! Init command implementation.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;

/// Run the init command
pub fn run(force: bool, config_path: &Path) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file {:?} already exists (use --force to overwrite)",
            config_path
        );
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
    }

    Config::write_template(config_path)?;

    println!("[OK] Sample configuration written to {:?}", config_path);
    println!("Set CF_ACCOUNT_ID and CF_API_TOKEN, then run 'gateway-adblock sync'.");
    Ok(())
}
