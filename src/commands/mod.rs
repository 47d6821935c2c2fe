//! CLI command implementations.

pub mod delete;
pub mod init;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::store::CloudflareStore;

/// Load the configuration file, naming it in the error
pub(crate) fn load_config(config_path: &Path) -> Result<Config> {
    Config::load(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))
}

/// Build the Cloudflare client from configured or environment credentials
pub(crate) fn connect(config: &Config) -> Result<CloudflareStore> {
    let (account_id, token) = config.cloudflare.credentials()?;
    CloudflareStore::new(&account_id, token)
}
