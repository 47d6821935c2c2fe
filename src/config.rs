//! Configuration management for gateway-adblock.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::chunker::DEFAULT_CHUNK_SIZE;
use crate::error::SyncError;
use crate::reconciler::ReconcileSettings;
use crate::store::GroupNames;

/// Default environment variable for the API token
const TOKEN_ENV: &str = "CF_API_TOKEN";

/// Default environment variable for the account id
const ACCOUNT_ENV: &str = "CF_ACCOUNT_ID";

/// Gateway caps account lists at 300 lists of 1000 entries
pub const DEFAULT_MAX_DOMAINS: usize = 300_000;

const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 8;

/// Secure string type that zeroizes memory on drop
/// Used for the API token
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Group names end up inside remote object names, keep them plain
pub fn is_valid_group_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cloudflare account and credentials
    pub cloudflare: CloudflareConfig,

    /// Processing limits
    pub settings: Settings,

    /// Block-list groups, each synced to its own lists and policy
    pub groups: Vec<GroupConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cloudflare: CloudflareConfig::default(),
            settings: Settings::default(),
            groups: default_groups(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            anyhow::bail!(SyncError::Config("At least one group must be configured".to_string()));
        }

        let mut seen = HashSet::new();
        for group in &self.groups {
            if !is_valid_group_name(&group.name) {
                anyhow::bail!(SyncError::Config(format!(
                    "Invalid group name '{}'. Use letters, digits, '-' or '_' (max 64)",
                    group.name
                )));
            }
            if !seen.insert(group.name.as_str()) {
                anyhow::bail!(SyncError::Config(format!("Duplicate group name '{}'", group.name)));
            }
            if group.adlist_urls.is_empty() {
                anyhow::bail!(SyncError::Config(format!(
                    "Group '{}' has no adlist_urls",
                    group.name
                )));
            }
            for url in group.adlist_urls.iter().chain(&group.whitelist_urls) {
                if !url.starts_with("https://") {
                    anyhow::bail!(SyncError::Config(format!(
                        "Group '{}' URL must use HTTPS: {}",
                        group.name, url
                    )));
                }
            }
        }

        if !(1..=DEFAULT_CHUNK_SIZE).contains(&self.settings.chunk_size) {
            anyhow::bail!(SyncError::Config(format!(
                "Invalid chunk_size {}. Must be between 1 and {}",
                self.settings.chunk_size, DEFAULT_CHUNK_SIZE
            )));
        }

        if self.settings.max_domains == 0 {
            anyhow::bail!(SyncError::Config("max_domains must be at least 1".to_string()));
        }

        if self.settings.max_concurrent_requests == 0 {
            anyhow::bail!(SyncError::Config(
                "max_concurrent_requests must be at least 1".to_string()
            ));
        }

        Ok(())
    }

    /// Write the commented sample configuration to `path` atomically
    ///
    /// Uses tempfile + rename pattern to prevent corruption on crash.
    pub fn write_template<P: AsRef<Path>>(path: P) -> Result<()> {
        write_atomic(path.as_ref(), &Self::generate_default_yaml())
    }

    /// Generate default config with comments
    pub fn generate_default_yaml() -> String {
        include_str!("../templates/config.yaml").to_string()
    }

    /// Look up a configured group by name
    pub fn group(&self, name: &str) -> Option<&GroupConfig> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Groups to process: the named one, or all of them
    pub fn select_groups(&self, name: Option<&str>) -> Result<Vec<&GroupConfig>> {
        match name {
            Some(name) => {
                let group = self.group(name).ok_or_else(|| {
                    SyncError::Config(format!("Group '{}' is not configured", name))
                })?;
                Ok(vec![group])
            }
            None => Ok(self.groups.iter().collect()),
        }
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    use std::io::Write;
    use tempfile::NamedTempFile;

    // Create temporary file in the same directory for atomic rename
    let parent_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .context("Failed to create temporary file for config")?;

    temp_file.write_all(content.as_bytes())?;
    temp_file.as_file().sync_all()?;

    temp_file
        .persist(path)
        .with_context(|| format!("Failed to persist config file: {:?}", path))?;

    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CloudflareConfig {
    /// Account id, or set CF_ACCOUNT_ID
    pub account_id: String,
    /// Environment variable name to read the account id from (optional)
    pub account_id_env: Option<String>,
    /// API token with Zero Trust edit permission, or set CF_API_TOKEN
    /// Memory is securely zeroed when dropped
    pub api_token: SecureString,
    /// Environment variable name to read the token from (optional)
    pub api_token_env: Option<String>,
}

impl CloudflareConfig {
    /// Get the effective account id, checking env vars first
    pub fn get_account_id(&self) -> String {
        if let Some(ref env_name) = self.account_id_env {
            if let Ok(val) = env::var(env_name) {
                return val;
            }
        }
        if let Ok(val) = env::var(ACCOUNT_ENV) {
            return val;
        }
        self.account_id.clone()
    }

    /// Get the effective token, checking env vars first
    /// Returns a SecureString that will be zeroed when dropped
    pub fn get_api_token(&self) -> SecureString {
        if let Some(ref env_name) = self.api_token_env {
            if let Ok(val) = env::var(env_name) {
                return SecureString::new(val);
            }
        }
        if let Ok(val) = env::var(TOKEN_ENV) {
            return SecureString::new(val);
        }
        self.api_token.clone()
    }

    /// Account id and token, failing if either is missing
    pub fn credentials(&self) -> Result<(String, SecureString)> {
        let account_id = self.get_account_id();
        if account_id.trim().is_empty() {
            anyhow::bail!(SyncError::Credentials(format!(
                "no Cloudflare account id (set cloudflare.account_id or {})",
                ACCOUNT_ENV
            )));
        }
        let token = self.get_api_token();
        if token.is_empty() {
            anyhow::bail!(SyncError::Credentials(format!(
                "no Cloudflare API token (set cloudflare.api_token or {})",
                TOKEN_ENV
            )));
        }
        Ok((account_id.trim().to_string(), token))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Domains per remote list (Gateway maximum is 1000)
    pub chunk_size: usize,
    /// Refuse to sync lists larger than this
    pub max_domains: usize,
    /// Cap on simultaneous downloads and API calls per group
    pub max_concurrent_requests: usize,
    /// Lock file preventing concurrent runs
    pub lock_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_domains: DEFAULT_MAX_DOMAINS,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            lock_file: env::temp_dir().join("gateway-adblock.lock"),
        }
    }
}

impl From<&Settings> for ReconcileSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            chunk_size: settings.chunk_size,
            max_domains: settings.max_domains,
            max_concurrent_requests: settings.max_concurrent_requests,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    pub adlist_urls: Vec<String>,
    #[serde(default)]
    pub whitelist_urls: Vec<String>,
}

impl GroupConfig {
    pub fn names(&self) -> GroupNames {
        GroupNames::new(&self.name)
    }
}

fn default_groups() -> Vec<GroupConfig> {
    vec![GroupConfig {
        name: "default".to_string(),
        adlist_urls: vec![
            "https://adguardteam.github.io/AdGuardSDNSFilter/Filters/filter.txt".to_string(),
        ],
        whitelist_urls: Vec::new(),
    }]
}
