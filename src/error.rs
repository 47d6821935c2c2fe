//! Error types for gateway-adblock.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credentials: {0}")]
    Credentials(String),

    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Cloudflare API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Found {count} policies under '{prefix}', expected at most one")]
    PolicyCardinality { prefix: String, count: usize },
}
