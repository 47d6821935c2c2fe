//! HTTP fetcher for downloading block-lists and whitelists.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::error::SyncError;
use crate::utils::format_bytes;

const TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 2000;

/// Maximum size per source file (50 MB)
/// Large hosts files (OISD big, 1Hosts Xtra) stay well under 30 MB
const MAX_SOURCE_SIZE: usize = 50 * 1024 * 1024;

/// Maximum total size for all downloads of one process (200 MB)
const MAX_TOTAL_SIZE: usize = 200 * 1024 * 1024;

/// Trait for retrieving raw list text
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Download the body behind `url`
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// HTTP client for fetching lists
pub struct HttpFetcher {
    client: Client,
    /// Cumulative download size tracker (thread-safe for concurrent fetches)
    total_downloaded: AtomicUsize,
}

impl HttpFetcher {
    /// Create a new fetcher with default settings
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(format!("gateway-adblock/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            total_downloaded: AtomicUsize::new(0),
        })
    }

    /// Get the total bytes downloaded so far
    pub fn total_downloaded(&self) -> usize {
        self.total_downloaded.load(Ordering::Relaxed)
    }

    /// Fetch content with retry logic and size validation
    async fn fetch_with_retry(&self, url: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_DELAY_MS * (1 << (attempt - 1));
                debug!("Retry {} after {}ms for {}", attempt, delay, url);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        if let Some(content_length) = response.content_length() {
                            check_size(content_length as usize, self.total_downloaded())?;
                        }

                        let body = response
                            .text()
                            .await
                            .context("Failed to read response body")?;

                        let previous = self
                            .total_downloaded
                            .fetch_add(body.len(), Ordering::Relaxed);
                        check_size(body.len(), previous)?;

                        return Ok(body);
                    }
                    last_error = Some(anyhow::anyhow!("HTTP {}", response.status()));
                }
                Err(e) => {
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")))
    }
}

// Note: Default is intentionally not implemented for HttpFetcher
// because new() can fail and we want explicit error handling.

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let body = self.fetch_with_retry(url).await?;
        info!(
            "Downloaded file from {} File size: {}",
            url,
            format_bytes(body.len() as u64)
        );
        Ok(body)
    }
}

/// Reject a download of `size` bytes on top of `already` downloaded bytes
fn check_size(size: usize, already: usize) -> Result<()> {
    if size > MAX_SOURCE_SIZE {
        anyhow::bail!(
            "Response too large: {} bytes (max: {} bytes)",
            size,
            MAX_SOURCE_SIZE
        );
    }
    if already.saturating_add(size) > MAX_TOTAL_SIZE {
        anyhow::bail!(
            "Cumulative download limit exceeded: {} + {} > {} bytes",
            already,
            size,
            MAX_TOTAL_SIZE
        );
    }
    Ok(())
}

/// Fetch every URL and join the bodies in URL order.
///
/// Downloads run concurrently (at most `concurrency` at once). Any failure
/// fails the whole call: a partial body would silently unblock every domain
/// that only the missing source listed.
pub async fn fetch_all<F>(fetcher: &F, urls: &[String], concurrency: usize) -> Result<String>
where
    F: SourceFetcher + ?Sized,
{
    let bodies: Vec<String> = stream::iter(urls.iter().map(|url| async move {
        fetcher.fetch(url).await.map_err(|e| SyncError::Fetch {
            url: url.clone(),
            reason: format!("{:#}", e),
        })
    }))
    .buffered(concurrency.max(1))
    .try_collect()
    .await?;

    // Sources do not always end with a newline; keep their last and first
    // lines apart
    Ok(bodies.join("\n"))
}
