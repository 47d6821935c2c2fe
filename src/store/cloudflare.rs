//! Cloudflare Zero Trust Gateway backend.
//!
//! Lists live under `/accounts/<id>/gateway/lists`, DNS policies under
//! `/accounts/<id>/gateway/rules`. A policy references lists through its
//! `traffic` expression (`any(dns.domains[*] in $<list-id>) or ...`), which is
//! also where the referenced list ids are read back from.

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{ListStore, RemoteList, RemotePolicy};
use crate::config::SecureString;
use crate::error::SyncError;
use crate::normalizer::CanonicalDomain;

const API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Creating a 1000-item list can take a while on Cloudflare's side
const TIMEOUT_SECS: u64 = 60;

static LIST_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([0-9A-Za-z\-]+)").expect("list reference pattern is valid"));

/// Cloudflare API response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListRecord {
    id: String,
    name: String,
    #[serde(default)]
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RuleRecord {
    id: String,
    name: String,
    #[serde(default)]
    traffic: String,
}

#[derive(Debug, Serialize)]
struct NewList<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    description: &'static str,
    items: Vec<ListItem<'a>>,
}

#[derive(Debug, Serialize)]
struct ListItem<'a> {
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct RuleBody<'a> {
    name: &'a str,
    description: &'static str,
    action: &'static str,
    enabled: bool,
    filters: [&'static str; 1],
    traffic: String,
}

impl<'a> RuleBody<'a> {
    fn block(name: &'a str, list_ids: &[String]) -> Self {
        Self {
            name,
            description: "Block ads",
            action: "block",
            enabled: true,
            filters: ["dns"],
            traffic: traffic_expression(list_ids),
        }
    }
}

/// Build the DNS traffic expression matching any of `list_ids`
pub(crate) fn traffic_expression(list_ids: &[String]) -> String {
    list_ids
        .iter()
        .map(|id| format!("any(dns.domains[*] in ${})", id))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Extract the list ids a traffic expression references
pub(crate) fn referenced_list_ids(traffic: &str) -> Vec<String> {
    LIST_REFERENCE
        .captures_iter(traffic)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Unwrap an envelope, turning `success: false` into an API error
fn unwrap_envelope<T>(status: u16, envelope: Envelope<T>) -> Result<Option<T>> {
    if !envelope.success {
        let message = if envelope.errors.is_empty() {
            "request failed without error details".to_string()
        } else {
            envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ")
        };
        return Err(SyncError::Api { status, message }.into());
    }
    Ok(envelope.result)
}

/// HTTP client for the Gateway API
#[derive(Debug)]
pub struct CloudflareStore {
    client: Client,
    base_url: String,
    token: SecureString,
}

impl CloudflareStore {
    /// Create a store for `account_id` against the public API
    pub fn new(account_id: &str, token: SecureString) -> Result<Self> {
        Self::with_api_base(API_BASE, account_id, token)
    }

    /// Create a store against a custom API base URL
    pub fn with_api_base(api_base: &str, account_id: &str, token: SecureString) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(format!("gateway-adblock/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/accounts/{}/gateway",
                api_base.trim_end_matches('/'),
                account_id
            ),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a request and decode the envelope's `result`
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        let response = request
            .bearer_auth(self.token.as_str())
            .send()
            .await
            .context("Cloudflare request failed")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read Cloudflare response")?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(e).context("Failed to decode Cloudflare response");
            }
            // Error pages are not always JSON; surface the status instead
            Err(_) => {
                return Err(SyncError::Api {
                    status: status.as_u16(),
                    message: status.canonical_reason().unwrap_or("unknown").to_string(),
                }
                .into())
            }
        };

        if !status.is_success() && envelope.success {
            return Err(SyncError::Api {
                status: status.as_u16(),
                message: "unexpected status".to_string(),
            }
            .into());
        }

        unwrap_envelope(status.as_u16(), envelope)
    }
}

#[async_trait]
impl ListStore for CloudflareStore {
    async fn list_lists(&self, prefix: &str) -> Result<Vec<RemoteList>> {
        let records: Vec<ListRecord> = self
            .send(self.client.get(self.url("lists")))
            .await?
            .unwrap_or_default();

        Ok(records
            .into_iter()
            .filter(|record| record.name.starts_with(prefix))
            .map(|record| RemoteList {
                id: record.id,
                name: record.name,
                count: record.count.unwrap_or(0),
            })
            .collect())
    }

    async fn create_list(&self, name: &str, domains: &[CanonicalDomain]) -> Result<RemoteList> {
        let body = NewList {
            name,
            kind: "DOMAIN",
            description: "Created by gateway-adblock",
            items: domains
                .iter()
                .map(|domain| ListItem {
                    value: domain.as_str(),
                })
                .collect(),
        };

        let record: ListRecord = self
            .send(self.client.post(self.url("lists")).json(&body))
            .await
            .with_context(|| format!("Failed to create list {}", name))?
            .with_context(|| format!("Cloudflare returned no list for {}", name))?;

        debug!("Created list {} - ID:{}", record.name, record.id);
        Ok(RemoteList {
            id: record.id,
            name: record.name,
            count: record.count.unwrap_or(domains.len()),
        })
    }

    async fn delete_list(&self, name: &str, id: &str) -> Result<()> {
        self.send::<serde_json::Value>(self.client.delete(self.url(&format!("lists/{}", id))))
            .await
            .with_context(|| format!("Failed to delete list {} ({})", name, id))?;
        Ok(())
    }

    async fn list_policies(&self, prefix: &str) -> Result<Vec<RemotePolicy>> {
        let records: Vec<RuleRecord> = self
            .send(self.client.get(self.url("rules")))
            .await?
            .unwrap_or_default();

        Ok(records
            .into_iter()
            .filter(|record| record.name.starts_with(prefix))
            .map(|record| RemotePolicy {
                list_ids: referenced_list_ids(&record.traffic),
                id: record.id,
                name: record.name,
            })
            .collect())
    }

    async fn create_policy(&self, name: &str, list_ids: &[String]) -> Result<String> {
        let body = RuleBody::block(name, list_ids);
        let record: RuleRecord = self
            .send(self.client.post(self.url("rules")).json(&body))
            .await
            .with_context(|| format!("Failed to create policy {}", name))?
            .with_context(|| format!("Cloudflare returned no policy for {}", name))?;
        Ok(record.id)
    }

    async fn update_policy(&self, name: &str, id: &str, list_ids: &[String]) -> Result<()> {
        let body = RuleBody::block(name, list_ids);
        self.send::<serde_json::Value>(
            self.client
                .put(self.url(&format!("rules/{}", id)))
                .json(&body),
        )
        .await
        .with_context(|| format!("Failed to update policy {}", name))?;
        Ok(())
    }

    async fn delete_policy(&self, prefix: &str) -> Result<usize> {
        let policies = self.list_policies(prefix).await?;
        for policy in &policies {
            info!("Deleting policy {} - ID:{}", policy.name, policy.id);
            self.send::<serde_json::Value>(
                self.client
                    .delete(self.url(&format!("rules/{}", policy.id))),
            )
            .await
            .with_context(|| format!("Failed to delete policy {}", policy.name))?;
        }
        Ok(policies.len())
    }
}
