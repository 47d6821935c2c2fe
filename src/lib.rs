//! # gateway-adblock - ad-blocking lists for Cloudflare Gateway
//!
//! Turns public hosts files and adblock filter lists into DNS blocking on
//! Cloudflare Zero Trust Gateway, without a local DNS server.
//!
//! ## Features
//!
//! - **Mixed syntax** - hosts files, `||domain^` filters and plain domain lists
//! - **Minimal lists** - subdomains of an already blocked domain are dropped
//! - **Whitelists** - per-group allow sources subtracted before upload
//! - **Stateless sync** - remote lists are only rewritten when the domain count moves
//! - **Groups** - independent list sets and policies per configured group
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     gateway-adblock                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: sync, delete, status, init, version        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! │    └── Credentials, settings, groups                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest + rustls)                                 │
//! │    └── Adlists and whitelists, retries, size limits         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Normalizer + Aggregator (regex, idna)                      │
//! │    └── Canonical domains, subdomain suppression, whitelist  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Chunker + Reconciler                                       │
//! │    └── 1000-domain lists, plan and apply                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Store (ListStore trait)                                    │
//! │    └── CloudflareStore (Gateway lists and rules API)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use gateway_adblock::aggregator::{build_blocklist, build_whitelist};
//! use gateway_adblock::config::Config;
//! use gateway_adblock::fetcher::{fetch_all, HttpFetcher};
//! use gateway_adblock::reconciler::{ReconcileSettings, Reconciler};
//! use gateway_adblock::store::CloudflareStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/gateway-adblock/config.yaml")?;
//!     let (account_id, token) = config.cloudflare.credentials()?;
//!     let store = CloudflareStore::new(&account_id, token)?;
//!     let fetcher = HttpFetcher::new()?;
//!
//!     for group in &config.groups {
//!         let whitelist = build_whitelist(&fetch_all(&fetcher, &group.whitelist_urls, 8).await?);
//!         let body = fetch_all(&fetcher, &group.adlist_urls, 8).await?;
//!         let domains = build_blocklist(&body, &whitelist);
//!
//!         let settings = ReconcileSettings::from(&config.settings);
//!         Reconciler::new(&store, group.names(), settings)
//!             .reconcile(&domains)
//!             .await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`aggregator`] - Blocklist and whitelist aggregation
//! - [`chunker`] - Splitting domain lists into remote-sized lists
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Typed errors
//! - [`fetcher`] - HTTP client for downloading lists
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`normalizer`] - Line to canonical domain conversion
//! - [`reconciler`] - Remote list and policy synchronization
//! - [`store`] - Remote list store abstraction and Cloudflare client
//! - [`utils`] - Formatting helpers

pub mod aggregator;
pub mod chunker;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod lock;
pub mod normalizer;
pub mod reconciler;
pub mod store;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use normalizer::{normalize, CanonicalDomain};
