//! Domain aggregation: deduplication, subdomain suppression and whitelist
//! subtraction.
//!
//! Block-lists are processed as a stream. A domain whose parent (or any
//! further ancestor) was already seen earlier in the stream is redundant:
//! blocking the ancestor blocks it too, so it is not stored. The check only
//! looks backwards, so a parent that appears *after* its child does not remove
//! the child. Output therefore depends on input order (first-seen-wins).

use std::collections::HashSet;
use tracing::info;

use crate::normalizer::{normalize, CanonicalDomain};
use crate::utils::format_count;

/// Whitelisted domains, matched literally (no hierarchical collapse).
pub type WhitelistDomainSet = HashSet<CanonicalDomain>;

/// Every domain accepted so far during one aggregation pass.
///
/// Created empty per run and threaded through [`collect_blocked`]; it grows
/// monotonically and is dropped with the run.
#[derive(Debug, Default)]
pub struct HigherLevelDomains {
    seen: HashSet<CanonicalDomain>,
}

impl HigherLevelDomains {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any proper ancestor of `domain` has been seen.
    pub fn covers(&self, domain: &CanonicalDomain) -> bool {
        domain.parents().any(|parent| self.seen.contains(parent))
    }

    /// Record `domain`. Returns false if it was already present.
    pub fn insert(&mut self, domain: CanonicalDomain) -> bool {
        self.seen.insert(domain)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

const LINE_BREAKS: &[char] = &['\r', '\n'];

/// Split a list body into lines, treating a lone `\r` as a line break too.
///
/// `\r\n` yields an empty line in between, which [`normalize`] rejects.
pub fn source_lines(body: &str) -> impl Iterator<Item = &str> {
    body.split(LINE_BREAKS)
}

/// Parse a whitelist body into a set of canonical domains.
pub fn build_whitelist(body: &str) -> WhitelistDomainSet {
    let whitelist: WhitelistDomainSet = source_lines(body).filter_map(normalize).collect();
    info!("Number of white domains: {}", format_count(whitelist.len()));
    whitelist
}

/// Fold a block-list body into the set of domains worth storing.
///
/// Every accepted line is recorded in `ancestors` before the next line is
/// read, whether or not it was kept.
pub fn collect_blocked(body: &str, ancestors: &mut HigherLevelDomains) -> HashSet<CanonicalDomain> {
    let mut blocked = HashSet::new();

    for domain in source_lines(body).filter_map(normalize) {
        if !ancestors.covers(&domain) {
            blocked.insert(domain.clone());
        }
        ancestors.insert(domain);
    }

    blocked
}

/// Remove whitelisted entries and sort lexicographically.
pub fn finalize(blocked: HashSet<CanonicalDomain>, whitelist: &WhitelistDomainSet) -> Vec<CanonicalDomain> {
    let mut domains: Vec<CanonicalDomain> = blocked
        .into_iter()
        .filter(|domain| !whitelist.contains(domain))
        .collect();
    domains.sort_unstable();
    domains
}

/// Build the final, sorted, deduplicated domain list for one group.
pub fn build_blocklist(body: &str, whitelist: &WhitelistDomainSet) -> Vec<CanonicalDomain> {
    let mut ancestors = HigherLevelDomains::new();
    let blocked = collect_blocked(body, &mut ancestors);
    info!("Number of block domains: {}", format_count(blocked.len()));

    let domains = finalize(blocked, whitelist);
    info!("Number of final domains: {}", format_count(domains.len()));

    domains
}
