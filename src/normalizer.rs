//! Line normalization for hosts-file and adblock-filter syntax.
//!
//! Every raw line of a block-list or whitelist goes through [`normalize`],
//! which either produces a [`CanonicalDomain`] or rejects the line. Rejections
//! are expected: real-world lists are full of comments, cosmetic filters,
//! IP literals and other entries that are not plain domains.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;

/// Hosts-file address prefix (`0.0.0.0 `, `::1 `) or adblock anchor markers.
static PREFIX_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(([0-9.]+|[0-9a-fA-F:.]+)\s+|\|\||@@\|\||\*\.|\*)")
        .expect("prefix pattern is valid")
});

static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9]|[a-z0-9][a-z0-9\-]*[a-z0-9])(\.([a-z0-9]|[a-z0-9][a-z0-9\-]*[a-z0-9]))*$")
        .expect("domain pattern is valid")
});

static IPV4_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}$")
        .expect("ipv4 pattern is valid")
});

/// Comment markers that disqualify a whole line.
const COMMENT_MARKERS: [char; 3] = ['#', '!', '/'];

const MAX_LABEL_LEN: usize = 63;
const MAX_DOMAIN_LEN: usize = 253;

/// A validated, lower-cased, IDNA-encoded domain name.
///
/// Only obtainable through [`normalize`] (or [`CanonicalDomain::parse`]),
/// so holding one guarantees the value matches the domain grammar and is
/// not an IPv4 literal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CanonicalDomain(String);

impl CanonicalDomain {
    /// Normalize a raw line into a canonical domain.
    pub fn parse(line: &str) -> Option<Self> {
        normalize(line)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Every proper suffix of the domain, immediate parent first.
    ///
    /// `ads.tracker.example.com` yields `tracker.example.com`, `example.com`, `com`.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.0.match_indices('.').map(move |(i, _)| &self.0[i + 1..])
    }
}

impl fmt::Display for CanonicalDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CanonicalDomain {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Convert one raw list line into a canonical domain, or reject it.
///
/// Steps, each a rejection point:
/// 1. empty lines and lines starting with `#`, `!` or `/` are comments
/// 2. lower-case, trim, cut at the first `#` and then the first `^`, drop `\r`
/// 3. strip one leading hosts-file address or `||`, `@@||`, `*.`, `*` marker
/// 4. IDNA-encode non-ASCII names; ASCII passes through untouched
/// 5. match the domain grammar and DNS length limits, refuse dotted-quad
///    IPv4 literals
pub fn normalize(line: &str) -> Option<CanonicalDomain> {
    if line.is_empty() || line.starts_with(&COMMENT_MARKERS[..]) {
        return None;
    }

    // Trimming happens before the cut, so "example.com # note" keeps its
    // trailing blanks and fails the grammar below.
    let lowered = line.to_lowercase();
    let trimmed = lowered.trim();
    let uncommented = trimmed.split('#').next().unwrap_or_default();
    let unoptioned = uncommented.split('^').next().unwrap_or_default();
    let cleaned = unoptioned.replace('\r', "");

    let stripped = PREFIX_PATTERN.replace(&cleaned, "");

    // Hyphen placement in ASCII labels (`r1---sn-x`, `xn--zz`) is left to
    // the grammar; only Unicode input goes through IDNA.
    let ascii = if stripped.is_ascii() {
        stripped.into_owned()
    } else {
        idna::domain_to_ascii_strict(&stripped).ok()?
    };

    if !DOMAIN_PATTERN.is_match(&ascii)
        || !within_dns_limits(&ascii)
        || IPV4_PATTERN.is_match(&ascii)
    {
        return None;
    }

    Some(CanonicalDomain(ascii))
}

fn within_dns_limits(name: &str) -> bool {
    name.len() <= MAX_DOMAIN_LEN && name.split('.').all(|label| label.len() <= MAX_LABEL_LEN)
}
