//! URL canonicalization used for deduplication, scope checks and storage keys.
//!
//! A [`NormalizedUrl`] is always an absolute `http`/`https` URL with:
//! - lower-cased scheme and host, default port removed
//! - `.`/`..` path segments resolved
//! - percent-encoding normalized (unreserved characters decoded, other escapes upper-cased)
//! - fragment removed
//! - query parameters filtered by a [`QueryPolicy`] and sorted

use crate::utils::url_hash;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;
use url::{Url, form_urlencoded};

/// Query keys dropped by the default policy
const TRACKING_KEYS: &[&str] = &[
    "fbclid", "gclid", "dclid", "gbraid", "wbraid", "msclkid", "yclid", "mc_cid", "mc_eid",
    "igshid", "_ga", "_gl", "_hsenc", "_hsmi", "mkt_tok", "ocid", "cmpid",
];

/// Key patterns dropped by the default policy
const TRACKING_PATTERNS: &[&str] = &[r"^utm_", r"^pk_"];

static DEFAULT_NORMALIZER: LazyLock<Normalizer> = LazyLock::new(Normalizer::default);

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("unparseable URL {url:?}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported scheme {scheme:?} in {url:?}")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("URL has no host: {0:?}")]
    MissingHost(String),
}

/// Serializable description of which query parameters to strip
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPolicyConfig {
    /// Exact keys to remove (compared case-insensitively)
    #[serde(default)]
    pub strip_keys: Vec<String>,

    /// Regex patterns matched against the lower-cased key
    #[serde(default)]
    pub strip_patterns: Vec<String>,

    /// Drop the whole query string
    #[serde(default)]
    pub strip_all: bool,
}

impl Default for QueryPolicyConfig {
    fn default() -> Self {
        Self {
            strip_keys: TRACKING_KEYS.iter().map(|k| k.to_string()).collect(),
            strip_patterns: TRACKING_PATTERNS.iter().map(|p| p.to_string()).collect(),
            strip_all: false,
        }
    }
}

/// Compiled query-parameter policy
#[derive(Debug, Clone)]
pub struct QueryPolicy {
    strip_keys: HashSet<String>,
    strip_patterns: Vec<Regex>,
    strip_all: bool,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self::new(&QueryPolicyConfig::default()).expect("Default tracking patterns should be valid")
    }
}

impl QueryPolicy {
    pub fn new(config: &QueryPolicyConfig) -> Result<Self, regex::Error> {
        let mut strip_patterns = Vec::with_capacity(config.strip_patterns.len());
        for pattern in &config.strip_patterns {
            strip_patterns.push(Regex::new(pattern)?);
        }

        Ok(Self {
            strip_keys: config
                .strip_keys
                .iter()
                .map(|k| k.to_ascii_lowercase())
                .collect(),
            strip_patterns,
            strip_all: config.strip_all,
        })
    }

    /// Whether a query parameter with this key is dropped
    pub fn strips(&self, key: &str) -> bool {
        if self.strip_all {
            return true;
        }
        let key = key.to_ascii_lowercase();
        self.strip_keys.contains(&key) || self.strip_patterns.iter().any(|re| re.is_match(&key))
    }
}

/// A URL in canonical form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Content-addressed identifier of this URL
    pub fn hash(&self) -> String {
        url_hash(self.as_str())
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Applies the canonical-URL rules with a configurable query policy
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    policy: QueryPolicy,
}

impl Normalizer {
    pub fn new(policy: QueryPolicy) -> Self {
        Self { policy }
    }

    /// Normalize an absolute URL string
    pub fn normalize(&self, raw: &str) -> Result<NormalizedUrl, NormalizeError> {
        let url = Url::parse(raw.trim()).map_err(|source| NormalizeError::Parse {
            url: raw.to_string(),
            source,
        })?;
        self.normalize_url(url)
    }

    /// Resolve `href` against `base`, then normalize
    pub fn normalize_relative(&self, base: &Url, href: &str) -> Result<NormalizedUrl, NormalizeError> {
        let url = base.join(href.trim()).map_err(|source| NormalizeError::Parse {
            url: href.to_string(),
            source,
        })?;
        self.normalize_url(url)
    }

    /// Normalize an already-parsed URL
    pub fn normalize_url(&self, mut url: Url) -> Result<NormalizedUrl, NormalizeError> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(NormalizeError::UnsupportedScheme {
                    url: url.to_string(),
                    scheme: scheme.to_string(),
                });
            }
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(NormalizeError::MissingHost(url.to_string()));
        }

        url.set_fragment(None);

        let path = normalize_percent_encoding(url.path());
        url.set_path(&path);

        let query = url.query().map(|q| self.canonical_query(q));
        match query {
            Some(q) if !q.is_empty() => url.set_query(Some(&q)),
            _ => url.set_query(None),
        }

        Ok(NormalizedUrl(url))
    }

    /// Filter and sort the raw `key=value` pairs.
    ///
    /// Pairs keep their original encoding (only hex case and unreserved
    /// escapes are normalized), so distinct byte sequences never collapse.
    fn canonical_query(&self, query: &str) -> String {
        let mut pairs: Vec<(String, String)> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
                let key = decode_query_key(raw_key);
                if key.is_empty() || self.policy.strips(&key) {
                    return None;
                }
                Some((
                    normalize_percent_encoding(raw_key),
                    normalize_percent_encoding(raw_value),
                ))
            })
            .collect();
        pairs.sort();

        pairs
            .iter()
            .map(|(key, value)| {
                if value.is_empty() {
                    key.clone()
                } else {
                    format!("{key}={value}")
                }
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Decoded form of a raw query key, only used to match against the policy
fn decode_query_key(raw_key: &str) -> String {
    form_urlencoded::parse(raw_key.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

/// Normalize with the default tracking-parameter policy
pub fn normalize(raw: &str) -> Result<NormalizedUrl, NormalizeError> {
    DEFAULT_NORMALIZER.normalize(raw)
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode escapes of unreserved characters and upper-case the remaining ones
fn normalize_percent_encoding(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).copied().and_then(hex_value),
                bytes.get(i + 2).copied().and_then(hex_value),
            ) {
                let decoded = hi * 16 + lo;
                if is_unreserved(decoded) {
                    out.push(decoded);
                } else {
                    out.push(b'%');
                    out.extend(format!("{:02X}", decoded).bytes());
                }
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
