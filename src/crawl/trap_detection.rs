//! Crawl trap detection
//!
//! Decides whether a discovered link may enter the frontier. Checks run in a
//! fixed order:
//! 1. Extremely long URLs (infinite query-string traps)
//! 2. Normalized URL or (host, path) key already trapped
//! 3. Host labels or path segments repeating (e.g. `a.b.a.b.a.b.example.com`)
//! 4. Per-(host, path) candidate counter (calendar traps)
//! 5. Scheme, allowed domain suffix and denied file extensions
//!
//! Steps 1, 3 and 4 register traps, so trap bookkeeping happens even when
//! step 5 rejects the link anyway. The trap set only ever grows.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::info;
use url::{Host, Url};

use super::normalize_parsed;
use crate::config::TrapConfig;
use crate::util::{in_domain, truncate_str};

/// Why a link was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Longer than the URL size limit
    TooLong { length: usize },
    /// Could not be parsed, or has no host
    InvalidUrl,
    /// Normalized URL or (host, path) key is in the trap set
    KnownTrap,
    /// A host label or path segment repeats too often
    RepeatingSegments { segment: String, count: usize },
    /// Not http or https
    UnsupportedScheme(String),
    /// Host outside the allowed domain suffix
    OutsideDomain(String),
    /// Path ends in a non-content file extension
    DeniedExtension(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooLong { length } => write!(f, "URL too long ({} chars)", length),
            Rejection::InvalidUrl => f.write_str("invalid URL"),
            Rejection::KnownTrap => f.write_str("known trap"),
            Rejection::RepeatingSegments { segment, count } => {
                write!(f, "segment '{}' repeats {} times", segment, count)
            }
            Rejection::UnsupportedScheme(scheme) => write!(f, "unsupported scheme '{}'", scheme),
            Rejection::OutsideDomain(host) => write!(f, "host '{}' outside crawl domain", host),
            Rejection::DeniedExtension(ext) => write!(f, "denied extension '.{}'", ext),
        }
    }
}

/// Admission decision for a candidate link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected(Rejection),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Composite crawl-trap detector holding the trap set and per-(host, path) counters
#[derive(Debug, Clone)]
pub struct TrapDetector {
    config: TrapConfig,
    /// Allowed domain suffix without leading dot, lower-cased
    allowed_domain: String,
    denied_extensions: HashSet<String>,
    /// Trapped normalized URLs, domain keys and over-long raw URLs
    traps: BTreeSet<String>,
    /// Candidate-link count per (host, path) key
    domain_visits: HashMap<String, u32>,
}

impl TrapDetector {
    /// Create a detector for hosts under `allowed_domain_suffix`
    ///
    /// An empty suffix allows every host.
    pub fn new(config: TrapConfig, allowed_domain_suffix: &str) -> Self {
        let denied_extensions = config
            .denied_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        Self {
            allowed_domain: allowed_domain_suffix.trim_start_matches('.').to_ascii_lowercase(),
            denied_extensions,
            config,
            traps: BTreeSet::new(),
            domain_visits: HashMap::new(),
        }
    }

    /// Check whether `url` may be enqueued, updating trap state
    pub fn is_admissible(&mut self, url: &str) -> bool {
        self.inspect(url).is_admitted()
    }

    /// Check `url` and report why it was refused
    pub fn inspect(&mut self, url: &str) -> Admission {
        if url.len() > self.config.url_size_limit {
            self.register_trap(url, "URL size limit");
            return Admission::Rejected(Rejection::TooLong { length: url.len() });
        }

        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return Admission::Rejected(Rejection::InvalidUrl),
        };

        let host = match parsed.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => {
                return Admission::Rejected(if is_http(&parsed) {
                    Rejection::InvalidUrl
                } else {
                    Rejection::UnsupportedScheme(parsed.scheme().to_string())
                });
            }
        };

        let normalized = normalize_parsed(&parsed);
        let key = domain_key(&host, parsed.path());
        if self.traps.contains(&normalized) || self.traps.contains(&key) {
            return Admission::Rejected(Rejection::KnownTrap);
        }

        if let Some((segment, count)) = self.repeating_segment(&parsed) {
            self.register_trap(&normalized, "repeating segments");
            return Admission::Rejected(Rejection::RepeatingSegments { segment, count });
        }

        let visits = self.domain_visits.entry(key.clone()).or_insert(0);
        *visits += 1;
        if *visits >= self.config.domain_access_limit {
            self.register_trap(&key, "domain access limit");
        }

        if !is_http(&parsed) {
            return Admission::Rejected(Rejection::UnsupportedScheme(parsed.scheme().to_string()));
        }

        if !in_domain(&host, &self.allowed_domain) {
            return Admission::Rejected(Rejection::OutsideDomain(host));
        }

        if let Some(ext) = self.denied_extension(parsed.path()) {
            return Admission::Rejected(Rejection::DeniedExtension(ext));
        }

        Admission::Admitted
    }

    /// Add `key` to the trap set; returns false if it was already there
    pub fn register_trap(&mut self, key: &str, reason: &str) -> bool {
        let added = self.traps.insert(key.to_string());
        if added {
            info!("Trap detected in {} ({})", truncate_str(key, 120), reason);
        }
        added
    }

    /// Whether a normalized URL or domain key is trapped
    pub fn is_trap(&self, key: &str) -> bool {
        self.traps.contains(key)
    }

    pub fn traps(&self) -> &BTreeSet<String> {
        &self.traps
    }

    pub fn domain_visits(&self) -> &HashMap<String, u32> {
        &self.domain_visits
    }

    /// Replace trap state, e.g. from a snapshot
    pub fn restore(&mut self, traps: BTreeSet<String>, domain_visits: HashMap<String, u32>) {
        self.traps = traps;
        self.domain_visits = domain_visits;
    }

    fn repeating_segment(&self, url: &Url) -> Option<(String, usize)> {
        let limit = self.config.max_repeated_segments;

        if let Some(Host::Domain(host)) = url.host() {
            if let Some((label, count)) = most_repeated(host.split('.')) {
                if count >= limit {
                    return Some((label.to_string(), count));
                }
            }
        }

        match most_repeated(url.path().split('/')) {
            Some((segment, count)) if count >= limit => Some((segment.to_string(), count)),
            _ => None,
        }
    }

    fn denied_extension(&self, path: &str) -> Option<String> {
        let last_segment = path.rsplit('/').next().unwrap_or_default();
        let (_, ext) = last_segment.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        self.denied_extensions.contains(&ext).then_some(ext)
    }
}

/// Key for the per-(host, path) counter
pub fn domain_key(host: &str, path: &str) -> String {
    format!("{}{}", host, path)
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

/// Most frequent non-empty segment and its count
fn most_repeated<'a>(segments: impl Iterator<Item = &'a str>) -> Option<(&'a str, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for segment in segments.filter(|s| !s.is_empty()) {
        *counts.entry(segment).or_insert(0) += 1;
    }
    counts.into_iter().max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
}
