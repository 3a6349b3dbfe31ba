//! Bounded-domain crawl core
//!
//! Decides what gets crawled next and when a region of URL-space stops
//! being expanded.
//!
//! Key components:
//! - `Fingerprinter`: 3-token shingles hashed into a sampled set
//! - `NearDuplicateRegistry`: Jaccard comparison per normalized URL
//! - `TrapDetector`: length, repeated segment and per-(host, path) heuristics
//! - `Frontier`: FIFO queue with the raw-URL seen set and snapshot persistence
//! - `CrawlCoordinator`: fetch → parse → fingerprint → validate → enqueue

pub mod analytics;
pub mod coordinator;
pub mod dedup;
pub mod document;
pub mod fetcher;
pub mod fingerprint;
pub mod frontier;
pub mod snapshot;
pub mod tokenizer;
pub mod trap_detection;

pub use analytics::{AnalyticsSink, CrawlAnalytics, PageReport};
pub use coordinator::{CrawlCoordinator, CrawlStats, CrawlSummary, PageOutcome, SkipReason};
pub use dedup::{DuplicateCheck, NearDuplicateRegistry};
pub use document::{ContentParser, Document, ParseError, Parser};
pub use fetcher::{Fetch, FetchError, FetchedPage, HttpFetcher};
pub use fingerprint::{Fingerprint, Fingerprinter};
pub use frontier::{Frontier, FrontierStats, LinkOutcome};
pub use snapshot::{FrontierSnapshot, SnapshotError, TrapState};
pub use trap_detection::{Admission, Rejection, TrapDetector};

use thiserror::Error;
use url::Url;

use crate::util::truncate_str;

/// URL could not be parsed
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("invalid URL '{url}': {reason}")]
    Invalid { url: String, reason: String },
}

/// Normalize a URL for trap and near-duplicate grouping
///
/// Drops the query string, the fragment and any `;params` on the last path
/// segment. Scheme, host, port and path are kept as the URL parser
/// serializes them.
pub fn normalize_url(raw: &str) -> Result<String, UrlError> {
    let url = Url::parse(raw).map_err(|e| UrlError::Invalid {
        url: truncate_str(raw, 120),
        reason: e.to_string(),
    })?;
    Ok(normalize_parsed(&url))
}

/// Normalize an already parsed URL
pub fn normalize_parsed(url: &Url) -> String {
    let mut trimmed = url.clone();
    trimmed.set_query(None);
    trimmed.set_fragment(None);

    let path = trimmed.path();
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    if let Some(offset) = path[segment_start..].find(';') {
        let stripped = path[..segment_start + offset].to_string();
        trimmed.set_path(&stripped);
    }

    trimmed.to_string()
}
