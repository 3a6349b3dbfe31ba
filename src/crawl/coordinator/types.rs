//! Coordinator types: per-page outcomes, statistics and the crawl summary

use serde::Serialize;
use std::collections::BTreeSet;

use crate::crawl::document::ParseError;
use crate::crawl::frontier::FrontierStats;

/// Why a dequeued page contributed nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The fetcher returned an error
    FetchFailed(String),
    /// No body or no content type
    NoContent,
    /// Parsing failed, including the NUL-stripped retry
    Unparseable(ParseError),
}

/// Outcome of processing a single URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Skipped(SkipReason),
    /// Content matched an earlier page under the same normalized URL
    NearDuplicate,
    Crawled {
        /// Links found on the page after resolution
        links_found: usize,
        /// Links that passed trap detection
        admitted: usize,
        /// Admitted links that were new to the frontier
        queued: usize,
    },
}

/// Statistics from the crawl coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    /// URLs dequeued and processed
    pub pages_fetched: u64,
    /// Pages whose links were followed
    pub pages_crawled: u64,
    pub near_duplicates: u64,
    /// Fetch failures, missing content and parse failures
    pub skipped: u64,
    pub links_admitted: u64,
    pub links_rejected: u64,
    pub links_queued: u64,
}

impl CrawlStats {
    pub(super) fn record(&mut self, outcome: &PageOutcome) {
        self.pages_fetched += 1;
        match outcome {
            PageOutcome::Skipped(_) => self.skipped += 1,
            PageOutcome::NearDuplicate => self.near_duplicates += 1,
            PageOutcome::Crawled {
                links_found,
                admitted,
                queued,
            } => {
                self.pages_crawled += 1;
                self.links_admitted += *admitted as u64;
                self.links_rejected += (links_found - admitted) as u64;
                self.links_queued += *queued as u64;
            }
        }
    }
}

/// State handed to analytics and the CLI when a crawl ends
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSummary {
    /// Frontier fetched counter
    pub fetched: u64,
    pub traps: BTreeSet<String>,
    pub stats: CrawlStats,
    pub frontier: FrontierStats,
}
