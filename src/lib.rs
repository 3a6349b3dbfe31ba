//! crawlguard: bounded-domain web crawler
//!
//! Crawls the hosts under one domain suffix while keeping the crawl finite:
//! - FIFO URL frontier with exact raw-URL dedup and crash-safe checkpoints
//! - Shingle fingerprints with Jaccard near-duplicate detection
//! - Crawl trap detection (URL length, repeating segments, calendar-style
//!   per-path counters, near-duplicate overflow)
//! - Worker-pool coordinator with cooperative shutdown
//! - Crawl analytics report

pub mod config;
pub mod crawl;
pub mod util;

pub use config::Config;
pub use crawl::{normalize_url, CrawlCoordinator, Frontier};
