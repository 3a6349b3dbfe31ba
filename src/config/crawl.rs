//! Crawl, trap-detection and deduplication configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::DEFAULT_USER_AGENT;

/// File extensions that never lead to crawlable text content
pub const DEFAULT_DENIED_EXTENSIONS: &[&str] = &[
    "css", "js", "bmp", "gif", "jpeg", "jpg", "ico", "png", "tif", "tiff", "mid", "mp2", "mp3",
    "mp4", "wav", "avi", "mov", "mpeg", "ram", "m4v", "mkv", "ogg", "ogv", "pdf", "ps", "eps",
    "tex", "ppt", "pptx", "doc", "docx", "xls", "xlsx", "names", "data", "dat", "exe", "bz2",
    "tar", "msi", "bin", "7z", "psd", "dmg", "iso", "epub", "dll", "cnf", "tgz", "sha1", "thmx",
    "mso", "arff", "rtf", "jar", "csv", "rm", "smil", "wmv", "swf", "wma", "zip", "rar", "gz",
];

/// Crawl loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// URL used when no previous frontier state exists
    pub seed_url: String,
    /// Hosts must equal or end with this domain suffix
    pub allowed_domain_suffix: String,
    /// Maximum number of URLs to dequeue (0 = unlimited)
    pub fetch_budget: u64,
    /// Concurrent fetch/parse workers
    pub workers: usize,
    /// Directory holding the frontier snapshot blobs
    pub state_dir: PathBuf,
    /// Checkpoint after this many dequeued URLs (0 = only at crawl end)
    pub checkpoint_interval: u64,
    /// Analytics report output path
    pub report_path: PathBuf,
    /// User agent string
    pub user_agent: String,
    /// Request timeout (seconds)
    pub request_timeout_secs: u64,
    /// Maximum response body size (bytes)
    pub max_content_size: usize,
}

impl CrawlConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seed_url: "http://www.ics.uci.edu/".to_string(),
            allowed_domain_suffix: ".ics.uci.edu".to_string(),
            fetch_budget: 0,
            workers: 1,
            state_dir: PathBuf::from("frontier_state"),
            checkpoint_interval: 100,
            report_path: PathBuf::from("analytics.txt"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
            max_content_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

/// Crawl trap heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapConfig {
    /// URLs longer than this are treated as traps
    pub url_size_limit: usize,
    /// Candidate links per (host, path) before the key is trapped
    pub domain_access_limit: u32,
    /// Occurrences of one host label or path segment that mark a trap
    pub max_repeated_segments: usize,
    /// Path extensions that are never admitted
    pub denied_extensions: Vec<String>,
}

impl Default for TrapConfig {
    fn default() -> Self {
        Self {
            url_size_limit: 200,
            domain_access_limit: 500,
            max_repeated_segments: 3,
            denied_extensions: DEFAULT_DENIED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// Shingle fingerprinting and near-duplicate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Tokens per shingle
    pub shingle_size: usize,
    /// Keep a shingle hash only when `hash % sample_divisor == 0`
    pub sample_divisor: u64,
    /// Jaccard similarity a page must exceed to count as a near-duplicate
    pub similarity_threshold: f64,
    /// Near-duplicate hits allowed per normalized URL before it becomes a trap
    pub max_dupes_allowed: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            shingle_size: 3,
            sample_divisor: 1,
            similarity_threshold: 0.99,
            max_dupes_allowed: 50,
        }
    }
}
