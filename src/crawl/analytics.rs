//! Crawl analytics
//!
//! The coordinator reports every non-duplicate parsed page to an
//! [`AnalyticsSink`] and hands it a [`CrawlSummary`] when the crawl ends.
//! [`CrawlAnalytics`] aggregates subdomain counts, the page with the most
//! outlinks, the longest page and corpus-wide word frequencies, and writes
//! them as a plain-text report.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::coordinator::CrawlSummary;
use crate::util::in_domain;

/// Number of words listed in the report
pub const TOP_WORDS: usize = 50;

/// Per-page analytics input
#[derive(Debug, Clone, Default)]
pub struct PageReport {
    /// Effective URL of the page
    pub url: String,
    /// Outlinks that passed trap detection
    pub outlinks: usize,
    pub word_count: usize,
    pub token_counts: HashMap<String, usize>,
    pub subdomain: Option<String>,
}

/// Receives crawl analytics
pub trait AnalyticsSink: Send {
    fn record_page(&mut self, page: PageReport);

    fn finish(&mut self, summary: &CrawlSummary);
}

/// In-memory analytics aggregate
#[derive(Debug, Clone, Default)]
pub struct CrawlAnalytics {
    allowed_domain: String,
    subdomains: BTreeMap<String, usize>,
    most_outlinks: Option<(String, usize)>,
    longest_page: Option<(String, usize)>,
    word_frequencies: HashMap<String, u64>,
    traps: BTreeSet<String>,
    fetched: u64,
}

impl CrawlAnalytics {
    /// Only subdomains under `allowed_domain` are counted
    pub fn new(allowed_domain: &str) -> Self {
        Self {
            allowed_domain: allowed_domain.to_string(),
            ..Default::default()
        }
    }

    pub fn subdomains(&self) -> &BTreeMap<String, usize> {
        &self.subdomains
    }

    pub fn most_outlinks(&self) -> Option<(&str, usize)> {
        self.most_outlinks.as_ref().map(|(url, n)| (url.as_str(), *n))
    }

    pub fn longest_page(&self) -> Option<(&str, usize)> {
        self.longest_page.as_ref().map(|(url, n)| (url.as_str(), *n))
    }

    pub fn word_frequency(&self, word: &str) -> u64 {
        self.word_frequencies.get(word).copied().unwrap_or(0)
    }

    /// The `n` most frequent words, ties broken alphabetically
    pub fn top_words(&self, n: usize) -> Vec<(&str, u64)> {
        let mut words: Vec<(&str, u64)> = self
            .word_frequencies
            .iter()
            .map(|(word, count)| (word.as_str(), *count))
            .collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        words.truncate(n);
        words
    }

    /// Render the report text
    pub fn render_report(&self) -> String {
        let mut out = String::new();

        out.push_str("Subdomains visited:\n");
        for (subdomain, pages) in &self.subdomains {
            let _ = writeln!(out, "\t{}, {}", subdomain, pages);
        }

        let (url, count) = self.most_outlinks().unwrap_or(("unknown", 0));
        out.push_str("Page with most valid outlinks:\n");
        let _ = writeln!(out, "\tURL: {}", url);
        let _ = writeln!(out, "\tNumber of Outlinks: {}", count);

        out.push_str("Identified Traps:\n");
        for trap in &self.traps {
            let _ = writeln!(out, "\t{}", trap);
        }

        let (url, words) = self.longest_page().unwrap_or(("unknown", 0));
        out.push_str("Page with highest word count:\n");
        let _ = writeln!(out, "\tURL: {}", url);
        let _ = writeln!(out, "\tWord Count: {}", words);

        out.push_str("Fifty most common words:\n");
        for (word, count) in self.top_words(TOP_WORDS) {
            let _ = writeln!(out, "\t{:20}{}", format!("{}:", word), count);
        }

        let _ = writeln!(out, "Total URLs fetched: {}", self.fetched);
        out
    }

    pub fn write_report(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render_report())
    }
}

impl AnalyticsSink for CrawlAnalytics {
    fn record_page(&mut self, page: PageReport) {
        if let Some(subdomain) = page.subdomain.filter(|s| in_domain(s, &self.allowed_domain)) {
            *self.subdomains.entry(subdomain).or_insert(0) += 1;
        }

        if page.outlinks > self.most_outlinks.as_ref().map_or(0, |(_, n)| *n) {
            self.most_outlinks = Some((page.url.clone(), page.outlinks));
        }
        if page.word_count > self.longest_page.as_ref().map_or(0, |(_, n)| *n) {
            self.longest_page = Some((page.url.clone(), page.word_count));
        }

        for (token, count) in page.token_counts {
            *self.word_frequencies.entry(token).or_insert(0) += count as u64;
        }
    }

    fn finish(&mut self, summary: &CrawlSummary) {
        self.fetched = summary.fetched;
        self.traps = summary.traps.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::tokenizer::tokenize;
    use tempfile::TempDir;

    fn page(url: &str, outlinks: usize, text: &str) -> PageReport {
        let token_counts = tokenize(text);
        PageReport {
            url: url.to_string(),
            outlinks,
            word_count: token_counts.values().sum(),
            token_counts,
            subdomain: crate::util::host_of(url),
        }
    }

    #[test]
    fn test_records_extremes_and_subdomains() {
        let mut analytics = CrawlAnalytics::new(".ics.uci.edu");
        analytics.record_page(page("http://www.ics.uci.edu/", 5, "one two three"));
        analytics.record_page(page("http://vision.ics.uci.edu/", 9, "one two"));
        analytics.record_page(page("http://www.ics.uci.edu/about", 2, "one two three four five"));
        analytics.record_page(page("http://www.example.com/", 50, "x"));

        assert_eq!(analytics.subdomains().get("www.ics.uci.edu"), Some(&2));
        assert_eq!(analytics.subdomains().get("vision.ics.uci.edu"), Some(&1));
        assert!(!analytics.subdomains().contains_key("www.example.com"));

        assert_eq!(analytics.most_outlinks(), Some(("http://www.example.com/", 50)));
        assert_eq!(analytics.longest_page(), Some(("http://www.ics.uci.edu/about", 5)));
        assert_eq!(analytics.word_frequency("one"), 3);
    }

    #[test]
    fn test_top_words_tie_break() {
        let mut analytics = CrawlAnalytics::new("");
        analytics.record_page(page("http://a.com/", 0, "beta alpha gamma beta alpha delta"));

        let top = analytics.top_words(3);
        assert_eq!(top, vec![("alpha", 2), ("beta", 2), ("delta", 1)]);
    }

    #[test]
    fn test_report_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("analytics.txt");

        let mut analytics = CrawlAnalytics::new(".ics.uci.edu");
        analytics.record_page(page("http://www.ics.uci.edu/", 3, "hello hello world"));
        let mut traps = BTreeSet::new();
        traps.insert("www.ics.uci.edu/calendar".to_string());
        analytics.finish(&CrawlSummary {
            fetched: 7,
            traps,
            ..Default::default()
        });
        analytics.write_report(&path).unwrap();

        let report = std::fs::read_to_string(&path).unwrap();
        assert!(report.starts_with("Subdomains visited:\n\twww.ics.uci.edu, 1\n"));
        assert!(report.contains("\tNumber of Outlinks: 3\n"));
        assert!(report.contains("Identified Traps:\n\twww.ics.uci.edu/calendar\n"));
        assert!(report.contains("\tWord Count: 3\n"));
        assert!(report.contains("\thello:              2\n"));
        assert!(report.ends_with("Total URLs fetched: 7\n"));
    }

    #[test]
    fn test_empty_report() {
        let report = CrawlAnalytics::new(".ics.uci.edu").render_report();
        assert!(report.contains("\tURL: unknown\n"));
        assert!(report.contains("Fifty most common words:\n"));
    }
}
