//! Crawl coordinator driving fetch → parse → fingerprint → validate → enqueue
//!
//! A fixed pool of workers pulls URLs from the shared frontier. Fetching and
//! parsing run concurrently; every read-modify-write on frontier state
//! happens under the single frontier lock. A page's near-duplicate check,
//! link admission and completion share one lock section, so a checkpoint
//! sees either all of a page's effects or none of them. The crawl ends when the queue is empty with nothing in
//! flight, the fetch budget is used up, or [`CrawlCoordinator::stop`] is
//! called. A final checkpoint is always written.

mod types;

pub use types::*;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::analytics::{AnalyticsSink, PageReport};
use super::document::{ContentParser, Document, ParseError, Parser};
use super::fetcher::Fetch;
use super::fingerprint::Fingerprinter;
use super::frontier::{Frontier, LinkOutcome};
use super::snapshot::SnapshotError;
use super::tokenizer::tokenize;
use crate::config::CrawlConfig;
use crate::util::{host_of, truncate_str};

/// How long an idle worker waits before re-checking the queue
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Result of asking the frontier for work
enum Claim {
    Url(String),
    /// Queue empty but other workers may still add links
    Wait,
    Done,
}

/// Crawl coordinator managing the worker pool
pub struct CrawlCoordinator {
    config: CrawlConfig,
    frontier: Arc<Mutex<Frontier>>,
    fetcher: Arc<dyn Fetch>,
    parser: Arc<dyn Parser>,
    analytics: Option<Arc<Mutex<dyn AnalyticsSink>>>,
    fingerprinter: Fingerprinter,
    stats: Mutex<CrawlStats>,
    running: AtomicBool,
    work_ready: Notify,
    /// Fetched count at the last checkpoint; held while a checkpoint is written
    last_checkpoint: tokio::sync::Mutex<u64>,
}

impl CrawlCoordinator {
    pub fn new(config: CrawlConfig, frontier: Frontier, fetcher: Arc<dyn Fetch>) -> Self {
        let fingerprinter = frontier.fingerprinter().clone();
        let fetched = frontier.fetched();

        Self {
            config,
            frontier: Arc::new(Mutex::new(frontier)),
            fetcher,
            parser: Arc::new(ContentParser),
            analytics: None,
            fingerprinter,
            stats: Mutex::new(CrawlStats::default()),
            running: AtomicBool::new(false),
            work_ready: Notify::new(),
            last_checkpoint: tokio::sync::Mutex::new(fetched),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_analytics(mut self, sink: Arc<Mutex<dyn AnalyticsSink>>) -> Self {
        self.analytics = Some(sink);
        self
    }

    pub fn frontier(&self) -> Arc<Mutex<Frontier>> {
        Arc::clone(&self.frontier)
    }

    pub fn stats(&self) -> CrawlStats {
        self.stats.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Ask workers to stop after their current page
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.work_ready.notify_waiters();
    }

    /// Run the crawl to completion and return its summary
    pub async fn run(self: &Arc<Self>) -> CrawlSummary {
        self.running.store(true, Ordering::Relaxed);

        let workers = self.config.workers.max(1);
        info!(
            "Starting crawl ({} workers, {} queued, budget {})",
            workers,
            self.frontier.lock().len(),
            if self.config.fetch_budget == 0 {
                "unlimited".to_string()
            } else {
                self.config.fetch_budget.to_string()
            }
        );

        let mut tasks = JoinSet::new();
        for id in 0..workers {
            let coordinator = Arc::clone(self);
            tasks.spawn(async move { coordinator.worker(id).await });
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!("Crawl worker failed: {}", e);
            }
        }
        self.running.store(false, Ordering::Relaxed);

        if let Err(e) = self.checkpoint().await {
            warn!("Final checkpoint failed: {}", e);
        }

        let summary = self.summary();
        if let Some(sink) = &self.analytics {
            sink.lock().finish(&summary);
        }

        info!(
            "Crawl finished: {} fetched, {} crawled, {} near-duplicates, {} traps, {} still queued",
            summary.fetched,
            summary.stats.pages_crawled,
            summary.stats.near_duplicates,
            summary.traps.len(),
            summary.frontier.queue_len
        );
        summary
    }

    /// Snapshot the frontier into the state directory
    pub async fn checkpoint(&self) -> Result<u64, SnapshotError> {
        let mut last = self.last_checkpoint.lock().await;
        let generation = self.write_checkpoint().await?;
        *last = self.frontier.lock().fetched();
        Ok(generation)
    }

    async fn write_checkpoint(&self) -> Result<u64, SnapshotError> {
        let snapshot = self.frontier.lock().snapshot();
        let dir = self.config.state_dir.clone();
        let fetched = snapshot.fetched;

        let generation = tokio::task::spawn_blocking(move || snapshot.save(&dir))
            .await
            .map_err(|e| SnapshotError::Io {
                path: self.config.state_dir.clone(),
                source: std::io::Error::other(e.to_string()),
            })??;

        info!("Checkpoint written to {} ({} fetched)", self.config.state_dir.display(), fetched);
        Ok(generation)
    }

    pub fn summary(&self) -> CrawlSummary {
        let frontier = self.frontier.lock();
        CrawlSummary {
            fetched: frontier.fetched(),
            traps: frontier.traps().clone(),
            stats: self.stats(),
            frontier: frontier.stats(),
        }
    }

    async fn worker(&self, id: usize) {
        debug!("Worker {} started", id);

        while self.is_running() {
            match self.claim() {
                Claim::Done => {
                    self.work_ready.notify_waiters();
                    break;
                }
                Claim::Wait => {
                    let _ = tokio::time::timeout(IDLE_POLL, self.work_ready.notified()).await;
                }
                Claim::Url(url) => {
                    let outcome = self.process_url(&url).await;
                    self.work_ready.notify_waiters();

                    if let PageOutcome::Skipped(reason) = &outcome {
                        debug!("Skipped {}: {:?}", truncate_str(&url, 120), reason);
                    }
                    self.stats.lock().record(&outcome);
                    self.maybe_checkpoint().await;
                }
            }
        }

        debug!("Worker {} stopped", id);
    }

    fn claim(&self) -> Claim {
        let mut frontier = self.frontier.lock();

        let budget = self.config.fetch_budget;
        if budget > 0 && frontier.fetched() >= budget {
            return Claim::Done;
        }

        match frontier.next() {
            Some(url) => {
                debug!(
                    "Fetching {} (fetched {}, queued {})",
                    truncate_str(&url, 120),
                    frontier.fetched(),
                    frontier.len()
                );
                Claim::Url(url)
            }
            None if frontier.in_flight() == 0 => Claim::Done,
            None => Claim::Wait,
        }
    }

    /// Process a single URL, completing it in the frontier
    pub async fn process_url(&self, url: &str) -> PageOutcome {
        let page = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => return self.skip(url, SkipReason::FetchFailed(e.to_string())),
        };

        let effective_url = page.effective_url().to_string();
        let (content, content_type) = match (page.content, page.content_type) {
            (Some(content), Some(content_type)) => (content, content_type),
            _ => return self.skip(url, SkipReason::NoContent),
        };

        // Parse on a blocking thread to keep HTML parsing off the runtime
        let parser = Arc::clone(&self.parser);
        let parsed =
            tokio::task::spawn_blocking(move || parse_with_retry(parser.as_ref(), content, &content_type))
                .await;

        let mut document = match parsed {
            Ok(Ok(document)) => document,
            Ok(Err(e)) => return self.skip(url, SkipReason::Unparseable(e)),
            Err(e) => {
                let error = ParseError::Malformed(format!("parse task failed: {}", e));
                return self.skip(url, SkipReason::Unparseable(error));
            }
        };

        let text = document.extract_text();
        let fingerprint = self.fingerprinter.fingerprint(&text);
        document.resolve_links_absolute(&effective_url);
        let links: Vec<String> = document.iter_links().map(str::to_string).collect();

        let mut admitted = 0;
        let mut queued = 0;
        {
            let mut frontier = self.frontier.lock();
            frontier.complete(url);
            if frontier.is_near_duplicate(&effective_url, fingerprint) {
                return PageOutcome::NearDuplicate;
            }
            for link in &links {
                match frontier.admit(link) {
                    LinkOutcome::Queued => {
                        admitted += 1;
                        queued += 1;
                    }
                    LinkOutcome::AlreadySeen => admitted += 1,
                    LinkOutcome::Rejected(reason) => {
                        debug!("Rejected {}: {}", truncate_str(link, 120), reason);
                    }
                }
            }
        }

        if let Some(sink) = &self.analytics {
            let token_counts = tokenize(&text);
            let report = PageReport {
                subdomain: host_of(&effective_url),
                url: effective_url,
                outlinks: admitted,
                word_count: token_counts.values().sum(),
                token_counts,
            };
            sink.lock().record_page(report);
        }

        PageOutcome::Crawled {
            links_found: links.len(),
            admitted,
            queued,
        }
    }

    fn skip(&self, url: &str, reason: SkipReason) -> PageOutcome {
        self.frontier.lock().complete(url);
        PageOutcome::Skipped(reason)
    }

    async fn maybe_checkpoint(&self) {
        let interval = self.config.checkpoint_interval;
        if interval == 0 {
            return;
        }

        // Another worker is already writing one
        let Ok(mut last) = self.last_checkpoint.try_lock() else {
            return;
        };

        let fetched = self.frontier.lock().fetched();
        if fetched < *last + interval {
            return;
        }

        match self.write_checkpoint().await {
            Ok(_) => *last = fetched,
            Err(e) => warn!("Checkpoint failed: {}", e),
        }
    }
}

/// Parse `content`, retrying once with NUL bytes stripped
fn parse_with_retry(
    parser: &dyn Parser,
    content: Vec<u8>,
    content_type: &str,
) -> Result<Box<dyn Document>, ParseError> {
    match parser.parse(&content, content_type) {
        Err(ParseError::EmbeddedNul | ParseError::Malformed(_)) => {
            let stripped: Vec<u8> = content.into_iter().filter(|&b| b != 0).collect();
            parser.parse(&stripped, content_type)
        }
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crawl::analytics::CrawlAnalytics;
    use crate::crawl::fetcher::{FetchError, FetchedPage};
    use crate::crawl::snapshot::FrontierSnapshot;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const SEED: &str = "http://www.ics.uci.edu/";

    /// In-memory site: URL → HTML body
    #[derive(Default)]
    struct FakeSite {
        pages: HashMap<String, (Option<&'static str>, Vec<u8>)>,
        redirects: HashMap<String, String>,
        hits: Mutex<HashMap<String, usize>>,
    }

    impl FakeSite {
        fn html(mut self, url: &str, body: &str) -> Self {
            self.pages
                .insert(url.to_string(), (Some("text/html; charset=utf-8"), body.as_bytes().to_vec()));
            self
        }

        fn raw(mut self, url: &str, content_type: Option<&'static str>, body: &[u8]) -> Self {
            self.pages.insert(url.to_string(), (content_type, body.to_vec()));
            self
        }

        fn redirect(mut self, from: &str, to: &str) -> Self {
            self.redirects.insert(from.to_string(), to.to_string());
            self
        }
    }

    #[async_trait]
    impl Fetch for FakeSite {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            *self.hits.lock().entry(url.to_string()).or_insert(0) += 1;
            let final_url = self.redirects.get(url).cloned();
            match self.pages.get(final_url.as_deref().unwrap_or(url)) {
                Some((content_type, body)) => Ok(FetchedPage {
                    url: url.to_string(),
                    final_url,
                    content: Some(body.clone()),
                    content_type: content_type.map(str::to_string),
                }),
                None => Err(FetchError::InvalidUrl(format!("no page at {}", url))),
            }
        }
    }

    /// Holds the fetch of one URL until released
    struct GatedSite {
        site: FakeSite,
        gated: &'static str,
        started: Notify,
        release: Notify,
    }

    impl GatedSite {
        fn new(site: FakeSite, gated: &'static str) -> Self {
            Self {
                site,
                gated,
                started: Notify::new(),
                release: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl Fetch for GatedSite {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            if url == self.gated {
                self.started.notify_one();
                self.release.notified().await;
            }
            self.site.fetch(url).await
        }
    }

    fn gated(site: GatedSite, configure: impl FnOnce(&mut Config)) -> (Arc<CrawlCoordinator>, Arc<GatedSite>, Config, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.crawl.state_dir = dir.path().join("state");
        configure(&mut config);

        let mut frontier = Frontier::from_config(&config);
        frontier.add(SEED);
        let site = Arc::new(site);
        let coordinator = Arc::new(CrawlCoordinator::new(config.crawl.clone(), frontier, site.clone()));
        (coordinator, site, config, dir)
    }

    fn build(site: FakeSite, configure: impl FnOnce(&mut Config)) -> (CrawlCoordinator, Arc<FakeSite>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.crawl.state_dir = dir.path().join("state");
        configure(&mut config);

        let mut frontier = Frontier::from_config(&config);
        frontier.add(SEED);
        let site = Arc::new(site);
        let coordinator = CrawlCoordinator::new(config.crawl.clone(), frontier, site.clone());
        (coordinator, site, dir)
    }

    fn coordinator(site: FakeSite, configure: impl FnOnce(&mut Config)) -> (Arc<CrawlCoordinator>, Arc<FakeSite>, TempDir) {
        let (coordinator, site, dir) = build(site, configure);
        (Arc::new(coordinator), site, dir)
    }

    fn small_site() -> FakeSite {
        FakeSite::default()
            .html(
                SEED,
                r#"<p>Welcome to the school of information and computer sciences</p>
                <a href="/about">About</a> <a href="http://vision.ics.uci.edu/">Vision</a>
                <a href="http://www.google.com/">Elsewhere</a> <a href="/paper.pdf">Paper</a>"#,
            )
            .html(
                "http://www.ics.uci.edu/about",
                r#"<p>About the school and its many departments and programs</p><a href="/">Home</a>"#,
            )
            .html("http://vision.ics.uci.edu/", "<p>Computer vision research group projects page</p>")
    }

    #[tokio::test]
    async fn test_crawls_reachable_pages_once() {
        let (coordinator, site, _dir) = coordinator(small_site(), |_| {});
        let summary = coordinator.run().await;

        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.stats.pages_crawled, 3);
        assert_eq!(summary.stats.links_rejected, 2);
        assert_eq!(summary.stats.links_queued, 2);
        assert_eq!(summary.frontier.queue_len, 0);
        assert!(site.hits.lock().values().all(|&n| n == 1));
        assert!(!coordinator.is_running());
    }

    #[tokio::test]
    async fn test_fetch_budget_stops_crawl() {
        let (coordinator, _site, _dir) = coordinator(small_site(), |c| c.crawl.fetch_budget = 2);
        let summary = coordinator.run().await;

        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.frontier.queue_len, 1);
    }

    #[tokio::test]
    async fn test_near_duplicate_links_not_followed() {
        let calendar = r#"<p>Department events calendar with seminars and colloquia listed</p>
            <a href="/calendar?day=2">Next</a>"#;
        let site = FakeSite::default()
            .html(SEED, r#"<a href="/calendar?day=1">Calendar</a>"#)
            .html("http://www.ics.uci.edu/calendar?day=1", calendar)
            .html("http://www.ics.uci.edu/calendar?day=2", &calendar.replace("day=2", "day=3"))
            .html("http://www.ics.uci.edu/calendar?day=3", calendar);

        let analytics = Arc::new(Mutex::new(CrawlAnalytics::new(".ics.uci.edu")));
        let (coordinator, site, _dir) = build(site, |_| {});
        let coordinator = Arc::new(coordinator.with_analytics(analytics.clone()));
        let summary = coordinator.run().await;

        assert_eq!(summary.stats.near_duplicates, 1);
        assert!(!site.hits.lock().contains_key("http://www.ics.uci.edu/calendar?day=3"));
        assert_eq!(analytics.lock().subdomains().get("www.ics.uci.edu"), Some(&2));
    }

    #[tokio::test]
    async fn test_unparseable_pages_are_skipped() {
        let site = FakeSite::default()
            .html(SEED, r#"<a href="/nul">a</a><a href="/bare">b</a><a href="/image">c</a><a href="/gone">d</a>"#)
            .raw("http://www.ics.uci.edu/nul", Some("text/html"), b"<p>has\0nul</p><a href=\"/after\">x</a>")
            .raw("http://www.ics.uci.edu/bare", None, b"<p>no type</p>")
            .raw("http://www.ics.uci.edu/image", Some("image/png"), b"\x89PNG")
            .html("http://www.ics.uci.edu/after", "<p>reached after NUL stripping</p>");

        let (coordinator, _site, _dir) = coordinator(site, |_| {});
        let summary = coordinator.run().await;

        // /gone fails to fetch; /bare and /image cannot be parsed
        assert_eq!(summary.stats.skipped, 3);
        assert_eq!(summary.stats.pages_crawled, 3);
        assert_eq!(summary.fetched, 6);
    }

    #[tokio::test]
    async fn test_parallel_workers_visit_each_page_once() {
        let mut site = FakeSite::default();
        let hub: String = (0..20)
            .map(|i| format!(r#"<a href="/p{}">p{}</a>"#, i, i))
            .collect();
        site = site.html(SEED, &hub);
        for i in 0..20 {
            site = site.html(
                &format!("http://www.ics.uci.edu/p{}", i),
                &format!("<p>page number {} with its own words w{} x{} y{}</p>{}", i, i, i, i, hub),
            );
        }

        let (coordinator, site, _dir) = coordinator(site, |c| c.crawl.workers = 4);
        let summary = coordinator.run().await;

        assert_eq!(summary.fetched, 21);
        assert_eq!(summary.stats.pages_fetched, 21);
        assert_eq!(site.hits.lock().len(), 21);
        assert!(site.hits.lock().values().all(|&n| n == 1));
    }

    #[tokio::test]
    async fn test_checkpoints_written() {
        let (coordinator, _site, dir) = coordinator(small_site(), |c| c.crawl.checkpoint_interval = 1);
        coordinator.run().await;

        let mut restored = Frontier::from_config(&Config::default());
        restored.restore(&dir.path().join("state")).unwrap();
        assert_eq!(restored.fetched(), 3);
        assert!(!restored.has_next());
    }

    #[tokio::test]
    async fn test_stop_before_work() {
        let (coordinator, site, _dir) = coordinator(small_site(), |_| {});
        coordinator.stop();
        assert!(!coordinator.is_running());

        // Processing a single page directly still works
        let outcome = coordinator.process_url(SEED).await;
        assert_eq!(
            outcome,
            PageOutcome::Crawled {
                links_found: 4,
                admitted: 2,
                queued: 2
            }
        );
        assert_eq!(site.hits.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_mid_crawl_finishes_page_and_checkpoints() {
        let (coordinator, site, config, _dir) = gated(GatedSite::new(small_site(), SEED), |c| {
            c.crawl.checkpoint_interval = 0;
        });

        let crawl = tokio::spawn({
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.run().await }
        });
        site.started.notified().await;
        coordinator.stop();
        site.release.notify_one();
        let summary = crawl.await.unwrap();

        // The seed page finished and queued its links; nothing further was fetched
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.stats.pages_crawled, 1);
        assert_eq!(summary.frontier.queue_len, 2);
        assert_eq!(site.site.hits.lock().len(), 1);

        let mut restored = Frontier::from_config(&config);
        restored.restore(&config.crawl.state_dir).unwrap();
        assert_eq!(restored.fetched(), 1);
        assert_eq!(restored.in_flight(), 0);
        assert_eq!(restored.next().as_deref(), Some("http://www.ics.uci.edu/about"));
    }

    #[tokio::test]
    async fn test_checkpoint_requeues_page_in_flight() {
        let slow = "http://www.ics.uci.edu/about";
        let (coordinator, site, config, _dir) = gated(GatedSite::new(small_site(), slow), |c| {
            c.crawl.checkpoint_interval = 1;
        });

        let crawl = tokio::spawn({
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.run().await }
        });
        site.started.notified().await;
        coordinator.checkpoint().await.unwrap();

        // /about is mid-fetch: back at the head of the queue and not counted
        let snapshot = FrontierSnapshot::load(&config.crawl.state_dir).unwrap();
        assert_eq!(snapshot.queue, vec![slow, "http://vision.ics.uci.edu/"]);
        assert!(snapshot.seen.contains(slow));
        assert_eq!(snapshot.fetched, 1);
        assert_eq!(coordinator.frontier().lock().fetched(), 2);

        site.release.notify_one();
        let summary = crawl.await.unwrap();
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.stats.pages_crawled, 3);
    }

    #[tokio::test]
    async fn test_redirect_target_is_effective_url() {
        let moved = r#"<p>The people directory moved to a new home on the site</p><a href="staff">Staff</a>"#;
        let site = FakeSite::default()
            .html(SEED, r#"<a href="/people">People</a> <a href="/directory/?page=2">Copy</a>"#)
            .redirect("http://www.ics.uci.edu/people", "http://www.ics.uci.edu/directory/")
            .html("http://www.ics.uci.edu/directory/", moved)
            .html("http://www.ics.uci.edu/directory/?page=2", moved)
            .html("http://www.ics.uci.edu/directory/staff", "<p>Staff listing with names and offices</p>");

        let (coordinator, site, _dir) = coordinator(site, |_| {});
        let summary = coordinator.run().await;

        // Relative links resolve against the redirect target
        assert_eq!(site.hits.lock().get("http://www.ics.uci.edu/directory/staff"), Some(&1));
        assert!(!site.hits.lock().contains_key("http://www.ics.uci.edu/staff"));

        // The fingerprint is filed under the target, so the copy is a near-duplicate
        assert_eq!(summary.stats.near_duplicates, 1);
        let frontier = coordinator.frontier();
        let frontier = frontier.lock();
        assert!(frontier.registry().history("http://www.ics.uci.edu/people").is_empty());
        assert_eq!(frontier.registry().history("http://www.ics.uci.edu/directory/").len(), 2);
    }
}
