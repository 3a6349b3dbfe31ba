use anyhow::{Context, Result};
use crawlguard::{
    config::Config,
    crawl::{CrawlAnalytics, CrawlCoordinator, Frontier, HttpFetcher},
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Command-line overrides for the `[crawl]` section
#[derive(Debug, Default)]
pub struct CrawlArgs {
    pub seed: Option<String>,
    pub domain: Option<String>,
    pub max_pages: Option<u64>,
    pub workers: Option<usize>,
    pub state_dir: Option<PathBuf>,
    /// Ignore any saved frontier state
    pub fresh: bool,
}

impl CrawlArgs {
    fn apply(self, config: &mut Config) -> bool {
        if let Some(seed) = self.seed {
            config.crawl.seed_url = seed;
        }
        if let Some(domain) = self.domain {
            config.crawl.allowed_domain_suffix = domain;
        }
        if let Some(max_pages) = self.max_pages {
            config.crawl.fetch_budget = max_pages;
        }
        if let Some(workers) = self.workers {
            config.crawl.workers = workers;
        }
        if let Some(state_dir) = self.state_dir {
            config.crawl.state_dir = state_dir;
        }
        self.fresh
    }
}

pub async fn run_crawl(mut config: Config, args: CrawlArgs) -> Result<()> {
    let fresh = args.apply(&mut config);
    config.validate()?;

    let crawl = &config.crawl;
    info!("Crawling {} (domain {})", crawl.seed_url, crawl.allowed_domain_suffix);

    let mut frontier = Frontier::from_config(&config);
    if fresh {
        info!("Starting fresh, ignoring saved state in {}", crawl.state_dir.display());
        frontier.add(&crawl.seed_url);
    } else {
        frontier.restore_or_seed(&crawl.state_dir, &crawl.seed_url);
    }

    let fetcher = HttpFetcher::new(crawl).context("Failed to build HTTP client")?;
    let analytics = Arc::new(Mutex::new(CrawlAnalytics::new(&crawl.allowed_domain_suffix)));
    let coordinator = Arc::new(
        CrawlCoordinator::new(crawl.clone(), frontier, Arc::new(fetcher)).with_analytics(analytics.clone()),
    );

    let stopper = Arc::clone(&coordinator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight pages before checkpointing...");
            stopper.stop();
        }
    });

    let summary = coordinator.run().await;

    analytics
        .lock()
        .write_report(&crawl.report_path)
        .with_context(|| format!("Failed to write report to {}", crawl.report_path.display()))?;

    println!("\nCrawl Summary:");
    println!("==============");
    println!("URLs fetched (total): {}", summary.fetched);
    println!("Pages fetched this run: {}", summary.stats.pages_fetched);
    println!("Pages crawled: {}", summary.stats.pages_crawled);
    println!("Near-duplicates: {}", summary.stats.near_duplicates);
    println!("Skipped: {}", summary.stats.skipped);
    println!("Links queued: {}", summary.stats.links_queued);
    println!("Links rejected: {}", summary.stats.links_rejected);
    println!("Traps identified: {}", summary.traps.len());
    println!("Still queued: {}", summary.frontier.queue_len);
    println!("Report: {}", crawl.report_path.display());
    println!("State: {}", crawl.state_dir.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_override_config() {
        let mut config = Config::default();
        let args = CrawlArgs {
            seed: Some("https://www.example.com/".to_string()),
            domain: Some("example.com".to_string()),
            max_pages: Some(10),
            workers: Some(4),
            state_dir: None,
            fresh: true,
        };

        assert!(args.apply(&mut config));
        assert_eq!(config.crawl.seed_url, "https://www.example.com/");
        assert_eq!(config.crawl.allowed_domain_suffix, "example.com");
        assert_eq!(config.crawl.fetch_budget, 10);
        assert_eq!(config.crawl.workers, 4);
        assert_eq!(config.crawl.state_dir, PathBuf::from("frontier_state"));
    }
}
