use anyhow::{Context, Result};
use crawlguard::{
    config::Config,
    crawl::{Frontier, FrontierSnapshot},
};
use std::path::PathBuf;

/// Traps listed in text output
const TRAPS_SHOWN: usize = 20;

pub fn show_stats(config: Config, state_dir: Option<PathBuf>, format: &str) -> Result<()> {
    let state_dir = state_dir.unwrap_or_else(|| config.crawl.state_dir.clone());

    if !FrontierSnapshot::exists(&state_dir) {
        anyhow::bail!("No frontier snapshot in {}", state_dir.display());
    }

    let snapshot = FrontierSnapshot::load(&state_dir)
        .with_context(|| format!("Frontier snapshot in {} is unusable", state_dir.display()))?;
    let mut frontier = Frontier::from_config(&config);
    frontier.apply_snapshot(snapshot);
    let stats = frontier.stats();

    match format {
        "json" => {
            let output = serde_json::json!({
                "state_dir": state_dir,
                "stats": stats,
                "traps": frontier.traps(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!("\nFrontier Statistics:");
            println!("====================");
            println!("State directory: {}", state_dir.display());
            println!("Queued URLs: {}", stats.queue_len);
            println!("Seen URLs: {}", stats.seen_count);
            println!("Fetched: {}", stats.fetched);
            println!("Near-duplicate hits: {}", stats.near_duplicate_total);
            println!("Traps: {}", stats.trap_count);
            for trap in frontier.traps().iter().take(TRAPS_SHOWN) {
                println!("  {}", trap);
            }
            if stats.trap_count > TRAPS_SHOWN {
                println!("  ... and {} more", stats.trap_count - TRAPS_SHOWN);
            }
        }
    }

    Ok(())
}
