//! crawlguard: bounded-domain web crawler with trap and near-duplicate detection

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use crawlguard::config::{Config, LogFormat, LogLevel};
use std::path::PathBuf;
use tracing_subscriber::FmtSubscriber;

use commands::{init_config, run_crawl, show_stats, CrawlArgs};

#[derive(Parser)]
#[command(name = "crawlguard")]
#[command(about = "Bounded-domain web crawler with crawl trap and near-duplicate detection")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "crawlguard.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl from the seed URL, resuming saved state if present
    Crawl {
        /// Seed URL used when no saved state exists
        #[arg(long)]
        seed: Option<String>,

        /// Allowed domain suffix (e.g. .ics.uci.edu)
        #[arg(long)]
        domain: Option<String>,

        /// Stop after this many fetched URLs (0 = unlimited)
        #[arg(short = 'n', long)]
        max_pages: Option<u64>,

        /// Concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Frontier state directory
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Ignore saved frontier state
        #[arg(long)]
        fresh: bool,
    },

    /// Write a default configuration file
    Init {
        /// Output directory or .toml file
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show statistics of a saved frontier
    Stats {
        /// Frontier state directory
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn init_logging(config: &Config, verbose: u8) -> Result<()> {
    let level = LogLevel::from_verbosity(verbose)
        .unwrap_or(config.logging.level)
        .as_tracing();

    let builder = FmtSubscriber::builder().with_max_level(level).with_target(false);
    match config.logging.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init must work even when an existing config file is broken
    if let Commands::Init { path } = cli.command {
        return init_config(path);
    }

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Crawl {
            seed,
            domain,
            max_pages,
            workers,
            state_dir,
            fresh,
        } => {
            let args = CrawlArgs {
                seed,
                domain,
                max_pages,
                workers,
                state_dir,
                fresh,
            };
            run_crawl(config, args).await
        }
        Commands::Init { .. } => Ok(()),
        Commands::Stats { state_dir, format } => show_stats(config, state_dir, &format),
    }
}
