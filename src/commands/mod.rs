mod crawl;
mod init;
mod stats;

pub use crawl::{run_crawl, CrawlArgs};
pub use init::init_config;
pub use stats::show_stats;
