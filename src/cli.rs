//! Command-line interface definitions for the news crawler.
//!
//! Global options can be given as flags or environment variables.

use clap::{Parser, Subcommand};

/// Command-line arguments for the news crawler.
///
/// # Examples
///
/// ```sh
/// # Run both workers until Ctrl-C
/// news_crawler run
///
/// # Crawl one source's listing page now
/// news_crawler --config ./sources.yaml discover --source-id 3
///
/// # Extract one queued post now
/// news_crawler extract --post-id 42
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "NEWS_CRAWLER_CONFIG", default_value = "news_crawler.yaml")]
    pub config: String,

    /// Path to the JSON snapshot of the work store
    #[arg(short, long, env = "NEWS_CRAWLER_STORE", default_value = "data/posts.json")]
    pub store: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start the discovery and extraction workers; stop on Ctrl-C
    Run,
    /// Run one discovery cycle and print the queued URLs
    Discover {
        /// Only crawl this source's listing page
        #[arg(long)]
        source_id: Option<u64>,
    },
    /// Run one extraction cycle and print the report
    Extract {
        /// Only extract this post
        #[arg(long)]
        post_id: Option<u64>,
    },
    /// Print queue counts by status
    Status,
}
