//! # News Crawler
//!
//! A news crawl and extraction engine. Listing pages of configured sources
//! are scanned for article links, which are queued in a work store; queued
//! articles are then fetched and their title, body, description and lead
//! image pulled out with per-source CSS selector rules.
//!
//! ## Usage
//!
//! ```sh
//! news_crawler --config news_crawler.yaml run
//! news_crawler discover --source-id 3
//! news_crawler extract
//! news_crawler status
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: scan each active source's listing page, queue new links
//! 2. **Extraction**: fetch the oldest queued posts, fill in their content
//! 3. **Scheduling**: run both phases as independent background workers
//!
//! The phases only meet in the work store, a JSON-snapshotted queue.

use clap::Parser;
use serde_json::json;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod crawler;
mod error;
mod models;
mod scheduler;
mod selectors;
mod store;
mod utils;

use cli::{Cli, Command};
use config::Config;
use crawler::{ContentExtraction, HttpFetcher, LinkDiscovery};
use models::PostStatus;
use scheduler::BotScheduler;
use store::{MemoryWorkStore, StaticSourceRegistry, WorkStore};
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "news_crawler starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.store, ?args.command, "Parsed CLI arguments");

    let config = Config::load(&args.config).await?;
    let settings = config.crawler.clone();

    // Early check: the snapshot directory must be writable
    let store_dir = Path::new(&args.store)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if let Err(e) = ensure_writable_dir(store_dir).await {
        error!(
            path = %store_dir.display(),
            error = %e,
            "Store directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let store = Arc::new(MemoryWorkStore::open(&args.store).await?);
    let registry = Arc::new(StaticSourceRegistry::new(config.sources));
    let fetcher = Arc::new(HttpFetcher::new(&settings.user_agent)?);

    let discovery = Arc::new(LinkDiscovery::new(
        registry.clone(),
        store.clone(),
        fetcher.clone(),
        &settings,
    ));
    let extraction = Arc::new(ContentExtraction::new(
        registry.clone(),
        store.clone(),
        fetcher,
        &settings,
    ));

    match args.command {
        Command::Run => {
            if registry.is_empty() {
                info!("No sources configured; discovery will find nothing");
            }
            let scheduler = BotScheduler::new(discovery, extraction, settings.interval());
            scheduler.start_background_workers();
            info!("Workers running; press Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            info!("Shutdown requested");
            scheduler.shutdown().await;
        }
        Command::Discover { source_id } => {
            let queued = match source_id {
                Some(id) => discovery.discover_source(id).await?,
                None => discovery.run_discovery_cycle().await,
            };
            for url in &queued {
                println!("{url}");
            }
            info!(queued = queued.len(), "Discovery finished");
        }
        Command::Extract { post_id } => match post_id {
            Some(id) => {
                let post = extraction.extract_post(id).await?;
                println!("{}", serde_json::to_string_pretty(&post)?);
            }
            None => {
                let report = extraction.run_extraction_cycle().await;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        },
        Command::Status => {
            let status = json!({
                "sources": registry.len(),
                "uncrawl": store.count_by_status(PostStatus::Uncrawl).await?,
                "crawled": store.count_by_status(PostStatus::Crawled).await?,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        "news_crawler finished"
    );

    Ok(())
}
