//! Link discovery: turn source listing pages into queued posts.
//!
//! Each cycle walks the active sources in registry order, pulls every link
//! off the listing page, keeps the ones the [`LinkFilter`] accepts and
//! queues those the work store has not seen. A cycle stops as soon as the
//! batch threshold of newly queued posts is reached, so with prolific
//! sources early in the order the later ones may wait for another cycle.

use super::fetcher::ContentFetcher;
use super::html::absolute_links;
use crate::config::CrawlerSettings;
use crate::error::{CrawlError, StoreError};
use crate::models::{Post, Source};
use crate::store::{SourceRegistry, WorkStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Decides which links on a listing page are articles.
pub trait LinkFilter: Send + Sync {
    /// `domain` is the source's registered domain (see [`Source::domain`]).
    fn accept(&self, domain: &str, url: &str) -> bool;
}

/// Accepts links that contain the source's domain and end in `.html`.
///
/// Fits sites whose article URLs look like
/// `https://vnexpress.net/some-slug-4790000.html`; sites with other URL
/// conventions need their own [`LinkFilter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DomainHtmlFilter;

impl LinkFilter for DomainHtmlFilter {
    fn accept(&self, domain: &str, url: &str) -> bool {
        url.contains(domain) && url.ends_with(".html")
    }
}

/// The link discovery worker.
pub struct LinkDiscovery {
    registry: Arc<dyn SourceRegistry>,
    store: Arc<dyn WorkStore>,
    fetcher: Arc<dyn ContentFetcher>,
    filter: Arc<dyn LinkFilter>,
    batch: usize,
    timeout: Duration,
}

impl LinkDiscovery {
    pub fn new(
        registry: Arc<dyn SourceRegistry>,
        store: Arc<dyn WorkStore>,
        fetcher: Arc<dyn ContentFetcher>,
        settings: &CrawlerSettings,
    ) -> Self {
        Self {
            registry,
            store,
            fetcher,
            filter: Arc::new(DomainHtmlFilter),
            batch: settings.discovery_batch,
            timeout: settings.fetch_timeout(),
        }
    }

    /// Replace the default [`DomainHtmlFilter`].
    pub fn with_filter(mut self, filter: Arc<dyn LinkFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Run one discovery pass over all active sources.
    ///
    /// Returns the URLs queued by this cycle. Failures are logged per source
    /// and never abort the cycle.
    #[instrument(level = "info", skip_all)]
    pub async fn run_discovery_cycle(&self) -> BTreeSet<String> {
        let mut queued = BTreeSet::new();

        let sources = match self.registry.active_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                error!(error = %e, "Failed to load active sources; skipping discovery cycle");
                return queued;
            }
        };

        for source in &sources {
            if queued.len() >= self.batch {
                info!(
                    batch = self.batch,
                    "Discovery batch full; remaining sources wait for the next cycle"
                );
                break;
            }
            if let Err(e) = self.crawl_source(source, &mut queued).await {
                warn!(source_id = source.id, url = %source.url, error = %e, "Skipping source");
            }
        }

        info!(sources = sources.len(), queued = queued.len(), "Discovery cycle complete");
        queued
    }

    /// Discover links for a single source on demand.
    ///
    /// Unlike a full cycle, failures are returned to the caller.
    #[instrument(level = "info", skip(self))]
    pub async fn discover_source(&self, source_id: u64) -> Result<BTreeSet<String>, CrawlError> {
        let source = self
            .registry
            .source(source_id)
            .await?
            .filter(|s| !s.deleted)
            .ok_or(CrawlError::UnknownSource(source_id))?;

        let mut queued = BTreeSet::new();
        self.crawl_source(&source, &mut queued).await?;
        info!(queued = queued.len(), "Source discovery complete");
        Ok(queued)
    }

    /// Queue new links from one source into `queued`, stopping once it
    /// holds a full batch.
    #[instrument(level = "debug", skip_all, fields(source_id = source.id))]
    async fn crawl_source(
        &self,
        source: &Source,
        queued: &mut BTreeSet<String>,
    ) -> Result<(), CrawlError> {
        let listing_url = source.url.trim();
        if listing_url.is_empty() {
            return Err(CrawlError::InvalidSource {
                id: source.id,
                reason: "listing url is blank".to_string(),
            });
        }
        let (base, domain) = match (Url::parse(listing_url), source.domain()) {
            (Ok(base), Some(domain)) => (base, domain),
            _ => {
                return Err(CrawlError::InvalidSource {
                    id: source.id,
                    reason: format!("listing url {listing_url} has no host"),
                });
            }
        };

        let html = self.fetcher.fetch(listing_url, self.timeout).await?;
        let candidates: Vec<String> = absolute_links(&html, &base)
            .into_iter()
            .filter(|url| self.filter.accept(&domain, url))
            .collect();
        debug!(candidates = candidates.len(), %domain, "Collected article links");

        for url in candidates {
            if queued.len() >= self.batch {
                break;
            }
            match self.store.find_by_crawl_url(&url).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    warn!(%url, error = %e, "Lookup failed; skipping link");
                    continue;
                }
            }
            match self.store.save(Post::discovered(&url, source)).await {
                Ok(post) => {
                    debug!(post_id = ?post.id, %url, "Queued post");
                    queued.insert(url);
                }
                Err(StoreError::DuplicateCrawlUrl(_)) => {
                    debug!(%url, "Link queued concurrently; skipping");
                }
                Err(e) => warn!(%url, error = %e, "Failed to queue link"),
            }
        }
        Ok(())
    }
}
