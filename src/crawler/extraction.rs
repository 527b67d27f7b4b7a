//! Content extraction: fill queued posts in from their article pages.
//!
//! Each cycle takes the oldest `UNCRAWL` posts (first in, first out),
//! fetches every article and extracts its fields with the selectors of the
//! post's source:
//!
//! | Field | Selector default | Value |
//! |-------|------------------|-------|
//! | title | `h1` | text of the first match |
//! | content | `article.fck_detail` | text of the first match, minus removal-selector matches |
//! | short description | `p.description` | text of the first match |
//! | image | none | `data-src`, `data-original` or `src` of the first match |
//!
//! A selector that matches nothing leaves its field empty. A post whose page
//! cannot be fetched stays `UNCRAWL` untouched and is picked up again by a
//! later cycle; there is no retry limit.

use super::fetcher::ContentFetcher;
use super::html::{image_url, text_of};
use crate::config::CrawlerSettings;
use crate::error::CrawlError;
use crate::models::{Field, Post, PostStatus, Source};
use crate::selectors::{compile, SelectorExpr};
use crate::store::{SourceRegistry, WorkStore};
use crate::utils::truncate_for_log;
use chrono::Utc;
use scraper::{ElementRef, Html};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Fields pulled out of one article page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedArticle {
    pub title: Option<String>,
    pub content: Option<String>,
    pub short_description: Option<String>,
    pub img_url: Option<String>,
}

/// Outcome counts of one extraction cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    /// Posts taken from the queue.
    pub attempted: usize,
    /// Posts extracted and marked `CRAWLED`.
    pub crawled: usize,
    /// Posts left `UNCRAWL` for a later cycle.
    pub failed: usize,
}

/// Extract every field of an article page.
///
/// `source` supplies per-site selectors; `None` means defaults only. A
/// selector that fails to parse is logged and its field left empty while the
/// remaining fields are still extracted.
pub fn extract_article(html: &str, source: Option<&Source>) -> ExtractedArticle {
    let document = Html::parse_document(html);
    let selector = |field: Field| match compile(source, field) {
        Ok(selector) => selector,
        Err(e) => {
            warn!(field = field.name(), error = %e, "Skipping field with invalid selector");
            None
        }
    };

    let removal_expr = selector(Field::Removal);
    let removal = removal_expr.as_ref().map(SelectorExpr::selector);

    ExtractedArticle {
        title: first(&document, selector(Field::Title)).and_then(|el| text_of(el, None)),
        content: first(&document, selector(Field::Content)).and_then(|el| text_of(el, removal)),
        short_description: first(&document, selector(Field::Description))
            .and_then(|el| text_of(el, None)),
        img_url: first(&document, selector(Field::Image)).and_then(image_url),
    }
}

fn first(document: &Html, selector: Option<SelectorExpr>) -> Option<ElementRef<'_>> {
    selector.and_then(|s| document.select(s.selector()).next())
}

/// The content extraction worker.
pub struct ContentExtraction {
    registry: Arc<dyn SourceRegistry>,
    store: Arc<dyn WorkStore>,
    fetcher: Arc<dyn ContentFetcher>,
    batch: usize,
    timeout: Duration,
}

impl ContentExtraction {
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
            batch: settings.extraction_batch,
            timeout: settings.fetch_timeout(),
        }
    }

    /// Extract the oldest batch of queued posts, one after another.
    #[instrument(level = "info", skip_all)]
    pub async fn run_extraction_cycle(&self) -> ExtractionReport {
        let posts = match self
            .store
            .find_by_status(PostStatus::Uncrawl, self.batch, true)
            .await
        {
            Ok(posts) => posts,
            Err(e) => {
                warn!(error = %e, "Failed to read queued posts; skipping extraction cycle");
                return ExtractionReport::default();
            }
        };

        let attempted = posts.len();
        let mut crawled = 0;
        for post in posts {
            let post_id = post.id;
            let url = post.crawl_url.clone();
            match self.process(post).await {
                Ok(_) => crawled += 1,
                Err(e) if e.is_fetch() => {
                    warn!(?post_id, %url, error = %e, "Fetch failed; post stays queued");
                }
                Err(e) => {
                    error!(?post_id, %url, error = %e, "Extraction failed; post stays queued");
                }
            }
        }

        let report = ExtractionReport {
            attempted,
            crawled,
            failed: attempted - crawled,
        };
        info!(
            attempted = report.attempted,
            crawled = report.crawled,
            failed = report.failed,
            "Extraction cycle complete"
        );
        report
    }

    /// Extract a single post on demand.
    ///
    /// A post that is already `CRAWLED` is returned unchanged.
    #[instrument(level = "info", skip(self))]
    pub async fn extract_post(&self, post_id: u64) -> Result<Post, CrawlError> {
        let post = self
            .store
            .find_by_id(post_id)
            .await?
            .ok_or(CrawlError::UnknownPost(post_id))?;
        if post.status == PostStatus::Crawled {
            info!("Post already crawled");
            return Ok(post);
        }
        self.process(post).await
    }

    #[instrument(level = "debug", skip_all, fields(post_id = ?post.id))]
    async fn process(&self, mut post: Post) -> Result<Post, CrawlError> {
        let url = post.fetch_url().to_string();
        let html = self.fetcher.fetch(&url, self.timeout).await?;

        let source = match self.registry.source(post.source_id).await {
            Ok(source) => source,
            Err(e) => {
                warn!(
                    source_id = post.source_id,
                    error = %e,
                    "Source lookup failed; using default selectors"
                );
                None
            }
        };
        if source.is_none() {
            debug!(source_id = post.source_id, "No registered source; using default selectors");
        }

        let article = extract_article(&html, source.as_ref());
        debug!(
            title = ?article.title,
            content = %truncate_for_log(article.content.as_deref().unwrap_or_default(), 120),
            img_url = ?article.img_url,
            "Extracted article"
        );

        post.title = article.title;
        post.content = article.content;
        post.short_description = article.short_description;
        post.img_url = article.img_url;
        post.status = PostStatus::Crawled;
        post.updated_at = Utc::now();

        Ok(self.store.save(post).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::StubFetcher;
    use crate::store::{MemoryWorkStore, StaticSourceRegistry};

    const ARTICLE: &str = r#"
        <html><body>
          <h1 class="title-detail">Title X</h1>
          <p class="description">Short summary.</p>
          <div class="fig"><img data-original="https://img.example.com/c.jpg" src="https://img.example.com/b.jpg"></div>
          <article class="fck_detail">
            <p>First paragraph.</p>
            <div class="box-related"><a href="/x.html">Related</a></div>
            <p>Second paragraph.</p>
          </article>
        </body></html>"#;

    fn source() -> Source {
        Source::new(1, 2, "https://vnexpress.net/thoi-su")
    }

    async fn queue(store: &MemoryWorkStore, urls: &[&str]) -> Vec<Post> {
        let mut posts = Vec::new();
        for url in urls {
            posts.push(store.save(Post::discovered(url, &source())).await.unwrap());
        }
        posts
    }

    fn worker(
        sources: Vec<Source>,
        fetcher: Arc<StubFetcher>,
        store: Arc<MemoryWorkStore>,
        batch: usize,
    ) -> ContentExtraction {
        let settings = CrawlerSettings {
            extraction_batch: batch,
            ..CrawlerSettings::default()
        };
        ContentExtraction::new(
            Arc::new(StaticSourceRegistry::new(sources)),
            store,
            fetcher,
            &settings,
        )
    }

    #[test]
    fn test_extract_with_defaults() {
        let article = extract_article(ARTICLE, Some(&source()));
        assert_eq!(article.title.as_deref(), Some("Title X"));
        assert_eq!(article.short_description.as_deref(), Some("Short summary."));
        assert_eq!(
            article.content.as_deref(),
            Some("First paragraph. Related Second paragraph.")
        );
        assert_eq!(article.img_url, None);
    }

    #[test]
    fn test_extract_with_configured_selectors() {
        let source = source()
            .with_selector(Field::Title, "h1.title-detail")
            .with_selector(Field::Image, "div.fig img")
            .with_selector(Field::Removal, ".box-related");
        let article = extract_article(ARTICLE, Some(&source));
        assert_eq!(article.title.as_deref(), Some("Title X"));
        assert_eq!(
            article.content.as_deref(),
            Some("First paragraph. Second paragraph.")
        );
        assert_eq!(article.img_url.as_deref(), Some("https://img.example.com/c.jpg"));
    }

    #[test]
    fn test_removal_happens_before_text() {
        let source = source()
            .with_selector(Field::Content, "div.body")
            .with_selector(Field::Removal, ".ad");
        let html = r#"<div class="body">Hello<span class="ad">AD</span></div>"#;
        let article = extract_article(html, Some(&source));
        assert_eq!(article.content.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_image_attribute_precedence() {
        let source = source().with_selector(Field::Image, "img");
        let html = r#"<img data-src="a.jpg" data-original="c.jpg" src="b.jpg">"#;
        let article = extract_article(html, Some(&source));
        assert_eq!(article.img_url.as_deref(), Some("a.jpg"));
    }

    #[test]
    fn test_title_falls_back_to_h1() {
        let article = extract_article("<h1>Title X</h1>", Some(&source()));
        assert_eq!(article.title.as_deref(), Some("Title X"));
        assert_eq!(extract_article("<h1>Title X</h1>", None).title.as_deref(), Some("Title X"));
    }

    #[test]
    fn test_first_match_wins() {
        let html = "<h1>Headline</h1><h1>Sidebar</h1>";
        assert_eq!(extract_article(html, None).title.as_deref(), Some("Headline"));
    }

    #[test]
    fn test_missing_elements_are_none() {
        let article = extract_article("<html><body><p>nothing here</p></body></html>", None);
        assert_eq!(article, ExtractedArticle::default());
    }

    #[test]
    fn test_invalid_selector_only_skips_its_field() {
        let mut source = source();
        // Bypass config validation to hit the crawl-time path.
        source.title_selector = Some("h1[".to_string());
        let article = extract_article(ARTICLE, Some(&source));
        assert_eq!(article.title, None);
        assert_eq!(article.short_description.as_deref(), Some("Short summary."));
        assert!(article.content.is_some());
    }

    #[tokio::test]
    async fn test_cycle_processes_oldest_first() {
        let urls = [
            "https://vnexpress.net/t1.html",
            "https://vnexpress.net/t2.html",
            "https://vnexpress.net/t3.html",
        ];
        let fetcher = Arc::new(
            StubFetcher::new()
                .with_page(urls[0], "<h1>One</h1>")
                .with_page(urls[1], "<h1>Two</h1>")
                .with_page(urls[2], "<h1>Three</h1>"),
        );
        let store = Arc::new(MemoryWorkStore::new());
        let posts = queue(&store, &urls).await;

        let report = worker(vec![source()], fetcher.clone(), store.clone(), 2)
            .run_extraction_cycle()
            .await;
        assert_eq!(
            report,
            ExtractionReport {
                attempted: 2,
                crawled: 2,
                failed: 0
            }
        );
        assert_eq!(fetcher.requests(), vec![urls[0].to_string(), urls[1].to_string()]);

        let third = store.find_by_id(posts[2].id.unwrap()).await.unwrap().unwrap();
        assert_eq!(third.status, PostStatus::Uncrawl);
        let first = store.find_by_id(posts[0].id.unwrap()).await.unwrap().unwrap();
        assert_eq!(first.status, PostStatus::Crawled);
        assert_eq!(first.title.as_deref(), Some("One"));
    }

    #[tokio::test]
    async fn test_cycle_runs_on_a_spawned_task() {
        let url = "https://vnexpress.net/a.html";
        let fetcher = Arc::new(StubFetcher::new().with_page(url, "<h1>A</h1>"));
        let store = Arc::new(MemoryWorkStore::new());
        queue(&store, &[url, "https://vnexpress.net/gone.html"]).await;
        let extraction = Arc::new(worker(vec![source()], fetcher, store.clone(), 10));

        let report = tokio::spawn(async move { extraction.run_extraction_cycle().await })
            .await
            .unwrap();
        assert_eq!(
            report,
            ExtractionReport {
                attempted: 2,
                crawled: 1,
                failed: 1,
            }
        );
        assert_eq!(store.count_by_status(PostStatus::Crawled).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_post_untouched() {
        let url = "https://vnexpress.net/gone.html";
        let fetcher = Arc::new(StubFetcher::new());
        let store = Arc::new(MemoryWorkStore::new());
        let before = queue(&store, &[url]).await.remove(0);

        let extraction = worker(vec![source()], fetcher.clone(), store.clone(), 10);
        let report = extraction.run_extraction_cycle().await;
        assert_eq!(report.failed, 1);

        let after = store.find_by_id(before.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(after, before);

        // Retried on the next cycle once the page is reachable.
        fetcher.set_page(url, "<h1>Back</h1>");
        let report = extraction.run_extraction_cycle().await;
        assert_eq!(report.crawled, 1);
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_source_url_falls_back_to_crawl_url() {
        let url = "https://vnexpress.net/a.html";
        let fetcher = Arc::new(StubFetcher::new().with_page(url, "<h1>A</h1>"));
        let store = Arc::new(MemoryWorkStore::new());
        let mut post = Post::discovered(url, &source());
        post.source_url = None;
        let post = store.save(post).await.unwrap();

        worker(vec![source()], fetcher.clone(), store.clone(), 10)
            .run_extraction_cycle()
            .await;

        let post = store.find_by_id(post.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(post.source_url.as_deref(), Some(url));
        assert_eq!(post.status, PostStatus::Crawled);
        assert_eq!(fetcher.requests(), vec![url.to_string()]);
    }

    #[tokio::test]
    async fn test_unregistered_source_uses_defaults() {
        let url = "https://vnexpress.net/a.html";
        let fetcher = Arc::new(StubFetcher::new().with_page(url, ARTICLE));
        let store = Arc::new(MemoryWorkStore::new());
        queue(&store, &[url]).await;

        let report = worker(vec![], fetcher, store.clone(), 10)
            .run_extraction_cycle()
            .await;
        assert_eq!(report.crawled, 1);
        let post = store.find_by_crawl_url(url).await.unwrap().unwrap();
        assert_eq!(post.title.as_deref(), Some("Title X"));
    }

    #[tokio::test]
    async fn test_extract_post_on_demand() {
        let url = "https://vnexpress.net/a.html";
        let fetcher = Arc::new(StubFetcher::new().with_page(url, "<h1>A</h1>"));
        let store = Arc::new(MemoryWorkStore::new());
        let id = queue(&store, &[url]).await[0].id.unwrap();
        let extraction = worker(vec![source()], fetcher.clone(), store, 10);

        let post = extraction.extract_post(id).await.unwrap();
        assert_eq!(post.status, PostStatus::Crawled);
        assert_eq!(post.title.as_deref(), Some("A"));

        // Crawled posts are never re-extracted.
        let again = extraction.extract_post(id).await.unwrap();
        assert_eq!(again, post);
        assert_eq!(fetcher.requests().len(), 1);

        assert!(matches!(
            extraction.extract_post(404).await,
            Err(CrawlError::UnknownPost(404))
        ));
    }
}
