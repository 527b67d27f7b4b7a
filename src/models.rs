//! Data models for crawl sources and the posts they produce.
//!
//! This module defines the core data structures used throughout the crawler:
//! - [`Source`]: A configured news site with its listing URL and selector rules
//! - [`Post`]: One discovered article and its crawl-queue state
//! - [`PostStatus`]: Queue state of a post
//! - [`Field`]: The extractable fields of an article
//!
//! Sources are read-only to the crawler. Posts are created by link discovery
//! and filled in by content extraction; they are never deleted here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

/// A configured news site.
///
/// Selector fields are normalised on load: surrounding whitespace is
/// trimmed and blank strings become `None`, so a present selector is always
/// non-blank.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Source {
    /// Unique identity of the source.
    pub id: u64,
    /// Category every post discovered from this source is filed under.
    pub category_id: u64,
    /// The listing page scanned for article links.
    pub url: String,
    /// Soft-delete flag. Deleted sources are never crawled.
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, deserialize_with = "normalized_selector")]
    pub title_selector: Option<String>,
    #[serde(default, deserialize_with = "normalized_selector")]
    pub content_selector: Option<String>,
    #[serde(default, deserialize_with = "normalized_selector")]
    pub description_selector: Option<String>,
    #[serde(default, deserialize_with = "normalized_selector")]
    pub image_selector: Option<String>,
    /// Elements matching this selector are dropped from the content body.
    #[serde(default, deserialize_with = "normalized_selector")]
    pub removal_selector: Option<String>,
}

impl Source {
    /// Create an active source with no selector overrides.
    pub fn new(id: u64, category_id: u64, url: impl Into<String>) -> Self {
        Self {
            id,
            category_id,
            url: url.into(),
            deleted: false,
            title_selector: None,
            content_selector: None,
            description_selector: None,
            image_selector: None,
            removal_selector: None,
        }
    }

    /// The configured selector for `field`, if any.
    pub fn selector(&self, field: Field) -> Option<&str> {
        match field {
            Field::Title => self.title_selector.as_deref(),
            Field::Content => self.content_selector.as_deref(),
            Field::Description => self.description_selector.as_deref(),
            Field::Image => self.image_selector.as_deref(),
            Field::Removal => self.removal_selector.as_deref(),
        }
    }

    /// Set the selector for `field`, applying the same normalisation as
    /// deserialisation does.
    pub fn with_selector(mut self, field: Field, selector: &str) -> Self {
        let value = normalize_selector(Some(selector.to_string()));
        match field {
            Field::Title => self.title_selector = value,
            Field::Content => self.content_selector = value,
            Field::Description => self.description_selector = value,
            Field::Image => self.image_selector = value,
            Field::Removal => self.removal_selector = value,
        }
        self
    }

    /// The registered domain of this source: the listing URL's host without
    /// a leading `www.`.
    ///
    /// For example: "https://www.vnexpress.net/thoi-su" -> "vnexpress.net"
    pub fn domain(&self) -> Option<String> {
        let parsed = Url::parse(self.url.trim()).ok()?;
        let host = parsed.host_str()?;
        Some(host.strip_prefix("www.").unwrap_or(host).to_string())
    }
}

fn normalize_selector(selector: Option<String>) -> Option<String> {
    selector
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn normalized_selector<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(normalize_selector(Option::<String>::deserialize(deserializer)?))
}

/// The extractable parts of an article page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Content,
    Description,
    Image,
    /// Not extracted itself; strips noise from [`Field::Content`].
    Removal,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Title,
        Field::Content,
        Field::Description,
        Field::Image,
        Field::Removal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Content => "content",
            Field::Description => "description",
            Field::Image => "image",
            Field::Removal => "removal",
        }
    }
}

/// Crawl-queue state of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    /// Discovered, not yet extracted.
    Uncrawl,
    /// Fully extracted. Terminal for the crawler.
    Crawled,
}

/// One discovered article and its crawl-queue state.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Post {
    /// Assigned by the work store on first save; `None` until then.
    pub id: Option<u64>,
    /// Dedup key: at most one post exists per crawl URL.
    pub crawl_url: String,
    /// Page actually fetched for extraction. Falls back to `crawl_url`.
    pub source_url: Option<String>,
    pub source_id: u64,
    pub category_id: u64,
    pub title: Option<String>,
    pub content: Option<String>,
    pub short_description: Option<String>,
    pub img_url: Option<String>,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// A freshly discovered, unsaved post queued for extraction.
    pub fn discovered(url: &str, source: &Source) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            crawl_url: url.to_string(),
            source_url: Some(url.to_string()),
            source_id: source.id,
            category_id: source.category_id,
            title: None,
            content: None,
            short_description: None,
            img_url: None,
            status: PostStatus::Uncrawl,
            created_at: now,
            updated_at: now,
        }
    }

    /// The URL to fetch for extraction, defaulting an empty `source_url` to
    /// `crawl_url`.
    pub fn fetch_url(&mut self) -> &str {
        let missing = self
            .source_url
            .as_deref()
            .is_none_or(|s| s.trim().is_empty());
        if missing {
            self.source_url = Some(self.crawl_url.clone());
        }
        self.source_url.as_deref().unwrap_or(&self.crawl_url)
    }
}
