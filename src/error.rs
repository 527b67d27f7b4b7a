//! Error taxonomy for the crawl engine.
//!
//! Failures are local to the source or post being processed: the workers
//! log them and move on, so none of these escape a cycle. They surface to
//! callers only through the on-demand entry points (`discover_source`,
//! `extract_post`) and configuration loading.

use thiserror::Error;

/// Errors raised while crawling a single source or post.
#[derive(Error, Debug)]
pub enum CrawlError {
    /// Network failure, timeout or non-success HTTP status.
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered but with a status we do not parse.
    #[error("failed to fetch {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    /// A selector string that `scraper` refuses to parse.
    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },

    #[error("source {0} does not exist or has been removed")]
    UnknownSource(u64),

    #[error("post {0} does not exist")]
    UnknownPost(u64),

    /// The source is registered but cannot be crawled (blank URL, no host).
    #[error("source {id} cannot be crawled: {reason}")]
    InvalidSource { id: u64, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CrawlError {
    /// True for failures of the fetch step, which leave state untouched.
    pub fn is_fetch(&self) -> bool {
        matches!(self, CrawlError::Fetch { .. } | CrawlError::Status { .. })
    }
}

/// Errors raised by a work store or source registry.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A new post collided with an existing `crawl_url`.
    #[error("a post with crawl url {0} already exists")]
    DuplicateCrawlUrl(String),

    #[error("post {0} not found")]
    NotFound(u64),

    /// Another store already has the snapshot open.
    #[error("work store {0} is in use by another process")]
    Locked(String),

    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store snapshot is not valid json: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised while loading the YAML configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config is not valid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("source {source_id}: invalid {field} selector `{selector}`")]
    InvalidSelector {
        source_id: u64,
        field: &'static str,
        selector: String,
    },

    #[error("source id {0} is declared more than once")]
    DuplicateSource(u64),
}
