//! Page fetching.
//!
//! Both workers load pages through [`ContentFetcher`], so tests can serve
//! canned HTML without a network.

use crate::error::CrawlError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Fetches the HTML body of a page.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch `url`, giving up after `timeout`.
    ///
    /// Network failures, timeouts and non-success statuses are all errors.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, CrawlError>;
}

/// [`ContentFetcher`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, CrawlError> {
        let t0 = Instant::now();
        let fetch_error = |source| CrawlError::Fetch {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Unexpected HTTP status");
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(fetch_error)?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(body)
    }
}
