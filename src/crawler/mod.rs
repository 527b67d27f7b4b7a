//! The crawl engine: link discovery and content extraction.
//!
//! Work moves through the engine in two independent phases that only meet
//! in the work store:
//!
//! 1. **Discovery** ([`discovery`]): scan each active source's listing page
//!    and queue unseen article links as `UNCRAWL` posts
//! 2. **Extraction** ([`extraction`]): take the oldest queued posts, fetch
//!    each article and fill in title, content, description and image
//!
//! Failures are local: a source or post that cannot be fetched is logged
//! and skipped, and is tried again on the next cycle.

pub mod discovery;
pub mod extraction;
pub mod fetcher;
pub mod html;

pub use discovery::LinkDiscovery;
pub use extraction::ContentExtraction;
pub use fetcher::HttpFetcher;
