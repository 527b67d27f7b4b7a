//! Collaborators the crawl engine reads from and writes to.
//!
//! The engine only talks to these traits. Two implementations ship with the
//! crate:
//!
//! - [`MemoryWorkStore`]: the crawl queue, kept in memory and optionally
//!   mirrored to a JSON snapshot file after every write
//! - [`StaticSourceRegistry`]: sources declared in the YAML configuration
//!
//! # Concurrency
//!
//! The work store is the only state shared by the discovery and extraction
//! workers. Its unique `crawl_url` constraint is what keeps concurrent or
//! repeated discovery cycles from queueing the same article twice.

use crate::error::StoreError;
use crate::models::{Post, PostStatus, Source};
use async_trait::async_trait;

pub mod memory;
pub mod registry;

pub use memory::MemoryWorkStore;
pub use registry::StaticSourceRegistry;

/// Persistent crawl queue keyed by a unique crawl URL.
#[async_trait]
pub trait WorkStore: Send + Sync {
    async fn find_by_crawl_url(&self, url: &str) -> Result<Option<Post>, StoreError>;

    async fn find_by_id(&self, id: u64) -> Result<Option<Post>, StoreError>;

    /// Insert a post without an id, or replace the stored post with the
    /// same id. Returns the post as stored, id assigned.
    ///
    /// Inserting a post whose `crawl_url` already exists fails with
    /// [`StoreError::DuplicateCrawlUrl`] and changes nothing.
    async fn save(&self, post: Post) -> Result<Post, StoreError>;

    /// Up to `limit` posts with `status`, ordered by id.
    async fn find_by_status(
        &self,
        status: PostStatus,
        limit: usize,
        ascending: bool,
    ) -> Result<Vec<Post>, StoreError>;

    async fn count_by_status(&self, status: PostStatus) -> Result<usize, StoreError>;
}

/// Supplier of source configurations.
#[async_trait]
pub trait SourceRegistry: Send + Sync {
    /// Sources that are not deleted, in crawl order.
    async fn active_sources(&self) -> Result<Vec<Source>, StoreError>;

    /// A source by id, deleted or not.
    async fn source(&self, id: u64) -> Result<Option<Source>, StoreError>;
}
