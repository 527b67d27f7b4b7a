//! Source registry backed by the sources declared in the configuration.

use super::SourceRegistry;
use crate::error::StoreError;
use crate::models::Source;
use async_trait::async_trait;

/// A fixed set of sources.
///
/// Active sources are reported newest first (descending id), the order in
/// which link discovery visits them.
#[derive(Debug, Clone, Default)]
pub struct StaticSourceRegistry {
    sources: Vec<Source>,
}

impl StaticSourceRegistry {
    pub fn new(sources: Vec<Source>) -> Self {
        Self { sources }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl SourceRegistry for StaticSourceRegistry {
    async fn active_sources(&self) -> Result<Vec<Source>, StoreError> {
        let mut active: Vec<Source> = self.sources.iter().filter(|s| !s.deleted).cloned().collect();
        active.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(active)
    }

    async fn source(&self, id: u64) -> Result<Option<Source>, StoreError> {
        Ok(self.sources.iter().find(|s| s.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_active_sources_skip_deleted_newest_first() {
        let mut removed = Source::new(2, 1, "https://b.example.com");
        removed.deleted = true;
        let registry = StaticSourceRegistry::new(vec![
            Source::new(1, 1, "https://a.example.com"),
            removed,
            Source::new(3, 1, "https://c.example.com"),
        ]);

        let ids: Vec<u64> = registry
            .active_sources()
            .await
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_source_lookup_includes_deleted() {
        let mut removed = Source::new(2, 1, "https://b.example.com");
        removed.deleted = true;
        let registry = StaticSourceRegistry::new(vec![removed]);

        assert!(registry.source(2).await.unwrap().unwrap().deleted);
        assert!(registry.source(9).await.unwrap().is_none());
    }
}
