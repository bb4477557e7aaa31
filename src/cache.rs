use dashmap::DashMap;
use std::sync::Arc;

use crate::gateway::{DirEntry, FsGateway, GatewayResult};
use crate::path::CanonicalPath;

/// Most recent listing per folder, shared by every panel.
///
/// Reads populate on miss and never evict. Only mutating operations call
/// [`DirectoryCache::invalidate`]. Writing the same path twice is harmless:
/// the later listing replaces the earlier one.
#[derive(Debug, Default, Clone)]
pub struct DirectoryCache {
    listings: Arc<DashMap<CanonicalPath, Arc<Vec<DirEntry>>>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &CanonicalPath) -> Option<Arc<Vec<DirEntry>>> {
        self.listings.get(path).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, path: CanonicalPath, children: Vec<DirEntry>) -> Arc<Vec<DirEntry>> {
        let children = Arc::new(children);
        self.listings.insert(path, children.clone());
        children
    }

    /// Read-through listing. Failures are returned and leave the cache as it was.
    pub async fn list<G: FsGateway>(
        &self,
        gateway: &G,
        path: &CanonicalPath,
    ) -> GatewayResult<Arc<Vec<DirEntry>>> {
        if let Some(hit) = self.get(path) {
            tracing::debug!(%path, "directory cache hit");
            return Ok(hit);
        }
        tracing::debug!(%path, "directory cache miss");
        let children = gateway.list_children(path).await?;
        Ok(self.insert(path.clone(), children))
    }

    pub fn invalidate(&self, path: &CanonicalPath) -> bool {
        self.listings.remove(path).is_some()
    }

    pub fn contains(&self, path: &CanonicalPath) -> bool {
        self.listings.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn clear(&self) {
        self.listings.clear();
    }
}
