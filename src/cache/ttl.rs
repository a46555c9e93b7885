//! Metadata caching provider decorator
//!
//! Caches `item_metadata` outcomes for a fixed TTL, including confirmed
//! absences. Listings are not cached but warm the metadata cache with every
//! item they return. Mutations invalidate the affected paths straight away.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::{Duration, SystemTime};
use tracing::trace;

use super::metadata::MetadataCache;
use crate::path::CloudPath;
use crate::provider::{CloudProvider, CloudResult, ItemList, ItemMetadata, Quota};

/// TTL metadata cache around a provider
pub struct MetadataCachingProvider<P> {
    inner: P,
    cache: MetadataCache,
}

impl<P: CloudProvider> MetadataCachingProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            cache: MetadataCache::new(ttl),
        }
    }

    /// The wrapped provider
    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }
}

#[async_trait]
impl<P: CloudProvider> CloudProvider for MetadataCachingProvider<P> {
    async fn item_metadata(&self, path: &CloudPath) -> CloudResult<ItemMetadata> {
        if let Some(entry) = self.cache.get(path) {
            return entry.into_result();
        }

        let result = self.inner.item_metadata(path).await;
        match &result {
            Ok(metadata) => self.cache.insert_found(metadata.clone()),
            Err(err) if err.is_not_found() => self.cache.insert_missing(path.clone(), err.clone()),
            Err(err) => {
                trace!(path = %path, error = %err, "Not caching metadata failure");
                self.cache.invalidate(path);
            }
        }
        result
    }

    async fn list(&self, folder: &CloudPath, page_token: Option<&str>) -> CloudResult<ItemList> {
        let list = self.inner.list(folder, page_token).await?;
        for item in &list.items {
            self.cache.insert_found(item.clone());
        }
        Ok(list)
    }

    async fn quota(&self, folder: &CloudPath) -> CloudResult<Quota> {
        self.inner.quota(folder).await
    }

    async fn read(&self, file: &CloudPath, offset: u64, count: Option<u64>) -> CloudResult<Bytes> {
        self.inner.read(file, offset, count).await
    }

    async fn write(
        &self,
        file: &CloudPath,
        replace: bool,
        data: Bytes,
        size: u64,
        last_modified: Option<SystemTime>,
    ) -> CloudResult<ItemMetadata> {
        self.cache.invalidate(file);
        let result = self
            .inner
            .write(file, replace, data, size, last_modified)
            .await;
        self.cache.invalidate(file);
        result
    }

    async fn create_folder(&self, folder: &CloudPath) -> CloudResult<CloudPath> {
        self.cache.invalidate(folder);
        let result = self.inner.create_folder(folder).await;
        self.cache.invalidate(folder);
        result
    }

    async fn delete_file(&self, file: &CloudPath) -> CloudResult<()> {
        self.cache.invalidate(file);
        let result = self.inner.delete_file(file).await;
        self.cache.invalidate(file);
        result
    }

    async fn delete_folder(&self, folder: &CloudPath) -> CloudResult<()> {
        // listings cache the children too
        self.cache.invalidate_subtree(folder);
        let result = self.inner.delete_folder(folder).await;
        self.cache.invalidate_subtree(folder);
        result
    }

    async fn move_item(
        &self,
        source: &CloudPath,
        target: &CloudPath,
        replace: bool,
    ) -> CloudResult<CloudPath> {
        self.cache.invalidate_subtree(source);
        self.cache.invalidate_subtree(target);
        let result = self.inner.move_item(source, target, replace).await;
        self.cache.invalidate_subtree(source);
        self.cache.invalidate_subtree(target);
        result
    }

    fn caching_capability(&self) -> bool {
        self.inner.caching_capability()
    }
}
