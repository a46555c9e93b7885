//! Coalescing provider decorator
//!
//! Guarantees at most one outstanding provider call per metadata path, per
//! (folder, page token) listing and per quota folder. Quota additionally
//! keeps results for a TTL via [`QuotaCache`].

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

use super::quota::QuotaCache;
use super::single_flight::SingleFlight;
use crate::path::CloudPath;
use crate::provider::{CloudProvider, CloudResult, ItemList, ItemMetadata, Quota};

/// Listing request identity
type ListKey = (CloudPath, Option<String>);

/// Single-flight metadata/listing plus TTL quota around a provider
pub struct CoalescingProvider<P> {
    inner: Arc<P>,
    metadata: SingleFlight<CloudPath, ItemMetadata>,
    listings: SingleFlight<ListKey, ItemList>,
    quota: QuotaCache,
}

impl<P: CloudProvider + 'static> CoalescingProvider<P> {
    pub fn new(inner: P, quota_ttl: Duration) -> Self {
        Self::from_arc(Arc::new(inner), quota_ttl)
    }

    pub fn from_arc(inner: Arc<P>, quota_ttl: Duration) -> Self {
        Self {
            inner,
            metadata: SingleFlight::new(),
            listings: SingleFlight::new(),
            quota: QuotaCache::new(quota_ttl),
        }
    }

    /// The wrapped provider
    pub fn inner(&self) -> &Arc<P> {
        &self.inner
    }

    /// Outstanding metadata and listing requests
    pub fn in_flight(&self) -> usize {
        self.metadata.in_flight() + self.listings.in_flight()
    }

    /// Whether a metadata lookup for exactly `path` is outstanding
    pub fn is_metadata_pending(&self, path: &CloudPath) -> bool {
        self.metadata.is_in_flight(path)
    }

    pub fn quota_cache(&self) -> &QuotaCache {
        &self.quota
    }

    /// Forget pending work keyed by exactly this path
    fn invalidate_path(&self, path: &CloudPath) {
        self.metadata.evict(path);
        self.listings.evict_where(|(folder, _)| folder == path);
    }

    /// Forget pending and cached work for `path` and all its descendants
    fn invalidate_subtree(&self, path: &CloudPath) {
        debug!(path = %path, "Invalidating coalesced requests below path");
        self.metadata.evict_where(|key| key.starts_with(path));
        self.listings.evict_where(|(folder, _)| folder.starts_with(path));
        self.quota.invalidate_subtree(path);
    }
}

#[async_trait]
impl<P: CloudProvider + 'static> CloudProvider for CoalescingProvider<P> {
    async fn item_metadata(&self, path: &CloudPath) -> CloudResult<ItemMetadata> {
        let inner = Arc::clone(&self.inner);
        let key = path.clone();
        self.metadata
            .get(path.clone(), move || async move { inner.item_metadata(&key).await })
            .await
    }

    async fn list(&self, folder: &CloudPath, page_token: Option<&str>) -> CloudResult<ItemList> {
        let inner = Arc::clone(&self.inner);
        let key: ListKey = (folder.clone(), page_token.map(str::to_string));
        let (folder, token) = key.clone();
        self.listings
            .get(key, move || async move { inner.list(&folder, token.as_deref()).await })
            .await
    }

    async fn quota(&self, folder: &CloudPath) -> CloudResult<Quota> {
        let inner = Arc::clone(&self.inner);
        let key = folder.clone();
        self.quota
            .get(folder, move || async move { inner.quota(&key).await })
            .await
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
        let result = self
            .inner
            .write(file, replace, data, size, last_modified)
            .await;
        self.invalidate_path(file);
        result
    }

    async fn create_folder(&self, folder: &CloudPath) -> CloudResult<CloudPath> {
        let result = self.inner.create_folder(folder).await;
        self.invalidate_path(folder);
        result
    }

    async fn delete_file(&self, file: &CloudPath) -> CloudResult<()> {
        let result = self.inner.delete_file(file).await;
        self.invalidate_subtree(file);
        result
    }

    async fn delete_folder(&self, folder: &CloudPath) -> CloudResult<()> {
        let result = self.inner.delete_folder(folder).await;
        self.invalidate_subtree(folder);
        result
    }

    async fn move_item(
        &self,
        source: &CloudPath,
        target: &CloudPath,
        replace: bool,
    ) -> CloudResult<CloudPath> {
        let result = self.inner.move_item(source, target, replace).await;
        self.invalidate_subtree(source);
        self.invalidate_subtree(target);
        result
    }

    fn caching_capability(&self) -> bool {
        self.inner.caching_capability()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{CloudError, InMemoryProvider, Operation};

    fn p(s: &str) -> CloudPath {
        CloudPath::new(s)
    }

    fn slow_provider() -> InMemoryProvider {
        InMemoryProvider::new().with_latency(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_concurrent_metadata_calls_coalesce() {
        let provider = slow_provider();
        provider.seed_file("/f", "abc");
        let cache = Arc::new(CoalescingProvider::new(provider, Duration::from_secs(10)));

        let calls: Vec<_> = (0..5)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.item_metadata(&p("/f")).await })
            })
            .collect();

        for call in calls {
            let meta = call.await.unwrap().unwrap();
            assert_eq!(meta.size, Some(3));
        }
        assert_eq!(cache.inner().calls(Operation::ItemMetadata), 1);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_are_not_cached() {
        let provider = InMemoryProvider::new();
        provider.seed_file("/f", "abc");
        let cache = CoalescingProvider::new(provider, Duration::from_secs(10));

        cache.item_metadata(&p("/f")).await.unwrap();
        cache.item_metadata(&p("/f")).await.unwrap();
        assert_eq!(cache.inner().calls(Operation::ItemMetadata), 2);
    }

    #[tokio::test]
    async fn test_listings_coalesce_per_page_token() {
        let provider = slow_provider().with_page_size(1);
        provider.seed_file("/dir/a", "1");
        provider.seed_file("/dir/b", "2");
        let cache = Arc::new(CoalescingProvider::new(provider, Duration::from_secs(10)));

        let first = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.list(&p("/dir"), None).await })
        };
        let same = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.list(&p("/dir"), None).await })
        };
        let second_page = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.list(&p("/dir"), Some("1")).await })
        };

        let first = first.await.unwrap().unwrap();
        assert_eq!(same.await.unwrap().unwrap(), first);
        assert_eq!(second_page.await.unwrap().unwrap().items[0].name, "b");
        assert_eq!(cache.inner().calls(Operation::List), 2);
    }

    #[tokio::test]
    async fn test_not_found_shared_by_all_waiters() {
        let cache = Arc::new(CoalescingProvider::new(slow_provider(), Duration::from_secs(10)));

        let calls: Vec<_> = (0..3)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.item_metadata(&p("/missing")).await })
            })
            .collect();

        for call in calls {
            assert_eq!(
                call.await.unwrap(),
                Err(CloudError::NotFound(p("/missing")))
            );
        }
        assert_eq!(cache.inner().calls(Operation::ItemMetadata), 1);
    }

    #[tokio::test]
    async fn test_quota_is_cached_for_ttl() {
        let provider = InMemoryProvider::new();
        provider.set_quota(Some(Ok(Quota::new(5, Some(10), Some(5)))));
        let cache = CoalescingProvider::new(provider, Duration::from_secs(10));

        let root = CloudPath::root();
        assert_eq!(cache.quota(&root).await.unwrap().available_bytes, 5);
        assert_eq!(cache.quota(&root).await.unwrap().available_bytes, 5);
        assert_eq!(cache.inner().calls(Operation::Quota), 1);
    }

    #[tokio::test]
    async fn test_move_evicts_cached_quota_on_both_sides() {
        let provider = InMemoryProvider::new();
        provider.seed_folder("/dir/x/sub");
        provider.seed_folder("/z");
        provider.set_quota(Some(Ok(Quota::new(5, None, None))));
        let cache = CoalescingProvider::new(provider, Duration::from_secs(10));

        for folder in ["/dir/x/sub", "/dir", "/z"] {
            cache.quota(&p(folder)).await.unwrap();
        }
        cache.move_item(&p("/dir/x"), &p("/y"), false).await.unwrap();

        assert!(!cache.quota_cache().contains(&p("/dir/x/sub")));
        assert!(cache.quota_cache().contains(&p("/dir")));
        assert!(cache.quota_cache().contains(&p("/z")));
    }
}
