//! Quota cache
//!
//! Quota changes slowly, so completed lookups are kept for a real TTL instead
//! of only being coalesced. Successful results are kept, and so are failures
//! that describe a stable state (NotFound, QuotaNotAvailable). Any other error
//! evicts the entry at once so the next caller asks the provider again.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, trace, warn};

use super::single_flight::SingleFlight;
use crate::path::CloudPath;
use crate::provider::{CloudResult, Quota};

/// TTL cache of quota outcomes with coalesced lookups
pub struct QuotaCache {
    outcomes: Cache<CloudPath, CloudResult<Quota>>,
    flights: SingleFlight<CloudPath, Quota>,
    /// Bumped by every invalidation; lookups that straddle one are not cached
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QuotaCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            outcomes: Cache::builder()
                .time_to_live(ttl)
                .name("quota_cache")
                .build(),
            flights: SingleFlight::new(),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached quota for `folder`, loading it through `loader` on a miss
    pub async fn get<F, Fut>(&self, folder: &CloudPath, loader: F) -> CloudResult<Quota>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CloudResult<Quota>> + Send + 'static,
    {
        if let Some(outcome) = self.outcomes.get(folder) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(path = %folder, "Cache HIT for quota");
            return outcome;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(path = %folder, "Cache MISS for quota");

        let generation = self.generation.load(Ordering::SeqCst);
        let outcome = self.flights.get(folder.clone(), loader).await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(path = %folder, "Quota invalidated during lookup, not caching");
            return outcome;
        }
        match &outcome {
            Ok(_) => self.outcomes.insert(folder.clone(), outcome.clone()),
            Err(err) if err.is_retained_quota_failure() => {
                debug!(path = %folder, error = %err, "Caching stable quota failure");
                self.outcomes.insert(folder.clone(), outcome.clone());
            }
            Err(err) => {
                warn!(path = %folder, error = %err, "Quota lookup failed, evicting");
                self.outcomes.invalidate(folder);
            }
        }
        outcome
    }

    /// Whether an unexpired outcome is cached for `folder`
    pub fn contains(&self, folder: &CloudPath) -> bool {
        self.outcomes.contains_key(folder)
    }

    /// Drop cached and in-flight quota for `path` and everything below it
    pub fn invalidate_subtree(&self, path: &CloudPath) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let stale: Vec<CloudPath> = self
            .outcomes
            .iter()
            .filter(|(key, _)| key.starts_with(path))
            .map(|(key, _)| (*key).clone())
            .collect();
        for key in &stale {
            self.outcomes.invalidate(key);
        }
        self.flights.evict_where(|key| key.starts_with(path));
        debug!(path = %path, evicted = stale.len(), "Invalidated cached quota subtree");
    }

    /// Returns (hits, misses)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    pub fn log_metrics(&self) {
        let (hits, misses) = self.stats();
        debug!(
            hits = hits,
            misses = misses,
            entries = self.outcomes.entry_count(),
            in_flight = self.flights.in_flight(),
            "Quota cache metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CloudError;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    async fn load(
        cache: &QuotaCache,
        calls: &Arc<AtomicUsize>,
        outcome: CloudResult<Quota>,
    ) -> CloudResult<Quota> {
        let calls = Arc::clone(calls);
        cache
            .get(&CloudPath::root(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                outcome
            })
            .await
    }

    #[tokio::test]
    async fn test_success_is_cached() {
        let cache = QuotaCache::new(Duration::from_secs(10));
        let calls = Arc::new(AtomicUsize::new(0));
        let quota = Quota::new(100, Some(200), Some(100));

        assert_eq!(load(&cache, &calls, Ok(quota)).await, Ok(quota));
        assert_eq!(load(&cache, &calls, Ok(quota)).await, Ok(quota));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[tokio::test]
    async fn test_quota_not_available_is_retained() {
        let cache = QuotaCache::new(Duration::from_secs(10));
        let calls = Arc::new(AtomicUsize::new(0));
        let unavailable = Err(CloudError::QuotaNotAvailable(CloudPath::root()));

        assert_eq!(load(&cache, &calls, unavailable.clone()).await, unavailable);
        assert!(cache.contains(&CloudPath::root()));
        assert_eq!(load(&cache, &calls, Ok(Quota::new(1, None, None))).await, unavailable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generic_error_is_evicted() {
        let cache = QuotaCache::new(Duration::from_secs(10));
        let calls = Arc::new(AtomicUsize::new(0));
        let quota = Quota::new(7, None, None);

        assert!(load(&cache, &calls, Err(CloudError::provider("503"))).await.is_err());
        assert!(!cache.contains(&CloudPath::root()));
        assert_eq!(load(&cache, &calls, Ok(quota)).await, Ok(quota));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retained_failure_expires() {
        let cache = QuotaCache::new(Duration::from_millis(50));
        let calls = Arc::new(AtomicUsize::new(0));
        let missing = Err(CloudError::NotFound(CloudPath::root()));

        assert!(load(&cache, &calls, missing).await.is_err());
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(load(&cache, &calls, Ok(Quota::new(1, None, None))).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_outcome_invalidated_mid_lookup_is_not_cached() {
        let cache = Arc::new(QuotaCache::new(Duration::from_secs(10)));
        let (release, gate) = oneshot::channel::<()>();
        let folder = CloudPath::new("/dir/x");

        let pending = {
            let cache = Arc::clone(&cache);
            let folder = folder.clone();
            tokio::spawn(async move {
                cache
                    .get(&folder, move || async move {
                        let _ = gate.await;
                        Ok(Quota::new(5, None, None))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.invalidate_subtree(&CloudPath::new("/dir"));
        release.send(()).unwrap();

        // the waiter still sees its answer, but nothing stale is kept
        assert_eq!(pending.await.unwrap(), Ok(Quota::new(5, None, None)));
        assert!(!cache.contains(&folder));
    }
}
