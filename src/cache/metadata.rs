//! Metadata Cache Implementation
//!
//! TTL cache for item metadata keyed by path, using Moka. Entries are either
//! a confirmed value or a confirmed absence (NotFound); unknown keys are
//! simply absent. Expiry is checked lazily on read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::sync::Cache;
use tracing::{debug, trace};

use crate::path::CloudPath;
use crate::provider::{CloudError, CloudResult, ItemMetadata};

/// Outcome remembered for a path
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataEntry {
    /// The item exists with this metadata
    Found(ItemMetadata),
    /// The provider reported NotFound
    Missing(CloudError),
}

impl MetadataEntry {
    pub fn into_result(self) -> CloudResult<ItemMetadata> {
        match self {
            MetadataEntry::Found(metadata) => Ok(metadata),
            MetadataEntry::Missing(err) => Err(err),
        }
    }
}

/// Cache entry with its insertion time
#[derive(Clone, Debug)]
pub struct CachedMetadata {
    pub entry: MetadataEntry,
    /// When this entry was cached
    pub cached_at: Instant,
}

/// Metadata cache with TTL support
pub struct MetadataCache {
    /// Cached outcomes by path
    entries: Cache<CloudPath, CachedMetadata>,
    ttl: Duration,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl MetadataCache {
    /// Create a cache whose entries live for `ttl`
    pub fn new(ttl: Duration) -> Self {
        let entries = Cache::builder()
            .time_to_live(ttl)
            .name("item_metadata_cache")
            .build();

        Self {
            entries,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the remembered outcome for `path`
    ///
    /// Returns None on miss. Updates hit/miss counters.
    pub fn get(&self, path: &CloudPath) -> Option<MetadataEntry> {
        match self.entries.get(path) {
            Some(cached) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(path = %path, "Cache HIT for item metadata");
                Some(cached.entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(path = %path, "Cache MISS for item metadata");
                None
            }
        }
    }

    /// Cache metadata under its own path
    pub fn insert_found(&self, metadata: ItemMetadata) {
        let path = metadata.path.clone();
        self.insert(path, MetadataEntry::Found(metadata));
    }

    /// Cache a confirmed absence
    pub fn insert_missing(&self, path: CloudPath, err: CloudError) {
        self.insert(path, MetadataEntry::Missing(err));
    }

    fn insert(&self, path: CloudPath, entry: MetadataEntry) {
        debug!(path = %path, found = matches!(entry, MetadataEntry::Found(_)), "Cached item metadata");
        self.entries.insert(
            path,
            CachedMetadata {
                entry,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop the entry for exactly this path
    pub fn invalidate(&self, path: &CloudPath) {
        self.entries.invalidate(path);
        debug!(path = %path, "Invalidated cached metadata");
    }

    /// Drop the entries for `path` and everything below it
    ///
    /// Scans a snapshot of the keys; entries inserted concurrently may survive.
    pub fn invalidate_subtree(&self, path: &CloudPath) {
        let stale: Vec<CloudPath> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(path))
            .map(|(key, _)| (*key).clone())
            .collect();
        for key in &stale {
            self.entries.invalidate(key);
        }
        debug!(path = %path, evicted = stale.len(), "Invalidated cached metadata subtree");
    }

    /// Clear all entries and reset counters
    pub fn clear(&self) {
        self.entries.invalidate_all();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("Cleared metadata cache");
    }

    /// Get cache statistics
    ///
    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let (hits, misses, hit_rate) = self.stats();

        debug!(
            hits = hits,
            misses = misses,
            hit_rate = format!("{:.1}%", hit_rate),
            entries = self.entries.entry_count(),
            "Metadata cache metrics"
        );
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(crate::cache::config::DEFAULT_METADATA_TTL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> ItemMetadata {
        ItemMetadata::file(CloudPath::new(path), 1024, None)
    }

    #[test]
    fn test_cache_hit_miss() {
        let cache = MetadataCache::default();

        // Initially miss
        assert!(cache.get(&CloudPath::new("/f")).is_none());
        let (_, _, hit_rate) = cache.stats();
        assert_eq!(hit_rate, 0.0);

        // Insert and hit
        cache.insert_found(file("/f"));
        assert_eq!(
            cache.get(&CloudPath::new("/f")),
            Some(MetadataEntry::Found(file("/f")))
        );

        let (hits, misses, hit_rate) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
        assert!(hit_rate > 49.0 && hit_rate < 51.0); // ~50%
    }

    #[test]
    fn test_negative_entry() {
        let cache = MetadataCache::default();
        let path = CloudPath::new("/missing");
        cache.insert_missing(path.clone(), CloudError::NotFound(path.clone()));

        let entry = cache.get(&path).unwrap();
        assert_eq!(entry.into_result(), Err(CloudError::NotFound(path)));
    }

    #[test]
    fn test_entries_expire() {
        let cache = MetadataCache::new(Duration::from_millis(50));
        cache.insert_found(file("/f"));
        assert!(cache.get(&CloudPath::new("/f")).is_some());

        std::thread::sleep(Duration::from_millis(120));
        assert!(cache.get(&CloudPath::new("/f")).is_none());
    }

    #[test]
    fn test_invalidate_subtree() {
        let cache = MetadataCache::default();
        for path in ["/dir", "/dir/a", "/dir/a/b", "/dirt", "/other"] {
            cache.insert_found(file(path));
        }

        cache.invalidate_subtree(&CloudPath::new("/dir"));

        assert!(cache.get(&CloudPath::new("/dir")).is_none());
        assert!(cache.get(&CloudPath::new("/dir/a")).is_none());
        assert!(cache.get(&CloudPath::new("/dir/a/b")).is_none());
        assert!(cache.get(&CloudPath::new("/dirt")).is_some());
        assert!(cache.get(&CloudPath::new("/other")).is_some());
    }

    #[test]
    fn test_cache_clear() {
        let cache = MetadataCache::default();
        cache.insert_found(file("/a"));
        cache.insert_found(file("/b"));
        assert!(cache.get(&CloudPath::new("/a")).is_some());

        cache.clear();

        assert!(cache.get(&CloudPath::new("/a")).is_none());
        assert!(cache.get(&CloudPath::new("/b")).is_none());
        let (hits, misses, _) = cache.stats();
        assert_eq!(hits, 0);
        assert_eq!(misses, 2);
    }
}
