//! Caching layer
//!
//! Provider decorators that coalesce concurrent lookups, cache metadata and
//! quota for a TTL, and the logic choosing which stack wraps a provider.

pub mod coalescing;
pub mod config;
pub mod metadata;
pub mod quota;
pub mod single_flight;
pub mod stack;
pub mod ttl;

pub use coalescing::CoalescingProvider;
pub use config::{CacheConfig, StackSelection};
pub use metadata::{MetadataCache, MetadataEntry};
pub use quota::QuotaCache;
pub use single_flight::SingleFlight;
pub use stack::{decorate, select_stack, CacheStack};
pub use ttl::MetadataCachingProvider;
