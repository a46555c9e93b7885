//! Cache stack selection
//!
//! Picks which decorator wraps a provider. Both stacks implement
//! `CloudProvider`, so the result can itself be wrapped by further layers.

use std::sync::Arc;
use tracing::info;

use super::coalescing::CoalescingProvider;
use super::config::{CacheConfig, StackSelection};
use super::ttl::MetadataCachingProvider;
use crate::provider::CloudProvider;

/// A concrete cache stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStack {
    /// Single-flight metadata/listing plus TTL quota
    Coalescing,
    /// TTL metadata cache with listing warm-up
    Metadata,
}

/// Decide which stack `provider` gets under `config`
pub fn select_stack(provider: &dyn CloudProvider, config: &CacheConfig) -> CacheStack {
    match config.stack {
        StackSelection::Coalescing => CacheStack::Coalescing,
        StackSelection::Metadata => CacheStack::Metadata,
        StackSelection::Auto if provider.caching_capability() => CacheStack::Coalescing,
        StackSelection::Auto => CacheStack::Metadata,
    }
}

/// Wrap `provider` in the cache stack chosen by `config`
pub fn decorate<P>(provider: P, config: &CacheConfig) -> Arc<dyn CloudProvider>
where
    P: CloudProvider + 'static,
{
    let stack = select_stack(&provider, config);
    info!(
        stack = ?stack,
        metadata_ttl_ms = config.metadata_ttl().as_millis() as u64,
        quota_ttl_ms = config.quota_ttl().as_millis() as u64,
        "Decorating provider with cache stack"
    );
    match stack {
        CacheStack::Coalescing => Arc::new(CoalescingProvider::new(provider, config.quota_ttl())),
        CacheStack::Metadata => {
            Arc::new(MetadataCachingProvider::new(provider, config.metadata_ttl()))
        }
    }
}
