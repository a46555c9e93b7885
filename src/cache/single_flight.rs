//! Single-flight request table
//!
//! At most one upstream call per key is outstanding at any time. Callers that
//! arrive while a call is in flight attach to its ticket and observe the same
//! outcome. The ticket is removed as soon as the call completes, so the next
//! caller triggers a fresh fetch; this is coalescing, not caching.
//!
//! Upstream calls run on a spawned tokio task: a ticket always completes and
//! removes itself even if every waiter goes away.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, trace};

use crate::provider::{CloudError, CloudResult};

type SharedOutcome<V> = Shared<BoxFuture<'static, CloudResult<V>>>;

/// An in-flight upstream call
struct Ticket<V: Clone> {
    /// Distinguishes this ticket from later ones for the same key
    id: u64,
    outcome: SharedOutcome<V>,
}

/// Per-key coalescing of concurrent requests
pub struct SingleFlight<K, V: Clone> {
    inflight: Arc<DashMap<K, Ticket<V>>>,
    next_id: AtomicU64,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Join the in-flight call for `key`, or start one with `loader`
    ///
    /// `loader` runs only when no ticket exists. Claiming the slot and
    /// inserting the ticket happen under the map's entry lock, so concurrent
    /// callers for one key always end up sharing a single ticket.
    pub async fn get<F, Fut>(&self, key: K, loader: F) -> CloudResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CloudResult<V>> + Send + 'static,
    {
        let outcome = match self.inflight.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                trace!(key = ?key, "Joined in-flight request");
                occupied.get().outcome.clone()
            }
            Entry::Vacant(vacant) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let inflight = Arc::clone(&self.inflight);
                let upstream = loader();
                let done_key = key.clone();

                let task = tokio::spawn(async move {
                    let result = upstream.await;
                    // Only drop our own ticket; it may already be evicted and replaced
                    inflight.remove_if(&done_key, |_, ticket| ticket.id == id);
                    result
                });

                let outcome: SharedOutcome<V> = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(join_err) => Err(CloudError::from(join_err)),
                    }
                }
                .boxed()
                .shared();

                vacant.insert(Ticket {
                    id,
                    outcome: outcome.clone(),
                });
                debug!(key = ?key, ticket = id, "Started upstream request");
                outcome
            }
        };

        outcome.await
    }

    /// Forget the ticket for `key`; its current waiters still get the outcome
    pub fn evict(&self, key: &K) {
        if self.inflight.remove(key).is_some() {
            debug!(key = ?key, "Evicted in-flight request");
        }
    }

    /// Forget every ticket whose key matches `predicate`
    ///
    /// Shards are scanned one at a time; a ticket inserted concurrently may
    /// or may not be caught.
    pub fn evict_where<P>(&self, predicate: P)
    where
        P: Fn(&K) -> bool,
    {
        self.inflight.retain(|key, _| {
            let matched = predicate(key);
            if matched {
                debug!(key = ?key, "Evicted in-flight request");
            }
            !matched
        });
    }

    /// Number of outstanding tickets
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inflight.contains_key(key)
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
