//! CloudCache - caching and consistency layer for cloud providers
//!
//! Wraps a path-keyed storage backend in decorators that coalesce concurrent
//! identical requests, cache metadata and quota for a short TTL, and keep an
//! explicit directory tree whose nodes can be marked dirty.
//!
//! All decorators implement [`CloudProvider`] themselves, so a cache stack
//! looks exactly like a backend to whatever is layered on top of it.

pub mod cache;
pub mod path;
pub mod provider;
pub mod tree;

pub use cache::{decorate, select_stack, CacheConfig, CacheStack, StackSelection};
pub use path::CloudPath;
pub use provider::{CloudError, CloudProvider, CloudResult, ItemList, ItemMetadata, ItemType, Quota};
pub use tree::{Node, NodeTree};
