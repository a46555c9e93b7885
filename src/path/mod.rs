//! Hierarchical cloud paths
//!
//! Immutable, segment-based paths used as cache keys by every layer.

pub mod cloud_path;

pub use cloud_path::{CloudPath, PathError, SEPARATOR};
