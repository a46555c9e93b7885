//! Hierarchical node-tree cache
//!
//! Explicit tree mirroring the remote directory structure with dirty-flag
//! propagation towards the root.

pub mod errors;
pub mod node;
pub mod node_tree;

pub use errors::TreeError;
pub use node::{Node, NodeId};
pub use node_tree::NodeTree;
