//! Tree nodes
//!
//! A node owns its children through `Arc`s and points back at its parent
//! through a `Weak`, so dropping a detached subtree frees it. Each node gets a
//! process-unique [`NodeId`] at creation. Equality and hashing use the name,
//! the parent's id and the payload only, never the children, so comparing
//! nodes cannot recurse through the parent/child links.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::errors::TreeError;
use crate::path::CloudPath;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Held across the cycle check and the attach in [`Node::add_child_named`]
static ATTACH: Mutex<()> = parking_lot::const_mutex(());

/// Stable identity of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A node in the cached directory tree
pub struct Node<T> {
    id: NodeId,
    name: RwLock<String>,
    parent: RwLock<Weak<Node<T>>>,
    children: DashMap<String, Arc<Node<T>>>,
    payload: RwLock<Option<T>>,
    dirty: AtomicBool,
}

impl<T> Node<T> {
    /// Detached node with no payload
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::build(name.into(), None)
    }

    /// Detached node carrying `payload`
    pub fn with_payload(name: impl Into<String>, payload: T) -> Arc<Self> {
        Self::build(name.into(), Some(payload))
    }

    fn build(name: String, payload: Option<T>) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::next(),
            name: RwLock::new(name),
            parent: RwLock::new(Weak::new()),
            children: DashMap::new(),
            payload: RwLock::new(payload),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.read().clone()
    }

    /// The parent, if attached and still alive
    pub fn parent(&self) -> Option<Arc<Node<T>>> {
        self.parent.read().upgrade()
    }

    pub fn child(&self, name: &str) -> Option<Arc<Node<T>>> {
        self.children.get(name).map(|child| Arc::clone(child.value()))
    }

    /// Snapshot of the current children
    pub fn children(&self) -> Vec<Arc<Node<T>>> {
        self.children
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Whether `self` sits strictly above `other`
    pub fn is_ancestor_of(&self, other: &Node<T>) -> bool {
        let mut current = other.parent();
        while let Some(node) = current {
            if node.id == self.id {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Attach `node` under its own name
    ///
    /// Returns the child previously stored under that name, if any.
    pub fn add_child(self: &Arc<Self>, node: Arc<Node<T>>) -> Result<Option<Arc<Node<T>>>, TreeError> {
        let name = node.name();
        self.add_child_named(&name, node)
    }

    /// Attach `node` under `name`, renaming it
    ///
    /// Fails if `node` is this node or one of its ancestors. A node that is
    /// still attached elsewhere is detached from its old parent first.
    pub fn add_child_named(
        self: &Arc<Self>,
        name: &str,
        node: Arc<Node<T>>,
    ) -> Result<Option<Arc<Node<T>>>, TreeError> {
        // two opposite attaches racing would both pass the check otherwise
        let _attach = ATTACH.lock();
        if node.id == self.id || node.is_ancestor_of(self) {
            return Err(TreeError::Cycle {
                parent: self.name(),
                child: node.name(),
            });
        }

        if let Some(old_parent) = node.parent() {
            let old_name = node.name();
            old_parent
                .children
                .remove_if(&old_name, |_, current| current.id == node.id);
        }

        *node.name.write() = name.to_string();
        *node.parent.write() = Arc::downgrade(self);
        let replaced = self.children.insert(name.to_string(), node);
        if let Some(old) = &replaced {
            *old.parent.write() = Weak::new();
        }
        trace!(parent = %self.name(), child = name, "Attached node");
        Ok(replaced)
    }

    /// Detach and return the child called `name`
    pub fn delete_child(&self, name: &str) -> Option<Arc<Node<T>>> {
        let (_, child) = self.children.remove(name)?;
        *child.parent.write() = Weak::new();
        Some(child)
    }

    /// Replace the payload and clear this node's dirty flag (ancestors keep theirs)
    pub fn update(&self, payload: T) {
        *self.payload.write() = Some(payload);
        self.dirty.store(false, Ordering::Release);
    }

    /// Mark this node and every ancestor dirty
    ///
    /// Walks existing parent links only, so the work is bounded by depth.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
        let mut current = self.parent();
        while let Some(node) = current {
            node.dirty.store(true, Ordering::Release);
            current = node.parent();
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Absolute path from the topmost ancestor down to this node
    ///
    /// The topmost ancestor is taken to be the root and contributes no segment.
    pub fn path(&self) -> CloudPath {
        let mut segments = Vec::new();
        let mut current_name = self.name();
        let mut current = self.parent();
        while let Some(node) = current {
            segments.push(current_name);
            current_name = node.name();
            current = node.parent();
        }
        segments.reverse();
        CloudPath::from_segments(true, segments)
    }
}

impl<T: Clone> Node<T> {
    pub fn payload(&self) -> Option<T> {
        self.payload.read().clone()
    }
}

impl<T: PartialEq> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let parent_id = |node: &Self| node.parent().map(|p| p.id);
        *self.name.read() == *other.name.read()
            && parent_id(self) == parent_id(other)
            && *self.payload.read() == *other.payload.read()
    }
}

impl<T: Eq> Eq for Node<T> {}

impl<T: Hash> Hash for Node<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.read().hash(state);
        self.parent().map(|p| p.id).hash(state);
        self.payload.read().hash(state);
    }
}

impl<T> std::fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &*self.name.read())
            .field("parent", &self.parent().map(|p| p.id))
            .field("children", &self.children.len())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
