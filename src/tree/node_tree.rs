//! Node tree
//!
//! Explicit mirror of the remote directory structure. Mutations mark the
//! affected nodes and all their ancestors dirty, so a caller can tell whether
//! a materialized listing is stale by looking at one flag instead of
//! rescanning every cached key.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::errors::TreeError;
use super::node::Node;
use crate::path::CloudPath;

/// Tree of cached nodes rooted at `/`
pub struct NodeTree<T> {
    root: Arc<Node<T>>,
    /// Makes find-then-attach sequences atomic against each other
    structure: Mutex<()>,
}

impl<T> NodeTree<T> {
    pub fn new() -> Self {
        Self {
            root: Node::new(""),
            structure: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Arc<Node<T>> {
        &self.root
    }

    /// Walk from the root one segment at a time; no partial matches
    ///
    /// Relative paths are never found.
    pub fn lookup(&self, path: &CloudPath) -> Option<Arc<Node<T>>> {
        if !path.is_absolute() {
            return None;
        }
        let mut current = Arc::clone(&self.root);
        for segment in path {
            current = current.child(segment)?;
        }
        Some(current)
    }

    /// Node at `path`, creating it and any missing ancestors
    pub fn get_or_create(&self, path: &CloudPath) -> Result<Arc<Node<T>>, TreeError> {
        require_absolute(path)?;
        let _guard = self.structure.lock();
        let mut current = Arc::clone(&self.root);
        for segment in path {
            current = match current.child(segment) {
                Some(child) => child,
                None => {
                    let child = Node::new(segment.as_str());
                    // a fresh node cannot be an ancestor of anything
                    let _ = current.add_child(Arc::clone(&child));
                    child
                }
            };
        }
        Ok(current)
    }

    /// Store `payload` at `path`, creating nodes as needed
    pub fn insert(&self, path: &CloudPath, payload: T) -> Result<Arc<Node<T>>, TreeError> {
        let node = self.get_or_create(path)?;
        node.update(payload);
        Ok(node)
    }

    /// Mark the node at `path` and its ancestors dirty
    ///
    /// Returns false when nothing is cached at `path`.
    pub fn mark_dirty(&self, path: &CloudPath) -> bool {
        match self.lookup(path) {
            Some(node) => {
                node.mark_dirty();
                true
            }
            None => false,
        }
    }

    /// Move the node at `from` to `to`
    ///
    /// The old parent and the moved node are marked dirty, which dirties the
    /// ancestors along both the old and the new path. The parent of `to` must
    /// already be cached. Any node previously at `to` is replaced and returned.
    pub fn move_node(&self, from: &CloudPath, to: &CloudPath) -> Result<Option<Arc<Node<T>>>, TreeError> {
        require_absolute(from)?;
        require_absolute(to)?;
        let _guard = self.structure.lock();

        let name = to.file_name().ok_or(TreeError::Root("a move target"))?;
        let node = self
            .lookup(from)
            .ok_or_else(|| TreeError::NotFound(from.clone()))?;
        let old_parent = node.parent().ok_or(TreeError::Root("moved"))?;
        let new_parent = to
            .parent()
            .and_then(|parent| self.lookup(&parent))
            .ok_or_else(|| TreeError::NotFound(to.clone()))?;

        let replaced = new_parent.add_child_named(name, Arc::clone(&node))?;
        old_parent.mark_dirty();
        node.mark_dirty();
        debug!(from = %from, to = %to, "Moved cached node");
        Ok(replaced)
    }

    /// Remove the node at `path`, marking its former ancestors dirty
    pub fn delete(&self, path: &CloudPath) -> Result<Arc<Node<T>>, TreeError> {
        require_absolute(path)?;
        let _guard = self.structure.lock();

        let name = path.file_name().ok_or(TreeError::Root("deleted"))?;
        let parent = path
            .parent()
            .and_then(|parent| self.lookup(&parent))
            .ok_or_else(|| TreeError::NotFound(path.clone()))?;
        let removed = parent
            .delete_child(name)
            .ok_or_else(|| TreeError::NotFound(path.clone()))?;
        parent.mark_dirty();
        debug!(path = %path, "Deleted cached node");
        Ok(removed)
    }
}

fn require_absolute(path: &CloudPath) -> Result<(), TreeError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(TreeError::Relative(path.clone()))
    }
}

impl<T> Default for NodeTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> CloudPath {
        CloudPath::new(s)
    }

    fn sample() -> NodeTree<&'static str> {
        let tree = NodeTree::new();
        tree.insert(&p("/a/b/c"), "c").unwrap();
        tree.insert(&p("/a/b/d"), "d").unwrap();
        tree.insert(&p("/dir/x/inner"), "inner").unwrap();
        tree.get_or_create(&p("/e")).unwrap();
        tree
    }

    #[test]
    fn test_lookup() {
        let tree = sample();
        assert_eq!(tree.lookup(&p("/a/b/c")).unwrap().payload(), Some("c"));
        assert_eq!(tree.lookup(&CloudPath::root()).unwrap().id(), tree.root().id());
        assert!(tree.lookup(&p("/a/b/zzz")).is_none());
        assert!(tree.lookup(&p("/a/b/c/deeper")).is_none());
    }

    #[test]
    fn test_relative_paths_are_rejected() {
        let tree = sample();
        assert!(tree.lookup(&p("a/b")).is_none());
        assert!(tree.lookup(&p("a/b/c")).is_none());
        assert!(!tree.mark_dirty(&p("a/b/c")));
        assert!(matches!(
            tree.insert(&p("a/new"), "new"),
            Err(TreeError::Relative(_))
        ));
        assert!(tree.lookup(&p("/a/new")).is_none());
        assert!(matches!(
            tree.move_node(&p("e"), &p("/e2")),
            Err(TreeError::Relative(_))
        ));
        assert!(matches!(tree.delete(&p("a/b")), Err(TreeError::Relative(_))));
    }

    #[test]
    fn test_mark_dirty_reaches_root_and_update_clears_only_node() {
        let tree = sample();
        assert!(tree.mark_dirty(&p("/a/b/c")));

        for path in ["/a/b/c", "/a/b", "/a", "/"] {
            assert!(tree.lookup(&p(path)).unwrap().is_dirty(), "{path}");
        }
        assert!(!tree.lookup(&p("/a/b/d")).unwrap().is_dirty());
        assert!(!tree.lookup(&p("/e")).unwrap().is_dirty());

        tree.lookup(&p("/a/b/c")).unwrap().update("c2");
        assert!(!tree.lookup(&p("/a/b/c")).unwrap().is_dirty());
        for path in ["/a/b", "/a", "/"] {
            assert!(tree.lookup(&p(path)).unwrap().is_dirty(), "{path}");
        }

        assert!(!tree.mark_dirty(&p("/nowhere")));
    }

    #[test]
    fn test_move_marks_both_paths_dirty() {
        let tree = sample();
        tree.move_node(&p("/dir/x"), &p("/a/y")).unwrap();

        assert!(tree.lookup(&p("/dir/x")).is_none());
        let moved = tree.lookup(&p("/a/y/inner")).unwrap();
        assert_eq!(moved.payload(), Some("inner"));
        assert_eq!(moved.path(), p("/a/y/inner"));

        for path in ["/dir", "/a/y", "/a", "/"] {
            assert!(tree.lookup(&p(path)).unwrap().is_dirty(), "{path}");
        }
        assert!(!tree.lookup(&p("/a/b")).unwrap().is_dirty());
    }

    #[test]
    fn test_move_into_own_subtree_is_rejected() {
        let tree = sample();
        assert!(matches!(
            tree.move_node(&p("/a"), &p("/a/b/a")),
            Err(TreeError::Cycle { .. })
        ));
        assert!(tree.lookup(&p("/a/b/c")).is_some());
    }

    #[test]
    fn test_move_requires_cached_target_parent() {
        let tree = sample();
        assert!(matches!(
            tree.move_node(&p("/e"), &p("/unknown/e")),
            Err(TreeError::NotFound(_))
        ));
        assert!(matches!(
            tree.move_node(&p("/missing"), &p("/e2")),
            Err(TreeError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_marks_former_ancestors() {
        let tree = sample();
        let removed = tree.delete(&p("/a/b/c")).unwrap();
        assert_eq!(removed.payload(), Some("c"));
        assert!(removed.parent().is_none());

        assert!(tree.lookup(&p("/a/b/c")).is_none());
        for path in ["/a/b", "/a", "/"] {
            assert!(tree.lookup(&p(path)).unwrap().is_dirty(), "{path}");
        }
        assert!(matches!(
            tree.delete(&p("/a/b/c")),
            Err(TreeError::NotFound(_))
        ));
        assert!(matches!(
            tree.delete(&CloudPath::root()),
            Err(TreeError::Root(_))
        ));
    }

    #[test]
    fn test_concurrent_mark_dirty() {
        let tree = Arc::new(sample());
        let handles: Vec<_> = ["/a/b/c", "/a/b/d", "/dir/x/inner", "/e"]
            .into_iter()
            .map(|path| {
                let tree = Arc::clone(&tree);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tree.mark_dirty(&CloudPath::new(path));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for path in ["/a/b/c", "/a/b/d", "/a/b", "/a", "/dir/x", "/dir", "/e", "/"] {
            assert!(tree.lookup(&p(path)).unwrap().is_dirty(), "{path}");
        }
    }
}
