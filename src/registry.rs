use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::reconciler::{create_container, RootHandle};
use crate::scene::NodeId;

/// Engine root mounted on a scene node.
pub type SceneRoot = RootHandle<NodeId, NodeId, Infallible>;

/// Shared handle to one mounted root.
pub type SharedRoot = Arc<Mutex<SceneRoot>>;

/// Table from mount target to the engine root rendering into it.
///
/// Entries are created on the first render into a target and removed once
/// the target is unmounted. Clones share the same table. The table lock is
/// only held for lookups, never while a commit runs.
#[derive(Debug, Default, Clone)]
pub struct RootRegistry {
    roots: Arc<Mutex<HashMap<NodeId, SharedRoot>>>,
}

impl RootRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: NodeId) -> Option<SharedRoot> {
        self.roots.lock().get(&target).cloned()
    }

    /// Returns the root for `target`, creating it when absent. The flag is
    /// `true` when a new root was created.
    pub fn get_or_create(&self, target: NodeId) -> (SharedRoot, bool) {
        let mut roots = self.roots.lock();
        if let Some(root) = roots.get(&target) {
            return (Arc::clone(root), false);
        }
        let root = Arc::new(Mutex::new(create_container(target)));
        roots.insert(target, Arc::clone(&root));
        (root, true)
    }

    pub fn remove(&self, target: NodeId) -> bool {
        self.roots.lock().remove(&target).is_some()
    }

    pub fn contains(&self, target: NodeId) -> bool {
        self.roots.lock().contains_key(&target)
    }

    pub fn len(&self) -> usize {
        self.roots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.lock().is_empty()
    }

    pub fn targets(&self) -> Vec<NodeId> {
        let mut targets: Vec<NodeId> = self.roots.lock().keys().copied().collect();
        targets.sort();
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{SceneGraph, SceneObject};

    fn target() -> NodeId {
        SceneGraph::new().insert(SceneObject::new("Scene"))
    }

    #[test]
    fn get_or_create_reuses_the_entry() {
        let registry = RootRegistry::new();
        let target = target();
        let (first, created) = registry.get_or_create(target);
        assert!(created);
        let (second, created) = registry.get_or_create(target);
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn clones_share_the_table() {
        let registry = RootRegistry::new();
        let target = target();
        registry.get_or_create(target);
        let clone = registry.clone();
        assert!(clone.remove(target));
        assert!(registry.is_empty());
        assert!(!registry.remove(target));
    }
}
