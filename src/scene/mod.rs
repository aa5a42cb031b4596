//! Retained scene graph mutated by the reconciler host.

mod namespace;
mod object;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use glam::{EulerRot, Mat4, Quat};
use log::warn;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

pub use namespace::{constructor_name, Constructor, Namespace};
pub use object::{PropertyTarget, SceneObject};

/// Handle of a node stored in a [`SceneGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A live object together with its place in the hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    object: SceneObject,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl SceneNode {
    pub fn object(&self) -> &SceneObject {
        &self.object
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Structural notification emitted by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEvent {
    Added { parent: NodeId, child: NodeId },
    Removed { parent: NodeId, child: NodeId },
    Disposed(NodeId),
}

/// Arena of scene nodes.
///
/// Nodes are created detached. `add`, `insert_before` and `remove` maintain the
/// parent back-reference and the ordered children list together; every
/// attach and detach is recorded as a [`GraphEvent`] until drained.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: HashMap<NodeId, SceneNode>,
    next_id: u64,
    events: Vec<GraphEvent>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a detached object and returns its handle.
    pub fn insert(&mut self, object: SceneObject) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            SceneNode {
                object,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn object(&self, id: NodeId) -> Option<&SceneObject> {
        self.nodes.get(&id).map(|node| &node.object)
    }

    pub fn object_mut(&mut self, id: NodeId) -> Option<&mut SceneObject> {
        self.nodes.get_mut(&id).map(|node| &mut node.object)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Appends `child` to `parent`, detaching it from any previous parent.
    pub fn add(&mut self, parent: NodeId, child: NodeId) -> bool {
        if !self.can_attach(parent, child) {
            return false;
        }
        self.detach(child);
        self.link(parent, child);
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        true
    }

    /// Places `child` immediately before `before` among `parent`'s children.
    ///
    /// The children list has no positional insert of its own: the child is
    /// linked first, then the list is rebuilt around the anchor's index. A
    /// missing anchor appends.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, before: NodeId) -> bool {
        if child == before || !self.can_attach(parent, child) {
            return false;
        }
        self.detach(child);
        self.link(parent, child);
        let Some(node) = self.nodes.get_mut(&parent) else {
            return false;
        };
        let index = match node.children.iter().position(|id| *id == before) {
            Some(index) => index,
            None => {
                warn!("insert_before: {before} is not a child of {parent}; appending {child}");
                node.children.len()
            }
        };
        let mut rebuilt = Vec::with_capacity(node.children.len() + 1);
        rebuilt.extend_from_slice(&node.children[..index]);
        rebuilt.push(child);
        rebuilt.extend_from_slice(&node.children[index..]);
        node.children = rebuilt;
        true
    }

    /// Detaches `child` from `parent`. The node itself stays in the arena.
    pub fn remove(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.parent(child) != Some(parent) {
            return false;
        }
        self.detach(child);
        true
    }

    /// Detaches `id` and drops it together with its whole subtree.
    pub fn dispose(&mut self, id: NodeId) -> usize {
        self.detach(id);
        let mut stack = vec![id];
        let mut disposed = 0;
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
                self.events.push(GraphEvent::Disposed(current));
                disposed += 1;
            }
        }
        disposed
    }

    /// Drains the structural notifications recorded so far.
    pub fn take_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    /// Depth-first, pre-order walk starting at `root` (included).
    pub fn traverse(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            order.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Local transform of `id` composed with every ancestor's.
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.nodes.get(&node_id) else {
                break;
            };
            matrix = local_matrix(&node.object) * matrix;
            current = node.parent;
        }
        matrix
    }

    fn can_attach(&self, parent: NodeId, child: NodeId) -> bool {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return false;
        }
        if self.is_ancestor(child, parent) {
            warn!("refusing to attach {child} below its own descendant {parent}");
            return false;
        }
        true
    }

    fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        self.events.push(GraphEvent::Added { parent, child });
    }

    fn detach(&mut self, child: NodeId) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|id| *id != child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
        self.events.push(GraphEvent::Removed { parent, child });
    }
}

fn local_matrix(object: &SceneObject) -> Mat4 {
    let rotation = object.rotation();
    Mat4::from_scale_rotation_translation(
        object.scale(),
        Quat::from_euler(EulerRot::XYZ, rotation.x, rotation.y, rotation.z),
        object.position(),
    )
}

/// Shared, lock-protected scene graph.
///
/// Commits take the write lock for their whole duration and frames take the
/// read lock, so a frame never observes a half-applied commit.
#[derive(Debug, Default)]
pub struct SceneHandle {
    graph: Arc<RwLock<SceneGraph>>,
}

impl Clone for SceneHandle {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
        }
    }
}

impl SceneHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_graph(graph: SceneGraph) -> Self {
        Self {
            graph: Arc::new(RwLock::new(graph)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, SceneGraph> {
        self.graph.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, SceneGraph> {
        self.graph.write()
    }
}
