//! Host contract between the reconciler and a rendering target.
//!
//! [`HostConfig`] lists every hook the reconciler calls, in the shape it calls
//! them. [`SceneHost`] implements the contract against a [`SceneGraph`]:
//! instances are scene nodes, containers are scene nodes registered as mount
//! targets, and text has no representation at all.

use std::convert::Infallible;
use std::fmt;

use log::{debug, trace, warn};

use crate::error::{HostError, Result};
use crate::props::apply_props;
use crate::scene::{Namespace, NodeId, SceneGraph};
use crate::value::PropBag;

/// Deferred work handed to the host after a commit.
pub type PassiveEffect = Box<dyn FnOnce() + Send + 'static>;

/// Callback table a rendering target provides to the reconciler.
pub trait HostConfig {
    type Container: Copy + PartialEq + fmt::Debug;
    type Instance: Copy + PartialEq + fmt::Debug;
    type TextInstance;
    type HostContext: Clone;
    type UpdatePayload;
    type PublicInstance;

    fn create_instance(
        &mut self,
        kind: &str,
        props: &PropBag,
        root: Self::Container,
        context: &Self::HostContext,
    ) -> Result<Self::Instance>;

    fn append_initial_child(&mut self, parent: Self::Instance, child: Option<Self::Instance>);

    fn append_child(&mut self, parent: Self::Instance, child: Option<Self::Instance>);

    fn append_child_to_container(
        &mut self,
        container: Self::Container,
        child: Option<Self::Instance>,
    );

    fn insert_before(
        &mut self,
        parent: Self::Instance,
        child: Option<Self::Instance>,
        before: Self::Instance,
    );

    fn insert_in_container_before(
        &mut self,
        container: Self::Container,
        child: Option<Self::Instance>,
        before: Self::Instance,
    );

    fn remove_child(&mut self, parent: Self::Instance, child: Option<Self::Instance>);

    fn remove_child_from_container(
        &mut self,
        container: Self::Container,
        child: Option<Self::Instance>,
    );

    /// Releases an instance created by a commit that failed before the
    /// instance reached the tree. It may already be gone if an ancestor was
    /// released first.
    fn detach_deleted_instance(&mut self, instance: Self::Instance);

    fn prepare_update(
        &self,
        instance: Self::Instance,
        kind: &str,
        old_props: &PropBag,
        new_props: &PropBag,
    ) -> Option<Self::UpdatePayload>;

    fn commit_update(
        &mut self,
        instance: Self::Instance,
        payload: Self::UpdatePayload,
        kind: &str,
        old_props: &PropBag,
        new_props: &PropBag,
    ) -> Result<()>;

    fn get_public_instance(&self, instance: Self::Instance) -> Self::PublicInstance;

    fn get_root_host_context(&self, container: Self::Container) -> Self::HostContext;

    fn get_child_host_context(&self, parent: &Self::HostContext, kind: &str) -> Self::HostContext;

    fn create_text_instance(
        &mut self,
        text: &str,
        root: Self::Container,
        context: &Self::HostContext,
    ) -> Option<Self::TextInstance>;

    fn finalize_initial_children(
        &mut self,
        instance: Self::Instance,
        kind: &str,
        props: &PropBag,
    ) -> bool;

    fn should_deprioritize_subtree(&self, kind: &str, props: &PropBag) -> bool;

    fn should_set_text_content(&self, kind: &str, props: &PropBag) -> bool;

    fn prepare_for_commit(&mut self, container: Self::Container);

    fn reset_after_commit(&mut self, container: Self::Container);

    fn schedule_passive_effects(&mut self, effect: PassiveEffect);

    fn cancel_passive_effects(&mut self);
}

/// Host context of the scene target. There is nothing to partition, so every
/// node shares the same empty value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SceneContext;

/// Update payload returned for every node: "commit this update".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeedsUpdate;

/// [`HostConfig`] that mutates a scene graph in place.
///
/// Passive effects are queued rather than run, because the caller usually
/// holds the graph lock while the host is alive. Drain them with
/// [`take_passive_effects`](Self::take_passive_effects) once the lock is gone.
pub struct SceneHost<'a> {
    graph: &'a mut SceneGraph,
    namespace: &'a Namespace,
    writes: usize,
    pending: Vec<PassiveEffect>,
}

impl<'a> SceneHost<'a> {
    pub fn new(graph: &'a mut SceneGraph, namespace: &'a Namespace) -> Self {
        Self {
            graph,
            namespace,
            writes: 0,
            pending: Vec::new(),
        }
    }

    pub fn graph(&self) -> &SceneGraph {
        self.graph
    }

    /// Property writes performed through this host so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Effects scheduled since the last call, in scheduling order.
    pub fn take_passive_effects(&mut self) -> Vec<PassiveEffect> {
        std::mem::take(&mut self.pending)
    }

    fn attach(&mut self, parent: NodeId, child: Option<NodeId>) {
        let Some(child) = child else {
            return;
        };
        if !self.graph.add(parent, child) {
            warn!("could not attach {child} to {parent}");
        }
    }

    fn attach_before(&mut self, parent: NodeId, child: Option<NodeId>, before: NodeId) {
        let Some(child) = child else {
            return;
        };
        if !self.graph.insert_before(parent, child, before) {
            warn!("could not insert {child} before {before} in {parent}");
        }
    }

    fn detach(&mut self, parent: NodeId, child: Option<NodeId>) {
        let Some(child) = child else {
            return;
        };
        if !self.graph.remove(parent, child) {
            warn!("{child} is not a child of {parent}");
        }
        let disposed = self.graph.dispose(child);
        trace!("removed {child} from {parent} ({disposed} node(s) disposed)");
    }
}

impl HostConfig for SceneHost<'_> {
    type Container = NodeId;
    type Instance = NodeId;
    type TextInstance = Infallible;
    type HostContext = SceneContext;
    type UpdatePayload = NeedsUpdate;
    type PublicInstance = NodeId;

    fn create_instance(
        &mut self,
        kind: &str,
        props: &PropBag,
        _root: NodeId,
        _context: &SceneContext,
    ) -> Result<NodeId> {
        let mut object = self
            .namespace
            .construct(kind)
            .ok_or_else(|| HostError::UnknownType(kind.to_string()))?;
        let writes = apply_props(&mut object, &PropBag::new(), props)?;
        self.writes += writes;
        let id = self.graph.insert(object);
        debug!("created {kind} as {id} ({writes} initial writes)");
        Ok(id)
    }

    fn append_initial_child(&mut self, parent: NodeId, child: Option<NodeId>) {
        self.attach(parent, child);
    }

    fn append_child(&mut self, parent: NodeId, child: Option<NodeId>) {
        self.attach(parent, child);
    }

    fn append_child_to_container(&mut self, container: NodeId, child: Option<NodeId>) {
        self.attach(container, child);
    }

    fn insert_before(&mut self, parent: NodeId, child: Option<NodeId>, before: NodeId) {
        self.attach_before(parent, child, before);
    }

    fn insert_in_container_before(
        &mut self,
        container: NodeId,
        child: Option<NodeId>,
        before: NodeId,
    ) {
        self.attach_before(container, child, before);
    }

    fn remove_child(&mut self, parent: NodeId, child: Option<NodeId>) {
        self.detach(parent, child);
    }

    fn remove_child_from_container(&mut self, container: NodeId, child: Option<NodeId>) {
        self.detach(container, child);
    }

    fn detach_deleted_instance(&mut self, instance: NodeId) {
        if self.graph.contains(instance) {
            let disposed = self.graph.dispose(instance);
            trace!("released {instance} ({disposed} node(s) disposed)");
        }
    }

    fn prepare_update(
        &self,
        _instance: NodeId,
        _kind: &str,
        _old_props: &PropBag,
        _new_props: &PropBag,
    ) -> Option<NeedsUpdate> {
        Some(NeedsUpdate)
    }

    fn commit_update(
        &mut self,
        instance: NodeId,
        _payload: NeedsUpdate,
        kind: &str,
        old_props: &PropBag,
        new_props: &PropBag,
    ) -> Result<()> {
        let Some(object) = self.graph.object_mut(instance) else {
            warn!("commit_update on unknown node {instance} ({kind})");
            return Ok(());
        };
        let writes = apply_props(object, old_props, new_props)?;
        if writes > 0 {
            debug!("updated {kind} {instance} ({writes} writes)");
        }
        self.writes += writes;
        Ok(())
    }

    fn get_public_instance(&self, instance: NodeId) -> NodeId {
        instance
    }

    fn get_root_host_context(&self, _container: NodeId) -> SceneContext {
        SceneContext
    }

    fn get_child_host_context(&self, parent: &SceneContext, _kind: &str) -> SceneContext {
        *parent
    }

    fn create_text_instance(
        &mut self,
        text: &str,
        _root: NodeId,
        _context: &SceneContext,
    ) -> Option<Infallible> {
        trace!("dropping text content {text:?}: the scene graph has no text nodes");
        None
    }

    fn finalize_initial_children(
        &mut self,
        _instance: NodeId,
        _kind: &str,
        _props: &PropBag,
    ) -> bool {
        false
    }

    fn should_deprioritize_subtree(&self, _kind: &str, _props: &PropBag) -> bool {
        false
    }

    fn should_set_text_content(&self, _kind: &str, _props: &PropBag) -> bool {
        false
    }

    fn prepare_for_commit(&mut self, container: NodeId) {
        trace!("commit start on {container}");
    }

    fn reset_after_commit(&mut self, container: NodeId) {
        trace!("commit end on {container}");
    }

    fn schedule_passive_effects(&mut self, effect: PassiveEffect) {
        self.pending.push(effect);
    }

    fn cancel_passive_effects(&mut self) {
        if !self.pending.is_empty() {
            debug!("dropping {} unrun passive effect(s)", self.pending.len());
            self.pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneObject;
    use glam::Vec3;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn setup() -> (SceneGraph, Namespace, NodeId) {
        let mut graph = SceneGraph::new();
        let root = graph.insert(SceneObject::new("Scene"));
        (graph, Namespace::default(), root)
    }

    #[test]
    fn create_instance_applies_initial_props() {
        let (mut graph, namespace, root) = setup();
        let mut host = SceneHost::new(&mut graph, &namespace);
        let props = PropBag::new()
            .with("position", Vec3::new(1.0, 2.0, 3.0))
            .with("material-color", Vec3::X);
        let id = host
            .create_instance("mesh", &props, root, &SceneContext)
            .unwrap();
        assert_eq!(host.writes(), 2);
        let object = graph.object(id).unwrap();
        assert_eq!(object.kind(), "Mesh");
        assert_eq!(object.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(
            object.object("material").and_then(|m| m.vec3("color")),
            Some(Vec3::X)
        );
        assert_eq!(graph.parent(id), None);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let (mut graph, namespace, root) = setup();
        let mut host = SceneHost::new(&mut graph, &namespace);
        let err = host
            .create_instance("teapot", &PropBag::new(), root, &SceneContext)
            .unwrap_err();
        assert_eq!(err, HostError::UnknownType("teapot".into()));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn missing_children_are_ignored() {
        let (mut graph, namespace, root) = setup();
        let mut host = SceneHost::new(&mut graph, &namespace);
        host.append_child_to_container(root, None);
        host.append_child(root, None);
        host.remove_child(root, None);
        host.remove_child_from_container(root, None);
        host.insert_before(root, None, root);
        assert!(graph.children(root).is_empty());
    }

    #[test]
    fn insert_before_example() {
        let (mut graph, namespace, root) = setup();
        let mut host = SceneHost::new(&mut graph, &namespace);
        let parent = host
            .create_instance("group", &PropBag::new(), root, &SceneContext)
            .unwrap();
        let a = host
            .create_instance("mesh", &PropBag::new(), root, &SceneContext)
            .unwrap();
        let b = host
            .create_instance("mesh", &PropBag::new(), root, &SceneContext)
            .unwrap();
        let c = host
            .create_instance("mesh", &PropBag::new(), root, &SceneContext)
            .unwrap();
        host.append_initial_child(parent, Some(a));
        host.append_initial_child(parent, Some(c));
        host.insert_before(parent, Some(b), c);
        assert_eq!(graph.children(parent), &[a, b, c]);
    }

    #[test]
    fn remove_child_discards_the_subtree() {
        let (mut graph, namespace, root) = setup();
        let mut host = SceneHost::new(&mut graph, &namespace);
        let group = host
            .create_instance("group", &PropBag::new(), root, &SceneContext)
            .unwrap();
        let mesh = host
            .create_instance("mesh", &PropBag::new(), root, &SceneContext)
            .unwrap();
        host.append_initial_child(group, Some(mesh));
        host.append_child_to_container(root, Some(group));
        host.remove_child_from_container(root, Some(group));
        assert!(graph.children(root).is_empty());
        assert!(!graph.contains(group));
        assert!(!graph.contains(mesh));
    }

    #[test]
    fn commit_update_with_equal_bags_writes_nothing() {
        let (mut graph, namespace, root) = setup();
        let mut host = SceneHost::new(&mut graph, &namespace);
        let props = PropBag::new().with("position", Vec3::ONE);
        let id = host
            .create_instance("mesh", &props, root, &SceneContext)
            .unwrap();
        let before = host.writes();
        let payload = host.prepare_update(id, "mesh", &props, &props).unwrap();
        host.commit_update(id, payload, "mesh", &props, &props)
            .unwrap();
        assert_eq!(host.writes(), before);
    }

    #[test]
    fn constant_hooks() {
        let (mut graph, namespace, root) = setup();
        let mut host = SceneHost::new(&mut graph, &namespace);
        let props = PropBag::new();
        assert!(host
            .create_text_instance("hello", root, &SceneContext)
            .is_none());
        assert!(!host.finalize_initial_children(root, "scene", &props));
        assert!(!host.should_deprioritize_subtree("mesh", &props));
        assert!(!host.should_set_text_content("mesh", &props));
        assert_eq!(host.get_public_instance(root), root);
        let context = host.get_root_host_context(root);
        assert_eq!(host.get_child_host_context(&context, "mesh"), SceneContext);
    }

    #[test]
    fn passive_effects_wait_to_be_drained() {
        let (mut graph, namespace, _) = setup();
        let mut host = SceneHost::new(&mut graph, &namespace);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        host.schedule_passive_effects(Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(!ran.load(Ordering::SeqCst));
        let effects = host.take_passive_effects();
        assert_eq!(effects.len(), 1);
        assert!(host.take_passive_effects().is_empty());
        for effect in effects {
            effect();
        }
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_drops_queued_effects() {
        let (mut graph, namespace, _) = setup();
        let mut host = SceneHost::new(&mut graph, &namespace);
        host.schedule_passive_effects(Box::new(|| {}));
        host.cancel_passive_effects();
        assert!(host.take_passive_effects().is_empty());
    }

    #[test]
    fn released_instances_leave_the_graph() {
        let (mut graph, namespace, root) = setup();
        let mut host = SceneHost::new(&mut graph, &namespace);
        let group = host
            .create_instance("group", &PropBag::new(), root, &SceneContext)
            .unwrap();
        let mesh = host
            .create_instance("mesh", &PropBag::new(), root, &SceneContext)
            .unwrap();
        host.append_initial_child(group, Some(mesh));
        host.detach_deleted_instance(group);
        host.detach_deleted_instance(mesh);
        assert!(!graph.contains(group));
        assert!(!graph.contains(mesh));
        assert_eq!(graph.len(), 1);
    }
}
