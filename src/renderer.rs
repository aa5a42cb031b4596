//! Mount and unmount entry points.

use std::sync::Arc;

use log::debug;

use crate::element::Element;
use crate::error::{HostError, Result};
use crate::host::{PassiveEffect, SceneHost};
use crate::reconciler::{public_root_instance, update_container};
use crate::registry::RootRegistry;
use crate::scene::{Namespace, NodeId, SceneHandle};

/// Renders element trees into nodes of a shared scene graph.
///
/// Every render into the same target reuses that target's root, so repeated
/// calls update the mounted tree in place. A commit holds the graph's write
/// lock from start to finish. Callbacks run after the commit has released
/// every lock, so they are free to read the scene or render again.
#[derive(Debug, Clone)]
pub struct SceneRenderer {
    scene: SceneHandle,
    namespace: Arc<Namespace>,
    roots: RootRegistry,
}

impl SceneRenderer {
    pub fn new(scene: SceneHandle) -> Self {
        Self::with_namespace(scene, Namespace::default())
    }

    pub fn with_namespace(scene: SceneHandle, namespace: Namespace) -> Self {
        Self {
            scene,
            namespace: Arc::new(namespace),
            roots: RootRegistry::new(),
        }
    }

    pub fn scene(&self) -> &SceneHandle {
        &self.scene
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn roots(&self) -> &RootRegistry {
        &self.roots
    }

    /// Renders `element` into `target` and returns the public instance of the
    /// tree's first scene node.
    pub fn render(&self, element: impl Into<Element>, target: NodeId) -> Result<Option<NodeId>> {
        self.commit(element.into(), target, None)
    }

    /// Like [`render`](Self::render), running `callback` once the commit is done.
    pub fn render_with_callback(
        &self,
        element: impl Into<Element>,
        target: NodeId,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<Option<NodeId>> {
        self.commit(element.into(), target, Some(Box::new(callback)))
    }

    /// Removes the tree mounted on `target` and forgets the target.
    ///
    /// Returns `false` when nothing was mounted there.
    pub fn unmount_component_at_node(&self, target: NodeId) -> Result<bool> {
        let Some(root) = self.roots.get(target) else {
            return Ok(false);
        };
        let roots = self.roots.clone();
        let forget: PassiveEffect = Box::new(move || {
            roots.remove(target);
            debug!("unmounted {target}");
        });
        let effects = {
            let mut root = root.lock();
            let mut graph = self.scene.write();
            let mut host = SceneHost::new(&mut *graph, &self.namespace);
            update_container(&mut host, Element::Empty, &mut *root, Some(forget))?;
            host.take_passive_effects()
        };
        run_effects(effects);
        Ok(true)
    }

    fn commit(
        &self,
        element: Element,
        target: NodeId,
        callback: Option<PassiveEffect>,
    ) -> Result<Option<NodeId>> {
        if !self.scene.read().contains(target) {
            return Err(HostError::UnknownTarget(target));
        }
        let (root, created) = self.roots.get_or_create(target);
        if created {
            debug!("created root for {target}");
        }
        let (public, effects) = {
            let mut root = root.lock();
            let mut graph = self.scene.write();
            let mut host = SceneHost::new(&mut *graph, &self.namespace);
            update_container(&mut host, element, &mut *root, callback)?;
            debug!("render into {target}: {} property write(s)", host.writes());
            (public_root_instance(&host, &*root), host.take_passive_effects())
        };
        run_effects(effects);
        Ok(public)
    }
}

fn run_effects(effects: Vec<PassiveEffect>) {
    for effect in effects {
        effect();
    }
}
