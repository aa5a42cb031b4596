//! Synchronous tree reconciler driving any [`HostConfig`].
//!
//! Each root keeps the fiber tree it committed last. An update walks the new
//! element tree against it level by level: children are matched by key, or by
//! position among unkeyed siblings, and reused only when their type is
//! unchanged. Everything else is created or removed. Once a host parent's
//! children are reconciled, a placement pass issues the `append_child` and
//! `insert_before` calls needed to bring its children into element order.
//!
//! Mutations are applied as they are discovered; there is no separate render
//! phase and no scheduling.

use std::mem;

use log::{debug, trace, warn};

use crate::element::{child_elements, Component, Element};
use crate::error::Result;
use crate::host::{HostConfig, PassiveEffect};
use crate::value::PropBag;

/// Parent a host node can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostParent<C, I> {
    Container(C),
    Instance(I),
}

#[derive(Debug)]
enum FiberKind<I, X> {
    Host {
        kind: String,
        props: PropBag,
        instance: I,
    },
    Component {
        component: Component,
        props: PropBag,
    },
    Fragment,
    Text {
        instance: Option<X>,
    },
    Empty,
}

#[derive(Debug)]
struct Fiber<I, X> {
    key: Option<String>,
    kind: FiberKind<I, X>,
    children: Vec<Fiber<I, X>>,
}

impl<I, X> Fiber<I, X> {
    fn leaf(key: Option<String>, kind: FiberKind<I, X>) -> Self {
        Self {
            key,
            kind,
            children: Vec::new(),
        }
    }

    fn accepts(&self, element: &Element) -> bool {
        match (&self.kind, element) {
            (FiberKind::Host { kind, .. }, Element::Host(descriptor)) => kind == descriptor.kind(),
            (FiberKind::Component { component, .. }, Element::Component(element)) => {
                component == element.component()
            }
            (FiberKind::Fragment, Element::Fragment(_))
            | (FiberKind::Text { .. }, Element::Text(_))
            | (FiberKind::Empty, Element::Empty) => true,
            _ => false,
        }
    }
}

/// Outermost host nodes of `fibers`, in tree order.
fn host_instances<I: Copy, X>(fibers: &[Fiber<I, X>]) -> Vec<I> {
    let mut instances = Vec::new();
    collect_host_instances(fibers, &mut instances);
    instances
}

fn collect_host_instances<I: Copy, X>(fibers: &[Fiber<I, X>], out: &mut Vec<I>) {
    for fiber in fibers {
        match &fiber.kind {
            FiberKind::Host { instance, .. } => out.push(*instance),
            _ => collect_host_instances(&fiber.children, out),
        }
    }
}

/// Engine-side state of one mounted tree.
#[derive(Debug)]
pub struct RootHandle<C, I, X> {
    container: C,
    current: Vec<Fiber<I, X>>,
}

/// Root handle for the node types of host `H`.
pub type HostRoot<H> = RootHandle<
    <H as HostConfig>::Container,
    <H as HostConfig>::Instance,
    <H as HostConfig>::TextInstance,
>;

impl<C: Copy, I: Copy, X> RootHandle<C, I, X> {
    pub fn container(&self) -> C {
        self.container
    }

    /// Host nodes currently attached directly to the container.
    pub fn host_instances(&self) -> Vec<I> {
        host_instances(&self.current)
    }
}

/// Creates the engine root for `container`. Nothing is committed until the
/// first [`update_container`].
pub fn create_container<C, I, X>(container: C) -> RootHandle<C, I, X> {
    RootHandle {
        container,
        current: Vec::new(),
    }
}

/// Reconciles `element` into `root` and commits the result through `host`.
///
/// `callback` is handed to [`HostConfig::schedule_passive_effects`] once the
/// commit succeeded. If the commit fails, the previous tree is removed from the
/// container, every instance created by the commit is released and the root is
/// left empty, so the next update mounts from scratch.
pub fn update_container<H: HostConfig>(
    host: &mut H,
    element: Element,
    root: &mut HostRoot<H>,
    callback: Option<PassiveEffect>,
) -> Result<()> {
    host.cancel_passive_effects();
    let container = root.container;
    host.prepare_for_commit(container);
    let context = host.get_root_host_context(container);
    let previous = mem::take(&mut root.current);
    let attached = host_instances(&previous);
    let mut commit = Commit {
        host: &mut *host,
        root: container,
        created: Vec::new(),
    };
    let result = commit.reconcile_host_children(
        HostParent::Container(container),
        previous,
        vec![element],
        &context,
    );
    if result.is_err() {
        commit.discard(&attached);
    }
    host.reset_after_commit(container);
    root.current = result?;
    debug!(
        "committed {:?} with {} top-level node(s)",
        container,
        host_instances(&root.current).len()
    );
    if let Some(callback) = callback {
        host.schedule_passive_effects(callback);
    }
    Ok(())
}

/// Public instance of the first host node mounted in `root`.
pub fn public_root_instance<H: HostConfig>(
    host: &H,
    root: &HostRoot<H>,
) -> Option<H::PublicInstance> {
    host_instances(&root.current)
        .first()
        .map(|instance| host.get_public_instance(*instance))
}

type HostFiber<H> = Fiber<<H as HostConfig>::Instance, <H as HostConfig>::TextInstance>;

struct Commit<'h, H: HostConfig> {
    host: &'h mut H,
    root: H::Container,
    /// Instances created so far, in creation order.
    created: Vec<H::Instance>,
}

impl<H: HostConfig> Commit<'_, H> {
    /// Tears down what a failed commit leaves behind. `attached` are the host
    /// nodes the container held before the commit started; placement in the
    /// container only runs after the whole tree reconciled, so they are still
    /// its children.
    fn discard(&mut self, attached: &[H::Instance]) {
        warn!(
            "commit on {:?} failed; dropping {} attached and {} new node(s)",
            self.root,
            attached.len(),
            self.created.len()
        );
        for instance in attached {
            self.host.remove_child_from_container(self.root, Some(*instance));
        }
        for instance in mem::take(&mut self.created) {
            self.host.detach_deleted_instance(instance);
        }
    }

    fn reconcile_host_children(
        &mut self,
        parent: HostParent<H::Container, H::Instance>,
        old: Vec<HostFiber<H>>,
        elements: Vec<Element>,
        context: &H::HostContext,
    ) -> Result<Vec<HostFiber<H>>> {
        let previous = host_instances(&old);
        let mut deletions = Vec::new();
        let fibers = self.reconcile_list(old, elements, context, &mut deletions)?;

        let deleted = host_instances(&deletions);
        for instance in &deleted {
            self.remove(parent, *instance);
        }
        let mut current: Vec<H::Instance> = previous
            .into_iter()
            .filter(|instance| !deleted.contains(instance))
            .collect();
        self.place(parent, &mut current, &host_instances(&fibers));
        Ok(fibers)
    }

    fn reconcile_list(
        &mut self,
        old: Vec<HostFiber<H>>,
        elements: Vec<Element>,
        context: &H::HostContext,
        deletions: &mut Vec<HostFiber<H>>,
    ) -> Result<Vec<HostFiber<H>>> {
        let mut slots: Vec<Option<HostFiber<H>>> = old.into_iter().map(Some).collect();
        let mut next_unkeyed = 0;
        let mut fibers = Vec::with_capacity(elements.len());

        for element in elements {
            let matched = match element.key() {
                Some(key) => slots.iter().position(|slot| {
                    slot.as_ref().is_some_and(|fiber| {
                        fiber.key.as_deref() == Some(key) && fiber.accepts(&element)
                    })
                }),
                None => {
                    let candidate = (next_unkeyed..slots.len()).find(|index| {
                        slots[*index]
                            .as_ref()
                            .is_some_and(|fiber| fiber.key.is_none())
                    });
                    match candidate {
                        Some(index) => {
                            next_unkeyed = index + 1;
                            slots[index]
                                .as_ref()
                                .filter(|fiber| fiber.accepts(&element))
                                .map(|_| index)
                        }
                        None => None,
                    }
                }
            };
            let fiber = match matched.and_then(|index| slots[index].take()) {
                Some(existing) => self.update_fiber(existing, element, context, deletions)?,
                None => self.mount_fiber(element, context)?,
            };
            fibers.push(fiber);
        }

        deletions.extend(slots.into_iter().flatten());
        Ok(fibers)
    }

    fn update_fiber(
        &mut self,
        fiber: HostFiber<H>,
        element: Element,
        context: &H::HostContext,
        deletions: &mut Vec<HostFiber<H>>,
    ) -> Result<HostFiber<H>> {
        let Fiber {
            key,
            kind,
            children,
        } = fiber;
        match (kind, element) {
            (
                FiberKind::Host {
                    kind,
                    props: old_props,
                    instance,
                },
                Element::Host(descriptor),
            ) => {
                let (_, props) = descriptor.into_parts();
                let payload = self.host.prepare_update(instance, &kind, &old_props, &props);
                if let Some(payload) = payload {
                    self.host.commit_update(instance, payload, &kind, &old_props, &props)?;
                }
                let child_context = self.host.get_child_host_context(context, &kind);
                let child_elements = self.child_elements_of(&kind, &props);
                let children = self.reconcile_host_children(
                    HostParent::Instance(instance),
                    children,
                    child_elements,
                    &child_context,
                )?;
                Ok(Fiber {
                    key,
                    kind: FiberKind::Host {
                        kind,
                        props,
                        instance,
                    },
                    children,
                })
            }
            (
                FiberKind::Component {
                    component,
                    props: old_props,
                },
                Element::Component(element),
            ) => {
                let (_, props) = element.into_parts();
                let children = if props == old_props {
                    trace!("{} props unchanged; keeping its output", component.name());
                    children
                } else {
                    let rendered = component.render(&props);
                    self.reconcile_list(children, vec![rendered], context, deletions)?
                };
                Ok(Fiber {
                    key,
                    kind: FiberKind::Component { component, props },
                    children,
                })
            }
            (FiberKind::Fragment, Element::Fragment(elements)) => {
                let children = self.reconcile_list(children, elements, context, deletions)?;
                Ok(Fiber {
                    key,
                    kind: FiberKind::Fragment,
                    children,
                })
            }
            (FiberKind::Text { instance }, Element::Text(_)) => {
                Ok(Fiber::leaf(key, FiberKind::Text { instance }))
            }
            (FiberKind::Empty, Element::Empty) => Ok(Fiber::leaf(key, FiberKind::Empty)),
            (kind, element) => {
                deletions.push(Fiber {
                    key,
                    kind,
                    children,
                });
                self.mount_fiber(element, context)
            }
        }
    }

    fn mount_fiber(&mut self, element: Element, context: &H::HostContext) -> Result<HostFiber<H>> {
        let key = element.key().map(str::to_owned);
        match element {
            Element::Host(descriptor) => {
                let (kind, props) = descriptor.into_parts();
                let instance = self.host.create_instance(&kind, &props, self.root, context)?;
                self.created.push(instance);
                if self.host.should_deprioritize_subtree(&kind, &props) {
                    trace!("{kind} asked for deprioritization; mounting synchronously");
                }
                let child_context = self.host.get_child_host_context(context, &kind);
                let mut children = Vec::new();
                for child in self.child_elements_of(&kind, &props) {
                    children.push(self.mount_fiber(child, &child_context)?);
                }
                for child in host_instances(&children) {
                    self.host.append_initial_child(instance, Some(child));
                }
                if self.host.finalize_initial_children(instance, &kind, &props) {
                    trace!("{kind} requested a post-mount commit");
                }
                Ok(Fiber {
                    key,
                    kind: FiberKind::Host {
                        kind,
                        props,
                        instance,
                    },
                    children,
                })
            }
            Element::Component(element) => {
                let (component, props) = element.into_parts();
                let rendered = component.render(&props);
                let child = self.mount_fiber(rendered, context)?;
                Ok(Fiber {
                    key,
                    kind: FiberKind::Component { component, props },
                    children: vec![child],
                })
            }
            Element::Fragment(elements) => {
                let mut children = Vec::with_capacity(elements.len());
                for child in elements {
                    children.push(self.mount_fiber(child, context)?);
                }
                Ok(Fiber {
                    key,
                    kind: FiberKind::Fragment,
                    children,
                })
            }
            Element::Text(text) => {
                let instance = self.host.create_text_instance(&text, self.root, context);
                Ok(Fiber::leaf(key, FiberKind::Text { instance }))
            }
            Element::Empty => Ok(Fiber::leaf(key, FiberKind::Empty)),
        }
    }

    fn child_elements_of(&self, kind: &str, props: &PropBag) -> Vec<Element> {
        if self.host.should_set_text_content(kind, props) {
            Vec::new()
        } else {
            child_elements(props).to_vec()
        }
    }

    /// Moves `next` into place inside `parent`, walking from the last child
    /// backwards so every node only needs to sit right before its successor.
    fn place(
        &mut self,
        parent: HostParent<H::Container, H::Instance>,
        current: &mut Vec<H::Instance>,
        next: &[H::Instance],
    ) {
        let mut before: Option<H::Instance> = None;
        for &instance in next.iter().rev() {
            let position = current.iter().position(|existing| *existing == instance);
            let in_place = position.is_some_and(|index| current.get(index + 1).copied() == before);
            if !in_place {
                if let Some(index) = position {
                    current.remove(index);
                }
                match before {
                    Some(anchor) => {
                        let index = current
                            .iter()
                            .position(|existing| *existing == anchor)
                            .unwrap_or(current.len());
                        current.insert(index, instance);
                        self.insert(parent, instance, anchor);
                    }
                    None => {
                        current.push(instance);
                        self.append(parent, instance);
                    }
                }
            }
            before = Some(instance);
        }
    }

    fn append(&mut self, parent: HostParent<H::Container, H::Instance>, child: H::Instance) {
        match parent {
            HostParent::Container(container) => {
                self.host.append_child_to_container(container, Some(child))
            }
            HostParent::Instance(instance) => self.host.append_child(instance, Some(child)),
        }
    }

    fn insert(
        &mut self,
        parent: HostParent<H::Container, H::Instance>,
        child: H::Instance,
        before: H::Instance,
    ) {
        match parent {
            HostParent::Container(container) => {
                self.host.insert_in_container_before(container, Some(child), before)
            }
            HostParent::Instance(instance) => {
                self.host.insert_before(instance, Some(child), before)
            }
        }
    }

    fn remove(&mut self, parent: HostParent<H::Container, H::Instance>, child: H::Instance) {
        match parent {
            HostParent::Container(container) => {
                self.host.remove_child_from_container(container, Some(child))
            }
            HostParent::Instance(instance) => self.host.remove_child(instance, Some(child)),
        }
    }
}
