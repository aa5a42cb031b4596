//! Declarative element trees produced by application code on every render pass.
//!
//! Elements are plain values. The reconciler compares a new tree against the
//! one it committed last time and only touches the scene graph where the two
//! differ.

use std::fmt;
use std::sync::Arc;

use crate::value::{PropBag, PropValue};

/// Property key holding an element's children.
pub const CHILDREN_KEY: &str = "children";
/// Property key holding an element's sibling identity.
pub const KEY_KEY: &str = "key";
/// Property key reserved for instance references.
pub const REF_KEY: &str = "ref";

type RenderFn = dyn Fn(&PropBag) -> Element + Send + Sync;

/// Reusable function component.
///
/// Two components are the same type when they share the same render function
/// allocation, so clone a `Component` instead of rebuilding it per render.
#[derive(Clone)]
pub struct Component {
    name: String,
    render: Arc<RenderFn>,
}

impl Component {
    pub fn new(
        name: impl Into<String>,
        render: impl Fn(&PropBag) -> Element + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            render: Arc::new(render),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, props: &PropBag) -> Element {
        (self.render)(props)
    }

    /// Creates an element instantiating this component with `props`.
    pub fn element(&self, props: PropBag) -> Element {
        Element::Component(ComponentElement {
            component: self.clone(),
            props,
        })
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.render, &other.render)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component").field("name", &self.name).finish()
    }
}

/// Host element: a scene object type tag plus its property bag.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    kind: String,
    props: PropBag,
}

impl Descriptor {
    pub fn new(kind: impl Into<String>) -> Self {
        Self::with_props(kind, PropBag::new())
    }

    pub fn with_props(kind: impl Into<String>, props: PropBag) -> Self {
        Self {
            kind: kind.into(),
            props,
        }
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.set(key, value);
        self
    }

    pub fn keyed(mut self, key: impl Into<String>) -> Self {
        self.props.set(KEY_KEY, PropValue::Text(key.into()));
        self
    }

    pub fn child(mut self, child: impl Into<Element>) -> Self {
        let child = child.into();
        match self.props.get_mut(CHILDREN_KEY) {
            Some(PropValue::Children(children)) => children.push(child),
            _ => self.props.set(CHILDREN_KEY, PropValue::Children(vec![child])),
        }
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Element>,
    {
        for child in children {
            self = self.child(child);
        }
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn props(&self) -> &PropBag {
        &self.props
    }

    pub fn key(&self) -> Option<&str> {
        self.props.get(KEY_KEY).and_then(PropValue::as_text)
    }

    pub fn child_elements(&self) -> &[Element] {
        child_elements(&self.props)
    }

    pub(crate) fn into_parts(self) -> (String, PropBag) {
        (self.kind, self.props)
    }
}

/// Children stored under the `children` key of a property bag.
pub fn child_elements(props: &PropBag) -> &[Element] {
    match props.get(CHILDREN_KEY) {
        Some(PropValue::Children(children)) => children,
        _ => &[],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentElement {
    component: Component,
    props: PropBag,
}

impl ComponentElement {
    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn props(&self) -> &PropBag {
        &self.props
    }

    pub(crate) fn into_parts(self) -> (Component, PropBag) {
        (self.component, self.props)
    }
}

/// Node of a declarative tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Element {
    /// Nothing rendered.
    #[default]
    Empty,
    Host(Descriptor),
    Component(ComponentElement),
    Fragment(Vec<Element>),
    /// Raw text. The scene graph cannot represent it and drops it.
    Text(String),
}

impl Element {
    pub fn host(kind: impl Into<String>) -> Descriptor {
        Descriptor::new(kind)
    }

    pub fn fragment<I>(children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Element>,
    {
        Self::Fragment(children.into_iter().map(Into::into).collect())
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Host(descriptor) => descriptor.key(),
            Self::Component(element) => element.props.get(KEY_KEY).and_then(PropValue::as_text),
            _ => None,
        }
    }

    /// Whether a node committed for `self` can be reused for `other`.
    pub fn same_type(&self, other: &Element) -> bool {
        match (self, other) {
            (Self::Host(a), Self::Host(b)) => a.kind == b.kind,
            (Self::Component(a), Self::Component(b)) => a.component == b.component,
            (Self::Fragment(_), Self::Fragment(_))
            | (Self::Text(_), Self::Text(_))
            | (Self::Empty, Self::Empty) => true,
            _ => false,
        }
    }
}

impl From<Descriptor> for Element {
    fn from(descriptor: Descriptor) -> Self {
        Self::Host(descriptor)
    }
}

impl From<&str> for Element {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Option<Element>> for Element {
    fn from(element: Option<Element>) -> Self {
        element.unwrap_or_default()
    }
}
