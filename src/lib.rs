//! Declarative element trees rendered into a retained 3D scene graph.
//!
//! Application code describes what the scene should contain as an
//! [`Element`] tree; a [`SceneRenderer`] reconciles each new tree against the
//! last committed one and applies the minimal set of node creations, moves,
//! removals and property writes to a shared [`SceneGraph`]. Drawing and
//! platform integration stay outside of the crate behind [`FrameSink`] and
//! [`ViewportProvider`], so everything here runs headless.

pub mod canvas;
pub mod element;
pub mod error;
pub mod host;
pub mod markup;
pub mod props;
pub mod reconciler;
pub mod registry;
pub mod renderer;
pub mod scene;
pub mod value;

pub use canvas::{
    Canvas, CanvasConfig, FixedViewport, FrameSink, HeadlessSink, Measure, Rect,
    ViewportProvider,
};
pub use element::{Component, Descriptor, Element};
pub use error::{HostError, Result};
pub use host::{HostConfig, SceneHost};
pub use markup::parse_element;
pub use registry::RootRegistry;
pub use renderer::SceneRenderer;
pub use scene::{GraphEvent, Namespace, NodeId, SceneGraph, SceneHandle, SceneObject};
pub use value::{Handler, PropBag, PropValue};
