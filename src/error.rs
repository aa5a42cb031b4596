use thiserror::Error;

use crate::scene::NodeId;

/// Failures raised while the reconciler drives the scene graph.
///
/// Only creation and property writes can fail. Structural hooks treat a
/// missing child as "nothing to do" and never surface an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The type tag has no constructor in the scene namespace.
    #[error("unknown scene object type `{0}`")]
    UnknownType(String),
    /// An intermediate segment of a property path did not resolve to an object.
    #[error("bad property path `{path}`: `{segment}` is not an object")]
    BadPropertyPath { path: String, segment: String },
    /// A render targeted a node that is not part of the scene graph.
    #[error("mount target {0} is not part of the scene graph")]
    UnknownTarget(NodeId),
}

pub type Result<T> = std::result::Result<T, HostError>;
