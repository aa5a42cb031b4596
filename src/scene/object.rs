use glam::Vec3;
use log::warn;

use crate::value::{PropBag, PropValue};

/// Object that property paths can be resolved against.
///
/// Implementors expose nested sub-objects by name and accept assignments to
/// leaf fields. The property applier only ever talks to this trait.
pub trait PropertyTarget {
    /// Returns the nested object stored under `name`, if that field holds one.
    fn object_mut(&mut self, name: &str) -> Option<&mut dyn PropertyTarget>;

    /// Writes `value` into the field `name` as given.
    fn assign(&mut self, name: &str, value: PropValue);
}

/// Runtime object in the scene graph, or a sub-object nested inside one.
///
/// Fields are dynamic. Constructors in the [`Namespace`](super::Namespace)
/// seed the defaults of each type; nested objects such as a mesh's material
/// are stored as [`PropValue::Object`] fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneObject {
    kind: String,
    fields: PropBag,
}

impl SceneObject {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: PropBag::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.fields.set(name, value);
        self
    }

    /// Type name of the constructor that produced this object.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn field(&self, name: &str) -> Option<&PropValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.fields.iter()
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<PropValue>) {
        self.fields.set(name, value);
    }

    pub fn object(&self, name: &str) -> Option<&SceneObject> {
        self.field(name).and_then(PropValue::as_object)
    }

    pub fn number(&self, name: &str) -> Option<f32> {
        self.field(name).and_then(PropValue::as_number)
    }

    pub fn vec3(&self, name: &str) -> Option<Vec3> {
        self.field(name).and_then(PropValue::as_vec3)
    }

    pub fn position(&self) -> Vec3 {
        self.vec3("position").unwrap_or(Vec3::ZERO)
    }

    pub fn rotation(&self) -> Vec3 {
        self.vec3("rotation").unwrap_or(Vec3::ZERO)
    }

    pub fn scale(&self) -> Vec3 {
        self.vec3("scale").unwrap_or(Vec3::ONE)
    }

    pub fn visible(&self) -> bool {
        self.field("visible")
            .and_then(PropValue::as_bool)
            .unwrap_or(true)
    }
}

impl PropertyTarget for SceneObject {
    fn object_mut(&mut self, name: &str) -> Option<&mut dyn PropertyTarget> {
        match self.fields.get_mut(name)? {
            PropValue::Object(object) => Some(object as &mut dyn PropertyTarget),
            PropValue::Vec3(vector) => Some(vector as &mut dyn PropertyTarget),
            _ => None,
        }
    }

    fn assign(&mut self, name: &str, value: PropValue) {
        self.fields.set(name, value);
    }
}

/// Vector fields accept per-component writes such as `position-x` or
/// `material-color-r`.
impl PropertyTarget for Vec3 {
    fn object_mut(&mut self, _name: &str) -> Option<&mut dyn PropertyTarget> {
        None
    }

    fn assign(&mut self, name: &str, value: PropValue) {
        let Some(component) = value.as_number() else {
            warn!("ignoring non-numeric value for vector component `{name}`");
            return;
        };
        match name {
            "x" | "r" => self.x = component,
            "y" | "g" => self.y = component,
            "z" | "b" => self.z = component,
            other => warn!("vectors have no component `{other}`"),
        }
    }
}
