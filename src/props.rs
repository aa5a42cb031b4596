//! Minimal property writes between two property bags.
//!
//! Keys are flat paths: `material-color` addresses the `color` field of the
//! object stored in the node's `material` field. This lets descriptors reach
//! nested runtime objects without per-type schema knowledge.

use log::trace;

use crate::element::{CHILDREN_KEY, KEY_KEY, REF_KEY};
use crate::error::{HostError, Result};
use crate::scene::PropertyTarget;
use crate::value::{PropBag, PropValue};

/// Prefix marking event-handler properties.
pub const HANDLER_PREFIX: &str = "on";
/// Separator between the segments of a property path.
pub const PATH_SEPARATOR: char = '-';

const STRUCTURAL_KEYS: [&str; 3] = [CHILDREN_KEY, KEY_KEY, REF_KEY];

/// Classification of one key of the new bag against the old bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropChange {
    Unchanged,
    Handler,
    Structural,
    Write,
}

pub fn classify(key: &str, old: Option<&PropValue>, new: &PropValue) -> PropChange {
    if old == Some(new) {
        PropChange::Unchanged
    } else if key.starts_with(HANDLER_PREFIX) && new.is_handler() {
        PropChange::Handler
    } else if STRUCTURAL_KEYS.contains(&key) {
        PropChange::Structural
    } else {
        PropChange::Write
    }
}

/// Keys of `new` that need writing, in declaration order.
pub fn diff_props<'a>(old: &PropBag, new: &'a PropBag) -> Vec<(&'a str, &'a PropValue)> {
    new.iter()
        .filter(|(key, value)| classify(key, old.get(key), value) == PropChange::Write)
        .collect()
}

/// Parsed property path: a chain of object lookups ending in a leaf field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    chain: Vec<String>,
    leaf: String,
}

impl PropertyPath {
    /// Splits `key` on `-`, lower-casing the first letter of each segment.
    pub fn parse(key: &str) -> Result<Self> {
        let mut chain = Vec::new();
        for segment in key.split(PATH_SEPARATOR) {
            if segment.is_empty() {
                return Err(HostError::BadPropertyPath {
                    path: key.to_string(),
                    segment: segment.to_string(),
                });
            }
            chain.push(normalize_segment(segment));
        }
        // `split` always yields at least one segment.
        let leaf = chain.pop().unwrap_or_default();
        Ok(Self { chain, leaf })
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    pub fn leaf(&self) -> &str {
        &self.leaf
    }
}

fn normalize_segment(segment: &str) -> String {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Resolves `path` against `target` and assigns `value` to the leaf.
pub fn write_path(
    target: &mut dyn PropertyTarget,
    key: &str,
    path: &PropertyPath,
    value: PropValue,
) -> Result<()> {
    let mut current = target;
    for segment in &path.chain {
        current = current
            .object_mut(segment)
            .ok_or_else(|| HostError::BadPropertyPath {
                path: key.to_string(),
                segment: segment.clone(),
            })?;
    }
    current.assign(&path.leaf, value);
    Ok(())
}

/// Brings `target` from `old` to `new` and returns the number of writes made.
pub fn apply_props<T>(target: &mut T, old: &PropBag, new: &PropBag) -> Result<usize>
where
    T: PropertyTarget,
{
    let writes = diff_props(old, new);
    if writes.is_empty() {
        return Ok(0);
    }
    for (key, value) in &writes {
        let path = PropertyPath::parse(key)?;
        trace!("write {key} = {value:?}");
        write_path(&mut *target, key, &path, (*value).clone())?;
    }
    Ok(writes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::scene::SceneObject;
    use crate::value::Handler;
    use glam::Vec3;

    /// Target that counts every assignment it receives.
    #[derive(Default)]
    struct CountingTarget {
        writes: Vec<(String, PropValue)>,
        material: Option<Box<CountingTarget>>,
    }

    impl PropertyTarget for CountingTarget {
        fn object_mut(&mut self, name: &str) -> Option<&mut dyn PropertyTarget> {
            match name {
                "material" => self
                    .material
                    .as_deref_mut()
                    .map(|material| material as &mut dyn PropertyTarget),
                _ => None,
            }
        }

        fn assign(&mut self, name: &str, value: PropValue) {
            self.writes.push((name.to_string(), value));
        }
    }

    fn mesh() -> SceneObject {
        SceneObject::new("Mesh")
            .with_field("position", Vec3::ZERO)
            .with_field("material", SceneObject::new("MeshBasicMaterial"))
    }

    #[test]
    fn equal_bags_make_no_writes() {
        let bag = PropBag::new()
            .with("position", Vec3::ONE)
            .with("material-color", Vec3::X)
            .with("visible", false);
        let mut target = CountingTarget::default();
        assert_eq!(apply_props(&mut target, &bag, &bag.clone()).unwrap(), 0);
        assert!(target.writes.is_empty());
    }

    #[test]
    fn nested_path_writes_only_the_leaf() {
        let mut target = CountingTarget {
            material: Some(Box::default()),
            ..CountingTarget::default()
        };
        let new = PropBag::new().with("material-color", Vec3::X);
        assert_eq!(apply_props(&mut target, &PropBag::new(), &new).unwrap(), 1);
        assert!(target.writes.is_empty());
        let material = target.material.unwrap();
        assert_eq!(
            material.writes,
            vec![("color".to_string(), PropValue::Vec3(Vec3::X))]
        );
    }

    #[test]
    fn nested_path_updates_scene_object() {
        let mut object = mesh();
        let new = PropBag::new().with("material-color", Vec3::new(1.0, 0.0, 0.0));
        apply_props(&mut object, &PropBag::new(), &new).unwrap();
        assert_eq!(
            object.object("material").and_then(|m| m.vec3("color")),
            Some(Vec3::new(1.0, 0.0, 0.0))
        );
        assert_eq!(object.field("color"), None);
    }

    #[test]
    fn handlers_and_structural_keys_are_skipped() {
        let new = PropBag::new()
            .with("onClick", Handler::new(|| {}))
            .with("children", PropValue::Children(vec![Element::Empty]))
            .with("key", "k");
        let mut target = CountingTarget::default();
        assert_eq!(apply_props(&mut target, &PropBag::new(), &new).unwrap(), 0);
        assert!(target.writes.is_empty());
    }

    #[test]
    fn only_changed_keys_are_written() {
        let old = PropBag::new()
            .with("position", Vec3::ZERO)
            .with("visible", true);
        let new = PropBag::new()
            .with("position", Vec3::ONE)
            .with("visible", true);
        let mut target = CountingTarget::default();
        assert_eq!(apply_props(&mut target, &old, &new).unwrap(), 1);
        assert_eq!(
            target.writes,
            vec![("position".to_string(), PropValue::Vec3(Vec3::ONE))]
        );
    }

    #[test]
    fn non_handler_values_under_on_prefix_are_written() {
        let new = PropBag::new().with("onion", 3.0);
        assert_eq!(diff_props(&PropBag::new(), &new).len(), 1);
    }

    #[test]
    fn parse_normalizes_segments() {
        let path = PropertyPath::parse("Material-Color").unwrap();
        assert_eq!(path.chain(), &["material".to_string()]);
        assert_eq!(path.leaf(), "color");
        let flat = PropertyPath::parse("castShadow").unwrap();
        assert!(flat.chain().is_empty());
        assert_eq!(flat.leaf(), "castShadow");
    }

    #[test]
    fn missing_intermediate_is_a_bad_path() {
        let mut object = mesh();
        let new = PropBag::new().with("geometry-width", 2.0);
        let err = apply_props(&mut object, &PropBag::new(), &new).unwrap_err();
        assert_eq!(
            err,
            HostError::BadPropertyPath {
                path: "geometry-width".into(),
                segment: "geometry".into()
            }
        );
    }

    #[test]
    fn empty_segment_is_a_bad_path() {
        assert!(PropertyPath::parse("material--color").is_err());
        assert!(PropertyPath::parse("").is_err());
    }
}
