use std::collections::HashMap;

use glam::Vec3;

use super::object::SceneObject;

/// Builds a fresh object with the defaults of its type.
pub type Constructor = fn() -> SceneObject;

/// Constructor table looked up by type name.
#[derive(Debug, Clone)]
pub struct Namespace {
    constructors: HashMap<String, Constructor>,
}

impl Default for Namespace {
    fn default() -> Self {
        let mut namespace = Self::empty();
        namespace.register("Scene", scene);
        namespace.register("Group", || object3d("Group"));
        namespace.register("Object3D", || object3d("Object3D"));
        namespace.register("Mesh", mesh);
        namespace.register("Line", line);
        namespace.register("Points", points);
        namespace.register("PerspectiveCamera", perspective_camera);
        namespace.register("OrthographicCamera", orthographic_camera);
        namespace.register("AmbientLight", || light("AmbientLight"));
        namespace.register("PointLight", || {
            light("PointLight").with_field("distance", 0.0)
        });
        namespace.register("DirectionalLight", || light("DirectionalLight"));
        namespace.register("SpotLight", || {
            light("SpotLight")
                .with_field("angle", std::f32::consts::FRAC_PI_3)
                .with_field("penumbra", 0.0)
        });
        namespace
    }
}

impl Namespace {
    /// Namespace without any registered type.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, constructor: Constructor) {
        self.constructors.insert(name.into(), constructor);
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.constructors.contains_key(&constructor_name(type_tag))
    }

    /// Constructs the object named by `type_tag`, upper-casing its first letter
    /// so that `mesh` resolves to `Mesh`.
    pub fn construct(&self, type_tag: &str) -> Option<SceneObject> {
        self.constructors
            .get(&constructor_name(type_tag))
            .map(|constructor| constructor())
    }
}

/// Maps a type tag onto the constructor naming convention.
pub fn constructor_name(type_tag: &str) -> String {
    let mut chars = type_tag.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn object3d(kind: &str) -> SceneObject {
    SceneObject::new(kind)
        .with_field("name", "")
        .with_field("position", Vec3::ZERO)
        .with_field("rotation", Vec3::ZERO)
        .with_field("scale", Vec3::ONE)
        .with_field("visible", true)
}

fn scene() -> SceneObject {
    object3d("Scene").with_field("background", Vec3::ZERO)
}

fn basic_material(kind: &str) -> SceneObject {
    SceneObject::new(kind)
        .with_field("color", Vec3::ONE)
        .with_field("opacity", 1.0)
        .with_field("transparent", false)
        .with_field("wireframe", false)
}

fn mesh() -> SceneObject {
    object3d("Mesh")
        .with_field(
            "geometry",
            SceneObject::new("BoxGeometry")
                .with_field("width", 1.0)
                .with_field("height", 1.0)
                .with_field("depth", 1.0),
        )
        .with_field("material", basic_material("MeshBasicMaterial"))
}

fn line() -> SceneObject {
    object3d("Line")
        .with_field("geometry", SceneObject::new("BufferGeometry"))
        .with_field("material", basic_material("LineBasicMaterial"))
}

fn points() -> SceneObject {
    object3d("Points")
        .with_field("geometry", SceneObject::new("BufferGeometry"))
        .with_field(
            "material",
            basic_material("PointsMaterial").with_field("size", 1.0),
        )
}

fn perspective_camera() -> SceneObject {
    object3d("PerspectiveCamera")
        .with_field("fov", 50.0)
        .with_field("aspect", 1.0)
        .with_field("near", 0.1)
        .with_field("far", 2000.0)
}

fn orthographic_camera() -> SceneObject {
    object3d("OrthographicCamera")
        .with_field("left", -1.0)
        .with_field("right", 1.0)
        .with_field("top", 1.0)
        .with_field("bottom", -1.0)
        .with_field("near", 0.1)
        .with_field("far", 2000.0)
}

fn light(kind: &str) -> SceneObject {
    object3d(kind)
        .with_field("color", Vec3::ONE)
        .with_field("intensity", 1.0)
}
