//! Frame driving on top of [`SceneRenderer`].
//!
//! A [`Canvas`] owns a scene node and a camera, mounts element trees into the
//! scene, and turns the graph into a [`Frame`] snapshot on every tick. The
//! actual drawing happens in a [`FrameSink`]; the crate ships a headless one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use glam::{Mat4, Vec3};
use log::{debug, error};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::renderer::SceneRenderer;
use crate::scene::{Namespace, NodeId, SceneGraph, SceneHandle, SceneObject};
use crate::value::PropValue;

/// Provides the current output size in pixels.
pub trait ViewportProvider: Send + Sync {
    fn viewport_size(&self) -> (u32, u32);
}

/// Output surface that is never resized, such as an offscreen target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedViewport {
    size: (u32, u32),
}

impl FixedViewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
        }
    }

    /// Surface of the size `config` asks for.
    pub fn from_config(config: &CanvasConfig) -> Self {
        Self::new(config.width, config.height)
    }
}

impl ViewportProvider for FixedViewport {
    fn viewport_size(&self) -> (u32, u32) {
        self.size
    }
}

/// Bounds of a measured surface.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub const fn sized(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }
}

/// Live bounds of the surface a canvas draws into.
///
/// The platform layer calls [`update`](Self::update) whenever the surface
/// moves or resizes; readers poll [`rect`](Self::rect) or compare
/// [`revision`](Self::revision) values.
#[derive(Debug, Default)]
pub struct Measure {
    rect: RwLock<Rect>,
    revision: AtomicU64,
}

impl Measure {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect: RwLock::new(rect),
            revision: AtomicU64::new(0),
        }
    }

    pub fn rect(&self) -> Rect {
        *self.rect.read()
    }

    /// Stores new bounds. Returns `false` when they equal the current ones.
    pub fn update(&self, rect: Rect) -> bool {
        let mut current = self.rect.write();
        if *current == rect {
            return false;
        }
        *current = rect;
        self.revision.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Bumped on every effective [`update`](Self::update).
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}

impl ViewportProvider for Measure {
    fn viewport_size(&self) -> (u32, u32) {
        let rect = self.rect();
        (
            rect.width.round().max(1.0) as u32,
            rect.height.round().max(1.0) as u32,
        )
    }
}

/// Camera and output defaults for a [`Canvas`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub camera_position: Vec3,
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            fov: 75.0,
            near: 0.1,
            far: 1000.0,
            camera_position: Vec3::new(0.0, 0.0, 5.0),
            width: 1280,
            height: 720,
        }
    }
}

/// Camera parameters of one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// Lighting state of one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LightParams {
    pub node: NodeId,
    pub kind: String,
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

/// A visible object with geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct Drawable {
    pub node: NodeId,
    pub kind: String,
    pub world: Mat4,
    pub color: Option<Vec3>,
}

/// Snapshot of the scene handed to a [`FrameSink`].
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub index: u64,
    pub size: (u32, u32),
    pub camera: CameraParams,
    pub drawables: Vec<Drawable>,
    pub lights: Vec<LightParams>,
}

/// Consumer of rendered frames.
pub trait FrameSink {
    fn resize(&mut self, width: u32, height: u32);
    fn present(&mut self, frame: &Frame) -> Result<()>;
}

/// Sink that keeps every presented frame in memory.
#[derive(Debug, Default)]
pub struct HeadlessSink {
    size: Option<(u32, u32)>,
    resizes: usize,
    frames: Vec<Frame>,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.size
    }

    pub fn resizes(&self) -> usize {
        self.resizes
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }
}

impl FrameSink for HeadlessSink {
    fn resize(&mut self, width: u32, height: u32) {
        self.size = Some((width, height));
        self.resizes += 1;
    }

    fn present(&mut self, frame: &Frame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

/// State handed to frame subscribers before each snapshot.
pub struct FrameContext<'a> {
    pub index: u64,
    pub elapsed: Duration,
    pub delta: Duration,
    pub scene: &'a SceneHandle,
    pub camera: NodeId,
}

type Subscriber = Box<dyn FnMut(&FrameContext<'_>) + Send>;

/// Drives frames for one scene.
pub struct Canvas<S: FrameSink> {
    renderer: SceneRenderer,
    scene: NodeId,
    camera: NodeId,
    viewport: Arc<dyn ViewportProvider>,
    size: Option<(u32, u32)>,
    sink: S,
    subscribers: Vec<Subscriber>,
    frame_index: u64,
    started: Instant,
    last_frame: Option<Instant>,
}

impl<S: FrameSink> Canvas<S> {
    pub fn new(
        config: &CanvasConfig,
        viewport: Arc<dyn ViewportProvider>,
        sink: S,
    ) -> Result<Self> {
        let namespace = Namespace::default();
        let handle = SceneHandle::new();
        let (scene, camera) = {
            let mut graph = handle.write();
            let scene = namespace
                .construct("scene")
                .ok_or_else(|| anyhow!("no constructor for the scene root"))?;
            let mut camera = namespace
                .construct("perspectiveCamera")
                .ok_or_else(|| anyhow!("no constructor for the default camera"))?;
            camera.set_field("fov", config.fov);
            camera.set_field("near", config.near);
            camera.set_field("far", config.far);
            camera.set_field("position", config.camera_position);
            (graph.insert(scene), graph.insert(camera))
        };
        debug!("canvas created with scene {scene} and camera {camera}");
        Ok(Self {
            renderer: SceneRenderer::with_namespace(handle, namespace),
            scene,
            camera,
            viewport,
            size: None,
            sink,
            subscribers: Vec::new(),
            frame_index: 0,
            started: Instant::now(),
            last_frame: None,
        })
    }

    pub fn renderer(&self) -> &SceneRenderer {
        &self.renderer
    }

    pub fn scene(&self) -> &SceneHandle {
        self.renderer.scene()
    }

    pub fn scene_node(&self) -> NodeId {
        self.scene
    }

    pub fn camera(&self) -> NodeId {
        self.camera
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Renders `element` as the scene's content.
    pub fn set_children(&self, element: impl Into<Element>) -> Result<Option<NodeId>> {
        Ok(self.renderer.render(element, self.scene)?)
    }

    /// Registers a callback run at the start of every frame.
    pub fn on_frame(&mut self, callback: impl FnMut(&FrameContext<'_>) + Send + 'static) {
        self.subscribers.push(Box::new(callback));
    }

    /// Runs one frame: applies size changes, notifies subscribers, then
    /// snapshots the graph and presents it.
    pub fn frame(&mut self) -> Result<()> {
        self.sync_size();
        let now = Instant::now();
        let context = FrameContext {
            index: self.frame_index,
            elapsed: now.duration_since(self.started),
            delta: self
                .last_frame
                .map_or(Duration::ZERO, |last| now.duration_since(last)),
            scene: self.renderer.scene(),
            camera: self.camera,
        };
        for subscriber in &mut self.subscribers {
            subscriber(&context);
        }
        let size = self.size.unwrap_or((1, 1));
        let frame = {
            let graph = self.renderer.scene().read();
            snapshot(&graph, self.scene, self.camera, self.frame_index, size)
        };
        self.sink.present(&frame)?;
        self.frame_index += 1;
        self.last_frame = Some(now);
        Ok(())
    }

    /// Number of frames presented so far.
    pub fn frames(&self) -> u64 {
        self.frame_index
    }

    /// Unmounts the scene content. Safe to call more than once.
    pub fn unmount(&self) -> Result<bool> {
        Ok(self.renderer.unmount_component_at_node(self.scene)?)
    }

    fn sync_size(&mut self) {
        let size = self.viewport.viewport_size();
        if self.size == Some(size) {
            return;
        }
        let (width, height) = size;
        self.size = Some(size);
        self.sink.resize(width, height);
        if let Some(camera) = self.renderer.scene().write().object_mut(self.camera) {
            camera.set_field("aspect", width as f32 / height.max(1) as f32);
        }
        debug!("canvas resized to {width}x{height}");
    }
}

impl<S: FrameSink> Drop for Canvas<S> {
    fn drop(&mut self) {
        if let Err(err) = self.renderer.unmount_component_at_node(self.scene) {
            error!("failed to unmount canvas scene: {err}");
        }
    }
}

/// Builds the frame for `scene` as seen from `camera`.
pub fn snapshot(
    graph: &SceneGraph,
    scene: NodeId,
    camera: NodeId,
    index: u64,
    size: (u32, u32),
) -> Frame {
    let mut drawables = Vec::new();
    let mut lights = Vec::new();
    let mut stack = vec![scene];
    while let Some(id) = stack.pop() {
        let Some(node) = graph.node(id) else {
            continue;
        };
        let object = node.object();
        if !object.visible() {
            continue;
        }
        stack.extend(node.children().iter().rev().copied());
        if object.object("geometry").is_some() {
            drawables.push(Drawable {
                node: id,
                kind: object.kind().to_string(),
                world: graph.world_matrix(id),
                color: object.object("material").and_then(|m| m.vec3("color")),
            });
        } else if object.kind().ends_with("Light") {
            lights.push(LightParams {
                node: id,
                kind: object.kind().to_string(),
                position: graph.world_matrix(id).transform_point3(Vec3::ZERO),
                color: object.vec3("color").unwrap_or(Vec3::ONE),
                intensity: object.number("intensity").unwrap_or(1.0),
            });
        }
    }
    Frame {
        index,
        size,
        camera: camera_params(graph, camera, size),
        drawables,
        lights,
    }
}

/// View-projection of `camera`. A missing camera looks down -Z from the origin.
pub fn camera_params(graph: &SceneGraph, camera: NodeId, size: (u32, u32)) -> CameraParams {
    let world = graph.world_matrix(camera);
    let position = world.transform_point3(Vec3::ZERO);
    let view = world.inverse();
    let projection = graph
        .object(camera)
        .map(|object| projection(object, size))
        .unwrap_or_else(|| default_projection(size));
    CameraParams {
        view_proj: projection * view,
        position,
    }
}

fn projection(camera: &SceneObject, size: (u32, u32)) -> Mat4 {
    let near = camera.number("near").unwrap_or(0.1);
    let far = camera.number("far").unwrap_or(2000.0);
    if camera.kind() == "OrthographicCamera" {
        return Mat4::orthographic_rh_gl(
            camera.number("left").unwrap_or(-1.0),
            camera.number("right").unwrap_or(1.0),
            camera.number("bottom").unwrap_or(-1.0),
            camera.number("top").unwrap_or(1.0),
            near,
            far,
        );
    }
    let fov = camera.number("fov").unwrap_or(50.0);
    let aspect = match camera.field("aspect") {
        Some(PropValue::Number(aspect)) => *aspect,
        _ => aspect_of(size),
    };
    Mat4::perspective_rh_gl(fov.to_radians(), aspect.max(0.01), near, far)
}

fn default_projection(size: (u32, u32)) -> Mat4 {
    Mat4::perspective_rh_gl(50f32.to_radians(), aspect_of(size).max(0.01), 0.1, 2000.0)
}

fn aspect_of((width, height): (u32, u32)) -> f32 {
    width as f32 / height.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn canvas(measure: &Arc<Measure>) -> Canvas<HeadlessSink> {
        let viewport: Arc<dyn ViewportProvider> = measure.clone();
        Canvas::new(&CanvasConfig::default(), viewport, HeadlessSink::new()).unwrap()
    }

    fn fixed_canvas(width: u32, height: u32) -> Canvas<HeadlessSink> {
        let viewport = Arc::new(FixedViewport::new(width, height));
        Canvas::new(&CanvasConfig::default(), viewport, HeadlessSink::new()).unwrap()
    }

    #[test]
    fn fixed_viewport_resizes_only_on_the_first_frame() {
        let config = CanvasConfig {
            width: 640,
            height: 480,
            ..CanvasConfig::default()
        };
        let viewport = Arc::new(FixedViewport::from_config(&config));
        assert_eq!(viewport.viewport_size(), (640, 480));
        let mut canvas = Canvas::new(&config, viewport, HeadlessSink::new()).unwrap();
        for _ in 0..3 {
            canvas.frame().unwrap();
        }
        assert_eq!(canvas.sink().resizes(), 1);
        assert_eq!(canvas.sink().size(), Some((640, 480)));
    }

    #[test]
    fn measure_tracks_effective_updates() {
        let measure = Measure::new(Rect::sized(100.0, 50.0));
        assert!(!measure.update(Rect::sized(100.0, 50.0)));
        assert_eq!(measure.revision(), 0);
        assert!(measure.update(Rect::new(10.0, 20.0, 300.0, 200.0)));
        assert_eq!(measure.revision(), 1);
        assert_eq!(measure.viewport_size(), (300, 200));
    }

    #[test]
    fn resize_reaches_camera_and_sink_once_per_change() {
        let measure = Arc::new(Measure::new(Rect::sized(800.0, 400.0)));
        let mut canvas = canvas(&measure);
        canvas.frame().unwrap();
        canvas.frame().unwrap();
        assert_eq!(canvas.sink().resizes(), 1);
        assert_eq!(canvas.sink().size(), Some((800, 400)));
        let aspect = canvas.scene().read().object(canvas.camera()).unwrap().number("aspect");
        assert_eq!(aspect, Some(2.0));

        measure.update(Rect::sized(300.0, 300.0));
        canvas.frame().unwrap();
        assert_eq!(canvas.sink().resizes(), 2);
        let aspect = canvas.scene().read().object(canvas.camera()).unwrap().number("aspect");
        assert_eq!(aspect, Some(1.0));
    }

    #[test]
    fn frames_contain_visible_meshes_only() {
        let mut canvas = fixed_canvas(64, 64);
        canvas
            .set_children(Element::fragment([
                Element::host("mesh")
                    .prop("material-color", Vec3::new(1.0, 0.0, 0.0))
                    .prop("position", Vec3::X),
                Element::host("group")
                    .prop("visible", false)
                    .child(Element::host("mesh")),
                Element::host("pointLight").prop("intensity", 2.0),
            ]))
            .unwrap();
        canvas.frame().unwrap();
        let frame = canvas.sink().last_frame().unwrap();
        assert_eq!(frame.drawables.len(), 1);
        assert_eq!(frame.drawables[0].color, Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(
            frame.drawables[0].world.transform_point3(Vec3::ZERO),
            Vec3::X
        );
        assert_eq!(frame.lights.len(), 1);
        assert_eq!(frame.lights[0].intensity, 2.0);
    }

    #[test]
    fn subscribers_run_before_the_snapshot() {
        let mut canvas = fixed_canvas(64, 64);
        let mesh = canvas
            .set_children(Element::host("mesh"))
            .unwrap()
            .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        canvas.on_frame(move |context| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let Some(object) = context.scene.write().object_mut(mesh) {
                object.set_field("position", Vec3::new(0.0, context.index as f32, 0.0));
            }
        });
        canvas.frame().unwrap();
        canvas.frame().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let frame = canvas.sink().last_frame().unwrap();
        assert_eq!(frame.index, 1);
        assert_eq!(
            frame.drawables[0].world.transform_point3(Vec3::ZERO),
            Vec3::Y
        );
    }

    #[test]
    fn camera_looks_down_negative_z() {
        let mut canvas = fixed_canvas(100, 100);
        canvas.frame().unwrap();
        let frame = canvas.sink().last_frame().unwrap();
        assert_eq!(frame.camera.position, Vec3::new(0.0, 0.0, 5.0));
        let center = frame.camera.view_proj.project_point3(Vec3::ZERO);
        assert!(center.x.abs() < 1e-5 && center.y.abs() < 1e-5);
    }

    #[test]
    fn unmount_clears_the_scene() {
        let canvas = fixed_canvas(64, 64);
        canvas.set_children(Element::host("mesh")).unwrap();
        assert!(canvas.unmount().unwrap());
        assert!(!canvas.unmount().unwrap());
        assert!(canvas.scene().read().children(canvas.scene_node()).is_empty());
    }
}
