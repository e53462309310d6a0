//! Scene objects consumed by render passes.
//!
//! The engine does not own a scene graph; callers describe what to draw as a
//! flat list of tagged [`SceneObject`]s inside a [`SceneView`]. Objects carry
//! dirty flags so per-frame scene updates only forward what changed to the
//! passes.

use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::mesh::Mesh;

/// A mesh instance with its world transform.
#[derive(Debug, Clone)]
pub struct Primitive {
    /// The GPU mesh to draw.
    pub mesh: Arc<Mesh>,
    /// World transform.
    pub transform: Mat4,
}

impl Primitive {
    /// Create a primitive at the identity transform.
    pub fn new(mesh: Arc<Mesh>) -> Self {
        Self {
            mesh,
            transform: Mat4::IDENTITY,
        }
    }

    /// Set the world transform.
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }
}

/// A point light.
#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    /// World position.
    pub position: Vec3,
    /// Linear RGB color.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Influence radius.
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            radius: 10.0,
        }
    }
}

/// A directional light.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    /// Direction the light travels, normalized.
    pub direction: Vec3,
    /// Linear RGB color.
    pub color: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::NEG_Y,
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

/// A camera with explicit view and projection matrices.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    /// World-to-view matrix.
    pub view: Mat4,
    /// View-to-clip matrix.
    pub projection: Mat4,
}

impl Camera {
    /// Create a perspective camera looking from `eye` at `target`.
    pub fn perspective(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            projection: Mat4::perspective_rh(fov_y, aspect, near, far),
        }
    }

    /// The combined view-projection matrix.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

/// An object in the scene, tagged by what a pass should do with it.
#[derive(Debug, Clone)]
pub enum SceneObject {
    /// A mesh instance.
    Primitive(Primitive),
    /// A point light.
    PointLight(PointLight),
    /// A directional light.
    DirectionalLight(DirectionalLight),
    /// The camera; passes use the last one processed.
    Camera(Camera),
}

/// Identifies an object within its [`SceneView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneObjectId(usize);

/// A flat list of scene objects with dirty tracking.
///
/// New and mutated objects are dirty; the render pass manager forwards dirty
/// objects to every pass's scene visitor once per frame and then clears the
/// flags.
#[derive(Debug, Default)]
pub struct SceneView {
    objects: Vec<SceneObject>,
    dirty: Vec<bool>,
}

impl SceneView {
    /// Create an empty scene view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object; it starts dirty.
    pub fn add(&mut self, object: SceneObject) -> SceneObjectId {
        let id = SceneObjectId(self.objects.len());
        self.objects.push(object);
        self.dirty.push(true);
        id
    }

    /// Read an object.
    pub fn object(&self, id: SceneObjectId) -> Option<&SceneObject> {
        self.objects.get(id.0)
    }

    /// Mutate an object, marking it dirty.
    pub fn object_mut(&mut self, id: SceneObjectId) -> Option<&mut SceneObject> {
        if let Some(flag) = self.dirty.get_mut(id.0) {
            *flag = true;
        }
        self.objects.get_mut(id.0)
    }

    /// Mark an object dirty without mutating it.
    pub fn mark_dirty(&mut self, id: SceneObjectId) {
        if let Some(flag) = self.dirty.get_mut(id.0) {
            *flag = true;
        }
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the view holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate all objects.
    pub fn objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.objects.iter()
    }

    /// Iterate the dirty objects.
    pub fn dirty_objects(&self) -> impl Iterator<Item = &SceneObject> {
        self.dirty_entries().map(|(_, object)| object)
    }

    /// Iterate the dirty objects with their ids.
    pub fn dirty_entries(&self) -> impl Iterator<Item = (SceneObjectId, &SceneObject)> {
        self.objects
            .iter()
            .zip(&self.dirty)
            .enumerate()
            .filter_map(|(index, (object, &dirty))| {
                dirty.then_some((SceneObjectId(index), object))
            })
    }

    /// Number of dirty objects.
    pub fn dirty_count(&self) -> usize {
        self.dirty.iter().filter(|&&d| d).count()
    }

    /// Clear every dirty flag; called after passes processed the frame.
    pub fn clear_dirty(&mut self) {
        self.dirty.fill(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_objects_start_dirty() {
        let mut scene = SceneView::new();
        scene.add(SceneObject::PointLight(PointLight::default()));
        scene.add(SceneObject::Camera(Camera::default()));

        assert_eq!(scene.len(), 2);
        assert_eq!(scene.dirty_count(), 2);

        scene.clear_dirty();
        assert_eq!(scene.dirty_count(), 0);
    }

    #[test]
    fn test_mutation_marks_dirty() {
        let mut scene = SceneView::new();
        let light = scene.add(SceneObject::PointLight(PointLight::default()));
        scene.clear_dirty();

        if let Some(SceneObject::PointLight(light)) = scene.object_mut(light) {
            light.intensity = 5.0;
        }
        assert_eq!(scene.dirty_count(), 1);

        let dirty: Vec<_> = scene.dirty_objects().collect();
        assert!(matches!(dirty[0], SceneObject::PointLight(l) if l.intensity == 5.0));
    }

    #[test]
    fn test_camera_view_projection() {
        let camera = Camera::perspective(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_4,
            16.0 / 9.0,
            0.1,
            100.0,
        );
        let clip = camera.view_projection() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        // The look-at target projects onto the view axis.
        assert!(clip.w > 0.0);
        assert!((clip.x).abs() < 1e-5);
        assert!((clip.y).abs() < 1e-5);
    }
}
