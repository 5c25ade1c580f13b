//! The ordered collection of shapes a surface draws each frame.

use glam::Vec3;

use crate::color::Color;
use crate::geometry::{GeometryError, build_flat_faces};
use crate::gpu::Backend;
use crate::shape::Shape;

/// Type-safe handle to a shape stored in a [`Scene`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShapeId(pub(crate) usize);

/// Shapes in insertion order. Both render passes visit them in this order.
pub struct Scene<B: Backend> {
    shapes: Vec<Shape<B>>,
}

impl<B: Backend> Default for Scene<B> {
    fn default() -> Self {
        Self { shapes: Vec::new() }
    }
}

impl<B: Backend> Scene<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, shape: Shape<B>) -> ShapeId {
        let id = ShapeId(self.shapes.len());
        self.shapes.push(shape);
        id
    }

    pub fn get(&self, id: ShapeId) -> Option<&Shape<B>> {
        self.shapes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shape<B>> {
        self.shapes.iter()
    }

    /// Drops every shape, releasing their device buffers.
    pub fn clear(&mut self) {
        self.shapes.clear();
    }
}

/// Adds shapes to a surface's scene while a device is available.
///
/// Handed to the ready callback once the surface has initialized.
pub struct SceneBuilder<'a, B: Backend> {
    backend: &'a B,
    scene: &'a mut Scene<B>,
}

impl<'a, B: Backend> SceneBuilder<'a, B> {
    pub fn new(backend: &'a B, scene: &'a mut Scene<B>) -> Self {
        Self { backend, scene }
    }

    /// Uploads raw per-corner geometry as a new shape.
    pub fn add_shape(
        &mut self,
        positions: &[[f32; 3]],
        normals: &[[f32; 3]],
        indices: &[u32],
        fill: Color,
        wireframe: Option<Color>,
    ) -> Result<ShapeId, GeometryError> {
        let shape = Shape::new(self.backend, positions, normals, indices, fill, wireframe)?;
        Ok(self.scene.add(shape))
    }

    /// Builds flat faces from control points and a face order, then adds them.
    pub fn add_polyhedron(
        &mut self,
        points: &[Vec3],
        order: &[usize],
        fill: Color,
        wireframe: Option<Color>,
    ) -> Result<ShapeId, GeometryError> {
        let faces = build_flat_faces(points, order)?;
        let shape = Shape::from_faces(self.backend, &faces, fill, wireframe)?;
        let id = self.scene.add(shape);
        log::debug!("Added polyhedron {id:?} with {} faces", faces.face_count());
        Ok(id)
    }

    pub fn scene(&self) -> &Scene<B> {
        self.scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polyhedra::{TETRAHEDRON_FACES, tetrahedron};
    use crate::testing::RecordingBackend;

    #[test]
    fn shapes_keep_insertion_order() {
        let backend = RecordingBackend::new();
        let mut scene = Scene::new();
        let mut builder = SceneBuilder::new(&backend, &mut scene);

        let first = builder
            .add_polyhedron(&tetrahedron(Vec3::ZERO), &TETRAHEDRON_FACES, Color::CRIMSON, None)
            .unwrap();
        let second = builder
            .add_polyhedron(
                &tetrahedron(Vec3::new(2.0, 2.0, 0.0)),
                &TETRAHEDRON_FACES,
                Color::BLUE_VIOLET,
                Some(Color::WHITE),
            )
            .unwrap();

        assert_eq!(first, ShapeId(0));
        assert_eq!(second, ShapeId(1));
        assert_eq!(scene.len(), 2);

        let fills: Vec<Color> = scene.iter().map(Shape::fill).collect();
        assert_eq!(fills, vec![Color::CRIMSON, Color::BLUE_VIOLET]);
        assert!(scene.get(second).is_some_and(Shape::has_wireframe));
        assert!(scene.get(ShapeId(2)).is_none());
    }

    #[test]
    fn rejected_geometry_adds_nothing() {
        let backend = RecordingBackend::new();
        let mut scene = Scene::new();
        let mut builder = SceneBuilder::new(&backend, &mut scene);

        let result = builder.add_polyhedron(&tetrahedron(Vec3::ZERO), &[0, 1], Color::WHITE, None);
        assert_eq!(result, Err(GeometryError::IncompleteFace { len: 2 }));
        assert!(scene.is_empty());
        assert!(backend.events().is_empty());
    }

    #[test]
    fn clear_releases_all_buffers() {
        let backend = RecordingBackend::new();
        let mut scene = Scene::new();
        SceneBuilder::new(&backend, &mut scene)
            .add_polyhedron(&tetrahedron(Vec3::ZERO), &TETRAHEDRON_FACES, Color::WHITE, None)
            .unwrap();
        assert_eq!(backend.live_buffers().len(), 2);

        scene.clear();
        assert!(backend.live_buffers().is_empty());
    }
}
