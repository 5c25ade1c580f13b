use crate::color::Color;
use crate::frame::{DrawCommand, RecordedFrame};
use crate::geometry::{FaceGeometry, GeometryError};
use crate::gpu::Backend;
use crate::mesh::GpuBuffer;

/// A drawable polyhedron: its geometry buffers plus fill and outline colours.
///
/// The fill colour is baked into the vertices. The outline colour is applied
/// by the render loop during the wireframe pass through the
/// `wireframe_colour` uniform.
pub struct Shape<B: Backend> {
    buffers: Vec<GpuBuffer<B>>,
    fill: Color,
    wireframe: Option<Color>,
}

impl<B: Backend> Shape<B> {
    /// Uploads the given geometry as one [`GpuBuffer`] filled with `fill`.
    ///
    /// `wireframe` is the outline colour, or `None` for no outline.
    pub fn new(
        backend: &B,
        positions: &[[f32; 3]],
        normals: &[[f32; 3]],
        indices: &[u32],
        fill: Color,
        wireframe: Option<Color>,
    ) -> Result<Self, GeometryError> {
        let buffer = GpuBuffer::new(backend, positions, normals, indices, fill)?;

        Ok(Self {
            buffers: vec![buffer],
            fill,
            wireframe,
        })
    }

    /// Same as [`Shape::new`] for the output of
    /// [`build_flat_faces`](crate::build_flat_faces).
    pub fn from_faces(
        backend: &B,
        faces: &FaceGeometry,
        fill: Color,
        wireframe: Option<Color>,
    ) -> Result<Self, GeometryError> {
        Self::new(
            backend,
            &faces.positions,
            &faces.normals,
            &faces.indices,
            fill,
            wireframe,
        )
    }

    /// Records one indexed draw per owned buffer.
    ///
    /// Only buffer bindings and draws are recorded; uniforms are left to the
    /// caller.
    pub fn draw<'a>(&'a self, frame: &mut RecordedFrame<'a, B::Buffer>) {
        for buffer in &self.buffers {
            buffer.bind(frame);
            frame.push(DrawCommand::DrawIndexed {
                index_count: buffer.index_count(),
            });
        }
    }

    pub fn fill(&self) -> Color {
        self.fill
    }

    pub fn has_wireframe(&self) -> bool {
        self.wireframe.is_some()
    }

    /// The outline colour, [`Color::TRANSPARENT`] when there is no outline.
    pub fn wireframe_colour(&self) -> Color {
        self.wireframe.unwrap_or(Color::TRANSPARENT)
    }

    pub fn index_count(&self) -> u32 {
        self.buffers.iter().map(GpuBuffer::index_count).sum()
    }

    pub fn buffers(&self) -> &[GpuBuffer<B>] {
        &self.buffers
    }
}
