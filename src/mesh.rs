//! Vertex format and device-resident geometry buffers.
//!
//! - [`Vertex`] is the interleaved vertex every shape uploads: position,
//!   normal and colour
//! - [`GpuBuffer`] owns one vertex buffer and one index buffer on a
//!   [`Backend`] and releases both when dropped
//!
//! # Vertex Layout
//!
//! [`Vertex`] occupies 40 bytes:
//!
//! | Attribute       | Format    | Offset |
//! |-----------------|-----------|--------|
//! | `position`      | Float32x3 | 0      |
//! | `normal`        | Float32x3 | 12     |
//! | `source_colour` | Float32x4 | 24     |
//!
//! Shader locations are not fixed here. They come from the compiled program,
//! see [`Attributes::vertex_attributes`](crate::Attributes::vertex_attributes).

use crate::color::Color;
use crate::frame::{DrawCommand, RecordedFrame};
use crate::geometry::GeometryError;
use crate::gpu::{Backend, BufferUsage, DeviceBuffer};

/// An interleaved vertex: position, flat normal and RGBA colour.
///
/// `#[repr(C)]` with [`bytemuck::Pod`] so a vertex slice can be uploaded as
/// bytes directly.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    /// Face normal, not normalized.
    pub normal: [f32; 3],
    pub colour: [f32; 4],
}

impl Vertex {
    /// Bytes between consecutive vertices.
    pub const STRIDE: u64 = std::mem::size_of::<Vertex>() as u64;

    pub const POSITION_OFFSET: u64 = 0;
    pub const NORMAL_OFFSET: u64 = 12;
    pub const COLOUR_OFFSET: u64 = 24;

    pub fn new(position: [f32; 3], normal: [f32; 3], colour: Color) -> Self {
        Self {
            position,
            normal,
            colour: colour.to_array(),
        }
    }
}

/// Static vertex and index buffers for one piece of geometry.
///
/// Both buffers are written once at construction. There is no update path;
/// new geometry means a new `GpuBuffer`. Dropping it releases the device
/// memory straight away.
pub struct GpuBuffer<B: Backend> {
    vertex_buffer: B::Buffer,
    index_buffer: B::Buffer,
    index_count: u32,
}

impl<B: Backend> GpuBuffer<B> {
    /// Interleaves `positions`, `normals` and `colour` and uploads the result
    /// together with `indices`.
    ///
    /// # Errors
    ///
    /// - [`GeometryError::LengthMismatch`] if `positions` and `normals` differ in length
    /// - [`GeometryError::Empty`] if `indices` is empty
    /// - [`GeometryError::IndexOutOfRange`] if an index is not below `positions.len()`
    pub fn new(
        backend: &B,
        positions: &[[f32; 3]],
        normals: &[[f32; 3]],
        indices: &[u32],
        colour: Color,
    ) -> Result<Self, GeometryError> {
        if positions.len() != normals.len() {
            return Err(GeometryError::LengthMismatch {
                positions: positions.len(),
                normals: normals.len(),
            });
        }
        if indices.is_empty() {
            return Err(GeometryError::Empty);
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(GeometryError::IndexOutOfRange {
                index,
                vertices: positions.len(),
            });
        }

        let vertices: Vec<Vertex> = positions
            .iter()
            .zip(normals)
            .map(|(p, n)| Vertex::new(*p, *n, colour))
            .collect();

        let vertex_buffer = backend.create_buffer(
            "Shape Vertex Buffer",
            bytemuck::cast_slice(&vertices),
            BufferUsage::Vertex,
        );
        let index_buffer = backend.create_buffer(
            "Shape Index Buffer",
            bytemuck::cast_slice(indices),
            BufferUsage::Index,
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    /// Makes both buffers current for the draws that follow in `frame`.
    pub fn bind<'a>(&'a self, frame: &mut RecordedFrame<'a, B::Buffer>) {
        frame.push(DrawCommand::BindBuffers {
            vertices: &self.vertex_buffer,
            indices: &self.index_buffer,
        });
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_buffer(&self) -> &B::Buffer {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &B::Buffer {
        &self.index_buffer
    }
}

impl<B: Backend> Drop for GpuBuffer<B> {
    fn drop(&mut self) {
        self.vertex_buffer.release();
        self.index_buffer.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BufferEvent, RecordingBackend};

    const POSITIONS: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    const NORMALS: [[f32; 3]; 3] = [[0.0, 0.0, 1.0]; 3];

    #[test]
    fn vertex_layout_is_forty_bytes() {
        assert_eq!(Vertex::STRIDE, 40);
        let v = Vertex::new([1.0, 2.0, 3.0], [4.0, 5.0, 6.0], Color::rgba(0.1, 0.2, 0.3, 0.4));
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&v));
        assert_eq!(floats[(Vertex::NORMAL_OFFSET / 4) as usize], 4.0);
        assert_eq!(floats[(Vertex::COLOUR_OFFSET / 4) as usize], 0.1);
    }

    #[test]
    fn uploads_interleaved_vertices_once() {
        let backend = RecordingBackend::new();
        let buffer = GpuBuffer::new(&backend, &POSITIONS, &NORMALS, &[0, 1, 2], Color::CRIMSON)
            .unwrap();

        assert_eq!(buffer.index_count(), 3);
        assert_eq!(
            backend.events(),
            vec![
                BufferEvent::Created {
                    id: 0,
                    usage: BufferUsage::Vertex,
                    bytes: 3 * 40
                },
                BufferEvent::Created {
                    id: 1,
                    usage: BufferUsage::Index,
                    bytes: 3 * 4
                },
            ]
        );

        let vertices: Vec<Vertex> = bytemuck::pod_collect_to_vec(&buffer.vertex_buffer().contents);
        assert_eq!(vertices[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(vertices[2].colour, Color::CRIMSON.to_array());
    }

    #[test]
    fn drop_releases_both_buffers() {
        let backend = RecordingBackend::new();
        let buffer = GpuBuffer::new(&backend, &POSITIONS, &NORMALS, &[0, 1, 2], Color::WHITE)
            .unwrap();
        assert_eq!(backend.live_buffers(), vec![0, 1]);

        drop(buffer);
        assert!(backend.live_buffers().is_empty());
    }

    #[test]
    fn bind_records_both_buffers() {
        let backend = RecordingBackend::new();
        let buffer = GpuBuffer::new(&backend, &POSITIONS, &NORMALS, &[0, 1, 2], Color::WHITE)
            .unwrap();

        let mut frame = RecordedFrame::new(0.0);
        buffer.bind(&mut frame);

        match frame.commands() {
            [DrawCommand::BindBuffers { vertices, indices }] => {
                assert_eq!(vertices.id, 0);
                assert_eq!(indices.id, 1);
            }
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn invalid_geometry_uploads_nothing() {
        let backend = RecordingBackend::new();

        assert_eq!(
            GpuBuffer::new(&backend, &POSITIONS, &NORMALS[..2], &[0, 1, 2], Color::WHITE).err(),
            Some(GeometryError::LengthMismatch {
                positions: 3,
                normals: 2
            })
        );
        assert_eq!(
            GpuBuffer::new(&backend, &POSITIONS, &NORMALS, &[], Color::WHITE).err(),
            Some(GeometryError::Empty)
        );
        assert_eq!(
            GpuBuffer::new(&backend, &POSITIONS, &NORMALS, &[0, 1, 3], Color::WHITE).err(),
            Some(GeometryError::IndexOutOfRange {
                index: 3,
                vertices: 3
            })
        );
        assert!(backend.events().is_empty());
    }
}
