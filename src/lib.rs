//! # Hedrite
//!
//! **Flat-shaded polyhedra you can grab and spin.**
//!
//! Hedrite opens a window, compiles a small WGSL program, and draws a scene of
//! convex shapes twice per frame: once solid, once as outlines. Drag with the
//! left mouse button to rotate the scene on a virtual trackball; scroll to
//! zoom, with the distance eased towards its target.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hedrite::{AppConfig, Color, Vec3, polyhedra};
//!
//! fn main() -> Result<(), hedrite::AppError> {
//!     hedrite::run(AppConfig::new().title("Hedrite"), |scene| {
//!         let points = polyhedra::tetrahedron(Vec3::ZERO);
//!         scene
//!             .add_polyhedron(
//!                 &points,
//!                 &polyhedra::TETRAHEDRON_FACES,
//!                 Color::CRIMSON,
//!                 Some(Color::CRIMSON.brighter(1.0)),
//!             )
//!             .ok();
//!     })
//! }
//! ```
//!
//! ## Layers
//!
//! - [`Surface`] owns the scene, the shader program and the camera, and
//!   records each frame as a list of [`DrawCommand`]s.
//! - [`ShapePass`] replays a recorded frame with wgpu.
//! - Geometry is uploaded through the [`Backend`] trait, so scenes and
//!   recorded frames can be inspected without a GPU.

mod app;
mod color;
mod frame;
mod geometry;
mod gpu;
mod input;
mod math;
mod mesh;
mod orbit_camera;
pub mod polyhedra;
mod renderer;
mod scene;
mod shader;
mod shape;
mod shape_pass;

#[cfg(test)]
mod testing;

pub use app::{AppConfig, AppError, run};
pub use color::Color;
pub use frame::{
    DEFAULT_FRAME_TIME, DeviceState, DrawCommand, DrawSummary, FrameClock, PolygonMode,
    RecordedFrame, UniformValue,
};
pub use geometry::{FaceGeometry, GeometryError, build_flat_faces, face_normal};
pub use gpu::{Backend, BufferUsage, DeviceBuffer, GpuContext, GpuError};
pub use input::{Input, PointerAction};
pub use math::{
    FAR_PLANE, FRUSTUM_HALF_WIDTH, NEAR_PLANE, frustum, projection_matrix, transform_point,
    transpose,
};
pub use mesh::{GpuBuffer, Vertex};
pub use orbit_camera::OrbitCamera;
pub use renderer::{ReadyCallback, Surface, SurfaceConfig};
pub use scene::{Scene, SceneBuilder, ShapeId};
pub use shader::{
    Attribute, AttributeLocation, Attributes, ShaderCompileError, ShaderProgram, Stage, Uniform,
    UniformLocation, UniformType, Uniforms, shaders,
};
pub use shape::Shape;
pub use shape_pass::ShapePass;

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
