//! Per-frame recording: the frame clock and the ordered draw command list.
//!
//! The render loop does not talk to wgpu directly. It records a
//! [`RecordedFrame`], an ordered list of [`DrawCommand`]s with the same
//! semantics as an immediate-mode device: a uniform write stays in effect for
//! every later draw until overwritten, bound buffers stay bound until the next
//! bind or unbind. [`ShapePass`](crate::ShapePass) replays the list on the GPU.

use std::time::Instant;

use glam::{Mat4, Vec4};

use crate::color::Color;
use crate::shader::UniformLocation;

/// Frame time used when no time has passed since the previous frame.
pub const DEFAULT_FRAME_TIME: f32 = 1.0 / 60.0;

/// Measures the time between consecutive render calls.
#[derive(Clone, Copy, Debug)]
pub struct FrameClock {
    last: Instant,
}

impl FrameClock {
    /// Starts the clock at `now`. The first tick measures from here.
    pub fn starting_at(now: Instant) -> Self {
        Self { last: now }
    }

    /// Seconds since the previous tick (or since construction), never zero.
    pub fn tick(&mut self, now: Instant) -> f32 {
        let dt = now.saturating_duration_since(self.last).as_secs_f32();
        self.last = now;

        if dt > 0.0 { dt } else { DEFAULT_FRAME_TIME }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::starting_at(Instant::now())
    }
}

/// How triangles are rasterized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
}

/// Fixed-function state applied to subsequent draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceState {
    /// Source-over alpha blending.
    pub alpha_blending: bool,
    pub depth_test: bool,
    /// Cull back faces (counter-clockwise front faces).
    pub cull_back_faces: bool,
}

impl DeviceState {
    /// Blending, depth testing and back-face culling all enabled.
    pub const SCENE: DeviceState = DeviceState {
        alpha_blending: true,
        depth_test: true,
        cull_back_faces: true,
    };
}

/// A value written to a shader uniform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Mat4(Mat4),
    Vec4(Vec4),
    Int(i32),
}

impl UniformValue {
    /// The value in the byte layout WGSL expects (column-major matrices).
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            UniformValue::Mat4(m) => bytemuck::cast_slice(&m.to_cols_array()).to_vec(),
            UniformValue::Vec4(v) => bytemuck::cast_slice(&v.to_array()).to_vec(),
            UniformValue::Int(i) => bytemuck::bytes_of(i).to_vec(),
        }
    }
}

/// One recorded device operation.
#[derive(Debug)]
pub enum DrawCommand<'a, Buf> {
    Clear(Color),
    SetState(DeviceState),
    /// Viewport in physical pixels.
    Viewport { width: u32, height: u32 },
    UseProgram,
    SetUniform {
        location: UniformLocation,
        value: UniformValue,
    },
    PolygonMode(PolygonMode),
    BindBuffers { vertices: &'a Buf, indices: &'a Buf },
    DrawIndexed { index_count: u32 },
    UnbindBuffers,
}

/// A draw as seen by the device: the polygon mode in effect and its size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawSummary {
    pub mode: PolygonMode,
    pub index_count: u32,
}

/// The commands recorded for one frame, in submission order.
#[derive(Debug)]
pub struct RecordedFrame<'a, Buf> {
    commands: Vec<DrawCommand<'a, Buf>>,
    /// Elapsed time this frame was recorded with, in seconds.
    pub dt: f32,
}

impl<'a, Buf> RecordedFrame<'a, Buf> {
    pub fn new(dt: f32) -> Self {
        Self {
            commands: Vec::new(),
            dt,
        }
    }

    pub fn push(&mut self, command: DrawCommand<'a, Buf>) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[DrawCommand<'a, Buf>] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of indexed draw calls.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::DrawIndexed { .. }))
            .count()
    }

    /// Every draw call with the polygon mode in effect when it was issued.
    pub fn draws(&self) -> Vec<DrawSummary> {
        let mut mode = PolygonMode::Fill;
        let mut draws = Vec::new();

        for command in &self.commands {
            match command {
                DrawCommand::PolygonMode(m) => mode = *m,
                DrawCommand::DrawIndexed { index_count } => draws.push(DrawSummary {
                    mode,
                    index_count: *index_count,
                }),
                _ => {}
            }
        }

        draws
    }

    /// The last value written to `location` before the `draw`-th draw call.
    pub fn uniform_at_draw(&self, location: UniformLocation, draw: usize) -> Option<UniformValue> {
        let mut value = None;
        let mut seen = 0;

        for command in &self.commands {
            match command {
                DrawCommand::SetUniform { location: l, value: v } if *l == location => {
                    value = Some(*v);
                }
                DrawCommand::DrawIndexed { .. } => {
                    if seen == draw {
                        return value;
                    }
                    seen += 1;
                }
                _ => {}
            }
        }

        None
    }
}
