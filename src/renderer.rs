//! The render surface: scene, shader program, camera and the per-frame loop.
//!
//! [`Surface`] is driven by a host through a small lifecycle:
//!
//! 1. [`initialize`](Surface::initialize) once a device exists. Compiles the
//!    configured shaders and hands a [`SceneBuilder`] to the ready callback.
//! 2. [`resize`](Surface::resize), [`set_scale_factor`](Surface::set_scale_factor)
//!    and the pointer/scroll methods whenever the host sees those events.
//! 3. [`render_frame`](Surface::render_frame) once per display refresh. The
//!    returned [`RecordedFrame`] is replayed by [`ShapePass`](crate::ShapePass).
//! 4. [`shutdown`](Surface::shutdown) before the device goes away.
//!
//! # Frame layout
//!
//! Every frame draws each shape twice. The fill pass draws all shapes solid
//! with `has_wireframe = 0`. The line pass draws them again as outlines,
//! setting `has_wireframe` and `wireframe_colour` per shape first. Shapes
//! without an outline get `has_wireframe = 0` and a transparent colour.

use std::time::Instant;

use glam::{Vec2, Vec3};

use crate::color::Color;
use crate::frame::{DeviceState, DrawCommand, FrameClock, PolygonMode, RecordedFrame};
use crate::geometry::GeometryError;
use crate::gpu::Backend;
use crate::math::{projection_matrix, transform_point};
use crate::orbit_camera::OrbitCamera;
use crate::scene::{Scene, SceneBuilder, ShapeId};
use crate::shader::{ShaderCompileError, ShaderProgram, shaders};

/// Called once, right after the surface has initialized.
pub type ReadyCallback<B> = Box<dyn FnOnce(&mut SceneBuilder<'_, B>)>;

/// Shaders, light and background for a [`Surface`].
#[derive(Clone, Debug)]
pub struct SurfaceConfig {
    pub vertex_shader: String,
    pub fragment_shader: String,
    /// World-space light position. Moved into view space every frame.
    pub light_position: Vec3,
    pub clear_color: Color,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            vertex_shader: shaders::DEFAULT_VERTEX.to_owned(),
            fragment_shader: shaders::DEFAULT_FRAGMENT.to_owned(),
            light_position: Vec3::new(10.0, 10.0, 5.0),
            clear_color: Color::BLACK,
        }
    }
}

impl SurfaceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the WGSL sources compiled on initialize.
    pub fn shaders(mut self, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.vertex_shader = vertex.into();
        self.fragment_shader = fragment.into();
        self
    }

    pub fn light_position(mut self, position: Vec3) -> Self {
        self.light_position = position;
        self
    }

    pub fn clear_color(mut self, color: Color) -> Self {
        self.clear_color = color;
        self
    }
}

/// Owns everything drawn into one window.
pub struct Surface<B: Backend> {
    config: SurfaceConfig,
    scene: Scene<B>,
    program: Option<ShaderProgram>,
    /// The program replaced by the last successful compile, restored if the
    /// device rejects its successor.
    previous_program: Option<ShaderProgram>,
    program_generation: u64,
    status: String,
    camera: OrbitCamera,
    clock: FrameClock,
    logical_size: Vec2,
    scale_factor: f64,
    on_ready: Option<ReadyCallback<B>>,
}

impl<B: Backend> Surface<B> {
    pub fn new(config: SurfaceConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    /// Creates a surface whose first frame measures its time from `now`.
    pub fn starting_at(config: SurfaceConfig, now: Instant) -> Self {
        let camera = OrbitCamera::new();
        Self {
            config,
            scene: Scene::new(),
            program: None,
            previous_program: None,
            program_generation: 0,
            status: String::from("no shader program"),
            camera,
            clock: FrameClock::starting_at(now),
            logical_size: Vec2::new(700.0, 700.0),
            scale_factor: 1.0,
            on_ready: None,
        }
    }

    /// Replace the camera, keeping the surface's viewport.
    pub fn with_camera(mut self, camera: OrbitCamera) -> Self {
        self.camera = camera.viewport(self.logical_size.x, self.logical_size.y);
        self
    }

    /// Register the callback that populates the scene after [`initialize`](Self::initialize).
    ///
    /// Only the first initialize after registering invokes it.
    pub fn on_ready(&mut self, callback: impl FnOnce(&mut SceneBuilder<'_, B>) + 'static) {
        self.on_ready = Some(Box::new(callback));
    }

    /// Compiles the configured shaders, then fires the ready callback.
    ///
    /// A compile failure is logged and leaves the surface drawing nothing; the
    /// callback still runs so the scene is ready for a later successful compile.
    pub fn initialize(&mut self, backend: &B) {
        let vertex = self.config.vertex_shader.clone();
        let fragment = self.config.fragment_shader.clone();
        if self.compile_shaders(&vertex, &fragment).is_ok() {
            log::info!("{}", self.status);
        }

        log::info!("Surface initialized");

        if let Some(callback) = self.on_ready.take() {
            callback(&mut SceneBuilder::new(backend, &mut self.scene));
        }
    }

    /// Compiles and activates a new program.
    ///
    /// On failure the previous program, if any, stays active and
    /// [`status`](Self::status) holds the diagnostic.
    pub fn compile_shaders(
        &mut self,
        vertex: &str,
        fragment: &str,
    ) -> Result<(), ShaderCompileError> {
        match ShaderProgram::compile(vertex, fragment) {
            Ok(program) => {
                self.status = program.describe();
                self.previous_program = self.program.replace(program);
                self.program_generation += 1;
                Ok(())
            }
            Err(err) => {
                log::error!("Shader compile failed: {err}");
                self.status = err.to_string();
                Err(err)
            }
        }
    }

    /// Records an error raised while the device built the current program.
    ///
    /// A [`ShaderCompileError::Device`] rolls back to the program that was
    /// active before the last compile, under a new generation so the executor
    /// rebuilds its pipelines. The status keeps the device diagnostic.
    pub fn report_shader_error(&mut self, err: &ShaderCompileError) {
        log::error!("{err}");
        self.status = err.to_string();

        if matches!(err, ShaderCompileError::Device(_)) {
            self.program = self.previous_program.take();
            self.program_generation += 1;
            if self.program.is_some() {
                log::warn!("Restored the previous shader program");
            }
        }
    }

    /// Uploads geometry and appends it to the scene.
    pub fn add_shape(
        &mut self,
        backend: &B,
        positions: &[[f32; 3]],
        normals: &[[f32; 3]],
        indices: &[u32],
        fill: Color,
        wireframe: Option<Color>,
    ) -> Result<ShapeId, GeometryError> {
        self.scene_builder(backend)
            .add_shape(positions, normals, indices, fill, wireframe)
    }

    pub fn scene_builder<'a>(&'a mut self, backend: &'a B) -> SceneBuilder<'a, B> {
        SceneBuilder::new(backend, &mut self.scene)
    }

    /// New logical size of the surface.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.logical_size = Vec2::new(width, height);
        self.camera.set_viewport(width, height);
    }

    /// Physical pixels per logical pixel.
    pub fn set_scale_factor(&mut self, scale_factor: f64) {
        self.scale_factor = scale_factor;
    }

    /// Viewport in physical pixels.
    pub fn viewport_size(&self) -> (u32, u32) {
        let scale = self.scale_factor as f32;
        (
            (self.logical_size.x * scale).round().max(0.0) as u32,
            (self.logical_size.y * scale).round().max(0.0) as u32,
        )
    }

    pub fn pointer_down(&mut self, position: Vec2) {
        self.camera.pointer_down(position);
    }

    pub fn pointer_drag(&mut self, position: Vec2) {
        self.camera.pointer_drag(position);
    }

    pub fn pointer_up(&mut self) {
        self.camera.pointer_up();
    }

    pub fn scroll(&mut self, delta_y: f32) {
        self.camera.scroll(delta_y);
    }

    /// Advances the clock and camera, then records this frame's draws.
    ///
    /// Without a compiled program the frame is empty.
    pub fn render_frame(&mut self, now: Instant) -> RecordedFrame<'_, B::Buffer> {
        let dt = self.clock.tick(now);
        self.camera.update(dt);

        let mut frame = RecordedFrame::new(dt);
        let Some(program) = &self.program else {
            return frame;
        };
        let uniforms = program.uniforms();

        frame.push(DrawCommand::Clear(self.config.clear_color));
        frame.push(DrawCommand::SetState(DeviceState::SCENE));
        let (width, height) = self.viewport_size();
        frame.push(DrawCommand::Viewport { width, height });
        frame.push(DrawCommand::UseProgram);

        let view = self.camera.view_matrix();
        uniforms.set_projection_matrix(
            &mut frame,
            projection_matrix(self.logical_size.x, self.logical_size.y),
        );
        uniforms.set_view_matrix(&mut frame, view);
        uniforms.set_light_position(
            &mut frame,
            transform_point(view, self.config.light_position).extend(1.0),
        );
        uniforms.set_has_wireframe(&mut frame, false);
        uniforms.set_wireframe_colour(&mut frame, Color::BLACK);

        frame.push(DrawCommand::PolygonMode(PolygonMode::Fill));
        for shape in self.scene.iter() {
            shape.draw(&mut frame);
        }

        frame.push(DrawCommand::PolygonMode(PolygonMode::Line));
        for shape in self.scene.iter() {
            uniforms.set_has_wireframe(&mut frame, shape.has_wireframe());
            uniforms.set_wireframe_colour(&mut frame, shape.wireframe_colour());
            shape.draw(&mut frame);
        }

        frame.push(DrawCommand::UnbindBuffers);
        frame
    }

    /// Releases every shape's buffers and the shader program.
    pub fn shutdown(&mut self) {
        self.scene.clear();
        self.program = None;
        self.previous_program = None;
        self.status = String::from("shut down");
        log::info!("Surface shut down");
    }

    pub fn program(&self) -> Option<&ShaderProgram> {
        self.program.as_ref()
    }

    /// Bumped on every successful compile.
    pub fn program_generation(&self) -> u64 {
        self.program_generation
    }

    /// Last compile result, human readable.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn scene(&self) -> &Scene<B> {
        &self.scene
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DrawSummary, UniformValue};
    use crate::polyhedra::{TETRAHEDRON_FACES, tetrahedron};
    use crate::shader::{Stage, UniformLocation};
    use crate::testing::RecordingBackend;
    use glam::Vec4;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn tetrahedron_surface(
        backend: &RecordingBackend,
        start: Instant,
        wireframe: Option<Color>,
    ) -> Surface<RecordingBackend> {
        let mut surface = Surface::starting_at(SurfaceConfig::default(), start);
        surface.on_ready(move |scene| {
            scene
                .add_polyhedron(
                    &tetrahedron(Vec3::ZERO),
                    &TETRAHEDRON_FACES,
                    Color::CRIMSON,
                    wireframe,
                )
                .unwrap();
        });
        surface.initialize(backend);
        surface
    }

    #[test]
    fn tetrahedron_draws_once_per_pass() {
        let backend = RecordingBackend::new();
        let start = Instant::now();
        let mut surface = tetrahedron_surface(&backend, start, None);
        let has_wireframe = surface.program().unwrap().uniforms().has_wireframe.unwrap();
        let colour = surface.program().unwrap().uniforms().wireframe_colour.unwrap();

        let frame = surface.render_frame(start + ms(16));

        assert_eq!(
            frame.draws(),
            vec![
                DrawSummary {
                    mode: PolygonMode::Fill,
                    index_count: 12
                },
                DrawSummary {
                    mode: PolygonMode::Line,
                    index_count: 12
                },
            ]
        );
        assert_eq!(frame.uniform_at_draw(has_wireframe, 0), Some(UniformValue::Int(0)));
        assert_eq!(frame.uniform_at_draw(has_wireframe, 1), Some(UniformValue::Int(0)));
        assert_eq!(
            frame.uniform_at_draw(colour, 1),
            Some(UniformValue::Vec4(Vec4::ZERO))
        );
        assert!(matches!(frame.commands().last(), Some(DrawCommand::UnbindBuffers)));
    }

    #[test]
    fn outlined_shape_sets_wireframe_for_line_pass_only() {
        let backend = RecordingBackend::new();
        let start = Instant::now();
        let mut surface = tetrahedron_surface(&backend, start, Some(Color::WHITE));
        let uniforms = *surface.program().unwrap().uniforms();

        let frame = surface.render_frame(start + ms(16));
        let has_wireframe = uniforms.has_wireframe.unwrap();
        let colour = uniforms.wireframe_colour.unwrap();

        assert_eq!(frame.uniform_at_draw(has_wireframe, 0), Some(UniformValue::Int(0)));
        assert_eq!(
            frame.uniform_at_draw(colour, 0),
            Some(UniformValue::Vec4(Color::BLACK.into()))
        );
        assert_eq!(frame.uniform_at_draw(has_wireframe, 1), Some(UniformValue::Int(1)));
        assert_eq!(
            frame.uniform_at_draw(colour, 1),
            Some(UniformValue::Vec4(Vec4::ONE))
        );
    }

    #[test]
    fn light_is_moved_into_view_space() {
        let backend = RecordingBackend::new();
        let start = Instant::now();
        let mut surface = tetrahedron_surface(&backend, start, None);
        let light = surface.program().unwrap().uniforms().light_position.unwrap();

        let frame = surface.render_frame(start + ms(16));
        assert_eq!(
            frame.uniform_at_draw(light, 0),
            Some(UniformValue::Vec4(Vec4::new(10.0, 10.0, -5.0, 1.0)))
        );
    }

    #[test]
    fn frame_before_compile_is_empty_but_camera_moves() {
        let start = Instant::now();
        let mut surface: Surface<RecordingBackend> =
            Surface::starting_at(SurfaceConfig::default(), start);
        surface.scroll(1.0);

        let frame = surface.render_frame(start + ms(16));
        assert!(frame.is_empty());
        assert!(surface.camera().current_distance() < 10.0);
    }

    #[test]
    fn failed_compile_keeps_previous_program() {
        let backend = RecordingBackend::new();
        let start = Instant::now();
        let mut surface = tetrahedron_surface(&backend, start, None);
        assert_eq!(surface.program_generation(), 1);

        let result = surface.compile_shaders("not wgsl", shaders::DEFAULT_FRAGMENT);
        assert!(matches!(result, Err(ShaderCompileError::Parse { .. })));
        assert_eq!(surface.program_generation(), 1);
        assert!(surface.program().is_some());
        assert!(surface.status().contains("parse"));

        assert_eq!(surface.render_frame(start + ms(16)).draw_count(), 2);
    }

    #[test]
    fn device_rejection_restores_previous_program() {
        let backend = RecordingBackend::new();
        let start = Instant::now();
        let mut surface = tetrahedron_surface(&backend, start, None);
        let accepted = *surface.program().unwrap().uniforms();

        let moved = shaders::DEFAULT_VERTEX.replace(
            "@binding(0) var<uniform> projection_matrix",
            "@binding(5) var<uniform> projection_matrix",
        );
        surface
            .compile_shaders(&moved, shaders::DEFAULT_FRAGMENT)
            .unwrap();
        assert_eq!(
            surface.program().unwrap().uniforms().projection_matrix,
            Some(UniformLocation { group: 0, binding: 5 })
        );

        surface.report_shader_error(&ShaderCompileError::Device("bad binding".into()));

        assert_eq!(*surface.program().unwrap().uniforms(), accepted);
        assert_eq!(surface.program_generation(), 3);
        assert!(surface.status().contains("bad binding"));

        let frame = surface.render_frame(start + ms(16));
        let projection = accepted.projection_matrix.unwrap();
        assert!(frame.uniform_at_draw(projection, 0).is_some());
        assert!(!frame.commands().iter().any(|c| matches!(
            c,
            DrawCommand::SetUniform { location, .. } if location.binding == 5
        )));
    }

    #[test]
    fn front_end_errors_do_not_roll_back() {
        let backend = RecordingBackend::new();
        let mut surface = tetrahedron_surface(&backend, Instant::now(), None);
        surface
            .compile_shaders(shaders::MINIMAL_VERTEX, shaders::DEFAULT_FRAGMENT)
            .unwrap();

        surface.report_shader_error(&ShaderCompileError::MissingEntryPoint {
            stage: Stage::Vertex,
        });

        assert_eq!(surface.program_generation(), 2);
        assert!(surface.program().unwrap().uniforms().light_position.is_none());
    }

    #[test]
    fn first_program_rejected_by_device_leaves_nothing_to_draw() {
        let backend = RecordingBackend::new();
        let start = Instant::now();
        let mut surface = tetrahedron_surface(&backend, start, None);

        surface.report_shader_error(&ShaderCompileError::Device("no adapter support".into()));

        assert!(surface.program().is_none());
        assert!(surface.render_frame(start + ms(16)).is_empty());
    }

    #[test]
    fn minimal_program_skips_absent_uniforms() {
        let backend = RecordingBackend::new();
        let start = Instant::now();
        let mut surface = tetrahedron_surface(&backend, start, Some(Color::WHITE));
        surface
            .compile_shaders(shaders::MINIMAL_VERTEX, shaders::DEFAULT_FRAGMENT)
            .unwrap();

        let frame = surface.render_frame(start + ms(16));
        let uniform_writes = frame
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::SetUniform { .. }))
            .count();

        assert_eq!(uniform_writes, 2);
        assert_eq!(frame.draw_count(), 2);
    }

    #[test]
    fn viewport_follows_scale_factor() {
        let start = Instant::now();
        let backend = RecordingBackend::new();
        let mut surface = tetrahedron_surface(&backend, start, None);
        surface.resize(700.0, 500.0);
        surface.set_scale_factor(1.5);

        let frame = surface.render_frame(start + ms(16));
        assert!(frame.commands().iter().any(|c| matches!(
            c,
            DrawCommand::Viewport {
                width: 1050,
                height: 750
            }
        )));
    }

    #[test]
    fn ready_callback_fires_once() {
        let backend = RecordingBackend::new();
        let calls = Rc::new(Cell::new(0));
        let mut surface: Surface<RecordingBackend> = Surface::new(SurfaceConfig::default());

        let counter = Rc::clone(&calls);
        surface.on_ready(move |_| counter.set(counter.get() + 1));
        surface.initialize(&backend);
        surface.initialize(&backend);

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn shutdown_releases_everything() {
        let backend = RecordingBackend::new();
        let mut surface = tetrahedron_surface(&backend, Instant::now(), None);
        assert_eq!(backend.live_buffers().len(), 2);

        surface.shutdown();
        assert!(backend.live_buffers().is_empty());
        assert!(surface.program().is_none());
        assert!(surface.scene().is_empty());
    }

    /// Two frames of `dt` leave a zoom gap of `g·(1 - s)²` with `s = rate·dt`,
    /// one frame of `2·dt` leaves `g·(1 - 2s)`. They differ by exactly `g·s²`.
    #[test]
    fn split_frames_match_combined_frame_within_bound() {
        let backend = RecordingBackend::new();
        let start = Instant::now();

        let mut split = tetrahedron_surface(&backend, start, None);
        let mut combined = tetrahedron_surface(&backend, start, None);
        split.scroll(1.0);
        combined.scroll(1.0);

        split.render_frame(start + ms(16));
        split.render_frame(start + ms(32));
        combined.render_frame(start + ms(32));

        let gap = 5.0;
        let s = 15.0 * 0.016;
        let difference = split.camera().current_distance() - combined.camera().current_distance();

        assert!(difference > 0.0);
        assert!((difference - gap * s * s).abs() < 1e-4);
        assert_eq!(split.camera().rotation(), combined.camera().rotation());
    }
}
