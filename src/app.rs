use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::color::Color;
use crate::gpu::{GpuContext, GpuError};
use crate::input::Input;
use crate::renderer::{ReadyCallback, Surface, SurfaceConfig};
use crate::scene::SceneBuilder;
use crate::shape_pass::ShapePass;

/// Errors that stop the application.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Configuration for the app window.
pub struct AppConfig {
    pub title: String,
    /// Initial inner size in logical pixels.
    pub width: u32,
    pub height: u32,
    pub surface: SurfaceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Hedrite".to_string(),
            width: 700,
            height: 700,
            surface: SurfaceConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Replace the shaders, light and background.
    pub fn surface(mut self, surface: SurfaceConfig) -> Self {
        self.surface = surface;
        self
    }

    pub fn clear_color(mut self, color: Color) -> Self {
        self.surface.clear_color = color;
        self
    }
}

/// Open a window and render the scene built by `setup` until it is closed.
///
/// `setup` runs once the GPU is ready, after the shaders have compiled.
///
/// # Example
/// ```no_run
/// use hedrite::{AppConfig, Color, Vec3, polyhedra};
///
/// hedrite::run(AppConfig::new().title("Tetrahedron"), |scene| {
///     let points = polyhedra::tetrahedron(Vec3::ZERO);
///     scene
///         .add_polyhedron(&points, &polyhedra::TETRAHEDRON_FACES, Color::CRIMSON, None)
///         .ok();
/// })?;
/// # Ok::<(), hedrite::AppError>(())
/// ```
pub fn run<S>(config: AppConfig, setup: S) -> Result<(), AppError>
where
    S: FnOnce(&mut SceneBuilder<'_, GpuContext>) + 'static,
{
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = HedriteApp::Pending {
        config,
        setup: Some(Box::new(setup)),
    };

    event_loop.run_app(&mut app)?;

    match app {
        HedriteApp::Failed(err) => Err(err),
        _ => Ok(()),
    }
}

enum HedriteApp {
    Pending {
        config: AppConfig,
        setup: Option<ReadyCallback<GpuContext>>,
    },
    Running {
        window: Arc<Window>,
        gpu: GpuContext,
        surface: Surface<GpuContext>,
        pass: ShapePass,
        input: Input,
    },
    Failed(AppError),
}

impl HedriteApp {
    fn start(
        event_loop: &ActiveEventLoop,
        config: &AppConfig,
        setup: Option<ReadyCallback<GpuContext>>,
    ) -> Result<Self, AppError> {
        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(LogicalSize::new(config.width, config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let gpu = GpuContext::new(window.clone())?;

        let scale_factor = window.scale_factor();
        let logical = window.inner_size().to_logical::<f32>(scale_factor);

        let mut surface = Surface::new(config.surface.clone());
        surface.set_scale_factor(scale_factor);
        surface.resize(logical.width, logical.height);
        if let Some(setup) = setup {
            surface.on_ready(setup);
        }
        surface.initialize(&gpu);

        let pass = ShapePass::new(&gpu);

        let mut input = Input::new();
        input.set_scale_factor(scale_factor);

        window.request_redraw();

        Ok(HedriteApp::Running {
            window,
            gpu,
            surface,
            pass,
            input,
        })
    }
}

impl ApplicationHandler for HedriteApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let HedriteApp::Pending { config, setup } = self else {
            return;
        };

        match Self::start(event_loop, config, setup.take()) {
            Ok(running) => *self = running,
            Err(err) => {
                log::error!("Startup failed: {err}");
                *self = HedriteApp::Failed(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let HedriteApp::Running {
            window,
            gpu,
            surface,
            pass,
            input,
        } = self
        else {
            return;
        };

        if let Some(action) = input.handle_event(&event) {
            action.apply(surface);
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                gpu.resize(size.width, size.height);
                let logical = size.to_logical::<f32>(window.scale_factor());
                surface.resize(logical.width, logical.height);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                surface.set_scale_factor(scale_factor);
                input.set_scale_factor(scale_factor);
            }
            WindowEvent::RedrawRequested => {
                redraw(gpu, surface, pass);
                window.request_redraw();
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let HedriteApp::Running { surface, .. } = self {
            surface.shutdown();
        }
    }
}

/// Record one frame and replay it onto the next swapchain image.
fn redraw(gpu: &GpuContext, surface: &mut Surface<GpuContext>, pass: &mut ShapePass) {
    if let Err(err) = pass.prepare(gpu, surface.program(), surface.program_generation()) {
        surface.report_shader_error(&err);
    }

    let output = match gpu.surface.get_current_texture() {
        Ok(output) => output,
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            log::debug!("Surface lost or outdated, reconfiguring");
            gpu.reconfigure();
            return;
        }
        Err(err) => {
            log::warn!("Skipping frame: {err}");
            return;
        }
    };
    let view = output
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());

    let frame = surface.render_frame(Instant::now());
    pass.execute(gpu, &frame, &view);
    output.present();
}
