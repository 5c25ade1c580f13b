//! Device bring-up and buffer allocation.
//!
//! This module provides [`GpuContext`], the struct that holds the wgpu device,
//! queue and window surface, and the [`Backend`] trait through which the rest
//! of the engine allocates device buffers.
//!
//! Geometry code is written against [`Backend`] rather than against wgpu
//! directly, so shapes and scenes can be built and inspected without a GPU.
//! [`GpuContext`] is the wgpu implementation.
//!
//! # Example
//!
//! ```ignore
//! let mut gpu = GpuContext::new(window)?;
//! let vertices = gpu.create_buffer("Shape Vertex Buffer", &bytes, BufferUsage::Vertex);
//!
//! gpu.resize(new_width, new_height);
//! ```

use std::sync::Arc;
use winit::window::Window;

/// What a device buffer will be bound as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
}

/// A buffer living in device memory.
pub trait DeviceBuffer {
    /// Frees the device memory now rather than when the handle is dropped.
    ///
    /// Must tolerate being called while the device is shutting down.
    fn release(&self);
}

/// Allocates write-once device buffers.
pub trait Backend {
    type Buffer: DeviceBuffer;

    /// Uploads `contents` into a new static buffer.
    fn create_buffer(&self, label: &str, contents: &[u8], usage: BufferUsage) -> Self::Buffer;
}

impl DeviceBuffer for wgpu::Buffer {
    fn release(&self) {
        // Destroying a buffer on a lost device is a no-op in wgpu.
        self.destroy();
    }
}

/// Errors raised while bringing up the GPU.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("failed to create window surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

/// The window's wgpu device, queue and swapchain.
///
/// Created once per window. Shapes are uploaded through its [`Backend`]
/// impl and [`ShapePass`](crate::ShapePass) renders with it.
pub struct GpuContext {
    /// Swapchain of the window.
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// Swapchain format and size in physical pixels.
    pub config: wgpu::SurfaceConfiguration,
    /// Whether pipelines may rasterize polygons as outlines.
    pub supports_wireframe: bool,
}

impl GpuContext {
    /// Brings up wgpu for `window`.
    ///
    /// Line rasterization is requested when the adapter offers it; otherwise
    /// [`supports_wireframe`](Self::supports_wireframe) is false and outline
    /// draws are skipped. The swapchain prefers an sRGB format and presents
    /// with vsync.
    pub fn new(window: Arc<Window>) -> Result<Self, GpuError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;

        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        let supports_wireframe = adapter
            .features()
            .contains(wgpu::Features::POLYGON_MODE_LINE);
        let required_features = if supports_wireframe {
            wgpu::Features::POLYGON_MODE_LINE
        } else {
            log::warn!("Adapter lacks POLYGON_MODE_LINE; wireframe overlays are disabled");
            wgpu::Features::empty()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Hedrite Device"),
            required_features,
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(GpuError::NoSurfaceFormat)?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            supports_wireframe,
        })
    }

    /// Reconfigures the swapchain for a new physical size.
    ///
    /// Zero sizes, as reported while minimized, are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Reapply the current configuration after the surface was lost or outdated.
    pub fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    /// Swapchain width in physical pixels.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }
}

impl Backend for GpuContext {
    type Buffer = wgpu::Buffer;

    fn create_buffer(&self, label: &str, contents: &[u8], usage: BufferUsage) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;

        let usage = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
        };

        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            })
    }
}
