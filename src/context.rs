//! The GPU and window context shared by the event loop and the scene.

use std::sync::Arc;

use anyhow::Context as _;
use cgmath::Deg;
use winit::{dpi::PhysicalPosition, window::Window};

use crate::{
    camera::{self, CameraResources, OrbitController, Projection},
    config::SceneConfig,
    data_structures::texture,
    framing::{self, Aabb},
    pipelines::{
        Pipelines,
        light::{LightResources, LightUniform, hex_to_linear_rgb},
    },
    resources,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseButtonState {
    #[default]
    None,
    Left,
    Right,
}

#[derive(Debug, Default)]
pub struct MouseState {
    pub pressed: MouseButtonState,
    pub coords: Option<PhysicalPosition<f64>>,
}

impl MouseState {
    /// Stores the new cursor position and returns the movement since the last one.
    pub fn moved_to(&mut self, position: PhysicalPosition<f64>) -> (f32, f32) {
        let delta = self
            .coords
            .map(|last| ((position.x - last.x) as f32, (position.y - last.y) as f32))
            .unwrap_or((0.0, 0.0));
        self.coords = Some(position);
        delta
    }
}

/// Samples per pixel when antialiasing is on.
pub const MSAA_SAMPLES: u32 = 4;

/// The sample count to render with: [`MSAA_SAMPLES`] when antialiasing is
/// requested and `supported` accepts it, a single sample otherwise.
pub fn choose_sample_count(antialias: bool, supported: impl Fn(u32) -> bool) -> u32 {
    if antialias && supported(MSAA_SAMPLES) {
        MSAA_SAMPLES
    } else {
        1
    }
}

/// Whether a surface configured at `surface` pixels has to be reconfigured to
/// match a drawable of `display` pixels. Empty drawables never are.
pub fn needs_resize(surface: (u32, u32), display: (u32, u32)) -> bool {
    display.0 > 0 && display.1 > 0 && surface != display
}

/// The parts of the [`Context`] flows need while they are constructed.
#[derive(Debug, Clone)]
pub struct InitContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub material_layout: wgpu::BindGroupLayout,
}

impl From<&Context> for InitContext {
    fn from(ctx: &Context) -> Self {
        // wgpu handles are reference counted; cloning them is cheap.
        Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            material_layout: ctx.material_layout.clone(),
        }
    }
}

#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    pub(crate) depth_texture: texture::Texture,
    /// Multisampled colour target, resolved into the surface each frame.
    pub(crate) msaa_view: Option<wgpu::TextureView>,
    pub sample_count: u32,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub camera: CameraResources,
    pub projection: Projection,
    pub light: LightResources,
    pub pipelines: Pipelines,
    pub material_layout: wgpu::BindGroupLayout,
    pub clear_colour: wgpu::Color,
    pub mouse: MouseState,
}

impl Context {
    pub async fn new(window: Arc<Window>, scene: &SceneConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();

        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("Cannot create a surface for the window")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No suitable graphics adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("Cannot open the graphics device")?;

        // Shaders output linear colour and rely on an sRGB surface.
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("The surface supports no formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let cam = &scene.camera;
        let projection = Projection::new(cam.aspect, Deg(cam.fov_degrees), cam.near, cam.far);
        let mut camera = camera::Camera::new(cam.position);
        let mut controller = OrbitController::new(cam.orbit_target.into());
        controller.update(&mut camera, &projection, size.height as f32);
        let camera = CameraResources::new(&device, camera, controller, &projection);

        let sample_count = choose_sample_count(scene.antialias, |count| {
            [surface_format, texture::Texture::DEPTH_FORMAT]
                .into_iter()
                .all(|format| {
                    adapter
                        .get_texture_format_features(format)
                        .flags
                        .sample_count_supported(count)
                })
        });
        log::info!("Rendering with {sample_count} sample(s) per pixel");
        let size_px = [config.width, config.height];
        let depth_texture =
            texture::Texture::create_depth_texture(&device, size_px, sample_count, "depth_texture");
        let msaa_view = (sample_count > 1).then(|| {
            texture::Texture::create_multisampled_view(&device, size_px, surface_format, sample_count)
        });

        let light = LightResources::new(
            &device,
            LightUniform::new(&scene.hemisphere_light, &scene.directional_light),
        );

        let material_layout = resources::material_layout(&device);
        let pipelines = Pipelines::new(
            &device,
            config.format,
            sample_count,
            &material_layout,
            &camera.bind_group_layout,
            &light.bind_group_layout,
        );

        let [r, g, b] = hex_to_linear_rgb(scene.background);
        let clear_colour = wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: 1.0,
        };

        log::info!("Surface format {surface_format:?}, initial size {size:?}");

        Ok(Self {
            window,
            depth_texture,
            msaa_view,
            sample_count,
            surface,
            device,
            queue,
            config,
            camera,
            projection,
            light,
            pipelines,
            material_layout,
            clear_colour,
            mouse: MouseState::default(),
        })
    }

    /// The drawable size of the window in physical pixels.
    pub fn display_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Reconfigures the surface, depth buffer and multisampled target and
    /// matches the projection's aspect. Returns `false` for empty sizes,
    /// which are skipped.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.config.width = width;
        self.config.height = height;
        self.projection.resize(width, height);
        self.surface.configure(&self.device, &self.config);
        self.depth_texture = texture::Texture::create_depth_texture(
            &self.device,
            [width, height],
            self.sample_count,
            "depth_texture",
        );
        if self.msaa_view.is_some() {
            self.msaa_view = Some(texture::Texture::create_multisampled_view(
                &self.device,
                [width, height],
                self.config.format,
                self.sample_count,
            ));
        }
        log::debug!("Surface resized to {width}x{height}");
        true
    }

    /// Applies pending orbit input and uploads the camera uniform.
    pub fn update_camera(&mut self) {
        let height = self.config.height as f32;
        let resources = &mut self.camera;
        resources
            .controller
            .update(&mut resources.camera, &self.projection, height);
        resources.write(&self.queue, &self.projection);
    }

    /// Fits the camera to `bounds` and makes it orbit their center.
    pub fn frame_bounds(&mut self, bounds: &Aabb) -> bool {
        let height = self.config.height as f32;
        let resources = &mut self.camera;
        let framed = framing::frame_bounds(
            bounds,
            &mut resources.camera,
            &mut self.projection,
            &mut resources.controller,
            height,
        );
        if framed {
            resources.write(&self.queue, &self.projection);
        }
        framed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_only_when_sizes_differ() {
        assert!(!needs_resize((800, 600), (800, 600)));
        assert!(needs_resize((800, 600), (1024, 600)));
        assert!(needs_resize((800, 600), (800, 601)));
    }

    #[test]
    fn empty_drawables_are_skipped() {
        assert!(!needs_resize((800, 600), (0, 600)));
        assert!(!needs_resize((800, 600), (800, 0)));
        assert!(!needs_resize((0, 0), (0, 0)));
    }

    #[test]
    fn first_configure_of_a_zero_surface() {
        assert!(needs_resize((0, 0), (300, 150)));
    }

    #[test]
    fn multisampling_needs_support_and_the_flag() {
        assert_eq!(choose_sample_count(true, |_| true), MSAA_SAMPLES);
        assert_eq!(choose_sample_count(true, |count| count == 1), 1);
        assert_eq!(choose_sample_count(false, |_| true), 1);
    }

    #[test]
    fn mouse_deltas_start_at_zero() {
        let mut mouse = MouseState::default();
        assert_eq!(mouse.moved_to(PhysicalPosition::new(10.0, 20.0)), (0.0, 0.0));
        assert_eq!(mouse.moved_to(PhysicalPosition::new(13.0, 18.0)), (3.0, -2.0));
    }
}
