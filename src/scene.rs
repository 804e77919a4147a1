//! The demo scene: a moon, a checkered ground, a windmill and a small city
//! under a hemisphere light and a sun, with a sound looping in the background.
//!
//! Everything is built on the spot with white placeholder textures. Textures,
//! models and the sound arrive as [`SceneEvent`]s and are swapped in as they
//! come. When the city is loaded the camera is framed around it.

use std::fmt;

use cgmath::{Deg, Quaternion, Rotation3, Vector3};
use instant::Duration;

use crate::{
    audio::BackgroundAudio,
    config::SceneConfig,
    context::{Context, InitContext},
    data_structures::{
        geometry,
        instance::Instance,
        model::{Material, MaterialParams, Mesh, Model, Shading},
        scene_graph::{ModelNode, SceneNode},
        texture::{Texture, TextureOptions},
    },
    flow::{self, FlowConstructor, GraphicsFlow, Out},
    render::Render,
    resources,
};

/// Everything the scene fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    SphereTexture,
    GroundTexture,
    Audio,
    Windmill,
    City,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Asset::SphereTexture => "sphere texture",
            Asset::GroundTexture => "ground texture",
            Asset::Audio => "background audio",
            Asset::Windmill => "windmill",
            Asset::City => "city",
        };
        f.write_str(name)
    }
}

pub enum SceneEvent {
    TextureLoaded {
        asset: Asset,
        texture: Texture,
    },
    #[cfg(not(target_arch = "wasm32"))]
    AudioLoaded(Vec<u8>),
    WindmillLoaded(Model),
    CityLoaded(Box<dyn SceneNode>),
    LoadFailed {
        asset: Asset,
        error: anyhow::Error,
    },
}

/// Load progress of the scene's assets.
#[derive(Debug, Default)]
pub struct SceneState {
    pub expected: usize,
    pub loaded: usize,
    pub failed: usize,
}

impl SceneState {
    pub fn record(&mut self, asset: Asset, ok: bool) {
        if ok {
            self.loaded += 1;
            log::info!("Loaded {asset}");
        } else {
            self.failed += 1;
        }
        if self.settled() {
            log::info!(
                "All assets settled: {} loaded, {} failed",
                self.loaded,
                self.failed
            );
        }
    }

    pub fn settled(&self) -> bool {
        self.loaded + self.failed >= self.expected
    }
}

pub fn sphere_transform(config: &SceneConfig) -> Instance {
    Instance::from(Vector3::from(config.sphere.position))
}

/// The plane is generated facing +Z; the ground lies flat facing +Y.
pub fn ground_transform() -> Instance {
    Instance::new().with_rotation(Quaternion::from_angle_x(Deg(-90.0)))
}

pub fn windmill_transform(config: &SceneConfig) -> Instance {
    Instance::from(Vector3::from(config.windmill.position))
}

pub fn city_transform(config: &SceneConfig) -> Instance {
    Instance::from(Vector3::from(config.city.position)).with_uniform_scale(config.city.scale)
}

/// Sampling of the two scene textures. The checkerboard is colour managed
/// and repeats with hard edges; the moon image is sampled as stored.
pub fn sphere_texture_options() -> TextureOptions {
    TextureOptions::linear()
}

pub fn ground_texture_options() -> TextureOptions {
    TextureOptions::repeat_nearest()
}

/// Whether the background sound is fetched and played.
fn plays_audio(config: &SceneConfig) -> bool {
    config.audio.enabled
}

pub struct DemoScene {
    config: SceneConfig,
    device: wgpu::Device,
    queue: wgpu::Queue,
    material_layout: wgpu::BindGroupLayout,
    sphere: ModelNode,
    ground: ModelNode,
    windmill: Option<ModelNode>,
    city: Option<Box<dyn SceneNode>>,
    #[allow(dead_code)]
    audio: Option<BackgroundAudio>,
}

impl DemoScene {
    pub fn new(ctx: InitContext, config: SceneConfig) -> Self {
        let InitContext {
            device,
            queue,
            material_layout,
        } = ctx;

        let sphere = {
            let data = geometry::sphere(
                config.sphere.radius,
                config.sphere.width_segments,
                config.sphere.height_segments,
            );
            let params = MaterialParams {
                shading: Shading::Unlit,
                ..Default::default()
            };
            let texture = placeholder(&device, &queue, sphere_texture_options());
            let mut node = single_mesh_node(
                &device,
                &material_layout,
                "sphere",
                &data,
                texture,
                params,
                false,
            );
            node.set_local_transform(sphere_transform(&config));
            node
        };

        let ground = {
            let size = config.ground.size;
            let data = geometry::plane(size, size);
            let repeats = size / 2.0;
            let params = MaterialParams {
                uv_repeat: [repeats, repeats],
                shading: Shading::Lit,
                ..Default::default()
            };
            let texture = placeholder(&device, &queue, ground_texture_options());
            let mut node = single_mesh_node(
                &device,
                &material_layout,
                "ground",
                &data,
                texture,
                params,
                true,
            );
            node.set_local_transform(ground_transform());
            node
        };

        let mut scene = Self {
            config,
            device,
            queue,
            material_layout,
            sphere,
            ground,
            windmill: None,
            city: None,
            audio: None,
        };
        for node in [&mut scene.sphere, &mut scene.ground] {
            node.update_world_transform_all();
            node.write_to_buffers(&scene.queue);
        }
        scene
    }

    fn load_texture(
        &self,
        asset: Asset,
        location: &str,
        options: TextureOptions,
    ) -> Box<dyn Future<Output = SceneEvent>> {
        let device = self.device.clone();
        let queue = self.queue.clone();
        let location = location.to_string();
        Box::new(async move {
            match resources::load_texture(&location, options, &device, &queue).await {
                Ok(texture) => SceneEvent::TextureLoaded { asset, texture },
                Err(error) => SceneEvent::LoadFailed { asset, error },
            }
        })
    }

    fn load_windmill(&self) -> Box<dyn Future<Output = SceneEvent>> {
        let device = self.device.clone();
        let queue = self.queue.clone();
        let layout = self.material_layout.clone();
        let windmill = self.config.windmill.clone();
        Box::new(async move {
            match resources::load_model_obj(&windmill.mtl, &windmill.obj, &device, &queue, &layout)
                .await
            {
                Ok(model) => SceneEvent::WindmillLoaded(model),
                Err(error) => SceneEvent::LoadFailed {
                    asset: Asset::Windmill,
                    error,
                },
            }
        })
    }

    fn load_city(&self) -> Box<dyn Future<Output = SceneEvent>> {
        let device = self.device.clone();
        let queue = self.queue.clone();
        let layout = self.material_layout.clone();
        let url = self.config.city.url.clone();
        Box::new(async move {
            match resources::load_model_gltf(&url, &device, &queue, &layout).await {
                Ok(root) => SceneEvent::CityLoaded(root),
                Err(error) => SceneEvent::LoadFailed {
                    asset: Asset::City,
                    error,
                },
            }
        })
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn load_audio(&self) -> Box<dyn Future<Output = SceneEvent>> {
        let url = self.config.audio.url.clone();
        Box::new(async move {
            match resources::load_binary(&url).await {
                Ok(bytes) => SceneEvent::AudioLoaded(bytes),
                Err(error) => SceneEvent::LoadFailed {
                    asset: Asset::Audio,
                    error,
                },
            }
        })
    }

    fn place_city(&mut self, ctx: &mut Context, mut root: Box<dyn SceneNode>) {
        root.set_local_transform(city_transform(&self.config));
        root.update_world_transform_all();
        root.write_to_buffers(&self.queue);

        match root.world_bounds() {
            Some(bounds) => {
                if ctx.frame_bounds(&bounds) {
                    log::info!(
                        "Framed the city: center {:?}, diagonal {}",
                        bounds.center(),
                        bounds.diagonal()
                    );
                }
            }
            None => log::warn!("The city has no geometry to frame"),
        }
        self.city = Some(root);
    }
}

fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue, options: TextureOptions) -> Texture {
    Texture::solid(device, queue, [255, 255, 255, 255], options, "placeholder")
}

fn single_mesh_node(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    name: &str,
    data: &geometry::MeshData,
    texture: Texture,
    params: MaterialParams,
    double_sided: bool,
) -> ModelNode {
    let material = Material::new(device, name, texture, params, layout);
    let model = Model {
        meshes: vec![Mesh::from_data(device, name, data, 0)],
        materials: vec![material],
    };
    ModelNode::new(device, name, model, double_sided)
}

impl GraphicsFlow<SceneState, SceneEvent> for DemoScene {
    fn on_init(&mut self, _ctx: &mut Context, state: &mut SceneState) -> Out<SceneEvent> {
        #[allow(unused_mut)]
        let mut futures = vec![
            self.load_texture(
                Asset::SphereTexture,
                &self.config.sphere.texture,
                sphere_texture_options(),
            ),
            self.load_texture(
                Asset::GroundTexture,
                &self.config.ground.texture,
                ground_texture_options(),
            ),
            self.load_windmill(),
            self.load_city(),
        ];
        state.expected = futures.len();

        if plays_audio(&self.config) {
            #[cfg(not(target_arch = "wasm32"))]
            {
                futures.push(self.load_audio());
                state.expected += 1;
            }

            // The audio element streams the file itself.
            #[cfg(target_arch = "wasm32")]
            match BackgroundAudio::from_url(&self.config.audio) {
                Ok(audio) => self.audio = Some(audio),
                Err(e) => log::error!("Failed to start {}: {e:#}", Asset::Audio),
            }
        } else {
            log::info!("Audio is disabled");
        }

        log::info!("Loading {} assets", state.expected);
        Out::FutEvent(futures)
    }

    fn on_update(&mut self, _ctx: &Context, _state: &mut SceneState, _dt: Duration) -> Out<SceneEvent> {
        Out::Empty
    }

    fn on_window_events(
        &mut self,
        _ctx: &Context,
        _state: &mut SceneState,
        _event: &winit::event::WindowEvent,
    ) -> Out<SceneEvent> {
        Out::Empty
    }

    fn on_custom_events(
        &mut self,
        ctx: &mut Context,
        state: &mut SceneState,
        event: SceneEvent,
    ) -> Option<SceneEvent> {
        match event {
            SceneEvent::TextureLoaded { asset, texture } => {
                let node = match asset {
                    Asset::SphereTexture => &mut self.sphere,
                    Asset::GroundTexture => &mut self.ground,
                    _ => return Some(SceneEvent::TextureLoaded { asset, texture }),
                };
                if let Some(material) = node.model_mut().materials.first_mut() {
                    material.set_diffuse(&self.device, texture);
                }
                state.record(asset, true);
            }
            #[cfg(not(target_arch = "wasm32"))]
            SceneEvent::AudioLoaded(bytes) => {
                match BackgroundAudio::from_bytes(bytes, &self.config.audio) {
                    Ok(audio) => {
                        self.audio = Some(audio);
                        state.record(Asset::Audio, true);
                    }
                    Err(e) => {
                        log::error!("Failed to play {}: {e:#}", Asset::Audio);
                        state.record(Asset::Audio, false);
                    }
                }
            }
            SceneEvent::WindmillLoaded(model) => {
                let mut node = ModelNode::new(&self.device, "windmill", model, false);
                node.set_local_transform(windmill_transform(&self.config));
                node.update_world_transform_all();
                node.write_to_buffers(&self.queue);
                self.windmill = Some(node);
                state.record(Asset::Windmill, true);
            }
            SceneEvent::CityLoaded(root) => {
                self.place_city(ctx, root);
                state.record(Asset::City, true);
            }
            SceneEvent::LoadFailed { asset, error } => {
                log::error!("Failed to load {asset}: {error:#}");
                state.record(asset, false);
            }
        }
        None
    }

    fn on_render(&self) -> Render<'_> {
        let mut nodes: Vec<&dyn SceneNode> = Vec::with_capacity(4);
        nodes.push(&self.sphere);
        nodes.push(&self.ground);
        if let Some(windmill) = &self.windmill {
            nodes.push(windmill);
        }
        if let Some(city) = self.city.as_deref() {
            nodes.push(city);
        }
        Render::Composed(nodes.into_iter().map(Render::from).collect())
    }
}

/// Opens the window and shows the scene described by `config`.
pub fn run(config: SceneConfig) -> anyhow::Result<()> {
    let scene_config = config.clone();
    let constructor: FlowConstructor<SceneState, SceneEvent> = Box::new(move |ctx| {
        Box::pin(async move {
            Box::new(DemoScene::new(ctx, scene_config))
                as Box<dyn GraphicsFlow<SceneState, SceneEvent>>
        })
    });
    flow::run(config, vec![constructor])
}

#[cfg(test)]
mod tests {
    use cgmath::{InnerSpace, Matrix4, Vector4};

    use super::*;

    #[test]
    fn only_the_checkerboard_is_srgb() {
        assert!(!sphere_texture_options().srgb);
        assert!(ground_texture_options().srgb);
        assert_eq!(ground_texture_options().mag_filter, wgpu::FilterMode::Nearest);
    }

    #[test]
    fn ground_faces_up() {
        let matrix: Matrix4<f32> = ground_transform().to_matrix();
        let normal = (matrix * Vector4::new(0.0, 0.0, 1.0, 0.0)).truncate();
        assert!((normal - Vector3::unit_y()).magnitude() < 1e-6);
    }

    #[test]
    fn city_is_scaled_around_its_position() {
        let config = SceneConfig::default();
        let city = city_transform(&config);
        assert_eq!(city.position, Vector3::new(20.0, 20.0, 20.0));
        assert_eq!(city.scale, Vector3::new(0.009, 0.009, 0.009));
    }

    #[test]
    fn windmill_sits_on_the_xy_position() {
        let config = SceneConfig::default();
        assert_eq!(
            windmill_transform(&config).position,
            Vector3::new(25.0, 20.0, 0.0)
        );
        assert_eq!(
            sphere_transform(&config).position,
            Vector3::new(20.0, 23.0, 30.0)
        );
    }

    #[test]
    fn state_settles_once_everything_reported() {
        let mut state = SceneState {
            expected: 3,
            ..Default::default()
        };
        assert!(!state.settled());
        state.record(Asset::City, true);
        state.record(Asset::Windmill, false);
        assert!(!state.settled());
        state.record(Asset::GroundTexture, true);
        assert!(state.settled());
        assert_eq!((state.loaded, state.failed), (2, 1));
    }

    #[test]
    fn muted_config_skips_audio() {
        let mut config = SceneConfig::default();
        assert!(plays_audio(&config));
        config.audio.enabled = false;
        assert!(!plays_audio(&config));
    }

    #[test]
    fn asset_names_read_well_in_logs() {
        assert_eq!(Asset::SphereTexture.to_string(), "sphere texture");
        assert_eq!(Asset::Audio.to_string(), "background audio");
    }
}
