//! Scene configuration.
//!
//! [`SceneConfig::default`] describes the demo scene exactly: camera, lights,
//! primitives, and the remote assets with their placement. On native builds
//! [`SceneConfig::from_env`] applies two overrides:
//!
//! - `VISTA_ASSET_ROOT` replaces the `https://threejs.org/` origin of every
//!   asset, e.g. with a local mirror directory for offline runs
//! - `VISTA_MUTE` (`1`, `true`, `yes`, `on`) disables the background sound

/// Origin all default assets are fetched from.
pub const THREEJS_ORIGIN: &str = "https://threejs.org/";

pub const ASSET_ROOT_ENV: &str = "VISTA_ASSET_ROOT";
pub const MUTE_ENV: &str = "VISTA_MUTE";

#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    /// Initial aspect ratio; replaced by the drawable's ratio on the first frame.
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub orbit_target: [f32; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct SphereConfig {
    pub radius: f32,
    pub width_segments: u32,
    pub height_segments: u32,
    pub position: [f32; 3],
    pub texture: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioConfig {
    pub url: String,
    pub volume: f32,
    pub looping: bool,
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HemisphereLightConfig {
    /// sRGB hex colour, e.g. `0xB1E1FF`
    pub sky_color: u32,
    pub ground_color: u32,
    pub intensity: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectionalLightConfig {
    pub color: u32,
    pub intensity: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroundConfig {
    pub size: f32,
    pub texture: String,
}

/// An OBJ model whose materials come from an explicitly named MTL file.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjModelConfig {
    pub mtl: String,
    pub obj: String,
    pub position: [f32; 3],
}

/// A glTF scene. Once loaded the camera is framed on its bounding box.
#[derive(Clone, Debug, PartialEq)]
pub struct GltfModelConfig {
    pub url: String,
    pub position: [f32; 3],
    pub scale: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneConfig {
    pub title: String,
    /// Id of the canvas element the web build renders into.
    pub canvas_id: String,
    /// Draw with 4x multisampling where the adapter supports it.
    pub antialias: bool,
    pub background: u32,
    pub camera: CameraConfig,
    pub sphere: SphereConfig,
    pub audio: AudioConfig,
    pub hemisphere_light: HemisphereLightConfig,
    pub directional_light: DirectionalLightConfig,
    pub ground: GroundConfig,
    pub windmill: ObjModelConfig,
    pub city: GltfModelConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        let asset = |path: &str| format!("{THREEJS_ORIGIN}{path}");
        Self {
            title: "vista".to_string(),
            canvas_id: "c".to_string(),
            antialias: true,
            background: 0x000000,
            camera: CameraConfig {
                fov_degrees: 45.0,
                aspect: 5.0,
                near: 0.5,
                far: 10.0,
                position: [1.0, 1.0, 1.0],
                orbit_target: [0.0, 5.0, 0.0],
            },
            sphere: SphereConfig {
                radius: 3.0,
                width_segments: 15,
                height_segments: 15,
                position: [20.0, 23.0, 30.0],
                texture: asset("examples/textures/planets/moon_1024.jpg"),
            },
            audio: AudioConfig {
                url: asset("examples/sounds/ping_pong.mp3"),
                volume: 0.5,
                looping: true,
                enabled: true,
            },
            hemisphere_light: HemisphereLightConfig {
                sky_color: 0xB1E1FF,
                ground_color: 0xB97A20,
                intensity: 3.0,
            },
            directional_light: DirectionalLightConfig {
                color: 0xFFFFFF,
                intensity: 3.0,
                position: [5.0, 10.0, 2.0],
                target: [0.0, 0.0, 0.0],
            },
            ground: GroundConfig {
                size: 3.0,
                texture: asset("manual/examples/resources/images/checker.png"),
            },
            windmill: ObjModelConfig {
                mtl: asset("manual/examples/resources/models/windmill/windmill.mtl"),
                obj: asset("manual/examples/resources/models/windmill/windmill.obj"),
                position: [25.0, 20.0, 0.0],
            },
            city: GltfModelConfig {
                url: asset(
                    "manual/examples/resources/models/cartoon_lowpoly_small_city_free_pack/scene.gltf",
                ),
                position: [20.0, 20.0, 20.0],
                scale: 0.009,
            },
        }
    }
}

impl SceneConfig {
    /// Default scene with the environment overrides applied.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var(ASSET_ROOT_ENV) {
            config = config.with_asset_root(&root);
        }
        if std::env::var(MUTE_ENV).is_ok_and(|value| is_truthy(&value)) {
            config.audio.enabled = false;
        }
        config
    }

    /// Rewrites every asset location that points at [`THREEJS_ORIGIN`] to `root`.
    ///
    /// `root` may be another origin or a local directory; a missing trailing
    /// slash is added.
    pub fn with_asset_root(mut self, root: &str) -> Self {
        let root = if root.ends_with('/') {
            root.to_string()
        } else {
            format!("{root}/")
        };
        for location in self.asset_locations_mut() {
            if let Some(path) = location.strip_prefix(THREEJS_ORIGIN) {
                *location = format!("{root}{path}");
            }
        }
        self
    }

    fn asset_locations_mut(&mut self) -> [&mut String; 6] {
        [
            &mut self.sphere.texture,
            &mut self.audio.url,
            &mut self.ground.texture,
            &mut self.windmill.mtl,
            &mut self.windmill.obj,
            &mut self.city.url,
        ]
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_the_demo_scene() {
        let config = SceneConfig::default();
        assert_eq!(config.canvas_id, "c");
        assert!(config.antialias);
        assert_eq!(config.camera.fov_degrees, 45.0);
        assert_eq!(config.camera.orbit_target, [0.0, 5.0, 0.0]);
        assert_eq!(config.sphere.width_segments, 15);
        assert_eq!(config.audio.volume, 0.5);
        assert!(config.audio.looping);
        assert_eq!(config.city.scale, 0.009);
        assert!(config.windmill.obj.ends_with("windmill/windmill.obj"));
    }

    #[test]
    fn asset_root_rewrites_every_remote_asset() {
        let config = SceneConfig::default().with_asset_root("/srv/mirror");
        assert_eq!(
            config.sphere.texture,
            "/srv/mirror/examples/textures/planets/moon_1024.jpg"
        );
        assert_eq!(
            config.windmill.mtl,
            "/srv/mirror/manual/examples/resources/models/windmill/windmill.mtl"
        );
        let mut config = config;
        assert!(
            config
                .asset_locations_mut()
                .iter()
                .all(|location| location.starts_with("/srv/mirror/"))
        );
    }

    #[test]
    fn asset_root_keeps_an_existing_trailing_slash() {
        let config = SceneConfig::default().with_asset_root("http://localhost:8080/");
        assert_eq!(
            config.audio.url,
            "http://localhost:8080/examples/sounds/ping_pong.mp3"
        );
    }

    #[test]
    fn truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy(" TRUE "));
        assert!(is_truthy("on"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
        assert!(!is_truthy("nope"));
    }
}
