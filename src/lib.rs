//! vista
//!
//! A small, hardcoded 3D scene that runs natively and on the web (WASM). It
//! shows a textured ground plane and moon, a windmill loaded from OBJ/MTL, a
//! low-poly city loaded from glTF that the camera frames once it arrives, and a
//! looping background sound. The camera orbits around a target with the mouse.
//!
//! High-level modules
//! - `audio`: background sound loop (rodio natively, an audio element on the web)
//! - `camera`: camera, projection, uniforms and the orbit controller
//! - `config`: every constant of the scene, overridable from the environment
//! - `context`: central GPU and window context that owns device/queue/pipelines
//! - `data_structures`: engine data models (geometry, meshes, instances, textures, scene graph)
//! - `flow`: the winit event loop and the `GraphicsFlow` lifecycle
//! - `framing`: bounding volumes and fitting the camera to them
//! - `pipelines`: render pipelines and the light uniform
//! - `resources`: fetching textures/models over HTTP or from disk
//! - `render`: batching renderable objects into pipelines
//! - `scene`: the demo scene itself
//!

pub mod audio;
pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod framing;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod scene;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use winit::event::WindowEvent;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Browser entry point: runs the scene on the canvas named in the default config.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    scene::run(config::SceneConfig::default()).map_err(|e| JsValue::from_str(&format!("{e:#}")))
}
