//! Loading meshes, textures and sounds from external files.
//!
//! Locations are either `http(s)://` URLs, fetched with `reqwest`, or paths.
//! Native builds read paths from disk; the web build resolves them against the
//! page's origin. References inside a file (an MTL's textures, a glTF's buffers
//! and images) are resolved against the location of that file.

use std::collections::HashMap;

use anyhow::Context as _;

use crate::data_structures::{
    model::{self, MaterialParams},
    scene_graph::{ContainerNode, SceneNode, to_scene_node},
    texture::{Texture, TextureOptions, format_from_mime},
};

pub mod mesh;
pub mod texture;

pub use texture::{load_texture, material_layout};

pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Resolves `reference` relative to the file at `base`.
///
/// Absolute URLs are returned as they are. Backslashes, which some exporters
/// write into MTL files, are treated as path separators.
pub fn resolve_location(base: &str, reference: &str) -> anyhow::Result<String> {
    let reference = reference.trim().replace('\\', "/");
    if is_remote(&reference) {
        return Ok(reference);
    }
    if is_remote(base) {
        let base = reqwest::Url::parse(base).with_context(|| format!("Invalid URL {base}"))?;
        let joined = base
            .join(&reference)
            .with_context(|| format!("Cannot resolve {reference} against {base}"))?;
        return Ok(joined.to_string());
    }
    let parent = std::path::Path::new(base)
        .parent()
        .unwrap_or_else(|| std::path::Path::new(""));
    Ok(parent.join(reference).to_string_lossy().into_owned())
}

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().context("No window")?;
    let href = window
        .location()
        .href()
        .map_err(|e| anyhow::anyhow!("Cannot read the page location: {e:?}"))?;
    let base = reqwest::Url::parse(&href)?;
    Ok(base.join(file_name)?)
}

async fn fetch(url: &str) -> anyhow::Result<reqwest::Response> {
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("Request to {url} failed"))?
        .error_for_status()
        .with_context(|| format!("Request to {url} failed"))?;
    Ok(response)
}

pub async fn load_string(location: &str) -> anyhow::Result<String> {
    if is_remote(location) {
        return Ok(fetch(location).await?.text().await?);
    }

    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(location)?;
        fetch(url.as_str()).await?.text().await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = std::fs::read_to_string(location).with_context(|| format!("Cannot read {location}"))?;

    Ok(txt)
}

pub async fn load_binary(location: &str) -> anyhow::Result<Vec<u8>> {
    if is_remote(location) {
        return Ok(fetch(location).await?.bytes().await?.to_vec());
    }

    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(location)?;
        fetch(url.as_str()).await?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = std::fs::read(location).with_context(|| format!("Cannot read {location}"))?;

    Ok(data)
}

/// Loads an OBJ model whose materials come from the MTL at `mtl_location`.
pub async fn load_model_obj(
    mtl_location: &str,
    obj_location: &str,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
) -> anyhow::Result<model::Model> {
    let (mut materials, models) =
        texture::load_materials(mtl_location, obj_location, device, queue, layout).await?;

    let default_material = materials.len();
    materials.push(default_material_for(device, queue, layout));

    let meshes = mesh::load_meshes(&models, obj_location, device, default_material);
    log::info!(
        "Loaded {obj_location}: {} meshes, {} materials",
        meshes.len(),
        materials.len()
    );

    Ok(model::Model { meshes, materials })
}

fn default_material_for(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
) -> model::Material {
    let white = Texture::solid(
        device,
        queue,
        [255, 255, 255, 255],
        TextureOptions::default(),
        "default",
    );
    model::Material::new(device, "default", white, MaterialParams::default(), layout)
}

/// Loads the default scene of a glTF file into a scene graph.
///
/// The returned root is a container holding the scene's top level nodes, so
/// it can be placed and scaled without touching the file's own transforms.
pub async fn load_model_gltf(
    location: &str,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
) -> anyhow::Result<Box<dyn SceneNode>> {
    let gltf_bytes = load_binary(location).await?;
    let gltf = gltf::Gltf::from_slice(&gltf_bytes)
        .with_context(|| format!("Cannot parse glTF {location}"))?;

    // Load buffers
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .context("glTF references a binary chunk it does not have")?;
                buffer_data.push(blob.to_vec());
            }
            gltf::buffer::Source::Uri(uri) => {
                let bin = load_binary(&resolve_location(location, uri)?).await?;
                buffer_data.push(bin);
            }
        }
    }

    // Load materials, sharing decoded images between materials
    let mut textures: HashMap<(usize, Option<usize>), Texture> = HashMap::new();
    let mut materials = Vec::new();
    for material in gltf.materials() {
        let pbr = material.pbr_metallic_roughness();
        let name = material.name().unwrap_or("material");
        let diffuse_texture = match pbr.base_color_texture() {
            Some(info) => {
                let texture = info.texture();
                let key = (texture.source().index(), texture.sampler().index());
                match textures.get(&key) {
                    Some(cached) => cached.clone(),
                    None => {
                        let loaded =
                            load_gltf_image(location, &texture, &buffer_data, device, queue)
                                .await
                                .unwrap_or_else(|e| {
                                    log::warn!("Texture of material {name} failed to load: {e:#}");
                                    white_texture(device, queue)
                                });
                        textures.insert(key, loaded.clone());
                        loaded
                    }
                }
            }
            None => white_texture(device, queue),
        };

        let params = MaterialParams {
            base_color: pbr.base_color_factor(),
            ..Default::default()
        };
        materials.push(model::Material::new(
            device,
            name,
            diffuse_texture,
            params,
            layout,
        ));
    }
    materials.push(default_material_for(device, queue, layout));

    let scene = gltf
        .default_scene()
        .or_else(|| gltf.scenes().next())
        .context("glTF contains no scene")?;

    let mut root = ContainerNode::new();
    for node in scene.nodes() {
        root.add_child(to_scene_node(node, &buffer_data, device, &materials));
    }
    log::info!(
        "Loaded {location}: {} top level nodes, {} materials",
        root.children.len(),
        materials.len()
    );

    Ok(Box::new(root))
}

fn white_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> Texture {
    Texture::solid(
        device,
        queue,
        [255, 255, 255, 255],
        TextureOptions::default(),
        "white",
    )
}

async fn load_gltf_image(
    location: &str,
    texture: &gltf::Texture<'_>,
    buffers: &[Vec<u8>],
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> anyhow::Result<Texture> {
    let options = TextureOptions::from_gltf(&texture.sampler());
    match texture.source().source() {
        gltf::image::Source::View { view, mime_type } => {
            let buffer = buffers
                .get(view.buffer().index())
                .context("Image references a missing buffer")?;
            let bytes = buffer
                .get(view.offset()..view.offset() + view.length())
                .context("Image view exceeds its buffer")?;
            Texture::from_bytes(
                device,
                queue,
                bytes,
                location,
                format_from_mime(mime_type),
                options,
            )
        }
        gltf::image::Source::Uri { uri, mime_type } => {
            let image_location = resolve_location(location, uri)?;
            let bytes = load_binary(&image_location).await?;
            Texture::from_bytes(
                device,
                queue,
                &bytes,
                &image_location,
                mime_type.and_then(format_from_mime),
                options,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_locations() {
        assert!(is_remote("https://threejs.org/x.png"));
        assert!(is_remote("http://localhost:8000/x.png"));
        assert!(!is_remote("/srv/mirror/x.png"));
        assert!(!is_remote("assets/x.png"));
    }

    #[test]
    fn resolves_against_a_remote_file() {
        let base = "https://threejs.org/manual/examples/resources/models/windmill/windmill.mtl";
        assert_eq!(
            resolve_location(base, "windmill_001_base_COL.jpg").unwrap(),
            "https://threejs.org/manual/examples/resources/models/windmill/windmill_001_base_COL.jpg"
        );
        assert_eq!(
            resolve_location(base, "textures\\lights.jpg").unwrap(),
            "https://threejs.org/manual/examples/resources/models/windmill/textures/lights.jpg"
        );
        assert_eq!(
            resolve_location(base, "../scene.bin").unwrap(),
            "https://threejs.org/manual/examples/resources/models/scene.bin"
        );
    }

    #[test]
    fn absolute_references_win() {
        assert_eq!(
            resolve_location("/srv/scene.gltf", "https://example.com/a.bin").unwrap(),
            "https://example.com/a.bin"
        );
    }

    #[test]
    fn resolves_against_a_local_file() {
        let expected = std::path::Path::new("mirror/models/city")
            .join("scene.bin")
            .to_string_lossy()
            .into_owned();
        assert_eq!(
            resolve_location("mirror/models/city/scene.gltf", "scene.bin").unwrap(),
            expected
        );
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn missing_local_files_are_errors() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let result = runtime.block_on(load_binary("this/file/does/not/exist.bin"));
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("this/file/does/not/exist.bin"));
    }
}
