use std::io::{BufReader, Cursor};

use crate::{
    data_structures::{
        model::{self, MaterialParams, Shading},
        texture::{self, TextureOptions},
    },
    pipelines::light::srgb_to_linear,
    resources::{load_binary, load_string, resolve_location},
};

/// Bind group 0 of the scene pipeline: diffuse texture, its sampler and the
/// material uniform.
pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
        label: Some("Material bind_group_layout"),
    })
}

pub async fn load_texture(
    location: &str,
    options: TextureOptions,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
) -> anyhow::Result<texture::Texture> {
    let data = load_binary(location).await?;
    texture::Texture::from_bytes(device, queue, &data, location, None, options)
}

/// Loads the MTL at `mtl_location`, then the OBJ using those materials.
///
/// Whatever material library the OBJ names itself, the given MTL is used.
/// Materials whose texture cannot be loaded keep their colour on a white
/// texture.
pub async fn load_materials(
    mtl_location: &str,
    obj_location: &str,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
) -> anyhow::Result<(Vec<model::Material>, Vec<tobj::Model>)> {
    let mtl_text = load_string(mtl_location).await?;
    let obj_text = load_string(obj_location).await?;
    let mut obj_reader = BufReader::new(Cursor::new(obj_text));

    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| {
            let mtl_text = mtl_text.clone();
            async move { tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mtl_text))) }
        },
    )
    .await?;

    let obj_materials = match obj_materials {
        Ok(materials) => materials,
        Err(e) => {
            log::warn!("Materials of {mtl_location} could not be parsed: {e}");
            Vec::new()
        }
    };

    let mut materials = Vec::with_capacity(obj_materials.len());
    for m in obj_materials {
        let diffuse_texture = match &m.diffuse_texture {
            Some(map) => {
                let loaded = match resolve_location(mtl_location, map) {
                    Ok(location) => {
                        load_texture(&location, TextureOptions::repeat_linear(), device, queue)
                            .await
                    }
                    Err(e) => Err(e),
                };
                loaded.unwrap_or_else(|e| {
                    log::warn!("Texture {map} of material {} failed to load: {e:#}", m.name);
                    white(device, queue)
                })
            }
            None => white(device, queue),
        };

        materials.push(model::Material::new(
            device,
            &m.name,
            diffuse_texture,
            mtl_params(&m),
            layout,
        ));
    }
    Ok((materials, models))
}

/// Phong parameters of an MTL material; colours are converted from sRGB.
pub fn mtl_params(m: &tobj::Material) -> MaterialParams {
    let [r, g, b] = m.diffuse.unwrap_or([1.0, 1.0, 1.0]);
    MaterialParams {
        base_color: [
            srgb_to_linear(r),
            srgb_to_linear(g),
            srgb_to_linear(b),
            m.dissolve.unwrap_or(1.0),
        ],
        shading: Shading::Lit,
        shininess: m.shininess.unwrap_or(30.0),
        ..Default::default()
    }
}

fn white(device: &wgpu::Device, queue: &wgpu::Queue) -> texture::Texture {
    texture::Texture::solid(
        device,
        queue,
        [255, 255, 255, 255],
        TextureOptions::default(),
        "white",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const MTL: &str = "\
newmtl blades
Ns 96.078431
Kd 0.5 0.5 0.5
d 1.0
map_Kd textures/blades.jpg

newmtl plain
";

    #[test]
    fn mtl_colours_become_linear() {
        let (materials, _) = tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(MTL))).unwrap();
        let blades = &materials[0];
        assert_eq!(blades.diffuse_texture.as_deref(), Some("textures/blades.jpg"));
        let params = mtl_params(blades);
        assert!((params.base_color[0] - 0.214).abs() < 1e-3);
        assert_eq!(params.base_color[3], 1.0);
        assert!((params.shininess - 96.078431).abs() < 1e-4);
        assert_eq!(params.shading, Shading::Lit);
    }

    #[test]
    fn mtl_defaults_to_white() {
        let (materials, _) = tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(MTL))).unwrap();
        let params = mtl_params(&materials[1]);
        assert!(params.base_color.iter().all(|c| (c - 1.0).abs() < 1e-6));
    }
}
