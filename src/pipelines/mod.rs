//! Render pipelines.
//!
//! - `basic` builds the scene pipeline (textured, lit or unlit meshes)
//! - `light` holds the light uniform shared by all lit materials

pub mod basic;
pub mod light;

/// The scene pipeline in its two culling variants.
#[derive(Debug)]
pub struct Pipelines {
    pub culled: wgpu::RenderPipeline,
    pub double_sided: wgpu::RenderPipeline,
}

impl Pipelines {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        sample_count: u32,
        material_bind_group_layout: &wgpu::BindGroupLayout,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
        light_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let mk = |cull_mode| {
            basic::mk_scene_pipeline(
                device,
                color_format,
                sample_count,
                material_bind_group_layout,
                camera_bind_group_layout,
                light_bind_group_layout,
                cull_mode,
            )
        };
        Self {
            culled: mk(Some(wgpu::Face::Back)),
            double_sided: mk(None),
        }
    }
}
