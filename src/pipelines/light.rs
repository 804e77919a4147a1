use cgmath::{InnerSpace, Vector3};
use wgpu::util::DeviceExt;

use crate::config::{DirectionalLightConfig, HemisphereLightConfig};

#[derive(Debug)]
pub struct LightResources {
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl LightResources {
    pub fn new(device: &wgpu::Device, uniform: LightUniform) -> Self {
        let buffer = mk_buffer(device, uniform);
        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = mk_bind_group(device, &bind_group_layout, &buffer);
        Self {
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }
}

/// Hemisphere light plus one directional light, colours in linear RGB.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    sky_color: [f32; 3],
    hemisphere_intensity: f32,
    ground_color: [f32; 3],
    // Due to uniforms requiring 16 byte (4 float) spacing, we need to use a padding field here
    _padding: u32,
    /// Unit vector pointing from the lit surface towards the light.
    sun_direction: [f32; 3],
    sun_intensity: f32,
    sun_color: [f32; 3],
    _padding2: u32,
}

impl LightUniform {
    pub fn new(hemisphere: &HemisphereLightConfig, directional: &DirectionalLightConfig) -> Self {
        let towards_light = Vector3::from(directional.position) - Vector3::from(directional.target);
        let sun_direction = if towards_light.magnitude2() > 0.0 {
            towards_light.normalize()
        } else {
            Vector3::unit_y()
        };
        Self {
            sky_color: hex_to_linear_rgb(hemisphere.sky_color),
            hemisphere_intensity: hemisphere.intensity,
            ground_color: hex_to_linear_rgb(hemisphere.ground_color),
            _padding: 0,
            sun_direction: sun_direction.into(),
            sun_intensity: directional.intensity,
            sun_color: hex_to_linear_rgb(directional.color),
            _padding2: 0,
        }
    }

    pub fn sun_direction(&self) -> Vector3<f32> {
        self.sun_direction.into()
    }
}

/// Decodes one sRGB channel in `[0, 1]` to linear.
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// `0xRRGGBB` in sRGB to linear RGB.
pub fn hex_to_linear_rgb(hex: u32) -> [f32; 3] {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xFF) as f32 / 255.0);
    [channel(16), channel(8), channel(0)]
}

pub fn mk_buffer(device: &wgpu::Device, light_uniform: LightUniform) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Light Buffer"),
        contents: bytemuck::cast_slice(&[light_uniform]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("light_bind_group_layout"),
    })
}

pub fn mk_bind_group(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    light_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: light_buffer.as_entire_binding(),
        }],
        label: Some("light_bind_group"),
    })
}
