//! GPU textures and texture creation utilities.
//!
//! This module provides [`Texture`], a wrapper around WGPU texture resources,
//! and helpers for creating the depth buffer, solid colour placeholders and
//! textures decoded from image files.

use anyhow::*;
use image::{GenericImageView, ImageFormat, load_from_memory_with_format};

/// A GPU texture with a view and sampler.
#[derive(Clone, Debug)]
pub struct Texture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

/// Sampling and colour space settings for an image texture.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureOptions {
    pub address_mode_u: wgpu::AddressMode,
    pub address_mode_v: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    /// Filter between mip levels. Image textures always get a full mip chain.
    pub mipmap_filter: wgpu::MipmapFilterMode,
    /// Colour data is stored in sRGB and decoded by the sampler.
    pub srgb: bool,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            srgb: true,
        }
    }
}

impl TextureOptions {
    /// Repeating texture sampled with hard texel edges, e.g. a checkerboard.
    pub fn repeat_nearest() -> Self {
        Self {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        }
    }

    /// Repeating texture with smooth filtering, the usual setup for model textures.
    pub fn repeat_linear() -> Self {
        Self {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            ..Default::default()
        }
    }

    /// Image data that is not colour managed, sampled as stored.
    pub fn linear() -> Self {
        Self {
            srgb: false,
            ..Default::default()
        }
    }

    /// Maps a glTF sampler; unspecified filters stay linear.
    pub fn from_gltf(sampler: &gltf::texture::Sampler) -> Self {
        use gltf::texture::{MagFilter, MinFilter, WrappingMode};

        let address = |mode: WrappingMode| match mode {
            WrappingMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            WrappingMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
            WrappingMode::Repeat => wgpu::AddressMode::Repeat,
        };
        let mag_filter = match sampler.mag_filter() {
            Some(MagFilter::Nearest) => wgpu::FilterMode::Nearest,
            _ => wgpu::FilterMode::Linear,
        };
        let min_filter = match sampler.min_filter() {
            Some(MinFilter::Nearest)
            | Some(MinFilter::NearestMipmapNearest)
            | Some(MinFilter::NearestMipmapLinear) => wgpu::FilterMode::Nearest,
            _ => wgpu::FilterMode::Linear,
        };
        let mipmap_filter = match sampler.min_filter() {
            Some(MinFilter::NearestMipmapNearest) | Some(MinFilter::LinearMipmapNearest) => {
                wgpu::MipmapFilterMode::Nearest
            }
            _ => wgpu::MipmapFilterMode::Linear,
        };

        Self {
            address_mode_u: address(sampler.wrap_s()),
            address_mode_v: address(sampler.wrap_t()),
            mag_filter,
            min_filter,
            mipmap_filter,
            srgb: true,
        }
    }

    fn sampler(&self, device: &wgpu::Device, label: Option<&str>) -> wgpu::Sampler {
        device.create_sampler(&wgpu::SamplerDescriptor {
            label,
            address_mode_u: self.address_mode_u,
            address_mode_v: self.address_mode_v,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: self.mag_filter,
            min_filter: self.min_filter,
            mipmap_filter: self.mipmap_filter,
            ..Default::default()
        })
    }

    fn format(&self) -> wgpu::TextureFormat {
        if self.srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        }
    }
}

impl Texture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// # Arguments
    ///
    /// * `size` is [width, height] of the texture in pixels
    /// * `sample_count` has to match the colour target it is used with
    /// * `label` is used as a debug label for the GPU resource
    pub fn create_depth_texture(
        device: &wgpu::Device,
        size: [u32; 2],
        sample_count: u32,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let desc = wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[Self::DEPTH_FORMAT],
        };
        let texture = device.create_texture(&desc);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 100.0,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// The multisampled colour target the scene is drawn into before it is
    /// resolved to the surface texture.
    pub fn create_multisampled_view(
        device: &wgpu::Device,
        size: [u32; 2],
        format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("multisampled_frame"),
            size: wgpu::Extent3d {
                width: size[0].max(1),
                height: size[1].max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// A 1x1 texture of one colour. Used for untextured materials and as a
    /// placeholder while an image is still loading.
    pub fn solid(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        rgba: [u8; 4],
        options: TextureOptions,
        label: &str,
    ) -> Self {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            1,
            1,
            image::Rgba(rgba),
        ));
        Self::upload(device, queue, &img, Some(label), options)
    }

    /// Load a texture from raw byte data (image file contents).
    ///
    /// # Arguments
    ///
    /// * `bytes` represent raw image file data (PNG, JPEG, etc.)
    /// * `label` is used as a debug name for the GPU resource
    /// * `format` is an optional file format hint. If None, the format is guessed from the data.
    pub fn from_bytes(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bytes: &[u8],
        label: &str,
        format: Option<ImageFormat>,
        options: TextureOptions,
    ) -> Result<Self> {
        let img = match format {
            None => image::load_from_memory(bytes),
            Some(fmt) => load_from_memory_with_format(bytes, fmt),
        }
        .with_context(|| format!("Could not decode image {label}"))?;
        Self::from_image(device, queue, &img, Some(label), options)
    }

    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &image::DynamicImage,
        label: Option<&str>,
        options: TextureOptions,
    ) -> Result<Self> {
        let (width, height) = img.dimensions();
        let limit = device.limits().max_texture_dimension_2d;
        ensure!(
            width > 0 && height > 0,
            "Image {} is empty",
            label.unwrap_or("<unnamed>")
        );
        if width > limit || height > limit {
            log::warn!(
                "Image {} is {width}x{height}, downscaling to fit {limit}",
                label.unwrap_or("<unnamed>")
            );
            let img = img.resize(limit, limit, image::imageops::FilterType::Triangle);
            return Ok(Self::upload(device, queue, &img, label, options));
        }
        Ok(Self::upload(device, queue, img, label, options))
    }

    fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &image::DynamicImage,
        label: Option<&str>,
        options: TextureOptions,
    ) -> Self {
        let (width, height) = img.dimensions();
        let mip_level_count = mip_count(width, height);

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: options.format(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        // Each level is filtered from the previous one on the CPU.
        let mut level = img.to_rgba8();
        for mip_level in 0..mip_level_count {
            let (w, h) = level.dimensions();
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &texture,
                    mip_level,
                    origin: wgpu::Origin3d::ZERO,
                },
                &level,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * w),
                    rows_per_image: Some(h),
                },
                wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: 1,
                },
            );
            if mip_level + 1 < mip_level_count {
                let (next_w, next_h) = mip_size(w, h);
                level = image::imageops::resize(
                    &level,
                    next_w,
                    next_h,
                    image::imageops::FilterType::Triangle,
                );
            }
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = options.sampler(device, label);

        Self {
            texture,
            view,
            sampler,
        }
    }
}

/// Number of levels in a full mip chain down to 1x1.
pub fn mip_count(width: u32, height: u32) -> u32 {
    let max_dim = width.max(height).max(1);
    32 - max_dim.leading_zeros()
}

fn mip_size(width: u32, height: u32) -> (u32, u32) {
    ((width / 2).max(1), (height / 2).max(1))
}

/// Guesses an image format from a mime type such as `image/png`.
pub fn format_from_mime(mime_type: &str) -> Option<ImageFormat> {
    ImageFormat::from_mime_type(mime_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_nearest_is_srgb_and_repeats() {
        let options = TextureOptions::repeat_nearest();
        assert_eq!(options.address_mode_u, wgpu::AddressMode::Repeat);
        assert_eq!(options.address_mode_v, wgpu::AddressMode::Repeat);
        assert_eq!(options.mag_filter, wgpu::FilterMode::Nearest);
        assert_eq!(options.format(), wgpu::TextureFormat::Rgba8UnormSrgb);
    }

    #[test]
    fn mip_chain_reaches_one_texel() {
        assert_eq!(mip_count(1, 1), 1);
        assert_eq!(mip_count(1024, 1024), 11);
        assert_eq!(mip_count(512, 128), 10);
        assert_eq!(mip_count(3, 1), 2);

        let mut size = (512, 128);
        for _ in 1..mip_count(512, 128) {
            size = mip_size(size.0, size.1);
        }
        assert_eq!(size, (1, 1));
    }

    #[test]
    fn linear_options_skip_srgb_decoding() {
        let options = TextureOptions::linear();
        assert!(!options.srgb);
        assert_eq!(options.format(), wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(options.mipmap_filter, wgpu::MipmapFilterMode::Linear);
    }

    #[test]
    fn mime_types() {
        assert_eq!(format_from_mime("image/png"), Some(ImageFormat::Png));
        assert_eq!(format_from_mime("image/jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(format_from_mime("text/plain"), None);
    }
}
