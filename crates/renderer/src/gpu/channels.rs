use std::collections::HashMap;

use anyhow::anyhow;

use rendergraph::{FilterMode, PixelView, SamplerOptions, TextureFormat, TextureShape, WrapMode};

/// Format of buffer-pass surfaces.
pub(crate) const RENDER_TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Format of the offscreen visible surface and of 8-bit inputs.
pub(crate) const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub(crate) struct TextureRecord {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub shape: TextureShape,
    pub format: wgpu::TextureFormat,
    pub size: wgpu::Extent3d,
}

impl TextureRecord {
    pub(crate) fn new(
        device: &wgpu::Device,
        label: &str,
        shape: TextureShape,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        let (layers, view_dimension) = match shape {
            TextureShape::D2 => (1, wgpu::TextureViewDimension::D2),
            TextureShape::Cube => (6, wgpu::TextureViewDimension::Cube),
        };
        let (format, usage) = match format {
            TextureFormat::Rgb8 | TextureFormat::Rgba8 => (
                COLOR_FORMAT,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            ),
            TextureFormat::RenderTarget => (
                RENDER_TARGET_FORMAT,
                wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
            ),
        };
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: layers,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(view_dimension),
            ..Default::default()
        });
        Self {
            texture,
            view,
            shape,
            format,
            size,
        }
    }

    /// Write one layer of 8-bit pixel data, expanding RGB to RGBA.
    pub(crate) fn upload(&self, queue: &wgpu::Queue, layer: u32, pixels: PixelView<'_>) -> Result<(), String> {
        check_upload(self.format, self.size, layer, pixels)?;
        let rgba = expand_to_rgba(pixels)?;
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(pixels.width * 4),
                rows_per_image: Some(pixels.height),
            },
            wgpu::Extent3d {
                width: pixels.width,
                height: pixels.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}

fn check_upload(
    format: wgpu::TextureFormat,
    size: wgpu::Extent3d,
    layer: u32,
    pixels: PixelView<'_>,
) -> Result<(), String> {
    if format != COLOR_FORMAT {
        return Err(format!("cannot upload 8-bit pixels into a {format:?} texture"));
    }
    if pixels.width != size.width || pixels.height != size.height || layer >= size.depth_or_array_layers {
        return Err(format!(
            "upload of {}x{} layer {layer} into {}x{}x{} texture",
            pixels.width, pixels.height, size.width, size.height, size.depth_or_array_layers
        ));
    }
    Ok(())
}

pub(crate) fn expand_to_rgba(pixels: PixelView<'_>) -> Result<Vec<u8>, String> {
    let channels = pixels.channels as usize;
    let expected = pixels.width as usize * pixels.height as usize * channels;
    if pixels.bytes.len() != expected {
        return Err(format!(
            "pixel payload is {} bytes, expected {expected}",
            pixels.bytes.len()
        ));
    }
    match channels {
        4 => Ok(pixels.bytes.to_vec()),
        3 => Ok(pixels
            .bytes
            .chunks_exact(3)
            .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
            .collect()),
        other => Err(format!("{other}-channel pixel data is not supported")),
    }
}

/// Samplers keyed by filter and wrap; vflip only matters at decode time.
#[derive(Default)]
pub(crate) struct SamplerCache {
    samplers: HashMap<(FilterMode, WrapMode), wgpu::Sampler>,
}

impl SamplerCache {
    pub(crate) fn get(&mut self, device: &wgpu::Device, options: SamplerOptions) -> &wgpu::Sampler {
        self.samplers
            .entry((options.filter, options.wrap))
            .or_insert_with(|| {
                let address_mode = match options.wrap {
                    WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
                    WrapMode::Repeat => wgpu::AddressMode::Repeat,
                };
                let (filter, mipmap_filter) = match options.filter {
                    FilterMode::Nearest => (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest),
                    FilterMode::Linear => (wgpu::FilterMode::Linear, wgpu::FilterMode::Nearest),
                    FilterMode::Mipmap => (wgpu::FilterMode::Linear, wgpu::FilterMode::Linear),
                };
                device.create_sampler(&wgpu::SamplerDescriptor {
                    label: Some("channel sampler"),
                    address_mode_u: address_mode,
                    address_mode_v: address_mode,
                    address_mode_w: address_mode,
                    mag_filter: filter,
                    min_filter: filter,
                    mipmap_filter,
                    ..Default::default()
                })
            })
    }
}

/// Transparent stand-ins bound to channels whose unit holds nothing usable.
/// Transparent black, sampled by channels with nothing bound.
const PLACEHOLDER_TEXEL: PixelView<'static> = PixelView {
    width: 1,
    height: 1,
    channels: 4,
    bytes: &[0, 0, 0, 0],
};

pub(crate) struct Placeholders {
    pub d2: TextureRecord,
    pub cube: TextureRecord,
}

impl Placeholders {
    pub(crate) fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> anyhow::Result<Self> {
        let d2 = TextureRecord::new(device, "placeholder channel", TextureShape::D2, TextureFormat::Rgba8, 1, 1);
        let cube = TextureRecord::new(device, "placeholder cubemap", TextureShape::Cube, TextureFormat::Rgba8, 1, 1);
        d2.upload(queue, 0, PLACEHOLDER_TEXEL)
            .map_err(|err| anyhow!("failed to fill placeholder channel: {err}"))?;
        for face in 0..6 {
            cube.upload(queue, face, PLACEHOLDER_TEXEL)
                .map_err(|err| anyhow!("failed to fill placeholder cubemap face {face}: {err}"))?;
        }
        Ok(Self { d2, cube })
    }

    pub(crate) fn for_shape(&self, shape: TextureShape) -> &TextureRecord {
        match shape {
            TextureShape::D2 => &self.d2,
            TextureShape::Cube => &self.cube,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_is_expanded_with_opaque_alpha() {
        let bytes = [1, 2, 3, 4, 5, 6];
        let rgba = expand_to_rgba(PixelView {
            width: 2,
            height: 1,
            channels: 3,
            bytes: &bytes,
        })
        .unwrap();
        assert_eq!(rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn short_payloads_are_rejected() {
        let result = expand_to_rgba(PixelView {
            width: 2,
            height: 2,
            channels: 4,
            bytes: &[0; 8],
        });
        assert!(result.is_err());
    }

    fn extent(width: u32, height: u32, layers: u32) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: layers,
        }
    }

    #[test]
    fn placeholder_texel_fits_every_cube_face() {
        for face in 0..6 {
            check_upload(COLOR_FORMAT, extent(1, 1, 6), face, PLACEHOLDER_TEXEL).unwrap();
        }
        assert!(check_upload(COLOR_FORMAT, extent(1, 1, 6), 6, PLACEHOLDER_TEXEL).is_err());
        assert_eq!(expand_to_rgba(PLACEHOLDER_TEXEL).unwrap(), vec![0; 4]);
    }

    #[test]
    fn uploads_into_render_targets_or_wrong_sizes_are_rejected() {
        let err = check_upload(RENDER_TARGET_FORMAT, extent(1, 1, 1), 0, PLACEHOLDER_TEXEL).unwrap_err();
        assert!(err.contains("Rgba16Float"), "{err}");
        assert!(check_upload(COLOR_FORMAT, extent(2, 1, 1), 0, PLACEHOLDER_TEXEL).is_err());
    }
}
