use std::collections::HashMap;
use std::sync::mpsc;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rendergraph::{
    Extent, FramebufferId, FramebufferStatus, GeometryId, GpuBackend, GpuError, PixelView,
    ProgramDesc, ProgramId, RenderTarget, SamplerOptions, TextureDesc, TextureId,
    TextureShape, TextureUnit, UniformLocation, CHANNEL_COUNT,
};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

use super::channels::{Placeholders, SamplerCache, TextureRecord, COLOR_FORMAT};
use super::context::GpuContext;
use super::pipeline::{PipelineLayouts, PresentPipeline, ProgramPipeline, QUAD_INDICES, QUAD_VERTICES};
use super::uniforms::{field_at, location_of, Field};

/// Size of the texture-unit table. Units are slots the driver binds
/// textures to; each draw resolves its four channels through them. Every
/// buffer resize takes two more, so the table is sized like a desktop GL
/// `GL_MAX_COMBINED_TEXTURE_IMAGE_UNITS`.
const TEXTURE_UNITS: u32 = 192;
const COPY_ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

struct Geometry {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
}

/// [`GpuBackend`] on top of wgpu, presenting into a window surface.
pub struct WgpuBackend {
    context: GpuContext,
    layouts: PipelineLayouts,
    present: PresentPipeline,
    samplers: SamplerCache,
    placeholders: Placeholders,

    next_id: u32,
    programs: HashMap<u32, ProgramPipeline>,
    current: Option<u32>,
    textures: HashMap<u32, TextureRecord>,
    framebuffers: HashMap<u32, TextureId>,
    geometry: HashMap<u32, Geometry>,
    units: HashMap<u32, (TextureId, SamplerOptions)>,
    screen: TextureRecord,
    pending: Vec<String>,
}

impl WgpuBackend {
    /// Create a backend presenting into `target`, which must outlive it.
    pub fn new<T>(target: &T, size: PhysicalSize<u32>) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, size)?;
        let layouts = PipelineLayouts::new(&context.device);
        let present = PresentPipeline::new(&context.device, context.surface_format());
        let placeholders = Placeholders::new(&context.device, &context.queue)?;
        let screen = create_screen(&context.device, context.size.width, context.size.height);
        Ok(Self {
            context,
            layouts,
            present,
            samplers: SamplerCache::default(),
            placeholders,
            next_id: 1,
            programs: HashMap::new(),
            current: None,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            geometry: HashMap::new(),
            units: HashMap::new(),
            screen,
            pending: Vec::new(),
        })
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, message: impl Into<String>) {
        self.pending.push(message.into());
    }

    fn current_program(&mut self) -> Option<&mut ProgramPipeline> {
        let id = self.current?;
        self.programs.get_mut(&id)
    }

    /// Texture view and format a draw or clear writes into.
    fn target_view(&self, target: RenderTarget) -> Option<(&wgpu::TextureView, wgpu::TextureFormat, wgpu::Extent3d)> {
        let record = match target {
            RenderTarget::Screen => &self.screen,
            RenderTarget::Framebuffer(fb) => {
                let texture = self.framebuffers.get(&fb.0)?;
                self.textures.get(&texture.0)?
            }
        };
        Some((&record.view, record.format, record.size))
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.context.queue.submit(std::iter::once(encoder.finish()));
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }
}

fn create_screen(device: &wgpu::Device, width: u32, height: u32) -> TextureRecord {
    let size = wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("visible surface"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    TextureRecord {
        texture,
        view,
        shape: TextureShape::D2,
        format: COLOR_FORMAT,
        size,
    }
}

fn padded_row(width: u32) -> u32 {
    let unpadded = width * 4;
    unpadded.div_ceil(COPY_ROW_ALIGNMENT) * COPY_ROW_ALIGNMENT
}

impl GpuBackend for WgpuBackend {
    fn max_texture_units(&self) -> u32 {
        TEXTURE_UNITS
    }

    fn compile_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, GpuError> {
        let (program, error) = self.context.scoped(|device| {
            ProgramPipeline::new(device, &self.layouts, desc.label, desc.fragment_body, &desc.channels)
        });
        if let Some(log) = error {
            return Err(GpuError::Compile {
                stage: "fragment",
                log,
            });
        }
        let id = self.next();
        tracing::debug!(pass = desc.label, program = id, "compiled program");
        self.programs.insert(id, program);
        Ok(ProgramId(id))
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs.get(&program.0)?;
        location_of(name)
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.contains_key(&program.0) {
            self.current = Some(program.0);
        } else {
            self.record(format!("use of unknown program {}", program.0));
        }
    }

    fn set_uniform_f32(&mut self, location: UniformLocation, _components: u8, values: &[f32]) {
        let Some(field) = field_at(location) else {
            self.record(format!("invalid uniform location {}", location.0));
            return;
        };
        let accepted = match self.current_program() {
            Some(program) => program.block.set_f32(field, values),
            None => {
                self.record("uniform set with no program in use");
                return;
            }
        };
        if !accepted {
            self.record(format!("float value for non-float uniform {field:?}"));
        }
    }

    fn set_uniform_i32(&mut self, location: UniformLocation, _components: u8, values: &[i32]) {
        let Some(field) = field_at(location) else {
            self.record(format!("invalid uniform location {}", location.0));
            return;
        };
        let Some(value) = values.first().copied() else {
            return;
        };
        let Some(program) = self.current_program() else {
            self.record("uniform set with no program in use");
            return;
        };
        match field {
            Field::Frame => program.block.set_frame(value),
            Field::Channel(index) => program.channel_units[index] = u32::try_from(value).ok(),
            other => {
                let message = format!("integer value for non-integer uniform {other:?}");
                self.record(message);
            }
        }
    }

    fn create_geometry(&mut self) -> Result<GeometryId, GpuError> {
        let device = &self.context.device;
        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });
        let id = self.next();
        self.geometry.insert(id, Geometry { vertices, indices });
        Ok(GeometryId(id))
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, GpuError> {
        let (record, error) = self.context.scoped(|device| {
            TextureRecord::new(
                device,
                desc.label,
                desc.shape,
                desc.format,
                desc.size.width,
                desc.size.height,
            )
        });
        if let Some(message) = error {
            return Err(GpuError::Device(message));
        }
        let id = self.next();
        self.textures.insert(id, record);
        Ok(TextureId(id))
    }

    fn upload_texture(&mut self, texture: TextureId, layer: u32, pixels: PixelView<'_>) {
        let result = match self.textures.get(&texture.0) {
            Some(record) => record.upload(&self.context.queue, layer, pixels),
            None => Err(format!("upload to unknown texture {}", texture.0)),
        };
        if let Err(message) = result {
            self.record(message);
        }
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        match self.textures.remove(&texture.0) {
            Some(record) => record.texture.destroy(),
            None => self.record(format!("destroy of unknown texture {}", texture.0)),
        }
        self.units.retain(|_, (bound, _)| *bound != texture);
    }

    fn create_framebuffer(&mut self, color: TextureId) -> Result<FramebufferId, GpuError> {
        if !self.textures.contains_key(&color.0) {
            return Err(GpuError::InvalidHandle {
                kind: "texture",
                id: color.0,
            });
        }
        let id = self.next();
        self.framebuffers.insert(id, color);
        Ok(FramebufferId(id))
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let Some(texture) = self.framebuffers.get(&framebuffer.0) else {
            return FramebufferStatus::Incomplete("unknown framebuffer".to_string());
        };
        match self.textures.get(&texture.0) {
            None => FramebufferStatus::Incomplete("missing colour attachment".to_string()),
            Some(record) if record.shape != TextureShape::D2 => {
                FramebufferStatus::Incomplete("cube colour attachment".to_string())
            }
            Some(record)
                if !record
                    .texture
                    .usage()
                    .contains(wgpu::TextureUsages::RENDER_ATTACHMENT) =>
            {
                FramebufferStatus::Incomplete("attachment is not renderable".to_string())
            }
            Some(_) => FramebufferStatus::Complete,
        }
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(&framebuffer.0).is_none() {
            self.record(format!("destroy of unknown framebuffer {}", framebuffer.0));
        }
    }

    fn clear(&mut self, target: RenderTarget, color: [f32; 4]) {
        let Some((view, _, _)) = self.target_view(target) else {
            self.record("clear of unknown framebuffer");
            return;
        };
        let mut encoder = self.encoder("clear");
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: color[0] as f64,
                            g: color[1] as f64,
                            b: color[2] as f64,
                            a: color[3] as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.submit(encoder);
    }

    fn blit(&mut self, src: FramebufferId, dst: FramebufferId, size: Extent) {
        let records = self
            .framebuffers
            .get(&src.0)
            .zip(self.framebuffers.get(&dst.0))
            .and_then(|(src, dst)| self.textures.get(&src.0).zip(self.textures.get(&dst.0)));
        let Some((source, dest)) = records else {
            self.record("blit between unknown framebuffers");
            return;
        };
        let width = size.width.min(source.size.width).min(dest.size.width);
        let height = size.height.min(source.size.height).min(dest.size.height);
        if width == 0 || height == 0 {
            return;
        }
        let mut encoder = self.encoder("resize blit");
        encoder.copy_texture_to_texture(
            source.texture.as_image_copy(),
            dest.texture.as_image_copy(),
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.submit(encoder);
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureId, sampler: SamplerOptions) {
        if unit.0 >= TEXTURE_UNITS {
            self.record(format!("texture unit {} out of range", unit.0));
            return;
        }
        self.units.insert(unit.0, (texture, sampler));
    }

    fn draw(&mut self, geometry: GeometryId, target: RenderTarget, viewport: Extent) {
        let Some(program_id) = self.current else {
            self.record("draw with no program in use");
            return;
        };
        if !self.programs.contains_key(&program_id) || !self.geometry.contains_key(&geometry.0) {
            self.record("draw with unknown program or geometry");
            return;
        }

        // resolve each channel through its unit, falling back to a placeholder
        let mut resolved = [(None, SamplerOptions::default()); CHANNEL_COUNT];
        if let Some(program) = self.programs.get(&program_id) {
            for (index, slot) in resolved.iter_mut().enumerate() {
                let shape = program.shapes[index];
                let bound = program.channel_units[index]
                    .and_then(|unit| self.units.get(&unit))
                    .filter(|(texture, _)| {
                        self.textures
                            .get(&texture.0)
                            .is_some_and(|record| record.shape == shape)
                    });
                if let Some((texture, options)) = bound {
                    *slot = (Some(texture.0), *options);
                }
            }
        }
        let samplers: Vec<wgpu::Sampler> = resolved
            .iter()
            .map(|(_, options)| self.samplers.get(&self.context.device, *options).clone())
            .collect();

        let Some((view, format, target_size)) = self.target_view(target) else {
            self.record("draw into unknown framebuffer");
            return;
        };
        let (Some(program), Some(quad)) = (self.programs.get(&program_id), self.geometry.get(&geometry.0)) else {
            return;
        };
        let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
        for (index, ((texture, _), sampler)) in resolved.iter().zip(&samplers).enumerate() {
            let record = texture
                .and_then(|id| self.textures.get(&id))
                .unwrap_or_else(|| self.placeholders.for_shape(program.shapes[index]));
            entries.push(wgpu::BindGroupEntry {
                binding: index as u32 * 2,
                resource: wgpu::BindingResource::TextureView(&record.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: index as u32 * 2 + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let channel_group = self.context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("channel bind group"),
            layout: &program.channel_layout,
            entries: &entries,
        });

        self.context
            .queue
            .write_buffer(&program.uniform_buffer, 0, bytemuck::bytes_of(&program.block));

        let width = viewport.width.min(target_size.width);
        let height = viewport.height.min(target_size.height);
        let mut encoder = self.encoder(&program.label);
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&program.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if width > 0 && height > 0 {
                pass.set_viewport(0.0, 0.0, width as f32, height as f32, 0.0, 1.0);
                pass.set_pipeline(program.pipeline_for(format));
                pass.set_bind_group(0, &program.uniform_bind_group, &[]);
                pass.set_bind_group(1, &channel_group, &[]);
                pass.set_vertex_buffer(0, quad.vertices.slice(..));
                pass.set_index_buffer(quad.indices.slice(..), wgpu::IndexFormat::Uint16);
                pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
            }
        }
        self.submit(encoder);
    }

    fn finish(&mut self) {
        if let Err(message) = self.context.wait_idle() {
            self.record(message);
        }
    }

    fn take_error(&mut self) -> Option<String> {
        if let Ok(mut log) = self.context.errors.lock() {
            self.pending.append(&mut log);
        }
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending).join("; "))
        }
    }

    fn resize_screen(&mut self, size: Extent) {
        if size.is_empty() {
            return;
        }
        self.context.resize(PhysicalSize::new(size.width, size.height));
        if self.screen.size.width != size.width || self.screen.size.height != size.height {
            self.screen.texture.destroy();
            self.screen = create_screen(&self.context.device, size.width, size.height);
        }
    }

    fn read_screen_rgb(&mut self, size: Extent) -> Result<Vec<u8>, GpuError> {
        let width = size.width.min(self.screen.size.width);
        let height = size.height.min(self.screen.size.height);
        let padded = padded_row(width);
        let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("screen read-back"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.encoder("screen read-back");
        encoder.copy_texture_to_buffer(
            self.screen.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.submit(encoder);

        let slice = buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.context.wait_idle().map_err(GpuError::Device)?;
        rx.recv()
            .map_err(|err| GpuError::Device(err.to_string()))?
            .map_err(|err| GpuError::Device(err.to_string()))?;

        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded as usize) {
                for texel in row[..width as usize * 4].chunks_exact(4) {
                    rgb.extend_from_slice(&texel[..3]);
                }
            }
        }
        buffer.unmap();
        Ok(rgb)
    }

    fn present(&mut self) -> Result<(), GpuError> {
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost or outdated; reconfiguring");
                self.context.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(GpuError::Device("surface out of memory".to_string()));
            }
            Err(other) => {
                tracing::warn!(error = %other, "skipping present");
                return Ok(());
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("present bind group"),
            layout: &self.present.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.screen.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.present.sampler),
                },
            ],
        });
        let mut encoder = self.encoder("present");
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("present"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.present.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.submit(encoder);
        frame.present();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_row(1), 256);
        assert_eq!(padded_row(64), 256);
        assert_eq!(padded_row(65), 512);
        assert_eq!(padded_row(640), 2560);
    }
}
