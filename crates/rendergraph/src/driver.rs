//! Per-frame execution of a [`RenderGraph`].

use crate::backend::{
    check_gpu, Extent, GeometryId, GpuBackend, PixelView, ProgramDesc, RenderTarget, TextureDesc,
    TextureFormat, TextureShape,
};
use crate::channel::{ChannelKind, ChannelSource, SamplerOptions, CHANNEL_COUNT};
use crate::error::GraphError;
use crate::graph::RenderGraph;
use crate::keyboard::{KEYMAP_COLUMNS, KEYMAP_ROWS};
use crate::pass::PassHandle;
use crate::state::RenderGraphState;
use crate::surface::{SurfaceLifecycle, SurfaceStatus, SurfaceTable};
use crate::uniforms::{upload, UniformTable, UniformValue};

/// A read-back of the visible surface, rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub pixel_scale: [f32; 2],
}

/// Receives screenshots and recorded frames.
pub trait FrameSink {
    fn consume(&mut self, frame: CapturedFrame) -> Result<(), GraphError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// `iFrame` value the frame was drawn with.
    pub frame: i32,
    /// Index handed to the sink, if the frame was captured.
    pub captured: Option<u32>,
}

/// Drives a graph against a backend: one-time setup, then one call per frame.
pub struct FrameDriver<S: SurfaceLifecycle = SurfaceTable> {
    graph: RenderGraph,
    surfaces: S,
    geometry: Option<GeometryId>,
    screen_size: Extent,
    captured: u32,
}

impl FrameDriver<SurfaceTable> {
    pub fn with_surface_table(graph: RenderGraph, gpu: &dyn GpuBackend) -> Self {
        let surfaces = SurfaceTable::new(gpu.max_texture_units());
        FrameDriver::new(graph, surfaces)
    }
}

impl<S: SurfaceLifecycle> FrameDriver<S> {
    pub fn new(graph: RenderGraph, surfaces: S) -> Self {
        Self {
            graph,
            surfaces,
            geometry: None,
            screen_size: Extent::default(),
            captured: 0,
        }
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn surfaces(&self) -> &S {
        &self.surfaces
    }

    /// Frames handed to a sink so far.
    pub fn captured_frames(&self) -> u32 {
        self.captured
    }

    /// Compile programs, assign texture units, create channel textures and
    /// allocate buffer surfaces at `framebuffer` size.
    pub fn setup(&mut self, gpu: &mut dyn GpuBackend, framebuffer: Extent) -> Result<(), GraphError> {
        let geometry = gpu
            .create_geometry()
            .map_err(|err| err.into_graph("creating quad geometry"))?;
        self.geometry = Some(geometry);
        gpu.resize_screen(framebuffer);
        self.screen_size = framebuffer;

        for pass in self.graph.passes_mut() {
            let name = pass.name().to_string();
            let channels = std::array::from_fn(|index| pass.channels()[index].sampler_type());
            let program = gpu
                .compile_program(&ProgramDesc {
                    label: &name,
                    fragment_body: pass.source().as_str(),
                    channels,
                })
                .map_err(|err| GraphError::ShaderCompile {
                    pass: name.clone(),
                    stage: "fragment",
                    log: err.to_string(),
                })?;
            check_gpu(gpu, "after linking program")?;
            pass.program = Some(program);
            pass.uniforms = UniformTable::resolve(&*gpu, program, &name)?;
            gpu.use_program(program);

            for index in 0..CHANNEL_COUNT {
                let channel = &mut pass.channels[index];
                if channel.sampler_type().is_none() {
                    continue;
                }
                let unit = self.surfaces.allocate_unit()?;
                channel.unit = Some(unit);

                let desc = match &channel.source {
                    ChannelSource::Texture(data) => Some(TextureDesc {
                        label: &name,
                        shape: TextureShape::D2,
                        format: pixel_format(data.channels),
                        size: Extent::new(data.width, data.height),
                        sampler: channel.sampler,
                    }),
                    ChannelSource::Cubemap(faces) => Some(TextureDesc {
                        label: &name,
                        shape: TextureShape::Cube,
                        format: pixel_format(faces[0].channels),
                        size: Extent::new(faces[0].width, faces[0].height),
                        sampler: channel.sampler,
                    }),
                    ChannelSource::Keyboard => Some(TextureDesc {
                        label: &name,
                        shape: TextureShape::D2,
                        format: TextureFormat::Rgb8,
                        size: Extent::new(KEYMAP_COLUMNS as u32, KEYMAP_ROWS as u32),
                        sampler: SamplerOptions::nearest_clamp(),
                    }),
                    ChannelSource::Buffer(_) | ChannelSource::None => None,
                };
                if let Some(desc) = desc {
                    let texture = gpu
                        .create_texture(&desc)
                        .map_err(|err| err.into_graph(format!("creating channel {index} texture of '{name}'")))?;
                    channel.texture = Some(texture);
                }
                if channel.kind() == ChannelKind::Keyboard {
                    channel.resolution = [KEYMAP_COLUMNS as f32, KEYMAP_ROWS as f32, 1.0];
                }

                if let Some(location) = pass.uniforms.channel_location(index) {
                    upload(gpu, location, &UniformValue::int(unit.0 as i32));
                }
                tracing::debug!(pass = %name, channel = index, unit = unit.0, kind = ?channel.kind(), "assigned texture unit");
            }
            check_gpu(gpu, "after setting up channels")?;

            self.surfaces.register(pass.handle(), !pass.is_image());
            if !pass.is_image() {
                self.surfaces.allocate(gpu, pass.handle(), &name, framebuffer)?;
            }
            tracing::info!(pass = %name, uniforms = pass.uniforms.len(), "prepared pass");
        }
        Ok(())
    }

    /// Record a window resize. Buffer surfaces reallocate lazily on their next draw.
    pub fn notify_resize(&mut self, state: &mut RenderGraphState, window: Extent, framebuffer: Extent) {
        state.set_sizes(window, framebuffer);
        for pass in self.graph.passes() {
            if self.surfaces.status(pass.handle()) == SurfaceStatus::Ok {
                self.surfaces.mark_bad_size(pass.handle());
            }
        }
    }

    /// Release buffer surfaces and channel textures. Units stay allocated;
    /// drawing again needs a fresh driver.
    pub fn shutdown(&mut self, gpu: &mut dyn GpuBackend) {
        for pass in self.graph.passes_mut() {
            for channel in pass.channels.iter_mut() {
                if let Some(texture) = channel.texture.take() {
                    gpu.destroy_texture(texture);
                }
            }
            if self.surfaces.status(pass.handle()) != SurfaceStatus::None {
                self.surfaces.release(gpu, pass.handle());
            }
        }
        self.geometry = None;
        tracing::debug!(passes = self.graph.passes().len(), "released render graph resources");
    }

    /// Draw every pass once in schedule order, capture if requested, present,
    /// and advance the playback state.
    pub fn render_frame(
        &mut self,
        gpu: &mut dyn GpuBackend,
        state: &mut RenderGraphState,
        sink: Option<&mut dyn FrameSink>,
    ) -> Result<FrameReport, GraphError> {
        let geometry = self.geometry.ok_or_else(|| GraphError::Gpu {
            context: "rendering".to_string(),
            message: "frame driver has not been set up".to_string(),
        })?;
        let frame_start = state.clock_seconds();
        let framebuffer = state.framebuffer_size();
        if framebuffer != self.screen_size {
            gpu.resize_screen(framebuffer);
            self.screen_size = framebuffer;
        }
        state.refresh_date();

        let order = self.graph.order().to_vec();
        for handle in order {
            self.draw_pass(gpu, state, geometry, handle, framebuffer)?;
        }

        let frame = state.frame();
        let mut captured = None;
        if state.recording || state.single_shot {
            if let Some(sink) = sink {
                let index = self.captured;
                sink.consume(self.capture(gpu, state, index, framebuffer)?)?;
                self.captured += 1;
                captured = Some(index);
            }
        }

        gpu.present()
            .map_err(|err| err.into_graph("presenting frame"))?;
        state.keyboard_mut().end_frame();
        state.finish_frame(frame_start, state.clock_seconds());
        Ok(FrameReport { frame, captured })
    }

    fn draw_pass(
        &mut self,
        gpu: &mut dyn GpuBackend,
        state: &RenderGraphState,
        geometry: GeometryId,
        handle: PassHandle,
        framebuffer: Extent,
    ) -> Result<(), GraphError> {
        if self.surfaces.status(handle) == SurfaceStatus::BadSize {
            let name = self.pass_name(handle);
            self.surfaces.resize(gpu, handle, &name, framebuffer)?;
        }

        let pass = self
            .graph
            .pass_mut(handle)
            .ok_or_else(|| GraphError::Gpu {
                context: "rendering".to_string(),
                message: format!("unknown pass handle {}", handle.0),
            })?;
        let Some(program) = pass.program else {
            return Err(GraphError::Gpu {
                context: format!("rendering '{}'", pass.name()),
                message: "pass has no program".to_string(),
            });
        };
        gpu.use_program(program);

        let mut channel_resolution = [[0.0; 3]; CHANNEL_COUNT];
        for index in 0..CHANNEL_COUNT {
            let channel = &mut pass.channels[index];
            let Some(unit) = channel.unit else {
                continue;
            };
            if let Some(source) = channel.buffer_source() {
                if let Some(read) = self.surfaces.current_read(source) {
                    gpu.bind_texture(unit, read.texture, channel.sampler);
                    if let Some(location) = pass.uniforms.channel_location(index) {
                        upload(gpu, location, &UniformValue::int(unit.0 as i32));
                    }
                    channel.resolution = [read.size.width as f32, read.size.height as f32, 1.0];
                }
            } else if let Some(texture) = channel.texture {
                if channel.is_dirty() {
                    match &channel.source {
                        ChannelSource::Texture(data) => gpu.upload_texture(texture, 0, data.into()),
                        ChannelSource::Cubemap(faces) => {
                            for (face, data) in faces.iter().enumerate() {
                                gpu.upload_texture(texture, face as u32, PixelView::from(data));
                            }
                        }
                        ChannelSource::Keyboard => gpu.upload_texture(texture, 0, state.keyboard().view()),
                        ChannelSource::Buffer(_) | ChannelSource::None => {}
                    }
                    channel.dirty = false;
                }
                gpu.bind_texture(unit, texture, channel.sampler);
            }
            channel_resolution[index] = channel.resolution;
        }
        check_gpu(gpu, "after binding channels")?;

        pass.uniforms.push(gpu, &state.uniforms(channel_resolution));
        check_gpu(gpu, "after set uniforms")?;

        let target = match self.surfaces.current_write(handle) {
            Some(framebuffer) => RenderTarget::Framebuffer(framebuffer),
            None => RenderTarget::Screen,
        };
        if target == RenderTarget::Screen {
            gpu.clear(RenderTarget::Screen, [0.0; 4]);
        }
        gpu.draw(geometry, target, framebuffer);
        gpu.finish();
        check_gpu(gpu, "after render")?;

        self.surfaces.flip(handle);
        Ok(())
    }

    fn capture(
        &self,
        gpu: &mut dyn GpuBackend,
        state: &RenderGraphState,
        index: u32,
        size: Extent,
    ) -> Result<CapturedFrame, GraphError> {
        let row = size.width as usize * 3;
        if row % 4 != 0 {
            tracing::warn!(
                width = size.width,
                "screenshot rows are not 4-byte aligned; expect sheared output on some drivers"
            );
        }
        let bottom_up = gpu
            .read_screen_rgb(size)
            .map_err(|err| err.into_graph("reading back frame"))?;
        let mut rgb = Vec::with_capacity(bottom_up.len());
        for line in bottom_up.chunks_exact(row.max(1)).rev() {
            rgb.extend_from_slice(line);
        }
        Ok(CapturedFrame {
            index,
            width: size.width,
            height: size.height,
            rgb,
            pixel_scale: state.pixel_scale(),
        })
    }

    fn pass_name(&self, handle: PassHandle) -> String {
        self.graph
            .pass(handle)
            .map(|pass| pass.name().to_string())
            .unwrap_or_default()
    }
}

fn pixel_format(channels: u8) -> TextureFormat {
    if channels == 3 {
        TextureFormat::Rgb8
    } else {
        TextureFormat::Rgba8
    }
}
