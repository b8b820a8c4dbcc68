use rendergraph::{SamplerType, TextureShape, CHANNEL_COUNT};

use crate::compile::compile_fragment_shader;

use super::channels::{COLOR_FORMAT, RENDER_TARGET_FORMAT};
use super::uniforms::UniformBlock;

/// Quad corners in clip space, drawn as two triangles.
pub(crate) const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
pub(crate) const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

pub(crate) struct PipelineLayouts {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub vertex_module: wgpu::ShaderModule,
}

impl PipelineLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        Self {
            uniform_layout,
            vertex_module: crate::compile::compile_vertex_shader(device),
        }
    }
}

/// A compiled pass program: one pipeline per target format, its uniform
/// buffer, and the CPU copy of the block written before each draw.
pub(crate) struct ProgramPipeline {
    pub label: String,
    pub shapes: [TextureShape; CHANNEL_COUNT],
    pub channel_layout: wgpu::BindGroupLayout,
    pub offscreen: wgpu::RenderPipeline,
    pub screen: wgpu::RenderPipeline,
    pub uniform_buffer: wgpu::Buffer,
    pub uniform_bind_group: wgpu::BindGroup,
    pub block: UniformBlock,
    pub channel_units: [Option<u32>; CHANNEL_COUNT],
}

impl ProgramPipeline {
    pub fn new(
        device: &wgpu::Device,
        layouts: &PipelineLayouts,
        label: &str,
        body: &str,
        channels: &[Option<SamplerType>; CHANNEL_COUNT],
    ) -> Self {
        let fragment_module = compile_fragment_shader(device, label, body, channels);
        let shapes = channels.map(|channel| match channel {
            Some(SamplerType::SamplerCube) => TextureShape::Cube,
            _ => TextureShape::D2,
        });
        let channel_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("channel layout"),
            entries: &build_channel_layout_entries(&shapes),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pass pipeline layout"),
            bind_group_layouts: &[&layouts.uniform_layout, &channel_layout],
            push_constant_ranges: &[],
        });

        let build = |format: wgpu::TextureFormat| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &layouts.vertex_module,
                    entry_point: Some("main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                    }],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        };
        let offscreen = build(RENDER_TARGET_FORMAT);
        let screen = build(COLOR_FORMAT);

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pass uniforms"),
            size: std::mem::size_of::<UniformBlock>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pass uniform bind group"),
            layout: &layouts.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Self {
            label: label.to_string(),
            shapes,
            channel_layout,
            offscreen,
            screen,
            uniform_buffer,
            uniform_bind_group,
            block: UniformBlock::default(),
            channel_units: [None; CHANNEL_COUNT],
        }
    }

    pub fn pipeline_for(&self, format: wgpu::TextureFormat) -> &wgpu::RenderPipeline {
        if format == RENDER_TARGET_FORMAT {
            &self.offscreen
        } else {
            &self.screen
        }
    }
}

pub(crate) fn build_channel_layout_entries(
    shapes: &[TextureShape; CHANNEL_COUNT],
) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::with_capacity(CHANNEL_COUNT * 2);
    for (index, shape) in shapes.iter().enumerate() {
        let dimension = match shape {
            TextureShape::D2 => wgpu::TextureViewDimension::D2,
            TextureShape::Cube => wgpu::TextureViewDimension::Cube,
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (index as u32) * 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: dimension,
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: (index as u32) * 2 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    entries
}

/// Pipeline that copies the offscreen visible surface into the swapchain.
pub(crate) struct PresentPipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub layout: wgpu::BindGroupLayout,
    pub sampler: wgpu::Sampler,
}

impl PresentPipeline {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let module = crate::compile::compile_present_shader(device);
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("present layout"),
            entries: &build_channel_layout_entries(&[TextureShape::D2; CHANNEL_COUNT])[..2],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("present pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("present pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("present sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            pipeline,
            layout,
            sampler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_entries_follow_channel_shapes() {
        let shapes = [TextureShape::D2, TextureShape::Cube, TextureShape::D2, TextureShape::D2];
        let entries = build_channel_layout_entries(&shapes);
        assert_eq!(entries.len(), 8);
        assert_eq!(entries[2].binding, 2);
        match entries[2].ty {
            wgpu::BindingType::Texture { view_dimension, .. } => {
                assert_eq!(view_dimension, wgpu::TextureViewDimension::Cube)
            }
            _ => panic!("expected a texture binding"),
        }
        assert!(matches!(entries[3].ty, wgpu::BindingType::Sampler(_)));
    }

    #[test]
    fn quad_covers_clip_space() {
        assert_eq!(QUAD_INDICES.len(), 6);
        assert!(QUAD_VERTICES.iter().all(|[x, y]| x.abs() == 1.0 && y.abs() == 1.0));
    }
}
