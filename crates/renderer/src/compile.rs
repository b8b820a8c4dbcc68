use std::borrow::Cow;

use rendergraph::{SamplerType, CHANNEL_COUNT};
use wgpu::naga::ShaderStage;

/// Compiles the quad vertex shader shared by every pass program.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("toyshader quad vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    })
}

/// Wraps an assembled pass body with the Shadertoy prelude and compiles it as GLSL.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    label: &str,
    body: &str,
    channels: &[Option<SamplerType>; CHANNEL_COUNT],
) -> wgpu::ShaderModule {
    let wrapped = wrap_fragment(body, channels);
    tracing::trace!(pass = label, source = %wrapped, "wrapped fragment shader");
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(wrapped),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    })
}

pub(crate) fn compile_present_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("toyshader present"),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(PRESENT_SHADER_WGSL)),
    })
}

/// Produces a self-contained GLSL 450 fragment shader from an assembled body.
///
/// The body already carries its own `#line` directives. Channels declared as
/// cube maps get `textureCube` bindings; everything else, including unused
/// channels, is declared 2D so every program shares one bind group shape per
/// sampler-type table.
pub(crate) fn wrap_fragment(body: &str, channels: &[Option<SamplerType>; CHANNEL_COUNT]) -> String {
    let mut source = String::from(HEADER);
    for (index, channel) in channels.iter().enumerate() {
        let (texture, sampler) = match channel {
            Some(SamplerType::SamplerCube) => ("textureCube", "samplerCube"),
            _ => ("texture2D", "sampler2D"),
        };
        let binding = index * 2;
        source.push_str(&format!(
            "layout(set = 1, binding = {binding}) uniform {texture} toy_channel{index}_texture;\n\
             layout(set = 1, binding = {sampler_binding}) uniform sampler toy_channel{index}_sampler;\n\
             #define iChannel{index} {sampler}(toy_channel{index}_texture, toy_channel{index}_sampler)\n",
            sampler_binding = binding + 1,
        ));
    }
    source.push_str(body);
    source.push('\n');
    source.push_str(FOOTER);
    source
}

/// Uniform block shared by every pass program. The layout must match
/// [`crate::gpu::uniforms::UniformBlock`].
const HEADER: &str = r"#version 450
layout(location = 0) out vec4 toy_frag_color;

layout(std140, set = 0, binding = 0) uniform ToyUniforms {
    vec3 u_resolution;
    float u_time;
    vec4 u_mouse;
    vec4 u_date;
    vec2 u_pixel_scale;
    float u_time_delta;
    int u_frame;
    vec3 u_channel_resolution[4];
} toy;

#define iResolution toy.u_resolution
#define iTime toy.u_time
#define iGlobalTime toy.u_time
#define iTimeDelta toy.u_time_delta
#define iFrame toy.u_frame
#define iMouse toy.u_mouse
#define iDate toy.u_date
#define iPixelScale toy.u_pixel_scale
#define iChannelResolution toy.u_channel_resolution

";

const FOOTER: &str = r"void main() {
    toy_frag_color = vec4(0.0);
    mainImage(toy_frag_color, gl_FragCoord.xy / iPixelScale);
}
";

const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 toy_position;

void main() {
    gl_Position = vec4(toy_position, 0.0, 1.0);
}
";

/// Draws the offscreen visible surface into the swapchain. Offscreen row 0 is
/// the bottom of the image, so the lookup flips vertically.
const PRESENT_SHADER_WGSL: &str = r"
@group(0) @binding(0) var screen_texture: texture_2d<f32>;
@group(0) @binding(1) var screen_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let x = f32((index << 1u) & 2u);
    let y = f32(index & 2u);
    var out: VertexOutput;
    out.position = vec4<f32>(x * 2.0 - 1.0, 1.0 - y * 2.0, 0.0, 1.0);
    out.uv = vec2<f32>(x, 1.0 - y);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(screen_texture, screen_sampler, in.uv);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_declares_uniforms_and_channel_samplers() {
        let body = "\n#line 0 3\nvoid mainImage(out vec4 c, in vec2 p) { c = texture(iChannel2, p); }";
        let channels = [
            Some(SamplerType::Sampler2D),
            None,
            Some(SamplerType::SamplerCube),
            None,
        ];
        let wrapped = wrap_fragment(body, &channels);

        assert!(wrapped.starts_with("#version 450"));
        assert!(wrapped.contains("#define iGlobalTime toy.u_time"));
        assert!(wrapped.contains("uniform texture2D toy_channel0_texture"));
        assert!(wrapped.contains("uniform textureCube toy_channel2_texture"));
        assert!(wrapped.contains("#define iChannel2 samplerCube("));
        assert!(wrapped.contains("binding = 7) uniform sampler toy_channel3_sampler"));
        assert!(wrapped.contains("#line 0 3\nvoid mainImage"));
        assert!(wrapped.trim_end().ends_with('}'));
        assert!(wrapped.contains("mainImage(toy_frag_color, gl_FragCoord.xy / iPixelScale)"));
    }

    #[test]
    fn each_channel_declaration_ends_its_own_line() {
        let wrapped = wrap_fragment("void mainImage(out vec4 c, in vec2 p) {}", &[None; CHANNEL_COUNT]);
        for index in 0..CHANNEL_COUNT {
            let define = format!(
                "#define iChannel{index} sampler2D(toy_channel{index}_texture, toy_channel{index}_sampler)\n"
            );
            assert!(wrapped.contains(&define), "{define}");
        }
        assert!(wrapped.contains("toy_channel3_sampler)\nvoid mainImage"));
    }
}
