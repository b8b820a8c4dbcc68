//! CPU implementation of [`GpuBackend`].
//!
//! Fragment stages are Rust closures registered under the pass label they
//! stand in for. Textures hold `f32` RGBA texels with row 0 at the bottom,
//! the same convention the GL-style driver assumes everywhere else.

use std::collections::HashMap;

use crate::backend::{
    Extent, FramebufferId, FramebufferStatus, GeometryId, GpuBackend, PixelView, ProgramDesc,
    ProgramId, RenderTarget, SamplerType, TextureDesc, TextureFormat, TextureId, TextureShape,
    TextureUnit, UniformLocation,
};
use crate::channel::{FilterMode, SamplerOptions, WrapMode, CHANNEL_COUNT};
use crate::error::GpuError;

/// Fragment stage: returns the colour for one pixel.
pub type FragmentFn = Box<dyn Fn(&FragmentInput<'_>) -> [f32; 4]>;

const UNIFORM_NAMES: [&str; 12] = [
    "iTime",
    "iTimeDelta",
    "iFrame",
    "iResolution",
    "iMouse",
    "iDate",
    "iPixelScale",
    "iChannelResolution",
    "iChannel0",
    "iChannel1",
    "iChannel2",
    "iChannel3",
];
const CHANNEL_UNIFORM_BASE: usize = 8;

fn uniform_index(name: &str) -> Option<usize> {
    UNIFORM_NAMES.iter().position(|candidate| *candidate == name)
}

#[derive(Debug, Clone)]
enum Stored {
    Float(Vec<f32>),
    Int(Vec<i32>),
}

struct Program {
    label: String,
    channels: [Option<SamplerType>; CHANNEL_COUNT],
    values: Vec<Option<Stored>>,
}

impl Program {
    fn float(&self, index: usize, component: usize) -> f32 {
        match self.values.get(index).and_then(Option::as_ref) {
            Some(Stored::Float(values)) => values.get(component).copied().unwrap_or(0.0),
            Some(Stored::Int(values)) => values.get(component).copied().unwrap_or(0) as f32,
            None => 0.0,
        }
    }

    fn int(&self, index: usize) -> Option<i32> {
        match self.values.get(index).and_then(Option::as_ref) {
            Some(Stored::Int(values)) => values.first().copied(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Texture {
    size: Extent,
    layers: u32,
    format: TextureFormat,
    texels: Vec<[f32; 4]>,
}

impl Texture {
    fn new(size: Extent, layers: u32, format: TextureFormat) -> Self {
        let count = size.width as usize * size.height as usize * layers as usize;
        Self {
            size,
            layers,
            format,
            texels: vec![[0.0; 4]; count],
        }
    }

    fn index(&self, layer: u32, x: u32, y: u32) -> usize {
        let (w, h) = (self.size.width as usize, self.size.height as usize);
        layer as usize * w * h + y as usize * w + x as usize
    }

    fn get(&self, layer: u32, x: i64, y: i64) -> [f32; 4] {
        if x < 0 || y < 0 || x >= self.size.width as i64 || y >= self.size.height as i64 {
            return [0.0; 4];
        }
        self.texels[self.index(layer, x as u32, y as u32)]
    }

    fn put(&mut self, x: u32, y: u32, mut value: [f32; 4]) {
        if self.format != TextureFormat::RenderTarget {
            for component in &mut value {
                *component = component.clamp(0.0, 1.0);
            }
        }
        let index = self.index(0, x, y);
        self.texels[index] = value;
    }

    fn sample(&self, layer: u32, sampler: SamplerOptions, uv: [f32; 2]) -> [f32; 4] {
        if self.size.is_empty() {
            return [0.0; 4];
        }
        let (w, h) = (self.size.width as i64, self.size.height as i64);
        let wrap = |i: i64, n: i64| match sampler.wrap {
            WrapMode::Clamp => i.clamp(0, n - 1),
            WrapMode::Repeat => i.rem_euclid(n),
        };
        match sampler.filter {
            FilterMode::Nearest => {
                let x = (uv[0] * w as f32).floor() as i64;
                let y = (uv[1] * h as f32).floor() as i64;
                self.get(layer, wrap(x, w), wrap(y, h))
            }
            FilterMode::Linear | FilterMode::Mipmap => {
                let fx = uv[0] * w as f32 - 0.5;
                let fy = uv[1] * h as f32 - 0.5;
                let (x0, y0) = (fx.floor(), fy.floor());
                let (tx, ty) = (fx - x0, fy - y0);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let fetch = |x: i64, y: i64| self.get(layer, wrap(x, w), wrap(y, h));
                let (a, b) = (fetch(x0, y0), fetch(x0 + 1, y0));
                let (c, d) = (fetch(x0, y0 + 1), fetch(x0 + 1, y0 + 1));
                std::array::from_fn(|i| {
                    let bottom = a[i] + (b[i] - a[i]) * tx;
                    let top = c[i] + (d[i] - c[i]) * tx;
                    bottom + (top - bottom) * ty
                })
            }
        }
    }
}

#[derive(Clone, Copy)]
struct Bound<'a> {
    texture: &'a Texture,
    sampler: SamplerOptions,
}

/// What a fragment closure can see: its coordinate, the uniforms its program
/// was given, and its bound channels.
pub struct FragmentInput<'a> {
    pub frag_coord: [f32; 2],
    program: &'a Program,
    channels: [Option<Bound<'a>>; CHANNEL_COUNT],
}

impl FragmentInput<'_> {
    fn vector<const N: usize>(&self, name: &str) -> [f32; N] {
        let index = uniform_index(name).unwrap_or(usize::MAX);
        std::array::from_fn(|component| self.program.float(index, component))
    }

    pub fn time(&self) -> f32 {
        self.vector::<1>("iTime")[0]
    }

    pub fn time_delta(&self) -> f32 {
        self.vector::<1>("iTimeDelta")[0]
    }

    pub fn frame(&self) -> i32 {
        self.vector::<1>("iFrame")[0] as i32
    }

    pub fn resolution(&self) -> [f32; 3] {
        self.vector("iResolution")
    }

    pub fn mouse(&self) -> [f32; 4] {
        self.vector("iMouse")
    }

    pub fn date(&self) -> [f32; 4] {
        self.vector("iDate")
    }

    pub fn channel_resolution(&self, channel: usize) -> [f32; 3] {
        let all: [f32; 12] = self.vector("iChannelResolution");
        let start = channel.min(CHANNEL_COUNT - 1) * 3;
        [all[start], all[start + 1], all[start + 2]]
    }

    /// Unfiltered read of one texel; zero outside the texture or for an unbound channel.
    pub fn texel_fetch(&self, channel: usize, x: i32, y: i32) -> [f32; 4] {
        match self.channels.get(channel).copied().flatten() {
            Some(bound) => bound.texture.get(0, x as i64, y as i64),
            None => [0.0; 4],
        }
    }

    /// Filtered read at normalised coordinates using the channel's sampler.
    pub fn texture(&self, channel: usize, uv: [f32; 2]) -> [f32; 4] {
        match self.channels.get(channel).copied().flatten() {
            Some(bound) => bound.texture.sample(0, bound.sampler, uv),
            None => [0.0; 4],
        }
    }

    /// Cube-map lookup along `dir`.
    pub fn texture_cube(&self, channel: usize, dir: [f32; 3]) -> [f32; 4] {
        let Some(bound) = self.channels.get(channel).copied().flatten() else {
            return [0.0; 4];
        };
        if bound.texture.layers < 6 {
            return [0.0; 4];
        }
        let [x, y, z] = dir;
        let (ax, ay, az) = (x.abs(), y.abs(), z.abs());
        let (face, sc, tc, ma) = if ax >= ay && ax >= az {
            if x > 0.0 {
                (0, -z, -y, ax)
            } else {
                (1, z, -y, ax)
            }
        } else if ay >= az {
            if y > 0.0 {
                (2, x, z, ay)
            } else {
                (3, x, -z, ay)
            }
        } else if z > 0.0 {
            (4, x, -y, az)
        } else {
            (5, -x, -y, az)
        };
        if ma == 0.0 {
            return [0.0; 4];
        }
        let uv = [(sc / ma + 1.0) * 0.5, (tc / ma + 1.0) * 0.5];
        bound.texture.sample(face, bound.sampler, uv)
    }
}

/// CPU [`GpuBackend`] for headless rendering and tests.
pub struct SoftwareBackend {
    next_id: u32,
    max_units: u32,
    fragments: HashMap<String, FragmentFn>,
    programs: HashMap<u32, Program>,
    current: Option<ProgramId>,
    textures: HashMap<u32, Texture>,
    framebuffers: HashMap<u32, TextureId>,
    geometry: Vec<GeometryId>,
    units: HashMap<TextureUnit, (TextureId, SamplerOptions)>,
    screen: Texture,
    presented: u64,
    error: Option<String>,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            max_units: 16,
            fragments: HashMap::new(),
            programs: HashMap::new(),
            current: None,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            geometry: Vec::new(),
            units: HashMap::new(),
            screen: Texture::new(Extent::default(), 1, TextureFormat::Rgba8),
            presented: 0,
            error: None,
        }
    }

    pub fn with_texture_units(mut self, units: u32) -> Self {
        self.max_units = units;
        self
    }

    /// Use `fragment` as the fragment stage of programs labelled `label`.
    pub fn register_fragment<F>(&mut self, label: impl Into<String>, fragment: F)
    where
        F: Fn(&FragmentInput<'_>) -> [f32; 4] + 'static,
    {
        self.fragments.insert(label.into(), Box::new(fragment));
    }

    pub fn texel(&self, texture: TextureId, x: u32, y: u32) -> Option<[f32; 4]> {
        let texture = self.textures.get(&texture.0)?;
        if x >= texture.size.width || y >= texture.size.height {
            return None;
        }
        Some(texture.texels[texture.index(0, x, y)])
    }

    pub fn screen_texel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.screen.size.width || y >= self.screen.size.height {
            return None;
        }
        Some(self.screen.texels[self.screen.index(0, x, y)])
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    fn set_value(&mut self, location: UniformLocation, value: Stored) {
        let Some(id) = self.current else {
            self.record("uniform set with no program in use");
            return;
        };
        let slot = self
            .programs
            .get_mut(&id.0)
            .and_then(|program| program.values.get_mut(location.0 as usize));
        match slot {
            Some(slot) => *slot = Some(value),
            None => self.record(format!("invalid uniform location {}", location.0)),
        }
    }

    fn target_texture_id(&self, target: RenderTarget) -> Option<Option<u32>> {
        match target {
            RenderTarget::Screen => Some(None),
            RenderTarget::Framebuffer(fb) => self.framebuffers.get(&fb.0).map(|tex| Some(tex.0)),
        }
    }
}

impl GpuBackend for SoftwareBackend {
    fn max_texture_units(&self) -> u32 {
        self.max_units
    }

    fn compile_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, GpuError> {
        if !self.fragments.contains_key(desc.label) {
            return Err(GpuError::Compile {
                stage: "fragment",
                log: format!("no fragment stage registered for '{}'", desc.label),
            });
        }
        let id = self.next();
        self.programs.insert(
            id,
            Program {
                label: desc.label.to_string(),
                channels: desc.channels,
                values: vec![None; UNIFORM_NAMES.len()],
            },
        );
        Ok(ProgramId(id))
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs.get(&program.0)?;
        uniform_index(name).map(|index| UniformLocation(index as u32))
    }

    fn use_program(&mut self, program: ProgramId) {
        if self.programs.contains_key(&program.0) {
            self.current = Some(program);
        } else {
            self.record(format!("use of unknown program {}", program.0));
        }
    }

    fn set_uniform_f32(&mut self, location: UniformLocation, _components: u8, values: &[f32]) {
        self.set_value(location, Stored::Float(values.to_vec()));
    }

    fn set_uniform_i32(&mut self, location: UniformLocation, _components: u8, values: &[i32]) {
        self.set_value(location, Stored::Int(values.to_vec()));
    }

    fn create_geometry(&mut self) -> Result<GeometryId, GpuError> {
        let id = GeometryId(self.next());
        self.geometry.push(id);
        Ok(id)
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, GpuError> {
        let layers = match desc.shape {
            TextureShape::D2 => 1,
            TextureShape::Cube => 6,
        };
        let id = self.next();
        self.textures.insert(id, Texture::new(desc.size, layers, desc.format));
        Ok(TextureId(id))
    }

    fn upload_texture(&mut self, texture: TextureId, layer: u32, pixels: PixelView<'_>) {
        let channels = pixels.channels as usize;
        let matches = match self.textures.get(&texture.0) {
            Some(target) => {
                layer < target.layers
                    && pixels.width == target.size.width
                    && pixels.height == target.size.height
                    && (channels == 3 || channels == 4)
                    && pixels.bytes.len()
                        == pixels.width as usize * pixels.height as usize * channels
            }
            None => {
                self.record(format!("upload to unknown texture {}", texture.0));
                return;
            }
        };
        if !matches {
            self.record(format!("upload does not match texture {}", texture.0));
            return;
        }
        let Some(target) = self.textures.get_mut(&texture.0) else {
            return;
        };
        for (i, texel) in pixels.bytes.chunks_exact(channels).enumerate() {
            let x = (i % pixels.width as usize) as u32;
            let y = (i / pixels.width as usize) as u32;
            let alpha = if channels == 4 { texel[3] as f32 / 255.0 } else { 1.0 };
            let index = target.index(layer, x, y);
            target.texels[index] = [
                texel[0] as f32 / 255.0,
                texel[1] as f32 / 255.0,
                texel[2] as f32 / 255.0,
                alpha,
            ];
        }
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture.0).is_none() {
            self.record(format!("destroy of unknown texture {}", texture.0));
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
            Some(texture) if texture.size.is_empty() => {
                FramebufferStatus::Incomplete("zero-sized colour attachment".to_string())
            }
            Some(texture) if texture.layers != 1 => {
                FramebufferStatus::Incomplete("cube colour attachment".to_string())
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
        let texture = match self.target_texture_id(target) {
            Some(Some(id)) => self.textures.get_mut(&id),
            Some(None) => Some(&mut self.screen),
            None => None,
        };
        match texture {
            Some(texture) => texture.texels.fill(color),
            None => self.record("clear of unknown framebuffer"),
        }
    }

    fn blit(&mut self, src: FramebufferId, dst: FramebufferId, size: Extent) {
        let (Some(src_tex), Some(dst_tex)) = (
            self.framebuffers.get(&src.0).copied(),
            self.framebuffers.get(&dst.0).copied(),
        ) else {
            self.record("blit between unknown framebuffers");
            return;
        };
        let Some(source) = self.textures.get(&src_tex.0).cloned() else {
            self.record("blit from missing texture");
            return;
        };
        let Some(dest) = self.textures.get_mut(&dst_tex.0) else {
            self.record("blit into missing texture");
            return;
        };
        let region = size.min(source.size).min(dest.size);
        for y in 0..region.height {
            for x in 0..region.width {
                let index = dest.index(0, x, y);
                dest.texels[index] = source.texels[source.index(0, x, y)];
            }
        }
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureId, sampler: SamplerOptions) {
        if unit.0 >= self.max_units {
            self.record(format!("texture unit {} out of range", unit.0));
            return;
        }
        self.units.insert(unit, (texture, sampler));
    }

    fn draw(&mut self, geometry: GeometryId, target: RenderTarget, viewport: Extent) {
        if !self.geometry.contains(&geometry) {
            self.record(format!("draw with unknown geometry {}", geometry.0));
            return;
        }
        let target_id = match self.target_texture_id(target) {
            Some(id) => id,
            None => {
                self.record("draw into unknown framebuffer");
                return;
            }
        };
        let target_size = match target_id {
            Some(id) => self.textures.get(&id).map(|texture| texture.size),
            None => Some(self.screen.size),
        };
        let Some(target_size) = target_size else {
            self.record("draw into missing texture");
            return;
        };
        let label = match self.current.and_then(|id| self.programs.get(&id.0)) {
            Some(program) => program.label.clone(),
            None => {
                self.record("draw with no program in use");
                return;
            }
        };
        if !self.fragments.contains_key(&label) {
            self.record(format!("fragment for '{label}' was unregistered"));
            return;
        }

        let (Some(program), Some(fragment)) = (
            self.current.and_then(|id| self.programs.get(&id.0)),
            self.fragments.get(&label),
        ) else {
            return;
        };
        let channels: [Option<Bound<'_>>; CHANNEL_COUNT] = std::array::from_fn(|index| {
            program.channels[index]?;
            let unit = program.int(CHANNEL_UNIFORM_BASE + index)?;
            let (texture, sampler) = self.units.get(&TextureUnit(unit as u32))?;
            let texture = self.textures.get(&texture.0)?;
            Some(Bound {
                texture,
                sampler: *sampler,
            })
        });
        let scale_index = uniform_index("iPixelScale").unwrap_or(usize::MAX);
        let scale = [program.float(scale_index, 0), program.float(scale_index, 1)]
            .map(|s| if s > 0.0 { s } else { 1.0 });

        let region = viewport.min(target_size);
        let mut output = Vec::with_capacity(region.width as usize * region.height as usize);
        for y in 0..region.height {
            for x in 0..region.width {
                let input = FragmentInput {
                    frag_coord: [(x as f32 + 0.5) / scale[0], (y as f32 + 0.5) / scale[1]],
                    program,
                    channels,
                };
                output.push((x, y, fragment(&input)));
            }
        }

        let texture = match target_id {
            Some(id) => self.textures.get_mut(&id),
            None => Some(&mut self.screen),
        };
        if let Some(texture) = texture {
            for (x, y, colour) in output {
                texture.put(x, y, colour);
            }
        }
    }

    fn finish(&mut self) {}

    fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }

    fn resize_screen(&mut self, size: Extent) {
        if self.screen.size != size {
            self.screen = Texture::new(size, 1, TextureFormat::Rgba8);
        }
    }

    fn read_screen_rgb(&mut self, size: Extent) -> Result<Vec<u8>, GpuError> {
        if size != self.screen.size {
            return Err(GpuError::Unsupported(format!(
                "read-back of {}x{} from a {}x{} screen",
                size.width, size.height, self.screen.size.width, self.screen.size.height
            )));
        }
        let mut rgb = Vec::with_capacity(self.screen.texels.len() * 3);
        for texel in &self.screen.texels {
            for component in &texel[..3] {
                rgb.push((component.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }
        Ok(rgb)
    }

    fn present(&mut self) -> Result<(), GpuError> {
        self.presented += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture_2x2(gpu: &mut SoftwareBackend, sampler: SamplerOptions) -> TextureId {
        let texture = gpu
            .create_texture(&TextureDesc {
                label: "t",
                shape: TextureShape::D2,
                format: TextureFormat::Rgb8,
                size: Extent::new(2, 2),
                sampler,
            })
            .unwrap();
        let bytes = [0, 0, 0, 255, 0, 0, 0, 255, 0, 255, 255, 255];
        gpu.upload_texture(
            texture,
            0,
            PixelView {
                width: 2,
                height: 2,
                channels: 3,
                bytes: &bytes,
            },
        );
        texture
    }

    #[test]
    fn nearest_and_linear_sampling() {
        let mut gpu = SoftwareBackend::new();
        let id = texture_2x2(&mut gpu, SamplerOptions::nearest_clamp());
        let texture = gpu.textures.get(&id.0).unwrap();

        let nearest = SamplerOptions::nearest_clamp();
        assert_eq!(texture.sample(0, nearest, [0.75, 0.25]), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(texture.sample(0, nearest, [0.25, 0.75]), [0.0, 1.0, 0.0, 1.0]);

        let linear = SamplerOptions {
            filter: FilterMode::Linear,
            wrap: WrapMode::Clamp,
            vflip: false,
        };
        let centre = texture.sample(0, linear, [0.5, 0.5]);
        assert!((centre[0] - 0.5).abs() < 1e-6);
        assert!((centre[1] - 0.5).abs() < 1e-6);
        assert!((centre[2] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn repeat_wraps_and_clamp_holds_edges() {
        let mut gpu = SoftwareBackend::new();
        let id = texture_2x2(&mut gpu, SamplerOptions::nearest_clamp());
        let texture = gpu.textures.get(&id.0).unwrap();
        let repeat = SamplerOptions {
            filter: FilterMode::Nearest,
            wrap: WrapMode::Repeat,
            vflip: false,
        };
        assert_eq!(texture.sample(0, repeat, [1.25, 0.25]), [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(
            texture.sample(0, SamplerOptions::nearest_clamp(), [1.25, 0.25]),
            [1.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn misuse_is_reported_through_error_query() {
        let mut gpu = SoftwareBackend::new();
        assert!(gpu.take_error().is_none());
        gpu.destroy_texture(TextureId(77));
        assert!(gpu.take_error().unwrap().contains("77"));
        assert!(gpu.take_error().is_none());

        gpu.set_uniform_f32(UniformLocation(0), 1, &[1.0]);
        assert!(gpu.take_error().is_some());
    }

    #[test]
    fn unknown_fragment_fails_to_compile() {
        let mut gpu = SoftwareBackend::new();
        let result = gpu.compile_program(&ProgramDesc {
            label: "Image",
            fragment_body: "void mainImage(out vec4 c, in vec2 p) {}",
            channels: [None; 4],
        });
        assert!(matches!(result, Err(GpuError::Compile { .. })));
    }
}
