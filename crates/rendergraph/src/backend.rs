//! The GPU seam. Everything the frame driver and the surface manager need
//! from a graphics API goes through [`GpuBackend`]; handles are opaque
//! integers owned by the backend.

use crate::channel::{PixelData, SamplerOptions};
use crate::error::{GpuError, GraphError};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

handle!(
    /// A 2D or cube texture.
    TextureId
);
handle!(
    /// An offscreen render target wrapping one texture.
    FramebufferId
);
handle!(
    /// A linked vertex + fragment program.
    ProgramId
);
handle!(
    /// Vertex data for the full-target quad.
    GeometryId
);
handle!(
    /// Where a named uniform lives inside a program.
    UniformLocation
);
handle!(
    /// A texture binding slot. Channel sampler uniforms hold one of these.
    TextureUnit
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Component-wise minimum; the overlap of two surfaces anchored at the origin.
    pub fn min(self, other: Extent) -> Extent {
        Extent::new(self.width.min(other.width), self.height.min(other.height))
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// 8-bit RGB input data.
    Rgb8,
    /// 8-bit RGBA input data.
    Rgba8,
    /// Floating-point RGBA colour target used by buffer surfaces.
    RenderTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureShape {
    D2,
    /// Six faces in +X, -X, +Y, -Y, +Z, -Z order.
    Cube,
}

#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub shape: TextureShape,
    pub format: TextureFormat,
    pub size: Extent,
    pub sampler: SamplerOptions,
}

/// Sampler type a program declares for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerType {
    Sampler2D,
    SamplerCube,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    /// Assembled user code (common + pass chunks). Backends wrap it with their
    /// own prelude declaring the standard uniforms and channel samplers.
    pub fragment_body: &'a str,
    pub channels: [Option<SamplerType>; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    Framebuffer(FramebufferId),
    /// The visible surface.
    Screen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    Incomplete(String),
}

/// Borrowed pixel rows, bottom row first.
#[derive(Debug, Clone, Copy)]
pub struct PixelView<'a> {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub bytes: &'a [u8],
}

impl<'a> From<&'a PixelData> for PixelView<'a> {
    fn from(data: &'a PixelData) -> Self {
        PixelView {
            width: data.width,
            height: data.height,
            channels: data.channels,
            bytes: &data.bytes,
        }
    }
}

/// Operations the render graph needs from a graphics API.
///
/// Uniform setters act on the program last passed to [`GpuBackend::use_program`].
/// Recoverable misuse (unknown handles and the like) is recorded and reported
/// through [`GpuBackend::take_error`], the way a GL error query would.
pub trait GpuBackend {
    fn max_texture_units(&self) -> u32;

    fn compile_program(&mut self, desc: &ProgramDesc<'_>) -> Result<ProgramId, GpuError>;
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn use_program(&mut self, program: ProgramId);
    fn set_uniform_f32(&mut self, location: UniformLocation, components: u8, values: &[f32]);
    fn set_uniform_i32(&mut self, location: UniformLocation, components: u8, values: &[i32]);

    fn create_geometry(&mut self) -> Result<GeometryId, GpuError>;

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, GpuError>;
    /// Replace the contents of `layer` (0 for 2D, face index for cube maps).
    fn upload_texture(&mut self, texture: TextureId, layer: u32, pixels: PixelView<'_>);
    fn destroy_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self, color: TextureId) -> Result<FramebufferId, GpuError>;
    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);

    fn clear(&mut self, target: RenderTarget, color: [f32; 4]);
    /// Copy the `size` rectangle at the origin of `src` into `dst`.
    fn blit(&mut self, src: FramebufferId, dst: FramebufferId, size: Extent);
    fn bind_texture(&mut self, unit: TextureUnit, texture: TextureId, sampler: SamplerOptions);
    fn draw(&mut self, geometry: GeometryId, target: RenderTarget, viewport: Extent);

    /// Block until previously submitted work has executed.
    fn finish(&mut self);
    fn take_error(&mut self) -> Option<String>;

    /// Resize the visible surface.
    fn resize_screen(&mut self, size: Extent);
    /// Read the visible surface as tightly packed RGB, bottom row first.
    fn read_screen_rgb(&mut self, size: Extent) -> Result<Vec<u8>, GpuError>;
    fn present(&mut self) -> Result<(), GpuError>;
}

/// Turn a pending backend error into a fatal [`GraphError::Gpu`].
pub fn check_gpu(gpu: &mut dyn GpuBackend, context: &str) -> Result<(), GraphError> {
    match gpu.take_error() {
        Some(message) => Err(GraphError::Gpu {
            context: context.to_string(),
            message,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_overlap() {
        let a = Extent::new(640, 360);
        let b = Extent::new(320, 480);
        assert_eq!(a.min(b), Extent::new(320, 360));
        assert!(Extent::new(0, 10).is_empty());
    }
}
