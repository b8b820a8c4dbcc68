//! Render-graph core for multi-pass Shadertoy compositions.
//!
//! A composition is a set of passes, each a fragment shader with up to four
//! input channels. Buffer passes render into double-buffered surfaces that any
//! pass (including themselves) may read on later draws; the terminal image pass
//! renders to the visible surface. The flow through this crate is:
//!
//! ```text
//!   loader ──▶ PassDescriptor* ──▶ RenderGraph::build
//!                                     │  resolve::resolve_buffers
//!                                     │  schedule::draw_order
//!                                     ▼
//!   window loop ──▶ FrameDriver::setup ──▶ FrameDriver::render_frame (per frame)
//!                        │                       │
//!                        └──── SurfaceLifecycle ─┴──▶ dyn GpuBackend
//! ```
//!
//! Nothing here talks to a windowing system or a concrete graphics API. The
//! [`GpuBackend`] trait is the only seam to the GPU; `renderer` implements it
//! with wgpu and [`SoftwareBackend`] implements it on the CPU for headless
//! runs and tests.

mod backend;
mod channel;
mod driver;
mod error;
mod graph;
mod keyboard;
mod pass;
mod resolve;
mod schedule;
mod software;
mod state;
mod surface;
mod uniforms;

pub use backend::{
    check_gpu, Extent, FramebufferId, FramebufferStatus, GeometryId, GpuBackend, PixelView,
    ProgramDesc, ProgramId, RenderTarget, SamplerType, TextureDesc, TextureFormat, TextureId,
    TextureShape, TextureUnit, UniformLocation,
};
pub use channel::{
    BufferSource, Channel, ChannelKind, ChannelSource, FilterMode, PixelData, SamplerOptions,
    WrapMode, CHANNEL_COUNT,
};
pub use driver::{CapturedFrame, FrameDriver, FrameReport, FrameSink};
pub use error::{ErrorClass, GpuError, GraphError};
pub use graph::{RenderGraph, MAX_PASSES};
pub use keyboard::{
    KeyboardMap, KEYMAP_BYTES_PER_KEY, KEYMAP_COLUMNS, KEYMAP_ROWS, KEY_ROW_DOWN, KEY_ROW_PRESSED,
    KEY_ROW_TOGGLED,
};
pub use pass::{OutputId, Pass, PassDescriptor, PassHandle, ShaderSource};
pub use resolve::resolve_buffers;
pub use schedule::{draw_order, BUFFER_LABELS};
pub use software::{FragmentFn, FragmentInput, SoftwareBackend};
pub use state::{FrameClock, Playback, RenderGraphState};
pub use surface::{
    SurfaceLifecycle, SurfacePair, SurfaceRead, SurfaceStatus, SurfaceTable, TextureUnitAllocator,
};
pub use uniforms::{upload, FrameUniforms, UniformName, UniformTable, UniformValue, MAX_UNIFORMS};
