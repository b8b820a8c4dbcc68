//! wgpu renderer and interactive player for render graphs.
//!
//! ```text
//!   toyshader CLI
//!          │ RunConfig + RenderGraph
//!          ▼
//!   run() ──▶ Player ──▶ winit event loop ──▶ FrameDriver::render_frame()
//!                 │                                   │
//!                 └── WgpuBackend ◀── GpuBackend calls ┘
//! ```
//!
//! [`WgpuBackend`] emulates the GL-style capability set the core expects:
//! uniform locations resolve into one std140 block per program, texture units
//! form a table consulted at draw time, and the visible surface is an
//! offscreen texture flipped into the swapchain on present. Captured frames
//! go to a [`PngSequenceSink`].

mod compile;
mod gpu;
mod sink;
mod window;

pub use gpu::WgpuBackend;
pub use sink::PngSequenceSink;
pub use window::{run, RunConfig};
