//! wgpu implementation of the render-graph backend.
//!
//! - `context` owns wgpu instance/device/surface wiring and rebuilds the
//!   swapchain when the window resizes.
//! - `channels` creates input and render-target textures, samplers, and the
//!   placeholders bound to empty channels.
//! - `pipeline` compiles wrapped GLSL into one pipeline per target format and
//!   holds the present pipeline.
//! - `uniforms` maps GL-style uniform locations onto a std140 block.
//! - `state` glues everything together as [`WgpuBackend`].
//!
//! Row 0 of every texture is the bottom of the image, as in GL. The visible
//! surface is an offscreen texture flipped into the swapchain on present.

mod channels;
mod context;
mod pipeline;
mod state;
mod uniforms;

pub use state::WgpuBackend;
