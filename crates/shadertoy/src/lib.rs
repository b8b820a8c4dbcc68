//! Loads Shadertoy shaders into render-graph pass descriptors.
//!
//! - `bundle` models the JSON the Shadertoy API returns.
//! - `loader` converts bundles and plain GLSL files into
//!   [`rendergraph::PassDescriptor`]s, decoding image inputs on the way.
//! - `remote` fetches bundles and media from Shadertoy.com.

mod bundle;
mod decode;
mod error;
mod loader;
mod remote;

pub use bundle::{
    Bundle, BundleId, PassKind, RenderInput, RenderOutput, RenderPass, SamplerSpec, ShaderInfo,
    ShaderPayload,
};
pub use decode::{decode_image, media_format};
pub use error::LoadError;
pub use loader::{is_bundle_path, LoadedShader, ShaderLoader};
pub use remote::{ShadertoyClient, ShadertoyConfig};
