//! Serde schema for Shadertoy JSON bundles.
//!
//! Bundles come from the `api/v1/shaders/{id}` endpoint or from a `.json` /
//! `.js` file saved from it. Only the fields the loader reads are modelled;
//! everything else is ignored.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::LoadError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Bundle {
    #[serde(rename = "Shader")]
    pub shader: ShaderPayload,
}

impl Bundle {
    /// Parse bundle text; `origin` names the file or URL in errors.
    pub fn parse(text: &str, origin: &str) -> Result<Self, LoadError> {
        serde_json::from_str(text).map_err(|source| LoadError::Json {
            origin: origin.to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShaderPayload {
    #[serde(default)]
    pub info: ShaderInfo,
    #[serde(rename = "renderpass")]
    pub render_passes: Vec<RenderPass>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShaderInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderPass {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub pass_type: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub inputs: Vec<RenderInput>,
    #[serde(default)]
    pub outputs: Vec<RenderOutput>,
}

impl RenderPass {
    pub fn kind(&self) -> PassKind {
        PassKind::from_type(&self.pass_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Image,
    Buffer,
    Common,
    Sound,
    Cubemap,
    Other,
}

impl PassKind {
    fn from_type(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "image" => PassKind::Image,
            "buffer" => PassKind::Buffer,
            "common" => PassKind::Common,
            "sound" => PassKind::Sound,
            "cubemap" => PassKind::Cubemap,
            _ => PassKind::Other,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderInput {
    #[serde(default)]
    pub id: Option<BundleId>,
    #[serde(default)]
    pub channel: u32,
    #[serde(rename = "ctype")]
    pub channel_type: String,
    #[serde(default)]
    pub src: Option<String>,
    #[serde(default)]
    pub sampler: Option<SamplerSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderOutput {
    pub id: BundleId,
    #[serde(default)]
    pub channel: u32,
}

/// Output and input ids appear as numbers in older bundles and strings in
/// newer ones.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BundleId {
    Number(i64),
    Text(String),
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleId::Number(value) => write!(f, "{value}"),
            BundleId::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SamplerSpec {
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default = "default_wrap")]
    pub wrap: String,
    #[serde(default = "default_vflip", deserialize_with = "bool_or_string")]
    pub vflip: bool,
}

impl Default for SamplerSpec {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            wrap: default_wrap(),
            vflip: default_vflip(),
        }
    }
}

fn default_filter() -> String {
    "linear".to_string()
}

fn default_wrap() -> String {
    "repeat".to_string()
}

fn default_vflip() -> bool {
    true
}

// The API sends booleans as the strings "true" / "false".
fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Text(text) => match text.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid flag '{other}'"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "Shader": {
            "ver": "0.1",
            "info": { "id": "XsBSRG", "name": "Feedback", "username": "someone" },
            "renderpass": [
                {
                    "name": "Buf A",
                    "type": "buffer",
                    "code": "void mainImage(out vec4 c, in vec2 f) { c = vec4(1.0); }",
                    "inputs": [
                        { "id": 257, "channel": 0, "ctype": "buffer", "src": "/media/previz/buffer00.png",
                          "sampler": { "filter": "linear", "wrap": "clamp", "vflip": "true", "srgb": "false" } }
                    ],
                    "outputs": [ { "id": 257, "channel": 0 } ]
                },
                {
                    "name": "Image",
                    "type": "image",
                    "code": "void mainImage(out vec4 c, in vec2 f) { c = texture(iChannel0, f); }",
                    "inputs": [
                        { "id": "4dXGR8", "channel": 0, "ctype": "buffer",
                          "sampler": { "filter": "nearest", "wrap": "repeat", "vflip": false } }
                    ],
                    "outputs": [ { "id": "4dfGRr", "channel": 0 } ]
                }
            ]
        }
    }"#;

    #[test]
    fn parses_numeric_and_string_ids() {
        let bundle = Bundle::parse(SAMPLE, "sample").unwrap();
        let passes = &bundle.shader.render_passes;
        assert_eq!(bundle.shader.info.name, "Feedback");
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].kind(), PassKind::Buffer);
        assert_eq!(passes[1].kind(), PassKind::Image);
        assert_eq!(passes[0].outputs[0].id, BundleId::Number(257));
        assert_eq!(passes[1].inputs[0].id, Some(BundleId::Text("4dXGR8".into())));
        assert_eq!(passes[0].outputs[0].id.to_string(), "257");
    }

    #[test]
    fn sampler_flags_accept_strings_and_booleans() {
        let bundle = Bundle::parse(SAMPLE, "sample").unwrap();
        let first = bundle.shader.render_passes[0].inputs[0].sampler.clone().unwrap();
        assert!(first.vflip);
        assert_eq!(first.wrap, "clamp");
        let second = bundle.shader.render_passes[1].inputs[0].sampler.clone().unwrap();
        assert!(!second.vflip);
        assert_eq!(second.filter, "nearest");
    }

    #[test]
    fn missing_sampler_fields_take_defaults() {
        let spec: SamplerSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.filter, "linear");
        assert_eq!(spec.wrap, "repeat");
        assert!(spec.vflip);
    }

    #[test]
    fn malformed_bundle_names_its_origin() {
        let err = Bundle::parse("{ \"Shader\": {} }", "broken.json").unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
