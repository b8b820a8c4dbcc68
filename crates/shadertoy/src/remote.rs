use reqwest::blocking::Client;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::bundle::{Bundle, ShaderPayload};
use crate::error::LoadError;

#[derive(Debug, Clone)]
pub struct ShadertoyConfig {
    pub api_key: String,
    pub api_base: Url,
    pub media_base: Url,
}

impl ShadertoyConfig {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LoadError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LoadError::Api("Shadertoy API key must not be empty".into()));
        }
        Ok(Self {
            api_key,
            api_base: parse_url("https://www.shadertoy.com/api/v1/")?,
            media_base: parse_url("https://www.shadertoy.com/")?,
        })
    }
}

fn parse_url(text: &str) -> Result<Url, LoadError> {
    Url::parse(text).map_err(|err| LoadError::Api(format!("invalid url '{text}': {err}")))
}

/// Blocking client for the Shadertoy.com API and its media files.
#[derive(Debug, Clone)]
pub struct ShadertoyClient {
    http: Client,
    config: ShadertoyConfig,
}

impl ShadertoyClient {
    pub fn new(config: ShadertoyConfig) -> Result<Self, LoadError> {
        let http = Client::builder().build()?;
        Ok(Self { http, config })
    }

    /// URL of the API request for `shader_id`, key included.
    pub fn shader_url(&self, shader_id: &str) -> Result<Url, LoadError> {
        if shader_id.trim().is_empty() {
            return Err(LoadError::Api("shader id must not be empty".into()));
        }
        let mut url = self.config.api_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| LoadError::Api("invalid Shadertoy API base url".into()))?;
            segments.pop_if_empty();
            segments.push("shaders");
            segments.push(shader_id);
        }
        url.set_query(Some(&format!("key={}", self.config.api_key)));
        Ok(url)
    }

    pub fn fetch_bundle(&self, shader_id: &str) -> Result<Bundle, LoadError> {
        let url = self.shader_url(shader_id)?;
        debug!(shader = shader_id, "requesting shader from Shadertoy");
        let body = self.http.get(url).send()?.error_for_status()?.text()?;
        tracing::info!(shader = shader_id, bytes = body.len(), "retrieved shader");
        parse_response(&body, shader_id)
    }

    /// Download a media file referenced by a bundle input.
    pub fn fetch_asset(&self, src: &str) -> Result<Vec<u8>, LoadError> {
        let url = self.resolve_media_url(src)?;
        debug!(%url, "downloading Shadertoy asset");
        let bytes = self.http.get(url).send()?.error_for_status()?.bytes()?;
        Ok(bytes.to_vec())
    }

    pub fn resolve_media_url(&self, src: &str) -> Result<Url, LoadError> {
        if src.starts_with("http://") || src.starts_with("https://") {
            return parse_url(src);
        }
        if src.starts_with("//") {
            return parse_url(&format!("https:{src}"));
        }
        let trimmed = src.trim_start_matches('/');
        self.config
            .media_base
            .join(trimmed)
            .map_err(|err| LoadError::Api(format!("invalid media path '{src}': {err}")))
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(alias = "Error")]
    error: String,
}

fn parse_response(body: &str, shader_id: &str) -> Result<Bundle, LoadError> {
    #[derive(Deserialize)]
    struct Envelope {
        #[serde(rename = "Shader")]
        shader: ShaderPayload,
    }

    if let Ok(envelope) = serde_json::from_str::<Envelope>(body) {
        return Ok(Bundle {
            shader: envelope.shader,
        });
    }
    if let Ok(err) = serde_json::from_str::<ApiError>(body) {
        return Err(LoadError::Api(format!("{} (shader {shader_id})", err.error)));
    }
    // neither shape matched; report the bundle parse error
    Bundle::parse(body, &format!("shader {shader_id}"))
}
