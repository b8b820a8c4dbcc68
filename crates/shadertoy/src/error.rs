use std::path::PathBuf;

use rendergraph::GraphError;
use thiserror::Error;

/// Failures while turning a bundle, GLSL files, or a remote shader into passes.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid shader bundle {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("shader bundle contains no render passes")]
    NoPasses,

    #[error("no shader inputs given")]
    NoInputs,

    #[error("pass '{pass}' has type '{kind}', which is not supported")]
    UnsupportedPass { pass: String, kind: String },

    #[error("pass '{pass}' uses a '{ctype}' input, which is not supported")]
    UnsupportedInput { pass: String, ctype: String },

    #[error("pass '{pass}' references channel {channel}; channels are 0-3")]
    ChannelOutOfRange { pass: String, channel: u32 },

    #[error("pass '{pass}' has a {ctype} input without {field}")]
    MissingField {
        pass: String,
        ctype: String,
        field: &'static str,
    },

    #[error("unrecognized media extension for '{src}'")]
    UnsupportedMedia { src: String },

    #[error("media '{src}' is not available locally and no Shadertoy client is configured")]
    AssetUnavailable { src: String },

    #[error("failed to decode '{src}': {source}")]
    Decode {
        src: String,
        #[source]
        source: image::ImageError,
    },

    #[error("cubemap '{src}' has faces of different sizes")]
    MismatchedCubeFaces { src: String },

    #[error("Shadertoy request failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Shadertoy API error: {0}")]
    Api(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl LoadError {
    pub(crate) fn in_pass(self, pass: &str) -> Self {
        match self {
            LoadError::Graph(err) => LoadError::Graph(err.in_pass(pass)),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use rendergraph::PixelData;

    use super::*;

    #[test]
    fn pixel_errors_pick_up_the_pass_name() {
        let err = LoadError::from(PixelData::new(1, 1, 2, vec![0; 2]).unwrap_err()).in_pass("Buf B");
        assert!(err.to_string().starts_with("pass 'Buf B'"), "{err}");

        let untouched = LoadError::UnsupportedMedia { src: "a.gif".into() }.in_pass("Buf B");
        assert!(matches!(untouched, LoadError::UnsupportedMedia { .. }));
    }
}
