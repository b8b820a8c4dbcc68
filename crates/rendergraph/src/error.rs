use thiserror::Error;

/// The three failure classes a render graph can hit. All of them are fatal at
/// the point they are detected; the class only shapes the diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed bundle references, duplicate ids, bad channel indices, unsupported inputs.
    Configuration,
    /// Shader compile/link failures, incomplete framebuffers, GPU error codes.
    Resource,
    /// Exceeding a fixed limit (passes, uniforms, texture units).
    Capacity,
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("pass '{pass}' channel {channel} reads buffer output '{output}' which no pass declares")]
    UnresolvedBuffer {
        pass: String,
        channel: usize,
        output: String,
    },

    #[error("output '{output}' is declared by both '{first}' and '{second}'")]
    DuplicateOutput {
        output: String,
        first: String,
        second: String,
    },

    #[error("pass '{pass}' uses channel {channel}; only channels 0-3 exist")]
    ChannelOutOfRange { pass: String, channel: usize },

    #[error("pass '{pass}': unsupported input: {detail}")]
    UnsupportedInput { pass: String, detail: String },

    #[error("composition has no image pass (a pass without an output id)")]
    MissingImagePass,

    #[error("passes '{first}' and '{second}' both lack an output id; only the image pass may")]
    MultipleImagePasses { first: String, second: String },

    #[error("error compiling {stage} shader for pass '{pass}':\n\n{log}")]
    ShaderCompile {
        pass: String,
        stage: &'static str,
        log: String,
    },

    #[error("framebuffer {index} of pass '{pass}' is incomplete: {reason}")]
    FramebufferIncomplete {
        pass: String,
        index: usize,
        reason: String,
    },

    #[error("{context}: {message}")]
    Gpu { context: String, message: String },

    #[error("all {limit} texture units are in use")]
    TextureUnitsExhausted { limit: u32 },

    #[error("composition declares {count} passes; at most {limit} are supported")]
    TooManyPasses { count: usize, limit: usize },

    #[error("program for pass '{pass}' needs more than {limit} uniforms")]
    TooManyUniforms { pass: String, limit: usize },

    #[error("frame sink failed: {0}")]
    Sink(String),
}

impl GraphError {
    pub fn class(&self) -> ErrorClass {
        match self {
            GraphError::UnresolvedBuffer { .. }
            | GraphError::DuplicateOutput { .. }
            | GraphError::ChannelOutOfRange { .. }
            | GraphError::UnsupportedInput { .. }
            | GraphError::MissingImagePass
            | GraphError::MultipleImagePasses { .. } => ErrorClass::Configuration,
            GraphError::ShaderCompile { .. }
            | GraphError::FramebufferIncomplete { .. }
            | GraphError::Gpu { .. }
            | GraphError::Sink(_) => ErrorClass::Resource,
            GraphError::TextureUnitsExhausted { .. }
            | GraphError::TooManyPasses { .. }
            | GraphError::TooManyUniforms { .. } => ErrorClass::Capacity,
        }
    }

    /// Name `pass` in an input error raised before the pass was known, such
    /// as pixel validation in [`crate::PixelData::new`].
    pub fn in_pass(self, pass: &str) -> Self {
        match self {
            GraphError::UnsupportedInput { pass: owner, detail } if owner.is_empty() => {
                GraphError::UnsupportedInput {
                    pass: pass.to_string(),
                    detail,
                }
            }
            other => other,
        }
    }
}

/// Failures reported by a [`crate::GpuBackend`] call.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: &'static str, log: String },

    #[error("unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u32 },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("device error: {0}")]
    Device(String),
}

impl GpuError {
    pub(crate) fn into_graph(self, context: impl Into<String>) -> GraphError {
        GraphError::Gpu {
            context: context.into(),
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PixelData;

    #[test]
    fn pixel_errors_name_the_pass_they_belong_to() {
        let err = PixelData::new(2, 2, 4, vec![0; 3]).unwrap_err().in_pass("Buf A");
        assert!(matches!(&err, GraphError::UnsupportedInput { pass, .. } if pass == "Buf A"));
        assert!(err.to_string().starts_with("pass 'Buf A': unsupported input"), "{err}");

        let named = GraphError::UnsupportedInput {
            pass: "Image".into(),
            detail: "x".into(),
        };
        assert!(matches!(named.in_pass("Buf A"), GraphError::UnsupportedInput { pass, .. } if pass == "Image"));
    }

    #[test]
    fn classes_follow_taxonomy() {
        let unresolved = GraphError::UnresolvedBuffer {
            pass: "Image".into(),
            channel: 0,
            output: "257".into(),
        };
        assert_eq!(unresolved.class(), ErrorClass::Configuration);

        let incomplete = GraphError::FramebufferIncomplete {
            pass: "Buf A".into(),
            index: 1,
            reason: "zero size".into(),
        };
        assert_eq!(incomplete.class(), ErrorClass::Resource);

        let units = GraphError::TextureUnitsExhausted { limit: 16 };
        assert_eq!(units.class(), ErrorClass::Capacity);
    }

    #[test]
    fn diagnostics_name_the_offender() {
        let err = GraphError::ShaderCompile {
            pass: "Buf B".into(),
            stage: "fragment",
            log: "0:12: syntax error".into(),
        };
        let message = err.to_string();
        assert!(message.contains("Buf B"));
        assert!(message.contains("fragment"));
        assert!(message.contains("syntax error"));
    }
}
