use std::collections::HashMap;

use crate::channel::{BufferSource, ChannelSource};
use crate::error::GraphError;
use crate::pass::{OutputId, Pass, PassHandle};

/// Rewrite every buffer channel from an output id to the handle of the pass
/// that publishes it.
///
/// Reads may form cycles and a pass may read its own output; both resolve
/// like any other reference. Reads always observe the previous completed
/// write of the source, so no ordering constraint follows from them.
pub fn resolve_buffers(passes: &mut [Pass]) -> Result<(), GraphError> {
    let mut producers: HashMap<&OutputId, (PassHandle, &str)> = HashMap::new();
    for pass in passes.iter() {
        let Some(output) = pass.output() else {
            continue;
        };
        if let Some((_, first)) = producers.insert(output, (pass.handle(), pass.name())) {
            return Err(GraphError::DuplicateOutput {
                output: output.to_string(),
                first: first.to_string(),
                second: pass.name().to_string(),
            });
        }
    }

    let mut resolved = Vec::new();
    for pass in passes.iter() {
        for (index, channel) in pass.channels().iter().enumerate() {
            let ChannelSource::Buffer(BufferSource::Unresolved(id)) = &channel.source else {
                continue;
            };
            let Some((source, _)) = producers.get(id) else {
                return Err(GraphError::UnresolvedBuffer {
                    pass: pass.name().to_string(),
                    channel: index,
                    output: id.to_string(),
                });
            };
            resolved.push((pass.handle(), index, *source));
        }
    }

    for (pass, index, source) in resolved {
        tracing::debug!(
            pass = passes[pass.index()].name(),
            channel = index,
            source = passes[source.index()].name(),
            "resolved buffer input"
        );
        passes[pass.index()].channels[index].source =
            ChannelSource::Buffer(BufferSource::Resolved(source));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Channel, SamplerOptions};
    use crate::pass::ShaderSource;

    fn pass(index: u32, name: &str, output: Option<&str>, reads: &[(usize, &str)]) -> Pass {
        let mut channels: [Channel; 4] = Default::default();
        for (channel, id) in reads {
            channels[*channel] = Channel::new(
                ChannelSource::Buffer(BufferSource::Unresolved(OutputId::from(*id))),
                SamplerOptions::default(),
            );
        }
        Pass::new(
            PassHandle(index),
            name.to_string(),
            output.map(OutputId::from),
            channels,
            ShaderSource::new(),
        )
    }

    #[test]
    fn cycles_and_self_reads_resolve() {
        let mut passes = vec![
            pass(0, "Buf A", Some("257"), &[(0, "258"), (1, "257")]),
            pass(1, "Buf B", Some("258"), &[(0, "257")]),
            pass(2, "Image", None, &[(2, "258")]),
        ];
        resolve_buffers(&mut passes).unwrap();
        assert_eq!(passes[0].channels()[0].buffer_source(), Some(PassHandle(1)));
        assert_eq!(passes[0].channels()[1].buffer_source(), Some(PassHandle(0)));
        assert_eq!(passes[1].channels()[0].buffer_source(), Some(PassHandle(0)));
        assert_eq!(passes[2].channels()[2].buffer_source(), Some(PassHandle(1)));
    }

    #[test]
    fn unmatched_id_is_reported() {
        let mut passes = vec![
            pass(0, "Buf A", Some("257"), &[]),
            pass(1, "Image", None, &[(3, "999")]),
        ];
        let err = resolve_buffers(&mut passes).unwrap_err();
        match err {
            GraphError::UnresolvedBuffer {
                pass,
                channel,
                output,
            } => {
                assert_eq!(pass, "Image");
                assert_eq!(channel, 3);
                assert_eq!(output, "999");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_outputs_are_rejected() {
        let mut passes = vec![
            pass(0, "Buf A", Some("257"), &[]),
            pass(1, "Buf B", Some("257"), &[]),
            pass(2, "Image", None, &[]),
        ];
        assert!(matches!(
            resolve_buffers(&mut passes),
            Err(GraphError::DuplicateOutput { .. })
        ));
    }
}
