use crate::channel::{Channel, CHANNEL_COUNT};
use crate::error::GraphError;
use crate::pass::{Pass, PassDescriptor, PassHandle, ShaderSource};
use crate::resolve::resolve_buffers;
use crate::schedule::draw_order;

/// Most passes one composition may declare.
pub const MAX_PASSES: usize = 8;

/// Arena of passes plus their draw order. Built once from loader output and
/// never structurally changed afterwards.
#[derive(Debug)]
pub struct RenderGraph {
    passes: Vec<Pass>,
    order: Vec<PassHandle>,
}

impl RenderGraph {
    pub fn build(descriptors: Vec<PassDescriptor>) -> Result<Self, GraphError> {
        if descriptors.len() > MAX_PASSES {
            return Err(GraphError::TooManyPasses {
                count: descriptors.len(),
                limit: MAX_PASSES,
            });
        }

        let mut passes = Vec::with_capacity(descriptors.len());
        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let mut channels: [Channel; CHANNEL_COUNT] = Default::default();
            for (slot, channel) in descriptor.channels {
                if slot >= CHANNEL_COUNT {
                    return Err(GraphError::ChannelOutOfRange {
                        pass: descriptor.name,
                        channel: slot,
                    });
                }
                channels[slot] = channel;
            }

            let mut source = ShaderSource::new();
            for chunk in &descriptor.chunks {
                source.append_chunk(chunk);
            }

            passes.push(Pass::new(
                PassHandle(index as u32),
                descriptor.name,
                descriptor.output,
                channels,
                source,
            ));
        }

        resolve_buffers(&mut passes)?;
        let order = draw_order(&passes)?;
        tracing::debug!(
            order = ?order
                .iter()
                .map(|handle| passes[handle.index()].name())
                .collect::<Vec<_>>(),
            "scheduled passes"
        );
        Ok(Self { passes, order })
    }

    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    pub fn pass(&self, handle: PassHandle) -> Option<&Pass> {
        self.passes.get(handle.index())
    }

    pub fn pass_mut(&mut self, handle: PassHandle) -> Option<&mut Pass> {
        self.passes.get_mut(handle.index())
    }

    pub(crate) fn passes_mut(&mut self) -> &mut [Pass] {
        &mut self.passes
    }

    pub fn order(&self) -> &[PassHandle] {
        &self.order
    }

    pub fn image_pass(&self) -> PassHandle {
        // draw_order guarantees the image pass is present and last
        self.order[self.order.len() - 1]
    }

    pub fn find(&self, name: &str) -> Option<PassHandle> {
        self.passes
            .iter()
            .find(|pass| pass.name() == name)
            .map(Pass::handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{BufferSource, ChannelSource, SamplerOptions};
    use crate::pass::OutputId;

    fn buffer(id: &str) -> ChannelSource {
        ChannelSource::Buffer(BufferSource::Unresolved(OutputId::from(id)))
    }

    #[test]
    fn builds_and_orders_a_typical_composition() {
        let graph = RenderGraph::build(vec![
            PassDescriptor::new("Image")
                .chunk("void mainImage(out vec4 c, in vec2 p) { c = texture(iChannel0, p); }")
                .channel(0, buffer("258"), SamplerOptions::default()),
            PassDescriptor::new("Buf B")
                .output("258")
                .chunk("void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }")
                .channel(0, buffer("257"), SamplerOptions::default()),
            PassDescriptor::new("Buf A")
                .output("257")
                .chunk("void mainImage(out vec4 c, in vec2 p) { c = vec4(0.5); }"),
        ])
        .unwrap();

        let names: Vec<&str> = graph
            .order()
            .iter()
            .map(|handle| graph.pass(*handle).unwrap().name())
            .collect();
        assert_eq!(names, ["Buf A", "Buf B", "Image"]);
        assert_eq!(graph.image_pass(), PassHandle(0));
        assert_eq!(
            graph.pass(PassHandle(0)).unwrap().channels()[0].buffer_source(),
            Some(PassHandle(1))
        );
    }

    #[test]
    fn limits_are_enforced() {
        let many: Vec<PassDescriptor> = (0..=MAX_PASSES)
            .map(|i| PassDescriptor::new(format!("pass {i}")).output(i.to_string()))
            .collect();
        assert!(matches!(
            RenderGraph::build(many),
            Err(GraphError::TooManyPasses { count: 9, limit: 8 })
        ));

        let wide = PassDescriptor::new("Image").channel(4, ChannelSource::Keyboard, SamplerOptions::default());
        assert!(matches!(
            RenderGraph::build(vec![wide]),
            Err(GraphError::ChannelOutOfRange { channel: 4, .. })
        ));
    }
}
