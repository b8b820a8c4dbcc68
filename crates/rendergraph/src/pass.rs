use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use crate::backend::ProgramId;
use crate::channel::{Channel, ChannelSource, SamplerOptions, CHANNEL_COUNT};
use crate::uniforms::UniformTable;

/// Index of a pass in the graph's arena. Handles stay valid for the lifetime
/// of the graph; passes are never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassHandle(pub u32);

impl PassHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier a buffer pass publishes its output under. Numeric ids sort
/// numerically and ahead of non-numeric ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputId(String);

impl OutputId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.trim().parse().ok()
    }
}

impl Ord for OutputId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for OutputId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OutputId {
    fn from(value: &str) -> Self {
        OutputId::new(value)
    }
}

static NEXT_SOURCE_STRING: AtomicU32 = AtomicU32::new(0);

/// Fragment source assembled from ordered chunks. Each chunk is preceded by a
/// `#line 0 N` directive with a process-unique `N`, so compiler diagnostics
/// point at the chunk they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderSource {
    text: String,
    chunks: Vec<u32>,
}

impl ShaderSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the source-string number assigned to it.
    pub fn append_chunk(&mut self, chunk: &str) -> u32 {
        let number = NEXT_SOURCE_STRING.fetch_add(1, AtomicOrdering::Relaxed);
        self.text.push_str(&format!("\n#line 0 {number}\n"));
        self.text.push_str(chunk);
        self.chunks.push(number);
        number
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Source-string numbers, in append order.
    pub fn chunk_numbers(&self) -> &[u32] {
        &self.chunks
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Loader-facing description of one pass, before it enters the arena.
#[derive(Debug, Clone)]
pub struct PassDescriptor {
    pub name: String,
    pub output: Option<OutputId>,
    pub chunks: Vec<String>,
    pub channels: Vec<(usize, Channel)>,
}

impl PassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: None,
            chunks: Vec::new(),
            channels: Vec::new(),
        }
    }

    pub fn output(mut self, id: impl Into<OutputId>) -> Self {
        self.output = Some(id.into());
        self
    }

    pub fn chunk(mut self, code: impl Into<String>) -> Self {
        self.chunks.push(code.into());
        self
    }

    pub fn channel(mut self, index: usize, source: ChannelSource, sampler: SamplerOptions) -> Self {
        self.set_channel(index, source, sampler);
        self
    }

    /// Set a channel, replacing any earlier assignment of the same index.
    pub fn set_channel(&mut self, index: usize, source: ChannelSource, sampler: SamplerOptions) {
        self.channels.retain(|(existing, _)| *existing != index);
        self.channels.push((index, Channel::new(source, sampler)));
    }
}

impl From<String> for OutputId {
    fn from(value: String) -> Self {
        OutputId(value)
    }
}

/// A pass inside a [`crate::RenderGraph`].
#[derive(Debug)]
pub struct Pass {
    handle: PassHandle,
    name: String,
    output: Option<OutputId>,
    pub(crate) channels: [Channel; CHANNEL_COUNT],
    source: ShaderSource,
    pub(crate) program: Option<ProgramId>,
    pub(crate) uniforms: UniformTable,
}

impl Pass {
    pub(crate) fn new(
        handle: PassHandle,
        name: String,
        output: Option<OutputId>,
        channels: [Channel; CHANNEL_COUNT],
        source: ShaderSource,
    ) -> Self {
        Self {
            handle,
            name,
            output,
            channels,
            source,
            program: None,
            uniforms: UniformTable::default(),
        }
    }

    pub fn handle(&self) -> PassHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output(&self) -> Option<&OutputId> {
        self.output.as_ref()
    }

    /// The image pass is the one pass that publishes no output.
    pub fn is_image(&self) -> bool {
        self.output.is_none()
    }

    pub fn channels(&self) -> &[Channel; CHANNEL_COUNT] {
        &self.channels
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut Channel> {
        self.channels.get_mut(index)
    }

    pub fn source(&self) -> &ShaderSource {
        &self.source
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }
}
