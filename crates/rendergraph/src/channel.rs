use crate::backend::{SamplerType, TextureId, TextureUnit};
use crate::error::GraphError;
use crate::pass::{OutputId, PassHandle};

/// Every pass has exactly this many input channels.
pub const CHANNEL_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    None,
    Texture,
    Cubemap,
    Keyboard,
    Buffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
    Mipmap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    Clamp,
    #[default]
    Repeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerOptions {
    pub filter: FilterMode,
    pub wrap: WrapMode,
    /// Whether decoded image rows are flipped on load. Only image inputs use it.
    pub vflip: bool,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            filter: FilterMode::default(),
            wrap: WrapMode::default(),
            vflip: true,
        }
    }
}

impl SamplerOptions {
    pub fn nearest_clamp() -> Self {
        Self {
            filter: FilterMode::Nearest,
            wrap: WrapMode::Clamp,
            vflip: false,
        }
    }
}

/// Decoded image data: `channels` is 3 or 4, rows are stored bottom row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelData {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub bytes: Vec<u8>,
}

impl PixelData {
    pub fn new(width: u32, height: u32, channels: u8, bytes: Vec<u8>) -> Result<Self, GraphError> {
        if channels != 3 && channels != 4 {
            return Err(GraphError::UnsupportedInput {
                pass: String::new(),
                detail: format!("{channels}-channel images are not supported"),
            });
        }
        let expected = width as usize * height as usize * channels as usize;
        if bytes.len() != expected {
            return Err(GraphError::UnsupportedInput {
                pass: String::new(),
                detail: format!(
                    "{width}x{height}x{channels} image carries {} bytes, expected {expected}",
                    bytes.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            bytes,
        })
    }

    pub fn resolution(&self) -> [f32; 3] {
        [self.width as f32, self.height as f32, 1.0]
    }
}

/// A buffer channel starts out naming an output id and is rewritten to a pass
/// handle by [`crate::resolve_buffers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferSource {
    Unresolved(OutputId),
    Resolved(PassHandle),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSource {
    None,
    Texture(PixelData),
    /// Faces in +X, -X, +Y, -Y, +Z, -Z order, all the same size.
    Cubemap(Box<[PixelData; 6]>),
    Keyboard,
    Buffer(BufferSource),
}

impl ChannelSource {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelSource::None => ChannelKind::None,
            ChannelSource::Texture(_) => ChannelKind::Texture,
            ChannelSource::Cubemap(_) => ChannelKind::Cubemap,
            ChannelSource::Keyboard => ChannelKind::Keyboard,
            ChannelSource::Buffer(_) => ChannelKind::Buffer,
        }
    }
}

/// One of a pass's four inputs, plus the GPU state the driver attaches to it.
#[derive(Debug, Clone)]
pub struct Channel {
    pub source: ChannelSource,
    pub sampler: SamplerOptions,
    pub(crate) unit: Option<TextureUnit>,
    pub(crate) texture: Option<TextureId>,
    pub(crate) dirty: bool,
    pub(crate) resolution: [f32; 3],
}

impl Default for Channel {
    fn default() -> Self {
        Channel::new(ChannelSource::None, SamplerOptions::default())
    }
}

impl Channel {
    pub fn new(source: ChannelSource, sampler: SamplerOptions) -> Self {
        let resolution = match &source {
            ChannelSource::Texture(data) => data.resolution(),
            ChannelSource::Cubemap(faces) => faces[0].resolution(),
            _ => [0.0; 3],
        };
        let dirty = matches!(
            source,
            ChannelSource::Texture(_) | ChannelSource::Cubemap(_) | ChannelSource::Keyboard
        );
        Self {
            source,
            sampler,
            unit: None,
            texture: None,
            dirty,
            resolution,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.source.kind()
    }

    /// Keyboard state changes between frames without anyone marking it, so
    /// keyboard channels always report dirty.
    pub fn is_dirty(&self) -> bool {
        self.kind() == ChannelKind::Keyboard || self.dirty
    }

    /// Request a re-upload of the channel contents before the next draw.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn unit(&self) -> Option<TextureUnit> {
        self.unit
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    pub fn resolution(&self) -> [f32; 3] {
        self.resolution
    }

    pub fn sampler_type(&self) -> Option<SamplerType> {
        match self.kind() {
            ChannelKind::None => None,
            ChannelKind::Cubemap => Some(SamplerType::SamplerCube),
            _ => Some(SamplerType::Sampler2D),
        }
    }

    pub fn buffer_source(&self) -> Option<PassHandle> {
        match &self.source {
            ChannelSource::Buffer(BufferSource::Resolved(handle)) => Some(*handle),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_data_validates_layout() {
        assert!(PixelData::new(2, 2, 3, vec![0; 12]).is_ok());
        assert!(PixelData::new(2, 2, 4, vec![0; 12]).is_err());
        assert!(PixelData::new(2, 2, 1, vec![0; 4]).is_err());
    }

    #[test]
    fn keyboard_channels_are_always_dirty() {
        let mut keyboard = Channel::new(ChannelSource::Keyboard, SamplerOptions::nearest_clamp());
        keyboard.dirty = false;
        assert!(keyboard.is_dirty());

        let texture = PixelData::new(1, 1, 4, vec![1, 2, 3, 4]).unwrap();
        let mut image = Channel::new(ChannelSource::Texture(texture), SamplerOptions::default());
        assert!(image.is_dirty());
        image.dirty = false;
        assert!(!image.is_dirty());
        image.mark_dirty();
        assert!(image.is_dirty());
        assert_eq!(image.resolution(), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn sampler_type_follows_kind() {
        assert_eq!(Channel::default().sampler_type(), None);
        let buffer = Channel::new(
            ChannelSource::Buffer(BufferSource::Resolved(PassHandle(1))),
            SamplerOptions::default(),
        );
        assert_eq!(buffer.sampler_type(), Some(SamplerType::Sampler2D));
        assert_eq!(buffer.buffer_source(), Some(PassHandle(1)));
    }
}
