use bytemuck::{Pod, Zeroable};
use rendergraph::{UniformLocation, CHANNEL_COUNT};

/// std140 mirror of the `ToyUniforms` block declared by the fragment prelude.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub(crate) struct UniformBlock {
    pub resolution: [f32; 3],
    pub time: f32,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
    pub pixel_scale: [f32; 2],
    pub time_delta: f32,
    pub frame: i32,
    /// vec3 array elements are padded to 16 bytes under std140.
    pub channel_resolution: [[f32; 4]; CHANNEL_COUNT],
}

/// A named uniform's slot: a block field or a channel sampler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Field {
    Resolution,
    Time,
    TimeDelta,
    Frame,
    Mouse,
    Date,
    PixelScale,
    ChannelResolution,
    Channel(usize),
}

const FIELDS: [(&str, Field); 12] = [
    ("iResolution", Field::Resolution),
    ("iTime", Field::Time),
    ("iTimeDelta", Field::TimeDelta),
    ("iFrame", Field::Frame),
    ("iMouse", Field::Mouse),
    ("iDate", Field::Date),
    ("iPixelScale", Field::PixelScale),
    ("iChannelResolution", Field::ChannelResolution),
    ("iChannel0", Field::Channel(0)),
    ("iChannel1", Field::Channel(1)),
    ("iChannel2", Field::Channel(2)),
    ("iChannel3", Field::Channel(3)),
];

pub(crate) fn location_of(name: &str) -> Option<UniformLocation> {
    FIELDS
        .iter()
        .position(|(candidate, _)| *candidate == name)
        .map(|index| UniformLocation(index as u32))
}

pub(crate) fn field_at(location: UniformLocation) -> Option<Field> {
    FIELDS.get(location.0 as usize).map(|(_, field)| *field)
}

fn copy(dst: &mut [f32], values: &[f32]) {
    let n = dst.len().min(values.len());
    dst[..n].copy_from_slice(&values[..n]);
}

impl UniformBlock {
    /// Store float data for `field`. Returns false for fields that are not floats.
    pub fn set_f32(&mut self, field: Field, values: &[f32]) -> bool {
        match field {
            Field::Resolution => copy(&mut self.resolution, values),
            Field::Time => copy(std::slice::from_mut(&mut self.time), values),
            Field::TimeDelta => copy(std::slice::from_mut(&mut self.time_delta), values),
            Field::Mouse => copy(&mut self.mouse, values),
            Field::Date => copy(&mut self.date, values),
            Field::PixelScale => copy(&mut self.pixel_scale, values),
            Field::ChannelResolution => {
                for (slot, chunk) in self.channel_resolution.iter_mut().zip(values.chunks(3)) {
                    copy(&mut slot[..3], chunk);
                }
            }
            Field::Frame | Field::Channel(_) => return false,
        }
        true
    }

    pub fn set_frame(&mut self, frame: i32) {
        self.frame = frame;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_matches_std140_layout() {
        assert_eq!(std::mem::size_of::<UniformBlock>(), 128);
        assert_eq!(std::mem::offset_of!(UniformBlock, time), 12);
        assert_eq!(std::mem::offset_of!(UniformBlock, mouse), 16);
        assert_eq!(std::mem::offset_of!(UniformBlock, pixel_scale), 48);
        assert_eq!(std::mem::offset_of!(UniformBlock, frame), 60);
        assert_eq!(std::mem::offset_of!(UniformBlock, channel_resolution), 64);
    }

    #[test]
    fn channel_resolution_is_strided() {
        let mut block = UniformBlock::default();
        let flat = [1.0, 2.0, 1.0, 3.0, 4.0, 1.0, 0.0, 0.0, 0.0, 5.0, 6.0, 1.0];
        assert!(block.set_f32(Field::ChannelResolution, &flat));
        assert_eq!(block.channel_resolution[1], [3.0, 4.0, 1.0, 0.0]);
        assert_eq!(block.channel_resolution[3], [5.0, 6.0, 1.0, 0.0]);
    }

    #[test]
    fn names_resolve_to_fields() {
        let location = location_of("iChannel2").unwrap();
        assert_eq!(field_at(location), Some(Field::Channel(2)));
        assert_eq!(field_at(location_of("iFrame").unwrap()), Some(Field::Frame));
        assert!(location_of("iSampleRate").is_none());
    }
}
