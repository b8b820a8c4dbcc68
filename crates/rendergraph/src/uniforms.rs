use crate::backend::{GpuBackend, ProgramId, UniformLocation};
use crate::channel::CHANNEL_COUNT;
use crate::error::GraphError;

/// Most uniforms a single program may expose to the driver.
pub const MAX_UNIFORMS: usize = 16;

/// Standard Shadertoy uniforms pushed before every draw. Channel samplers are
/// handled separately since their values are texture units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformName {
    Time,
    TimeDelta,
    Frame,
    Resolution,
    Mouse,
    Date,
    PixelScale,
    ChannelResolution,
}

impl UniformName {
    pub const ALL: [UniformName; 8] = [
        UniformName::Time,
        UniformName::TimeDelta,
        UniformName::Frame,
        UniformName::Resolution,
        UniformName::Mouse,
        UniformName::Date,
        UniformName::PixelScale,
        UniformName::ChannelResolution,
    ];

    pub fn glsl_name(self) -> &'static str {
        match self {
            UniformName::Time => "iTime",
            UniformName::TimeDelta => "iTimeDelta",
            UniformName::Frame => "iFrame",
            UniformName::Resolution => "iResolution",
            UniformName::Mouse => "iMouse",
            UniformName::Date => "iDate",
            UniformName::PixelScale => "iPixelScale",
            UniformName::ChannelResolution => "iChannelResolution",
        }
    }
}

/// Sampler uniform name for a channel index.
pub fn channel_uniform_name(index: usize) -> String {
    format!("iChannel{index}")
}

/// A uniform value as a component count plus flat data. Arrays carry
/// `components * len` values.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float { components: u8, values: Vec<f32> },
    Int { components: u8, values: Vec<i32> },
}

impl UniformValue {
    pub fn float(value: f32) -> Self {
        UniformValue::Float {
            components: 1,
            values: vec![value],
        }
    }

    pub fn vec(values: &[f32]) -> Self {
        UniformValue::Float {
            components: values.len() as u8,
            values: values.to_vec(),
        }
    }

    pub fn int(value: i32) -> Self {
        UniformValue::Int {
            components: 1,
            values: vec![value],
        }
    }
}

/// Single dispatch point from a tagged value to the backend setters.
pub fn upload(gpu: &mut dyn GpuBackend, location: UniformLocation, value: &UniformValue) {
    match value {
        UniformValue::Float { components, values } => {
            gpu.set_uniform_f32(location, *components, values)
        }
        UniformValue::Int { components, values } => gpu.set_uniform_i32(location, *components, values),
    }
}

/// Per-draw values, assembled from the playback state and the pass's channels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameUniforms {
    pub time: f32,
    pub time_delta: f32,
    pub frame: i32,
    pub resolution: [f32; 3],
    pub mouse: [f32; 4],
    pub date: [f32; 4],
    pub pixel_scale: [f32; 2],
    pub channel_resolution: [[f32; 3]; CHANNEL_COUNT],
}

impl FrameUniforms {
    pub fn value(&self, name: UniformName) -> UniformValue {
        match name {
            UniformName::Time => UniformValue::float(self.time),
            UniformName::TimeDelta => UniformValue::float(self.time_delta),
            UniformName::Frame => UniformValue::int(self.frame),
            UniformName::Resolution => UniformValue::vec(&self.resolution),
            UniformName::Mouse => UniformValue::vec(&self.mouse),
            UniformName::Date => UniformValue::vec(&self.date),
            UniformName::PixelScale => UniformValue::vec(&self.pixel_scale),
            UniformName::ChannelResolution => UniformValue::Float {
                components: 3,
                values: self.channel_resolution.iter().flatten().copied().collect(),
            },
        }
    }
}

/// Locations of the standard uniforms a program actually uses. Names the
/// compiler optimised away are simply absent.
#[derive(Debug, Clone, Default)]
pub struct UniformTable {
    entries: Vec<(UniformName, UniformLocation)>,
    channels: [Option<UniformLocation>; CHANNEL_COUNT],
}

impl UniformTable {
    pub fn resolve(
        gpu: &dyn GpuBackend,
        program: ProgramId,
        pass: &str,
    ) -> Result<Self, GraphError> {
        let mut table = UniformTable::default();
        for name in UniformName::ALL {
            if let Some(location) = gpu.uniform_location(program, name.glsl_name()) {
                table.insert(pass, name, location)?;
            }
        }
        for (index, slot) in table.channels.iter_mut().enumerate() {
            *slot = gpu.uniform_location(program, &channel_uniform_name(index));
        }
        Ok(table)
    }

    fn insert(
        &mut self,
        pass: &str,
        name: UniformName,
        location: UniformLocation,
    ) -> Result<(), GraphError> {
        if self.entries.len() >= MAX_UNIFORMS {
            return Err(GraphError::TooManyUniforms {
                pass: pass.to_string(),
                limit: MAX_UNIFORMS,
            });
        }
        self.entries.push((name, location));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn location(&self, name: UniformName) -> Option<UniformLocation> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, location)| *location)
    }

    pub fn channel_location(&self, index: usize) -> Option<UniformLocation> {
        self.channels.get(index).copied().flatten()
    }

    /// Push every resolved uniform. The caller has already made the program current.
    pub fn push(&self, gpu: &mut dyn GpuBackend, values: &FrameUniforms) {
        for (name, location) in &self.entries {
            upload(gpu, *location, &values.value(*name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_resolution_is_flattened_vec3_array() {
        let uniforms = FrameUniforms {
            channel_resolution: [[64.0, 32.0, 1.0], [0.0; 3], [256.0, 3.0, 1.0], [0.0; 3]],
            ..FrameUniforms::default()
        };
        match uniforms.value(UniformName::ChannelResolution) {
            UniformValue::Float { components, values } => {
                assert_eq!(components, 3);
                assert_eq!(values.len(), 12);
                assert_eq!(&values[6..9], &[256.0, 3.0, 1.0]);
            }
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn frame_is_an_integer_uniform() {
        let uniforms = FrameUniforms {
            frame: 42,
            ..FrameUniforms::default()
        };
        assert_eq!(uniforms.value(UniformName::Frame), UniformValue::int(42));
        assert_eq!(UniformName::Frame.glsl_name(), "iFrame");
    }

    #[test]
    fn table_is_capped() {
        let mut table = UniformTable::default();
        for i in 0..MAX_UNIFORMS {
            table
                .insert("Image", UniformName::Time, UniformLocation(i as u32))
                .unwrap();
        }
        assert!(matches!(
            table.insert("Image", UniformName::Time, UniformLocation(99)),
            Err(GraphError::TooManyUniforms { .. })
        ));
    }
}
