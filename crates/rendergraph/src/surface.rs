//! Double-buffered offscreen surfaces for buffer passes.

use std::collections::HashMap;

use crate::backend::{
    check_gpu, Extent, FramebufferId, FramebufferStatus, GpuBackend, RenderTarget, TextureDesc,
    TextureFormat, TextureId, TextureShape, TextureUnit,
};
use crate::channel::SamplerOptions;
use crate::error::GraphError;
use crate::pass::PassHandle;

const TRANSPARENT_BLACK: [f32; 4] = [0.0; 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// The pass renders to the visible surface and owns nothing.
    None,
    /// Registered as a buffer pass, not yet allocated.
    Uninitialized,
    Ok,
    /// The window resized; reallocate before the next draw.
    BadSize,
}

/// Hands out texture units from a single global counter. Units are never
/// returned, so a unit stays bound to whatever took it for the whole run.
#[derive(Debug, Clone)]
pub struct TextureUnitAllocator {
    next: u32,
    limit: u32,
}

impl TextureUnitAllocator {
    pub fn new(limit: u32) -> Self {
        Self { next: 0, limit }
    }

    pub fn allocate(&mut self) -> Result<TextureUnit, GraphError> {
        if self.next >= self.limit {
            return Err(GraphError::TextureUnitsExhausted { limit: self.limit });
        }
        let unit = TextureUnit(self.next);
        self.next += 1;
        Ok(unit)
    }

    pub fn allocated(&self) -> u32 {
        self.next
    }
}

/// Two same-sized render targets. One holds the last completed write, the
/// other receives the next draw.
#[derive(Debug, Clone)]
pub struct SurfacePair {
    textures: [TextureId; 2],
    framebuffers: [FramebufferId; 2],
    units: [TextureUnit; 2],
    size: Extent,
    last_written: usize,
}

impl SurfacePair {
    pub fn size(&self) -> Extent {
        self.size
    }

    pub fn units(&self) -> [TextureUnit; 2] {
        self.units
    }

    pub fn last_written(&self) -> usize {
        self.last_written
    }

    pub fn read_texture(&self) -> TextureId {
        self.textures[self.last_written]
    }

    pub fn write_framebuffer(&self) -> FramebufferId {
        self.framebuffers[1 - self.last_written]
    }

    fn flip(&mut self) {
        self.last_written = 1 - self.last_written;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceRead {
    pub texture: TextureId,
    pub size: Extent,
}

/// Owns the offscreen surfaces and texture units of a render graph.
pub trait SurfaceLifecycle {
    /// Record whether a pass renders offscreen. Non-buffer passes stay at
    /// [`SurfaceStatus::None`] and never own surfaces.
    fn register(&mut self, pass: PassHandle, offscreen: bool);

    fn allocate_unit(&mut self) -> Result<TextureUnit, GraphError>;

    fn allocate(
        &mut self,
        gpu: &mut dyn GpuBackend,
        pass: PassHandle,
        label: &str,
        size: Extent,
    ) -> Result<(), GraphError>;

    /// Reallocate at `size`, keeping the overlapping rectangle of both
    /// surfaces and which of them was written last. The new pair takes two
    /// fresh units; the old ones are not reclaimed.
    fn resize(
        &mut self,
        gpu: &mut dyn GpuBackend,
        pass: PassHandle,
        label: &str,
        size: Extent,
    ) -> Result<(), GraphError>;

    fn release(&mut self, gpu: &mut dyn GpuBackend, pass: PassHandle);

    fn current_read(&self, pass: PassHandle) -> Option<SurfaceRead>;
    fn current_write(&self, pass: PassHandle) -> Option<FramebufferId>;
    fn flip(&mut self, pass: PassHandle);

    fn status(&self, pass: PassHandle) -> SurfaceStatus;
    fn mark_bad_size(&mut self, pass: PassHandle);
}

#[derive(Debug)]
struct Entry {
    status: SurfaceStatus,
    pair: Option<SurfacePair>,
}

/// Default [`SurfaceLifecycle`] keyed by pass handle.
#[derive(Debug)]
pub struct SurfaceTable {
    entries: HashMap<PassHandle, Entry>,
    units: TextureUnitAllocator,
}

impl SurfaceTable {
    pub fn new(max_units: u32) -> Self {
        Self {
            entries: HashMap::new(),
            units: TextureUnitAllocator::new(max_units),
        }
    }

    pub fn pair(&self, pass: PassHandle) -> Option<&SurfacePair> {
        self.entries.get(&pass).and_then(|entry| entry.pair.as_ref())
    }

    pub fn units_allocated(&self) -> u32 {
        self.units.allocated()
    }

    fn create_pair(
        &mut self,
        gpu: &mut dyn GpuBackend,
        label: &str,
        size: Extent,
    ) -> Result<SurfacePair, GraphError> {
        let units = [self.units.allocate()?, self.units.allocate()?];

        let mut textures = [TextureId(0); 2];
        let mut framebuffers = [FramebufferId(0); 2];
        for index in 0..2 {
            let texture = gpu
                .create_texture(&TextureDesc {
                    label,
                    shape: TextureShape::D2,
                    format: TextureFormat::RenderTarget,
                    size,
                    sampler: SamplerOptions::default(),
                })
                .map_err(|err| err.into_graph(format!("creating surface {index} of '{label}'")))?;
            let framebuffer = gpu
                .create_framebuffer(texture)
                .map_err(|err| err.into_graph(format!("creating framebuffer {index} of '{label}'")))?;
            if let FramebufferStatus::Incomplete(reason) = gpu.framebuffer_status(framebuffer) {
                return Err(GraphError::FramebufferIncomplete {
                    pass: label.to_string(),
                    index,
                    reason,
                });
            }
            gpu.clear(RenderTarget::Framebuffer(framebuffer), TRANSPARENT_BLACK);
            textures[index] = texture;
            framebuffers[index] = framebuffer;
        }
        check_gpu(gpu, "after allocating surfaces")?;

        Ok(SurfacePair {
            textures,
            framebuffers,
            units,
            size,
            last_written: 1,
        })
    }
}

fn destroy_pair(gpu: &mut dyn GpuBackend, pair: &SurfacePair) {
    for index in 0..2 {
        gpu.destroy_framebuffer(pair.framebuffers[index]);
        gpu.destroy_texture(pair.textures[index]);
    }
}

impl SurfaceLifecycle for SurfaceTable {
    fn register(&mut self, pass: PassHandle, offscreen: bool) {
        let status = if offscreen {
            SurfaceStatus::Uninitialized
        } else {
            SurfaceStatus::None
        };
        self.entries.insert(pass, Entry { status, pair: None });
    }

    fn allocate_unit(&mut self) -> Result<TextureUnit, GraphError> {
        self.units.allocate()
    }

    fn allocate(
        &mut self,
        gpu: &mut dyn GpuBackend,
        pass: PassHandle,
        label: &str,
        size: Extent,
    ) -> Result<(), GraphError> {
        if self.status(pass) != SurfaceStatus::Uninitialized {
            tracing::debug!(pass = label, "surface allocate skipped; not uninitialized");
            return Ok(());
        }
        let pair = self.create_pair(gpu, label, size)?;
        tracing::debug!(
            pass = label,
            width = size.width,
            height = size.height,
            units = ?pair.units,
            "allocated surfaces"
        );
        self.entries.insert(
            pass,
            Entry {
                status: SurfaceStatus::Ok,
                pair: Some(pair),
            },
        );
        Ok(())
    }

    fn resize(
        &mut self,
        gpu: &mut dyn GpuBackend,
        pass: PassHandle,
        label: &str,
        size: Extent,
    ) -> Result<(), GraphError> {
        let Some(old) = self.pair(pass).cloned() else {
            return self.allocate(gpu, pass, label, size);
        };

        let mut pair = self.create_pair(gpu, label, size)?;
        let overlap = old.size.min(size);
        for index in 0..2 {
            gpu.blit(old.framebuffers[index], pair.framebuffers[index], overlap);
        }
        pair.last_written = old.last_written;
        check_gpu(gpu, "after copying resized surfaces")?;
        destroy_pair(gpu, &old);

        tracing::debug!(
            pass = label,
            from = ?(old.size.width, old.size.height),
            to = ?(size.width, size.height),
            "resized surfaces"
        );
        self.entries.insert(
            pass,
            Entry {
                status: SurfaceStatus::Ok,
                pair: Some(pair),
            },
        );
        Ok(())
    }

    fn release(&mut self, gpu: &mut dyn GpuBackend, pass: PassHandle) {
        if let Some(entry) = self.entries.get_mut(&pass) {
            if let Some(pair) = entry.pair.take() {
                destroy_pair(gpu, &pair);
                entry.status = SurfaceStatus::Uninitialized;
            }
        }
    }

    fn current_read(&self, pass: PassHandle) -> Option<SurfaceRead> {
        self.pair(pass).map(|pair| SurfaceRead {
            texture: pair.read_texture(),
            size: pair.size,
        })
    }

    fn current_write(&self, pass: PassHandle) -> Option<FramebufferId> {
        self.pair(pass).map(SurfacePair::write_framebuffer)
    }

    fn flip(&mut self, pass: PassHandle) {
        if let Some(pair) = self.entries.get_mut(&pass).and_then(|entry| entry.pair.as_mut()) {
            pair.flip();
        }
    }

    fn status(&self, pass: PassHandle) -> SurfaceStatus {
        self.entries
            .get(&pass)
            .map(|entry| entry.status)
            .unwrap_or(SurfaceStatus::None)
    }

    fn mark_bad_size(&mut self, pass: PassHandle) {
        if let Some(entry) = self.entries.get_mut(&pass) {
            if entry.status == SurfaceStatus::Ok {
                entry.status = SurfaceStatus::BadSize;
            }
        }
    }
}
