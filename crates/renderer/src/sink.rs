use std::path::{Path, PathBuf};

use image::RgbImage;
use rendergraph::{CapturedFrame, FrameSink, GraphError};

/// Writes each captured frame as `frameNNNN.png` into a directory.
#[derive(Debug, Clone)]
pub struct PngSequenceSink {
    directory: PathBuf,
}

impl PngSequenceSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, index: u32) -> PathBuf {
        self.directory.join(format!("frame{index:04}.png"))
    }
}

impl FrameSink for PngSequenceSink {
    fn consume(&mut self, frame: CapturedFrame) -> Result<(), GraphError> {
        let path = self.path_for(frame.index);
        let image = RgbImage::from_raw(frame.width, frame.height, frame.rgb).ok_or_else(|| {
            GraphError::Sink(format!(
                "frame {} does not hold {}x{} RGB pixels",
                frame.index, frame.width, frame.height
            ))
        })?;
        image
            .save(&path)
            .map_err(|err| GraphError::Sink(format!("{}: {err}", path.display())))?;
        tracing::info!(path = %path.display(), "wrote {}", path.display());
        Ok(())
    }
}
