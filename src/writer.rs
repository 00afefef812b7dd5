use crate::error::{DancemetricsError, Result};
use crate::frame::FrameBuffer;
use crate::pipeline::VideoWriter;
use image::{ImageFormat, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes processed frames as a numbered JPEG sequence.
///
/// Container muxing is an external concern; the sequence plus the report
/// JSON is the complete session output this crate produces.
pub struct ImageSequenceWriter {
    dir: PathBuf,
    frames_written: u64,
}

impl ImageSequenceWriter {
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Writing annotated frames to {}", dir.display());
        Ok(Self {
            dir,
            frames_written: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.jpg", index))
    }
}

impl VideoWriter for ImageSequenceWriter {
    fn write_frame(&mut self, frame: &FrameBuffer, annotated: Option<&RgbImage>) -> Result<()> {
        let path = self.frame_path(frame.index);
        let save = |img: &RgbImage| {
            img.save_with_format(&path, ImageFormat::Jpeg).map_err(|e| {
                DancemetricsError::render(format!(
                    "Failed to encode frame {} to {}: {}",
                    frame.index,
                    path.display(),
                    e
                ))
            })
        };

        match annotated {
            Some(img) => save(img)?,
            None => save(&frame.to_rgb_image()?)?,
        }

        self.frames_written += 1;
        debug!("Wrote frame {} to {}", frame.index, path.display());
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        info!(
            "Frame sequence complete: {} frames in {}",
            self.frames_written,
            self.dir.display()
        );
        Ok(())
    }
}

/// Drops every frame; for sessions that only need the report
#[derive(Debug, Default)]
pub struct DiscardWriter {
    frames_discarded: u64,
}

impl DiscardWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_discarded(&self) -> u64 {
        self.frames_discarded
    }
}

impl VideoWriter for DiscardWriter {
    fn write_frame(&mut self, _frame: &FrameBuffer, _annotated: Option<&RgbImage>) -> Result<()> {
        self.frames_discarded += 1;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}
