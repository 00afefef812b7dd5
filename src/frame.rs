use crate::error::{DancemetricsError, Result};
use image::RgbImage;
use std::sync::Arc;

/// One decoded video frame as raw RGB24 pixel data.
///
/// Container decode happens upstream; the pipeline only ever sees raw
/// frames. The pixel data is shared via `Arc` so a frame can be handed to
/// the detector, the overlay renderer, and the video writer without copies.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    /// Position of this frame in the video, starting at 0
    pub index: u64,
    /// Raw RGB24 bytes, row-major, 3 bytes per pixel
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl FrameBuffer {
    pub fn new(index: u64, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            index,
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Black frame of the given dimensions
    pub fn blank(index: u64, width: u32, height: u32) -> Self {
        Self::new(
            index,
            vec![0u8; width as usize * height as usize * 3],
            width,
            height,
        )
    }

    /// Expected byte length for the frame dimensions
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Validate the data length against the frame dimensions
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Copy the pixel data into an owned [`RgbImage`] for drawing
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.as_ref().clone()).ok_or_else(
            || {
                DancemetricsError::render(format!(
                    "frame {} has {} bytes, expected {} for {}x{} RGB24",
                    self.index,
                    self.data.len(),
                    self.expected_size(),
                    self.width,
                    self.height
                ))
            },
        )
    }
}
