use crate::analysis::geometry::FrameMetrics;
use crate::config::OverlayConfig;
use crate::error::{DancemetricsError, Result};
use crate::frame::FrameBuffer;
use crate::landmark::{KeypointFrame, LandmarkId};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut};
use rusttype::{Font, Scale};
use std::fs;
use tracing::{debug, warn};

/// Draws the skeleton, landmark markers, and an optional metrics text block
/// onto video frames.
///
/// Rendering always produces a new buffer; the input frame is left
/// untouched so the raw bytes can still be handed to other consumers.
pub struct OverlayRenderer {
    connections: Vec<(LandmarkId, LandmarkId)>,
    visibility_threshold: f64,
    line_color: Rgb<u8>,
    marker_color: Rgb<u8>,
    marker_radius: i32,
    metrics_text: bool,
    font: Option<Font<'static>>,
    font_size: f32,
}

impl std::fmt::Debug for OverlayRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayRenderer")
            .field("visibility_threshold", &self.visibility_threshold)
            .field("metrics_text", &self.metrics_text)
            .finish_non_exhaustive()
    }
}

impl OverlayRenderer {
    pub fn new(config: &OverlayConfig, visibility_threshold: f64) -> Result<Self> {
        let font = if config.metrics_text {
            match &config.font_path {
                Some(path) => Some(load_font(path)?),
                None => {
                    warn!("Metrics text enabled but no overlay font configured; text disabled");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            connections: config.skeleton_connections.clone(),
            visibility_threshold,
            line_color: Rgb([
                config.line_color.0,
                config.line_color.1,
                config.line_color.2,
            ]),
            marker_color: Rgb([
                config.marker_color.0,
                config.marker_color.1,
                config.marker_color.2,
            ]),
            marker_radius: config.marker_radius,
            metrics_text: config.metrics_text,
            font,
            font_size: config.font_size,
        })
    }

    /// Render one annotated frame.
    ///
    /// A skeleton line is drawn only when both endpoints pass the
    /// visibility threshold; a marker only when its landmark does. This
    /// keeps low-confidence detections from producing spurious limbs.
    pub fn render(
        &self,
        frame: &FrameBuffer,
        keypoints: &KeypointFrame,
        metrics: Option<&FrameMetrics>,
    ) -> Result<RgbImage> {
        let mut img = frame.to_rgb_image()?;

        for (a, b) in &self.connections {
            let lm_a = keypoints.get(*a);
            let lm_b = keypoints.get(*b);
            if !lm_a.is_visible(self.visibility_threshold)
                || !lm_b.is_visible(self.visibility_threshold)
            {
                continue;
            }

            let (ax, ay) = lm_a.to_pixel(frame.width, frame.height);
            let (bx, by) = lm_b.to_pixel(frame.width, frame.height);
            draw_line_segment_mut(
                &mut img,
                (ax as f32, ay as f32),
                (bx as f32, by as f32),
                self.line_color,
            );
        }

        let mut markers = 0usize;
        for (_, landmark) in keypoints.iter() {
            if !landmark.is_visible(self.visibility_threshold) {
                continue;
            }
            let center = landmark.to_pixel(frame.width, frame.height);
            draw_filled_circle_mut(&mut img, center, self.marker_radius, self.marker_color);
            markers += 1;
        }
        debug!("frame {}: drew {} landmark markers", frame.index, markers);

        if self.metrics_text {
            if let (Some(font), Some(metrics)) = (&self.font, metrics) {
                self.draw_metrics_text(&mut img, metrics, font);
            }
        }

        Ok(img)
    }

    fn draw_metrics_text(&self, img: &mut RgbImage, metrics: &FrameMetrics, font: &Font<'_>) {
        let mut lines = vec![format!("frame {}", metrics.frame_index)];
        for measurement in &metrics.angles {
            match measurement.degrees {
                Some(degrees) => lines.push(format!("{}: {:.1} deg", measurement.name, degrees)),
                None => lines.push(format!("{}: --", measurement.name)),
            }
        }
        match metrics.posture_score {
            Some(score) => lines.push(format!("posture: {:.1}", score)),
            None => lines.push("posture: --".to_string()),
        }

        let scale = Scale::uniform(self.font_size);
        let line_height = (self.font_size * 1.25) as u32;
        let x: u32 = 10;
        let y: u32 = 10;

        // Darken a strip behind the text so it stays readable on any frame
        let strip_height = line_height * lines.len() as u32 + 10;
        let strip_width = (self.font_size * 14.0) as u32;
        for dy in 0..strip_height {
            for dx in 0..strip_width {
                let px = x.saturating_sub(5) + dx;
                let py = y.saturating_sub(5) + dy;
                if px < img.width() && py < img.height() {
                    let pixel = img.get_pixel(px, py);
                    img.put_pixel(
                        px,
                        py,
                        Rgb([pixel[0] / 3, pixel[1] / 3, pixel[2] / 3]),
                    );
                }
            }
        }

        for (i, line) in lines.iter().enumerate() {
            draw_text_mut(
                img,
                Rgb([255, 255, 255]),
                x as i32,
                (y + i as u32 * line_height) as i32,
                scale,
                font,
                line,
            );
        }
    }
}

fn load_font(path: &str) -> Result<Font<'static>> {
    let font_data = fs::read(path).map_err(|e| {
        DancemetricsError::render(format!("Failed to read font file '{}': {}", path, e))
    })?;

    Font::try_from_vec(font_data).ok_or_else(|| {
        DancemetricsError::render(format!("Failed to parse font file '{}'", path))
    })
}
