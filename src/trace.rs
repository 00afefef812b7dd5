//! File-backed stand-ins for the external pose model and video decoder.
//!
//! A keypoint trace is a JSON recording of per-frame detections. Playing
//! one back through [`TraceDetector`] drives the full pipeline without a
//! model or a video container, which is how the CLI binary and the
//! integration-style tests exercise the crate end-to-end.

use crate::detector::{Detection, PoseDetector};
use crate::error::Result;
use crate::frame::FrameBuffer;
use crate::landmark::{KeypointFrame, Landmark, LandmarkId};
use crate::pipeline::FrameSource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// On-disk keypoint trace: one entry per frame, `null` for frames where
/// the recording found no person
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeypointTrace {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<Option<TraceFrame>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceFrame {
    pub landmarks: Vec<TraceLandmark>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceLandmark {
    pub id: LandmarkId,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default = "default_visibility")]
    pub visibility: f64,
}

fn default_visibility() -> f64 {
    1.0
}

impl KeypointTrace {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let trace: KeypointTrace = serde_json::from_str(&raw)?;
        debug!(
            "Loaded keypoint trace: {} frames at {}x{}",
            trace.frames.len(),
            trace.width,
            trace.height
        );
        Ok(trace)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Plays a recorded keypoint trace back as if it were a live pose model.
///
/// Lookup is by frame index, so the detector is stateless and one handle
/// can serve any number of concurrent sessions. Landmarks the recording
/// does not mention come back with zero visibility, keeping the id set
/// identical on every frame. Frames past the end of the trace report
/// no detection.
pub struct TraceDetector {
    detections: Vec<Detection>,
}

impl TraceDetector {
    pub fn new(trace: &KeypointTrace) -> Self {
        let detections = trace
            .frames
            .iter()
            .map(|entry| match entry {
                Some(frame) => {
                    let mut keypoints = KeypointFrame::empty();
                    for lm in &frame.landmarks {
                        keypoints.set(lm.id, Landmark::new(lm.x, lm.y, lm.z, lm.visibility));
                    }
                    Detection::Pose(keypoints)
                }
                None => Detection::NoDetection,
            })
            .collect();

        Self { detections }
    }

    /// Detector over an explicit detection sequence
    pub fn from_detections(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl PoseDetector for TraceDetector {
    fn detect(&self, frame: &FrameBuffer) -> Result<Detection> {
        Ok(self
            .detections
            .get(frame.index as usize)
            .cloned()
            .unwrap_or(Detection::NoDetection))
    }
}

/// Produces a fixed number of blank frames, standing in for the external
/// decoder when only a keypoint trace is available
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    total: u64,
    next_index: u64,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32, total: u64) -> Self {
        Self {
            width,
            height,
            total,
            next_index: 0,
        }
    }
}

impl FrameSource for SyntheticFrameSource {
    fn next_frame(&mut self) -> Result<Option<FrameBuffer>> {
        if self.next_index >= self.total {
            return Ok(None);
        }
        let frame = FrameBuffer::blank(self.next_index, self.width, self.height);
        self.next_index += 1;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trace_json() -> &'static str {
        r#"{
            "width": 64,
            "height": 64,
            "frames": [
                {
                    "landmarks": [
                        {"id": "left_hip", "x": 0.5, "y": 0.2},
                        {"id": "left_knee", "x": 0.5, "y": 0.5, "visibility": 0.8},
                        {"id": "left_ankle", "x": 0.6, "y": 0.7, "z": 0.1}
                    ]
                },
                null
            ]
        }"#
    }

    #[test]
    fn test_trace_parsing_and_defaults() {
        let trace: KeypointTrace = serde_json::from_str(sample_trace_json()).unwrap();
        assert_eq!(trace.len(), 2);

        let frame = trace.frames[0].as_ref().unwrap();
        assert_eq!(frame.landmarks[0].id, LandmarkId::LeftHip);
        // Unspecified visibility defaults to fully visible
        assert_eq!(frame.landmarks[0].visibility, 1.0);
        assert_eq!(frame.landmarks[1].visibility, 0.8);
        assert_eq!(frame.landmarks[2].z, 0.1);
        assert!(trace.frames[1].is_none());
    }

    #[test]
    fn test_trace_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        fs::write(&path, sample_trace_json()).unwrap();

        let trace = KeypointTrace::load(&path).unwrap();
        assert_eq!(trace.width, 64);
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn test_detector_playback_by_frame_index() {
        let trace: KeypointTrace = serde_json::from_str(sample_trace_json()).unwrap();
        let detector = TraceDetector::new(&trace);

        let first = detector.detect(&FrameBuffer::blank(0, 64, 64)).unwrap();
        let pose = first.pose().unwrap();
        assert_eq!(pose.get(LandmarkId::LeftHip).x, 0.5);
        // Unrecorded landmarks are present but hidden
        assert_eq!(pose.get(LandmarkId::Nose).visibility, 0.0);

        let second = detector.detect(&FrameBuffer::blank(1, 64, 64)).unwrap();
        assert_eq!(second, Detection::NoDetection);

        // Past the end of the trace
        let past = detector.detect(&FrameBuffer::blank(9, 64, 64)).unwrap();
        assert_eq!(past, Detection::NoDetection);
    }

    #[test]
    fn test_synthetic_source_is_finite() {
        let mut source = SyntheticFrameSource::new(32, 16, 3);
        let mut indices = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert!(frame.validate_size());
            indices.push(frame.index);
        }
        assert_eq!(indices, vec![0, 1, 2]);
        // Non-restartable: stays exhausted
        assert!(source.next_frame().unwrap().is_none());
    }
}
