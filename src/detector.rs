use crate::error::Result;
use crate::frame::FrameBuffer;
use crate::landmark::KeypointFrame;

/// Per-frame detection outcome.
///
/// "No person found" is an expected per-frame result, not an error; the
/// pipeline counts it and moves on. Only detector-internal failures
/// (a broken model handle, a malformed frame) surface as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// A person was found; the full landmark set for the frame
    Pose(KeypointFrame),
    /// No person found in this frame
    NoDetection,
}

impl Detection {
    pub fn is_pose(&self) -> bool {
        matches!(self, Detection::Pose(_))
    }

    pub fn pose(&self) -> Option<&KeypointFrame> {
        match self {
            Detection::Pose(frame) => Some(frame),
            Detection::NoDetection => None,
        }
    }
}

/// Black-box pose model seam.
///
/// Implementations load model state once at construction. A single handle
/// is shared across concurrent sessions behind an `Arc` and torn down when
/// the last clone drops; sessions never hold model state of their own.
///
/// Within a session, `detect` must report the same fixed landmark id set
/// on every call — low-confidence points come back with a reduced
/// visibility score, never omitted.
pub trait PoseDetector: Send + Sync {
    fn detect(&self, frame: &FrameBuffer) -> Result<Detection>;
}
