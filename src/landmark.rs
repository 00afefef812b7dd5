use serde::{Deserialize, Serialize};
use std::fmt;

/// Anatomical landmark identifiers for the fixed 17-point body keypoint set.
///
/// The id set is identical across every frame of a session; detectors report
/// low-confidence points with a reduced visibility score instead of omitting
/// them, so indexing stays stable for the whole video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkId {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl LandmarkId {
    /// Number of landmarks in the fixed id set
    pub const COUNT: usize = 17;

    /// All landmark ids in index order
    pub const ALL: [LandmarkId; LandmarkId::COUNT] = [
        LandmarkId::Nose,
        LandmarkId::LeftEye,
        LandmarkId::RightEye,
        LandmarkId::LeftEar,
        LandmarkId::RightEar,
        LandmarkId::LeftShoulder,
        LandmarkId::RightShoulder,
        LandmarkId::LeftElbow,
        LandmarkId::RightElbow,
        LandmarkId::LeftWrist,
        LandmarkId::RightWrist,
        LandmarkId::LeftHip,
        LandmarkId::RightHip,
        LandmarkId::LeftKnee,
        LandmarkId::RightKnee,
        LandmarkId::LeftAnkle,
        LandmarkId::RightAnkle,
    ];

    /// Stable array index of this landmark
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Landmark for a given array index, if in range
    pub fn from_index(index: usize) -> Option<LandmarkId> {
        LandmarkId::ALL.get(index).copied()
    }

    /// Snake_case name matching the serde representation
    pub fn name(&self) -> &'static str {
        match self {
            LandmarkId::Nose => "nose",
            LandmarkId::LeftEye => "left_eye",
            LandmarkId::RightEye => "right_eye",
            LandmarkId::LeftEar => "left_ear",
            LandmarkId::RightEar => "right_ear",
            LandmarkId::LeftShoulder => "left_shoulder",
            LandmarkId::RightShoulder => "right_shoulder",
            LandmarkId::LeftElbow => "left_elbow",
            LandmarkId::RightElbow => "right_elbow",
            LandmarkId::LeftWrist => "left_wrist",
            LandmarkId::RightWrist => "right_wrist",
            LandmarkId::LeftHip => "left_hip",
            LandmarkId::RightHip => "right_hip",
            LandmarkId::LeftKnee => "left_knee",
            LandmarkId::RightKnee => "right_knee",
            LandmarkId::LeftAnkle => "left_ankle",
            LandmarkId::RightAnkle => "right_ankle",
        }
    }
}

impl fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One detected body point with normalized coordinates and confidence.
///
/// Coordinates are in [0,1] relative to frame dimensions; `z` is the
/// detector's relative depth estimate. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Detection confidence in [0,1]
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64, visibility: f64) -> Self {
        Self { x, y, z, visibility }
    }

    /// Placeholder for a landmark the detector did not find this frame
    pub fn hidden() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            visibility: 0.0,
        }
    }

    /// Check whether this landmark passes the visibility threshold
    pub fn is_visible(&self, threshold: f64) -> bool {
        self.visibility >= threshold
    }

    /// Map normalized coordinates to pixel coordinates, rounded to the
    /// nearest pixel and clamped inside the frame
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f64).round() as i64;
        let py = (self.y * height as f64).round() as i64;
        (
            px.clamp(0, width.saturating_sub(1) as i64) as i32,
            py.clamp(0, height.saturating_sub(1) as i64) as i32,
        )
    }
}

/// The full landmark set for one video frame, indexed by [`LandmarkId`].
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointFrame {
    landmarks: [Landmark; LandmarkId::COUNT],
}

impl KeypointFrame {
    pub fn new(landmarks: [Landmark; LandmarkId::COUNT]) -> Self {
        Self { landmarks }
    }

    /// Frame with every landmark marked as not detected
    pub fn empty() -> Self {
        Self {
            landmarks: [Landmark::hidden(); LandmarkId::COUNT],
        }
    }

    pub fn get(&self, id: LandmarkId) -> &Landmark {
        &self.landmarks[id.index()]
    }

    pub fn set(&mut self, id: LandmarkId, landmark: Landmark) {
        self.landmarks[id.index()] = landmark;
    }

    /// Number of landmarks passing the visibility threshold
    pub fn visible_count(&self, threshold: f64) -> usize {
        self.landmarks
            .iter()
            .filter(|lm| lm.is_visible(threshold))
            .count()
    }

    /// Iterate landmarks in id order
    pub fn iter(&self) -> impl Iterator<Item = (LandmarkId, &Landmark)> {
        LandmarkId::ALL
            .iter()
            .copied()
            .zip(self.landmarks.iter())
    }
}
