use crate::config::AnalysisConfig;
use crate::landmark::{KeypointFrame, Landmark, LandmarkId};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Vectors shorter than this are treated as degenerate (coincident landmarks)
const MIN_VECTOR_MAGNITUDE: f64 = 1e-6;

/// A named vertex angle: the angle at `vertex` between the rays toward
/// `point_a` and `point_b`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleDefinition {
    pub name: String,
    pub point_a: LandmarkId,
    pub vertex: LandmarkId,
    pub point_b: LandmarkId,
    /// Reference angle the posture score measures deviation against
    #[serde(default = "default_target_degrees")]
    pub target_degrees: f64,
}

fn default_target_degrees() -> f64 {
    90.0
}

impl AngleDefinition {
    pub fn new(
        name: &str,
        point_a: LandmarkId,
        vertex: LandmarkId,
        point_b: LandmarkId,
        target_degrees: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            point_a,
            vertex,
            point_b,
            target_degrees,
        }
    }
}

/// One measured joint angle for one frame.
///
/// `degrees` is `None` when the measurement is undefined: a participating
/// landmark fell below the visibility threshold, or the geometry was
/// degenerate. Undefined measurements are excluded from the posture score
/// and from stability tracking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointAngleMeasurement {
    pub name: String,
    /// Angle in degrees within [0, 180]
    pub degrees: Option<f64>,
}

impl JointAngleMeasurement {
    pub fn is_defined(&self) -> bool {
        self.degrees.is_some()
    }
}

/// All measurements plus the posture score for one frame.
///
/// Transient: folded into the stability tracker and the report, then
/// discarded (kept only as long as the same frame's overlay needs it).
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetrics {
    pub frame_index: u64,
    /// Measurements in angle-definition order
    pub angles: Vec<JointAngleMeasurement>,
    /// Posture quality in [0, 100]; `None` when too many measurements were
    /// undefined to score the frame honestly
    pub posture_score: Option<f64>,
}

impl FrameMetrics {
    pub fn defined_count(&self) -> usize {
        self.angles.iter().filter(|m| m.is_defined()).count()
    }
}

/// Computes joint angles and the posture score from a keypoint frame.
pub struct GeometryEngine {
    definitions: Vec<AngleDefinition>,
    /// Posture-score weight per definition, aligned with `definitions`
    weights: Vec<f64>,
    visibility_threshold: f64,
    max_undefined_fraction: f64,
}

impl GeometryEngine {
    /// Build an engine from a validated analysis configuration
    pub fn new(config: &AnalysisConfig) -> Self {
        let weights = config
            .angle_definitions
            .iter()
            .map(|def| config.angle_weights.get(&def.name).copied().unwrap_or(1.0))
            .collect();

        Self {
            definitions: config.angle_definitions.clone(),
            weights,
            visibility_threshold: config.visibility_threshold,
            max_undefined_fraction: config.max_undefined_fraction,
        }
    }

    pub fn definitions(&self) -> &[AngleDefinition] {
        &self.definitions
    }

    /// Measure every configured angle on one keypoint frame
    pub fn measure(&self, frame_index: u64, keypoints: &KeypointFrame) -> FrameMetrics {
        let angles: Vec<JointAngleMeasurement> = self
            .definitions
            .iter()
            .map(|def| {
                let degrees = self.measure_angle(def, keypoints);
                trace!(
                    "frame {}: {} = {:?}",
                    frame_index,
                    def.name,
                    degrees
                );
                JointAngleMeasurement {
                    name: def.name.clone(),
                    degrees,
                }
            })
            .collect();

        let posture_score = self.posture_score(&angles);

        FrameMetrics {
            frame_index,
            angles,
            posture_score,
        }
    }

    fn measure_angle(&self, def: &AngleDefinition, keypoints: &KeypointFrame) -> Option<f64> {
        let a = keypoints.get(def.point_a);
        let v = keypoints.get(def.vertex);
        let b = keypoints.get(def.point_b);

        let visible = |lm: &Landmark| lm.is_visible(self.visibility_threshold);
        if !visible(a) || !visible(v) || !visible(b) {
            return None;
        }

        vertex_angle(a, v, b)
    }

    /// Weighted closeness of each defined angle to its target, scaled to
    /// [0, 100]. Frames with too many undefined measurements get no score
    /// rather than a misleading low one.
    fn posture_score(&self, angles: &[JointAngleMeasurement]) -> Option<f64> {
        if angles.is_empty() {
            return None;
        }

        let undefined = angles.iter().filter(|m| !m.is_defined()).count();
        let undefined_fraction = undefined as f64 / angles.len() as f64;
        if undefined_fraction > self.max_undefined_fraction {
            return None;
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (measurement, (def, weight)) in angles
            .iter()
            .zip(self.definitions.iter().zip(self.weights.iter()))
        {
            if let Some(degrees) = measurement.degrees {
                let deviation = (degrees - def.target_degrees).abs().min(180.0);
                weighted_sum += weight * (1.0 - deviation / 180.0);
                weight_total += weight;
            }
        }

        if weight_total == 0.0 {
            return None;
        }

        Some(100.0 * weighted_sum / weight_total)
    }
}

/// Angle at `v` between the rays toward `a` and `b`, in degrees.
///
/// Uses only the (x, y) coordinates. The cosine is clamped to [-1, 1]
/// before the arccosine to absorb floating-point drift, so the result is
/// always within [0, 180]. A zero-length ray yields `None`.
fn vertex_angle(a: &Landmark, v: &Landmark, b: &Landmark) -> Option<f64> {
    let (ax, ay) = (a.x - v.x, a.y - v.y);
    let (bx, by) = (b.x - v.x, b.y - v.y);

    let mag_a = (ax * ax + ay * ay).sqrt();
    let mag_b = (bx * bx + by * by).sqrt();
    if mag_a < MIN_VECTOR_MAGNITUDE || mag_b < MIN_VECTOR_MAGNITUDE {
        return None;
    }

    let cos_angle = ((ax * bx + ay * by) / (mag_a * mag_b)).clamp(-1.0, 1.0);
    Some(cos_angle.acos().to_degrees())
}
