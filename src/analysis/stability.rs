use crate::analysis::geometry::FrameMetrics;
use crate::error::{DancemetricsError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Standard deviation (degrees) at which a metric's stability score is 50
const STABILITY_HALF_SCORE_SIGMA: f64 = 15.0;

/// Online running statistics over a stream of values.
///
/// Mean and variance use Welford's algorithm, so memory stays constant no
/// matter how many values arrive. Variance is the population variance
/// (`m2 / count`).
#[derive(Debug, Clone)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    pub fn variance(&self) -> Option<f64> {
        (self.count > 0).then(|| self.m2 / self.count as f64)
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Finalized statistics for one tracked metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricStability {
    /// Frames on which the metric was defined
    pub count: u64,
    pub mean: Option<f64>,
    pub variance: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// (0, 100]; `None` when the metric was never defined
    pub stability: Option<f64>,
}

/// Finalized session-level stability result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilitySummary {
    pub metrics: BTreeMap<String, MetricStability>,
    /// Weighted stability across metrics with at least one sample, in [0, 100]
    pub overall_stability: f64,
    /// Frames consumed by the tracker (detected frames only)
    pub frames_consumed: u64,
}

/// Incrementally tracks per-metric statistics across a session.
///
/// Consumes one [`FrameMetrics`] per call in frame order; undefined
/// measurements are skipped without touching that metric's count. Memory
/// is bounded by the number of distinct metrics, never by video length.
pub struct StabilityTracker {
    /// Per-metric stats in definition order
    stats: Vec<(String, RunningStats)>,
    weights: HashMap<String, f64>,
    frames_consumed: u64,
    finalized: Option<StabilitySummary>,
}

impl StabilityTracker {
    /// Seed the tracker with the session's fixed metric name set
    pub fn new<I>(metric_names: I, weights: &HashMap<String, f64>) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            stats: metric_names
                .into_iter()
                .map(|name| (name, RunningStats::new()))
                .collect(),
            weights: weights.clone(),
            frames_consumed: 0,
            finalized: None,
        }
    }

    pub fn frames_consumed(&self) -> u64 {
        self.frames_consumed
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    /// Fold one frame's metrics into the running statistics
    pub fn update(&mut self, metrics: &FrameMetrics) -> Result<()> {
        if self.finalized.is_some() {
            return Err(DancemetricsError::session_misuse(
                "stability update after finalize",
            ));
        }

        for measurement in &metrics.angles {
            if let Some(value) = measurement.degrees {
                if let Some((_, stats)) = self
                    .stats
                    .iter_mut()
                    .find(|(name, _)| name == &measurement.name)
                {
                    stats.update(value);
                }
            }
        }

        self.frames_consumed += 1;
        debug!(
            "Stability tracker consumed frame {} ({} frames total)",
            metrics.frame_index, self.frames_consumed
        );
        Ok(())
    }

    /// Convert running statistics into the session stability summary.
    ///
    /// Idempotent: the first call computes and caches the summary, later
    /// calls return the cached value. Calling before any frame was
    /// consumed is a contract violation.
    pub fn finalize(&mut self) -> Result<StabilitySummary> {
        if let Some(summary) = &self.finalized {
            return Ok(summary.clone());
        }

        if self.frames_consumed == 0 {
            return Err(DancemetricsError::session_misuse(
                "stability finalize before any frame was consumed",
            ));
        }

        let mut metrics = BTreeMap::new();
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        for (name, stats) in &self.stats {
            let stability = stats.variance().map(stability_score);
            if let Some(score) = stability {
                let weight = self.weights.get(name).copied().unwrap_or(1.0);
                weighted_sum += weight * score;
                weight_total += weight;
            }

            metrics.insert(
                name.clone(),
                MetricStability {
                    count: stats.count(),
                    mean: stats.mean(),
                    variance: stats.variance(),
                    min: stats.min(),
                    max: stats.max(),
                    stability,
                },
            );
        }

        let overall_stability = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };

        let summary = StabilitySummary {
            metrics,
            overall_stability,
            frames_consumed: self.frames_consumed,
        };

        info!(
            "Stability finalized: overall {:.1} over {} frames",
            summary.overall_stability, summary.frames_consumed
        );

        self.finalized = Some(summary.clone());
        Ok(summary)
    }
}

/// Map a variance (degrees squared) to a stability score.
///
/// `100 / (1 + sigma / 15)`: strictly decreasing in the standard
/// deviation, bounded to (0, 100], and 50 at sigma = 15 degrees.
fn stability_score(variance: f64) -> f64 {
    100.0 / (1.0 + variance.sqrt() / STABILITY_HALF_SCORE_SIGMA)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::geometry::JointAngleMeasurement;

    fn knee_frame(frame_index: u64, degrees: Option<f64>) -> FrameMetrics {
        FrameMetrics {
            frame_index,
            angles: vec![JointAngleMeasurement {
                name: "knee_angle".to_string(),
                degrees,
            }],
            posture_score: None,
        }
    }

    fn knee_tracker() -> StabilityTracker {
        StabilityTracker::new(["knee_angle".to_string()], &HashMap::new())
    }

    #[test]
    fn test_welford_matches_direct_computation() {
        let values = [90.0, 100.0, 95.0, 102.5, 88.0];
        let mut stats = RunningStats::new();
        for v in values {
            stats.update(v);
        }

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

        assert_eq!(stats.count(), 5);
        assert!((stats.mean().unwrap() - mean).abs() < 1e-9);
        assert!((stats.variance().unwrap() - variance).abs() < 1e-9);
        assert_eq!(stats.min(), Some(88.0));
        assert_eq!(stats.max(), Some(102.5));
    }

    #[test]
    fn test_empty_stats_report_nothing() {
        let stats = RunningStats::new();
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.variance(), None);
        assert_eq!(stats.min(), None);
        assert_eq!(stats.max(), None);
    }

    #[test]
    fn test_order_independence_of_final_statistics() {
        let forward = [90.0, 100.0, 95.0, 102.5, 88.0];
        let shuffled = [88.0, 95.0, 102.5, 90.0, 100.0];

        let mut a = RunningStats::new();
        for v in forward {
            a.update(v);
        }
        let mut b = RunningStats::new();
        for v in shuffled {
            b.update(v);
        }

        assert!((a.mean().unwrap() - b.mean().unwrap()).abs() < 1e-9);
        assert!((a.variance().unwrap() - b.variance().unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_undefined_measurements_do_not_corrupt_counts() {
        let mut tracker = knee_tracker();
        tracker.update(&knee_frame(0, Some(90.0))).unwrap();
        tracker.update(&knee_frame(1, None)).unwrap();
        tracker.update(&knee_frame(2, Some(100.0))).unwrap();

        let summary = tracker.finalize().unwrap();
        let knee = &summary.metrics["knee_angle"];
        assert_eq!(knee.count, 2);
        assert_eq!(summary.frames_consumed, 3);
        assert!((knee.mean.unwrap() - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut tracker = knee_tracker();
        tracker.update(&knee_frame(0, Some(90.0))).unwrap();
        tracker.update(&knee_frame(1, Some(100.0))).unwrap();

        let first = tracker.finalize().unwrap();
        let second = tracker.finalize().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_update_after_finalize_is_an_error() {
        let mut tracker = knee_tracker();
        tracker.update(&knee_frame(0, Some(90.0))).unwrap();
        tracker.finalize().unwrap();

        let err = tracker.update(&knee_frame(1, Some(91.0))).unwrap_err();
        assert!(matches!(err, DancemetricsError::SessionMisuse { .. }));
    }

    #[test]
    fn test_finalize_without_frames_is_an_error() {
        let mut tracker = knee_tracker();
        let err = tracker.finalize().unwrap_err();
        assert!(matches!(err, DancemetricsError::SessionMisuse { .. }));
    }

    #[test]
    fn test_steadier_movement_scores_higher() {
        let mut steady = knee_tracker();
        for (i, v) in [90.0, 100.0, 95.0].into_iter().enumerate() {
            steady.update(&knee_frame(i as u64, Some(v))).unwrap();
        }

        let mut erratic = knee_tracker();
        for (i, v) in [10.0, 170.0, 10.0].into_iter().enumerate() {
            erratic.update(&knee_frame(i as u64, Some(v))).unwrap();
        }

        let steady_score = steady.finalize().unwrap().overall_stability;
        let erratic_score = erratic.finalize().unwrap().overall_stability;
        assert!(
            steady_score > erratic_score,
            "steady {} should beat erratic {}",
            steady_score,
            erratic_score
        );
    }

    #[test]
    fn test_never_defined_metric_excluded_from_overall() {
        let mut tracker = StabilityTracker::new(
            ["knee_angle".to_string(), "elbow_angle".to_string()],
            &HashMap::new(),
        );
        tracker.update(&knee_frame(0, Some(90.0))).unwrap();
        tracker.update(&knee_frame(1, Some(92.0))).unwrap();

        let summary = tracker.finalize().unwrap();
        assert_eq!(summary.metrics["elbow_angle"].stability, None);
        let knee_stability = summary.metrics["knee_angle"].stability.unwrap();
        assert!((summary.overall_stability - knee_stability).abs() < 1e-9);
    }

    #[test]
    fn test_metric_weights_shift_overall_score() {
        let mut weights = HashMap::new();
        weights.insert("a".to_string(), 3.0);
        weights.insert("b".to_string(), 1.0);

        let mut tracker =
            StabilityTracker::new(["a".to_string(), "b".to_string()], &weights);
        for i in 0..3u64 {
            tracker
                .update(&FrameMetrics {
                    frame_index: i,
                    angles: vec![
                        JointAngleMeasurement {
                            name: "a".to_string(),
                            degrees: Some(90.0),
                        },
                        JointAngleMeasurement {
                            name: "b".to_string(),
                            degrees: Some(if i % 2 == 0 { 10.0 } else { 170.0 }),
                        },
                    ],
                    posture_score: None,
                })
                .unwrap();
        }

        let summary = tracker.finalize().unwrap();
        let a = summary.metrics["a"].stability.unwrap();
        let b = summary.metrics["b"].stability.unwrap();
        let expected = (3.0 * a + b) / 4.0;
        assert!((summary.overall_stability - expected).abs() < 1e-9);
        // Weighted toward the steadier metric
        assert!(summary.overall_stability > (a + b) / 2.0);
    }
}
