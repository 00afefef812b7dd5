use crate::analysis::stability::{MetricStability, RunningStats, StabilitySummary};
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Posture-score statistics over the detected frames of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostureSummary {
    /// Frames that received a posture score
    pub count: u64,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl PostureSummary {
    pub fn from_stats(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            mean: stats.mean(),
            min: stats.min(),
            max: stats.max(),
        }
    }
}

/// Terminal aggregate of one completed session.
///
/// Created once at pipeline completion and read-only afterward. Fully
/// determined by the keypoint sequence and the configuration: two runs
/// over the same inputs produce identical reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    /// Total frames submitted, including detection failures
    pub frame_count: u64,
    /// Frames where no person was found
    pub detection_failures: u64,
    pub detection_failure_fraction: f64,
    /// Weighted session stability in [0, 100]
    pub overall_stability: f64,
    /// Flat per-metric mapping for the report consumer
    pub metrics: BTreeMap<String, MetricStability>,
    pub posture: PostureSummary,
}

impl AnalysisReport {
    pub fn new(
        frame_count: u64,
        detection_failures: u64,
        summary: StabilitySummary,
        posture: PostureSummary,
    ) -> Self {
        let detection_failure_fraction = if frame_count > 0 {
            detection_failures as f64 / frame_count as f64
        } else {
            0.0
        };

        Self {
            frame_count,
            detection_failures,
            detection_failure_fraction,
            overall_stability: summary.overall_stability,
            metrics: summary.metrics,
            posture,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_report() -> AnalysisReport {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "knee_angle".to_string(),
            MetricStability {
                count: 3,
                mean: Some(95.0),
                variance: Some(16.7),
                min: Some(90.0),
                max: Some(100.0),
                stability: Some(78.6),
            },
        );

        let summary = StabilitySummary {
            metrics,
            overall_stability: 78.6,
            frames_consumed: 3,
        };

        let mut posture_stats = RunningStats::new();
        for v in [88.0, 92.0, 90.0] {
            posture_stats.update(v);
        }

        AnalysisReport::new(4, 1, summary, PostureSummary::from_stats(&posture_stats))
    }

    #[test]
    fn test_failure_fraction() {
        let report = sample_report();
        assert_eq!(report.frame_count, 4);
        assert_eq!(report.detection_failures, 1);
        assert!((report.detection_failure_fraction - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_report_serializes_as_flat_metric_mapping() {
        let report = sample_report();
        let json = report.to_json_pretty().unwrap();

        let value: HashMap<String, serde_json::Value> = serde_json::from_str(&json).unwrap();
        let knee = &value["metrics"]["knee_angle"];
        assert_eq!(knee["count"], 3);
        assert_eq!(knee["mean"], 95.0);
        assert_eq!(knee["min"], 90.0);
        assert_eq!(knee["max"], 100.0);
        assert_eq!(value["posture"]["count"], 3);
        assert_eq!(value["overall_stability"], 78.6);
    }
}
