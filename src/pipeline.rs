use crate::analysis::geometry::{FrameMetrics, GeometryEngine};
use crate::analysis::stability::{RunningStats, StabilityTracker};
use crate::config::DancemetricsConfig;
use crate::detector::{Detection, PoseDetector};
use crate::error::{DancemetricsError, Result};
use crate::frame::FrameBuffer;
use crate::overlay::OverlayRenderer;
use crate::report::{AnalysisReport, PostureSummary};
use image::RgbImage;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Finalizing,
    Done,
    Failed,
}

/// Lazy, finite, non-restartable sequence of decoded frames.
///
/// The pipeline pulls; `Ok(None)` is the end-of-stream signal. Implemented
/// by the external video decoder.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<FrameBuffer>>;
}

/// Sink for processed frames in submission order.
///
/// `annotated` is present when overlay rendering is enabled and a pose was
/// found; otherwise the raw frame passes through unchanged. Implemented by
/// the external video encoder.
pub trait VideoWriter {
    fn write_frame(&mut self, frame: &FrameBuffer, annotated: Option<&RgbImage>) -> Result<()>;
    fn finalize(&mut self) -> Result<()>;
}

/// Result of submitting one frame to the pipeline
#[derive(Debug)]
pub enum FrameStep {
    Processed(FrameOutcome),
    /// The session was cancelled; accumulated state has been discarded
    Aborted,
}

/// What one per-frame step produced
#[derive(Debug)]
pub struct FrameOutcome {
    pub frame_index: u64,
    /// Whether a person was found in the frame
    pub detected: bool,
    pub metrics: Option<FrameMetrics>,
    pub annotated: Option<RgbImage>,
}

/// Orchestrates one video's analysis session.
///
/// Owns the session's stability state and accumulating report; frames must
/// be submitted in temporal order, exactly once each. Independent sessions
/// run in separate pipeline instances sharing nothing but the detector
/// handle.
pub struct VideoAnalysisPipeline {
    detector: Arc<dyn PoseDetector>,
    geometry: GeometryEngine,
    tracker: StabilityTracker,
    renderer: Option<OverlayRenderer>,
    posture_stats: RunningStats,
    state: SessionState,
    frame_count: u64,
    detection_failures: u64,
    max_detection_failure_fraction: f64,
    progress_log_interval: u64,
    cancellation: CancellationToken,
    report: Option<AnalysisReport>,
}

impl std::fmt::Debug for VideoAnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoAnalysisPipeline")
            .field("frame_count", &self.frame_count)
            .field("detection_failures", &self.detection_failures)
            .finish_non_exhaustive()
    }
}

impl VideoAnalysisPipeline {
    /// Create a pipeline for one session.
    ///
    /// The configuration is validated here, so a malformed angle or
    /// connection table rejects the session before any frame is processed.
    pub fn new(config: &DancemetricsConfig, detector: Arc<dyn PoseDetector>) -> Result<Self> {
        config.validate()?;

        let geometry = GeometryEngine::new(&config.analysis);
        let tracker = StabilityTracker::new(
            geometry.definitions().iter().map(|def| def.name.clone()),
            &config.analysis.stability_metric_weights,
        );
        let renderer = if config.pipeline.annotate {
            Some(OverlayRenderer::new(
                &config.overlay,
                config.analysis.visibility_threshold,
            )?)
        } else {
            None
        };

        Ok(Self {
            detector,
            geometry,
            tracker,
            renderer,
            posture_stats: RunningStats::new(),
            state: SessionState::Idle,
            frame_count: 0,
            detection_failures: 0,
            max_detection_failure_fraction: config.pipeline.max_detection_failure_fraction,
            progress_log_interval: config.pipeline.progress_log_interval,
            cancellation: CancellationToken::new(),
            report: None,
        })
    }

    /// Attach a cancellation token checked at the top of every per-frame step
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn detection_failures(&self) -> u64 {
        self.detection_failures
    }

    /// Run the per-frame step on the next frame of the session.
    ///
    /// A frame with no detected person increments the failure counter and
    /// passes through unprocessed; the session keeps going. Only detector
    /// failures and contract violations surface as errors.
    pub fn process_frame(&mut self, frame: &FrameBuffer) -> Result<FrameStep> {
        if self.cancellation.is_cancelled() {
            self.abort();
            return Ok(FrameStep::Aborted);
        }

        match self.state {
            SessionState::Idle => {
                info!(
                    "Session started: {}x{} frames",
                    frame.width, frame.height
                );
                self.state = SessionState::Running;
            }
            SessionState::Running => {}
            other => {
                return Err(DancemetricsError::SessionMisuse {
                    details: format!("frame submitted in {:?} state", other),
                });
            }
        }

        self.frame_count += 1;
        if self.frame_count % self.progress_log_interval == 0 {
            info!("Processed {} frames...", self.frame_count);
        }

        let outcome = match self.detector.detect(frame)? {
            Detection::NoDetection => {
                self.detection_failures += 1;
                debug!("No person detected in frame {}", frame.index);
                FrameOutcome {
                    frame_index: frame.index,
                    detected: false,
                    metrics: None,
                    annotated: None,
                }
            }
            Detection::Pose(keypoints) => {
                let metrics = self.geometry.measure(frame.index, &keypoints);
                self.tracker.update(&metrics)?;
                if let Some(score) = metrics.posture_score {
                    self.posture_stats.update(score);
                }

                let annotated = match &self.renderer {
                    Some(renderer) => Some(renderer.render(frame, &keypoints, Some(&metrics))?),
                    None => None,
                };

                FrameOutcome {
                    frame_index: frame.index,
                    detected: true,
                    metrics: Some(metrics),
                    annotated,
                }
            }
        };

        Ok(FrameStep::Processed(outcome))
    }

    /// End-of-stream signal: finalize the session into a report.
    ///
    /// Fails the session instead when the detection-failure fraction ended
    /// above the configured maximum, or when no frame produced a detection
    /// at all — a report from such a session would be misleading. Calling
    /// again after `Done` returns the cached report.
    pub fn finish(&mut self) -> Result<AnalysisReport> {
        match self.state {
            SessionState::Running => {}
            SessionState::Done => {
                if let Some(report) = &self.report {
                    return Ok(report.clone());
                }
                return Err(DancemetricsError::session_misuse(
                    "finished session lost its report",
                ));
            }
            SessionState::Idle => {
                return Err(DancemetricsError::session_misuse(
                    "finalize before any frame was processed",
                ));
            }
            other => {
                return Err(DancemetricsError::SessionMisuse {
                    details: format!("finalize in {:?} state", other),
                });
            }
        }

        self.state = SessionState::Finalizing;

        let observed = self.detection_failures as f64 / self.frame_count as f64;
        let detected = self.frame_count - self.detection_failures;
        if observed > self.max_detection_failure_fraction || detected == 0 {
            warn!(
                "Session failed: detection-failure fraction {:.2} (allowed {:.2}, {} of {} frames detected)",
                observed, self.max_detection_failure_fraction, detected, self.frame_count
            );
            self.state = SessionState::Failed;
            return Err(DancemetricsError::LowDetectionRate {
                threshold: self.max_detection_failure_fraction,
                observed,
            });
        }

        let summary = self.tracker.finalize()?;
        let report = AnalysisReport::new(
            self.frame_count,
            self.detection_failures,
            summary,
            PostureSummary::from_stats(&self.posture_stats),
        );

        info!(
            "Session done: {} frames, {} detection failures, stability {:.1}",
            report.frame_count, report.detection_failures, report.overall_stability
        );

        self.report = Some(report.clone());
        self.state = SessionState::Done;
        Ok(report)
    }

    /// Abort the session between frames, discarding accumulated state.
    ///
    /// Nothing is written out for an aborted session; `finish` afterwards
    /// is a contract violation.
    pub fn abort(&mut self) {
        warn!(
            "Session aborted after {} frames; partial results discarded",
            self.frame_count
        );
        self.state = SessionState::Failed;
        self.report = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DancemetricsConfig;
    use crate::landmark::{KeypointFrame, Landmark, LandmarkId};
    use crate::trace::TraceDetector;

    fn knee_config() -> DancemetricsConfig {
        let mut config = DancemetricsConfig::default();
        config.analysis.angle_definitions = vec![crate::analysis::geometry::AngleDefinition::new(
            "knee_angle",
            LandmarkId::LeftHip,
            LandmarkId::LeftKnee,
            LandmarkId::LeftAnkle,
            160.0,
        )];
        config.pipeline.annotate = false;
        config
    }

    /// Keypoint frame whose knee angle measures exactly `degrees`
    fn knee_pose(degrees: f64) -> Detection {
        let bend = degrees.to_radians();
        let mut keypoints = KeypointFrame::empty();
        keypoints.set(LandmarkId::LeftHip, Landmark::new(0.5, 0.2, 0.0, 1.0));
        keypoints.set(LandmarkId::LeftKnee, Landmark::new(0.5, 0.5, 0.0, 1.0));
        keypoints.set(
            LandmarkId::LeftAnkle,
            Landmark::new(0.5 - 0.3 * bend.sin(), 0.5 - 0.3 * bend.cos(), 0.0, 1.0),
        );
        Detection::Pose(keypoints)
    }

    fn run_session(
        config: &DancemetricsConfig,
        detections: Vec<Detection>,
    ) -> Result<AnalysisReport> {
        let count = detections.len() as u64;
        let detector = Arc::new(TraceDetector::from_detections(detections));
        let mut pipeline = VideoAnalysisPipeline::new(config, detector)?;

        for index in 0..count {
            let frame = FrameBuffer::blank(index, 64, 64);
            match pipeline.process_frame(&frame)? {
                FrameStep::Processed(_) => {}
                FrameStep::Aborted => panic!("unexpected abort"),
            }
        }
        pipeline.finish()
    }

    #[test]
    fn test_invalid_configuration_rejected_before_frames() {
        let mut config = knee_config();
        config.analysis.angle_definitions.clear();
        let detector = Arc::new(TraceDetector::from_detections(vec![]));

        let err = VideoAnalysisPipeline::new(&config, detector).unwrap_err();
        assert!(matches!(
            err,
            DancemetricsError::InvalidConfiguration { .. }
        ));
    }

    #[test]
    fn test_steady_session_beats_erratic_session() {
        let config = knee_config();
        let steady = run_session(
            &config,
            vec![knee_pose(90.0), knee_pose(100.0), knee_pose(95.0)],
        )
        .unwrap();
        let erratic = run_session(
            &config,
            vec![knee_pose(10.0), knee_pose(170.0), knee_pose(10.0)],
        )
        .unwrap();

        assert!(steady.overall_stability > erratic.overall_stability);
    }

    #[test]
    fn test_detection_failures_do_not_abort_the_session() {
        let config = knee_config();
        let report = run_session(
            &config,
            vec![
                knee_pose(90.0),
                Detection::NoDetection,
                knee_pose(100.0),
                knee_pose(95.0),
            ],
        )
        .unwrap();

        assert_eq!(report.frame_count, 4);
        assert_eq!(report.detection_failures, 1);
        assert_eq!(report.metrics["knee_angle"].count, 3);
    }

    #[test]
    fn test_low_detection_rate_fails_the_session() {
        // Scenario: 10 frames, 6 without a detection, allowed fraction 0.5
        let config = knee_config();
        let mut detections = vec![Detection::NoDetection; 6];
        detections.extend([
            knee_pose(90.0),
            knee_pose(91.0),
            knee_pose(92.0),
            knee_pose(93.0),
        ]);

        let err = run_session(&config, detections).unwrap_err();
        match err {
            DancemetricsError::LowDetectionRate {
                threshold,
                observed,
            } => {
                assert!((threshold - 0.5).abs() < 1e-9);
                assert!((observed - 0.6).abs() < 1e-9);
            }
            other => panic!("Unexpected error: {}", other),
        }
    }

    #[test]
    fn test_all_frames_failing_always_fails_the_session() {
        for threshold in [0.1, 0.5, 0.9] {
            let mut config = knee_config();
            config.pipeline.max_detection_failure_fraction = threshold;

            let err = run_session(&config, vec![Detection::NoDetection; 5]).unwrap_err();
            assert!(
                matches!(err, DancemetricsError::LowDetectionRate { .. }),
                "threshold {} should fail a fully undetected session",
                threshold
            );
        }
    }

    #[test]
    fn test_finish_before_any_frame_is_misuse() {
        let config = knee_config();
        let detector = Arc::new(TraceDetector::from_detections(vec![]));
        let mut pipeline = VideoAnalysisPipeline::new(&config, detector).unwrap();

        let err = pipeline.finish().unwrap_err();
        assert!(matches!(err, DancemetricsError::SessionMisuse { .. }));
    }

    #[test]
    fn test_frame_after_finish_is_misuse() {
        let config = knee_config();
        let detector = Arc::new(TraceDetector::from_detections(vec![knee_pose(90.0)]));
        let mut pipeline = VideoAnalysisPipeline::new(&config, detector).unwrap();

        let frame = FrameBuffer::blank(0, 64, 64);
        pipeline.process_frame(&frame).unwrap();
        pipeline.finish().unwrap();

        let err = pipeline
            .process_frame(&FrameBuffer::blank(1, 64, 64))
            .unwrap_err();
        assert!(matches!(err, DancemetricsError::SessionMisuse { .. }));
    }

    #[test]
    fn test_finish_twice_returns_cached_report() {
        let config = knee_config();
        let detector = Arc::new(TraceDetector::from_detections(vec![
            knee_pose(90.0),
            knee_pose(100.0),
        ]));
        let mut pipeline = VideoAnalysisPipeline::new(&config, detector).unwrap();

        for index in 0..2 {
            pipeline
                .process_frame(&FrameBuffer::blank(index, 64, 64))
                .unwrap();
        }

        let first = pipeline.finish().unwrap();
        let second = pipeline.finish().unwrap();
        assert_eq!(first, second);
        assert_eq!(pipeline.state(), SessionState::Done);
    }

    #[test]
    fn test_identical_sessions_produce_identical_reports() {
        let config = knee_config();
        let detections = vec![
            knee_pose(90.0),
            Detection::NoDetection,
            knee_pose(100.0),
            knee_pose(95.0),
        ];

        let a = run_session(&config, detections.clone()).unwrap();
        let b = run_session(&config, detections).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cancellation_aborts_between_frames() {
        let config = knee_config();
        let detector = Arc::new(TraceDetector::from_detections(vec![
            knee_pose(90.0),
            knee_pose(100.0),
        ]));
        let token = CancellationToken::new();
        let mut pipeline = VideoAnalysisPipeline::new(&config, detector)
            .unwrap()
            .with_cancellation(token.clone());

        pipeline
            .process_frame(&FrameBuffer::blank(0, 64, 64))
            .unwrap();

        token.cancel();
        match pipeline.process_frame(&FrameBuffer::blank(1, 64, 64)).unwrap() {
            FrameStep::Aborted => {}
            FrameStep::Processed(_) => panic!("expected abort"),
        }
        assert_eq!(pipeline.state(), SessionState::Failed);
        assert!(pipeline.finish().is_err());
    }

    #[test]
    fn test_undefined_measurement_excluded_but_session_continues() {
        // Scenario: ankle visibility below threshold makes the knee angle
        // undefined for that frame without failing anything
        let config = knee_config();

        let mut gated = KeypointFrame::empty();
        gated.set(LandmarkId::LeftHip, Landmark::new(0.25, 0.25, 0.0, 0.9));
        gated.set(LandmarkId::LeftKnee, Landmark::new(0.25, 0.75, 0.0, 0.9));
        gated.set(LandmarkId::LeftAnkle, Landmark::new(0.75, 0.75, 0.0, 0.1));

        let report = run_session(
            &config,
            vec![knee_pose(90.0), Detection::Pose(gated), knee_pose(100.0)],
        )
        .unwrap();

        assert_eq!(report.frame_count, 3);
        assert_eq!(report.detection_failures, 0);
        // Only the two fully visible frames contribute to the metric
        assert_eq!(report.metrics["knee_angle"].count, 2);
    }
}
