use crate::config::DancemetricsConfig;
use crate::detector::PoseDetector;
use crate::error::{DancemetricsError, Result};
use crate::events::{EventBus, SessionEvent};
use crate::pipeline::{FrameSource, FrameStep, VideoAnalysisPipeline, VideoWriter};
use crate::report::AnalysisReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Envelope around a completed session's report.
///
/// Identity and wall-clock timing live here rather than in the report
/// itself, so the report stays a pure function of the keypoint sequence
/// and the configuration.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub report: AnalysisReport,
}

impl SessionRecord {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Drives one video through the pipeline from source to writer.
pub struct AnalysisSession {
    id: String,
    pipeline: VideoAnalysisPipeline,
    event_bus: Option<Arc<EventBus>>,
}

impl AnalysisSession {
    pub fn new(config: &DancemetricsConfig, detector: Arc<dyn PoseDetector>) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            pipeline: VideoAnalysisPipeline::new(config, detector)?,
            event_bus: None,
        })
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.pipeline = self.pipeline.with_cancellation(token);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn publish(&self, event: SessionEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Pull the source dry, one frame at a time, writing each processed
    /// frame in submission order, then finalize into a record.
    ///
    /// Returns `Ok(None)` when the session was cancelled; nothing is
    /// written out for an aborted session.
    pub fn run<S, W>(mut self, source: &mut S, writer: &mut W) -> Result<Option<SessionRecord>>
    where
        S: FrameSource,
        W: VideoWriter,
    {
        let started_at = Utc::now();
        let mut started_published = false;

        while let Some(frame) = source.next_frame()? {
            if !started_published {
                self.publish(SessionEvent::SessionStarted {
                    session_id: self.id.clone(),
                    frame_width: frame.width,
                    frame_height: frame.height,
                });
                started_published = true;
            }

            let outcome = match self.pipeline.process_frame(&frame)? {
                FrameStep::Processed(outcome) => outcome,
                FrameStep::Aborted => {
                    self.publish(SessionEvent::SessionAborted {
                        session_id: self.id.clone(),
                        frames_processed: self.pipeline.frame_count(),
                    });
                    return Ok(None);
                }
            };

            if outcome.detected {
                self.publish(SessionEvent::FrameProcessed {
                    frame_index: outcome.frame_index,
                    posture_score: outcome.metrics.as_ref().and_then(|m| m.posture_score),
                });
            } else {
                self.publish(SessionEvent::DetectionFailed {
                    frame_index: outcome.frame_index,
                });
            }

            writer.write_frame(&frame, outcome.annotated.as_ref())?;
        }

        let report = match self.pipeline.finish() {
            Ok(report) => report,
            Err(e) => {
                self.publish(SessionEvent::SessionFailed {
                    session_id: self.id.clone(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        writer.finalize()?;
        self.publish(SessionEvent::SessionCompleted {
            session_id: self.id.clone(),
            frame_count: report.frame_count,
            overall_stability: report.overall_stability,
        });

        Ok(Some(SessionRecord {
            session_id: self.id,
            started_at,
            completed_at: Utc::now(),
            report,
        }))
    }
}

/// Run a session on the blocking pool so the async side stays responsive
/// for event subscribers and signal handling
pub async fn run_session<S, W>(
    session: AnalysisSession,
    mut source: S,
    mut writer: W,
) -> Result<Option<SessionRecord>>
where
    S: FrameSource + Send + 'static,
    W: VideoWriter + Send + 'static,
{
    tokio::task::spawn_blocking(move || session.run(&mut source, &mut writer))
        .await
        .map_err(|e| DancemetricsError::system(format!("session task failed: {}", e)))?
}
