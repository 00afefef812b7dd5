pub mod analysis;
pub mod config;
pub mod detector;
pub mod error;
pub mod events;
pub mod frame;
pub mod landmark;
pub mod overlay;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod trace;
pub mod writer;

pub use analysis::geometry::{
    AngleDefinition, FrameMetrics, GeometryEngine, JointAngleMeasurement,
};
pub use analysis::stability::{
    MetricStability, RunningStats, StabilitySummary, StabilityTracker,
};
pub use config::{
    AnalysisConfig, DancemetricsConfig, OutputConfig, OverlayConfig, PipelineConfig, SystemConfig,
};
pub use detector::{Detection, PoseDetector};
pub use error::{DancemetricsError, Result};
pub use events::{EventBus, SessionEvent};
pub use frame::FrameBuffer;
pub use landmark::{KeypointFrame, Landmark, LandmarkId};
pub use overlay::OverlayRenderer;
pub use pipeline::{
    FrameOutcome, FrameSource, FrameStep, SessionState, VideoAnalysisPipeline, VideoWriter,
};
pub use report::{AnalysisReport, PostureSummary};
pub use session::{run_session, AnalysisSession, SessionRecord};
pub use trace::{KeypointTrace, SyntheticFrameSource, TraceDetector, TraceFrame, TraceLandmark};
pub use writer::{DiscardWriter, ImageSequenceWriter};
