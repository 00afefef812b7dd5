use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Progress events published while a session runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// First frame of a session entered the pipeline
    SessionStarted {
        session_id: String,
        frame_width: u32,
        frame_height: u32,
    },
    /// A frame finished the per-frame step
    FrameProcessed {
        frame_index: u64,
        posture_score: Option<f64>,
    },
    /// No person was found in a frame
    DetectionFailed { frame_index: u64 },
    /// The session finalized into a report
    SessionCompleted {
        session_id: String,
        frame_count: u64,
        overall_stability: f64,
    },
    /// The session ended without a report
    SessionFailed { session_id: String, reason: String },
    /// The session was cancelled between frames
    SessionAborted {
        session_id: String,
        frames_processed: u64,
    },
}

impl SessionEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SessionEvent::SessionStarted {
                session_id,
                frame_width,
                frame_height,
            } => format!(
                "Session {} started ({}x{})",
                session_id, frame_width, frame_height
            ),
            SessionEvent::FrameProcessed {
                frame_index,
                posture_score,
            } => match posture_score {
                Some(score) => format!("Frame {} processed (posture {:.1})", frame_index, score),
                None => format!("Frame {} processed (no posture score)", frame_index),
            },
            SessionEvent::DetectionFailed { frame_index } => {
                format!("No person detected in frame {}", frame_index)
            }
            SessionEvent::SessionCompleted {
                session_id,
                frame_count,
                overall_stability,
            } => format!(
                "Session {} completed: {} frames, stability {:.1}",
                session_id, frame_count, overall_stability
            ),
            SessionEvent::SessionFailed { session_id, reason } => {
                format!("Session {} failed: {}", session_id, reason)
            }
            SessionEvent::SessionAborted {
                session_id,
                frames_processed,
            } => format!(
                "Session {} aborted after {} frames",
                session_id, frames_processed
            ),
        }
    }
}

/// Broadcast bus for session progress events.
///
/// Publishing is synchronous so the per-frame path never suspends;
/// subscribers drain their receivers on the async side.
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers; returns the receiver count.
    ///
    /// A bus without subscribers is not an error — the event is simply
    /// dropped.
    pub fn publish(&self, event: SessionEvent) -> usize {
        match &event {
            SessionEvent::SessionFailed { session_id, reason } => {
                error!("Session {} failed: {}", session_id, reason);
            }
            SessionEvent::SessionAborted { session_id, .. } => {
                warn!("Session {} aborted", session_id);
            }
            SessionEvent::SessionStarted { .. } | SessionEvent::SessionCompleted { .. } => {
                info!("{}", event.description());
            }
            _ => {
                debug!("{}", event.description());
            }
        }

        self.sender.send(event).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::new(16);
        let delivered = bus.publish(SessionEvent::DetectionFailed { frame_index: 3 });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();

        let delivered = bus.publish(SessionEvent::FrameProcessed {
            frame_index: 7,
            posture_score: Some(88.0),
        });
        assert_eq!(delivered, 1);

        match receiver.recv().await.unwrap() {
            SessionEvent::FrameProcessed { frame_index, .. } => assert_eq!(frame_index, 7),
            other => panic!("Unexpected event: {}", other.description()),
        }
    }

    #[test]
    fn test_event_descriptions() {
        let event = SessionEvent::SessionCompleted {
            session_id: "abc".to_string(),
            frame_count: 10,
            overall_stability: 81.25,
        };
        assert!(event.description().contains("abc"));
        assert!(event.description().contains("10 frames"));
    }
}
