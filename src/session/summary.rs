use crate::transcript::Utterance;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Returned by `leave()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub transcript: Vec<Utterance>,
    /// Whole seconds the session was open, rounded to nearest.
    pub duration_secs: u64,
    /// Opaque snapshot supplied by the caller.
    pub metrics: Option<serde_json::Value>,
    pub video_mode_enabled: bool,
}

/// What remains of a session after teardown.
#[derive(Debug, Clone, Default)]
pub(crate) struct FinishedSession {
    pub transcript: Vec<Utterance>,
    pub opened_at: Option<Instant>,
    pub ended_at: Option<Instant>,
    pub video_mode: bool,
}

impl FinishedSession {
    pub fn summary(&self, metrics: Option<serde_json::Value>) -> SessionSummary {
        let open_for = match (self.opened_at, self.ended_at) {
            (Some(opened), Some(ended)) => ended.saturating_duration_since(opened),
            _ => Duration::ZERO,
        };
        SessionSummary {
            transcript: self.transcript.clone(),
            duration_secs: round_secs(open_for),
            metrics,
            video_mode_enabled: self.video_mode,
        }
    }
}

fn round_secs(duration: Duration) -> u64 {
    ((duration.as_millis() + 500) / 1000) as u64
}
