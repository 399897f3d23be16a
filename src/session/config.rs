use crate::config::Config;
use crate::defaults;
use crate::streaming::capture::CaptureConfig;
use crate::transcript::{MarkerPolicy, SignMarker};
use std::time::Duration;

/// Everything one session needs to know, resolved from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub capture: CaptureConfig,
    pub output_sample_rate: u32,
    pub frame_rate: u32,
    pub jpeg_quality: f32,
    /// Upper bound on the wait for the channel's `Opened` event.
    pub connect_timeout: Duration,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    /// `None` disables the video-mode instruction.
    pub sign_instruction: Option<String>,
    pub marker: SignMarker,
    pub marker_policy: MarkerPolicy,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        let sign_instruction = Some(config.agent.sign_instruction.clone())
            .filter(|instruction| !instruction.trim().is_empty());
        Self {
            capture: CaptureConfig {
                window_size: config.audio.window_size,
                poll_interval_ms: config.audio.poll_interval_ms,
            },
            output_sample_rate: config.audio.output_sample_rate,
            frame_rate: config.video.frame_rate,
            jpeg_quality: config.video.jpeg_quality,
            connect_timeout: Duration::from_millis(config.agent.connect_timeout_ms),
            model: config.agent.model.clone(),
            voice: config.agent.voice.clone(),
            system_instruction: config.agent.system_instruction.clone(),
            sign_instruction,
            marker: SignMarker::new(config.transcript.sign_marker.clone()),
            marker_policy: config.transcript.marker_policy,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
