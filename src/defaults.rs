//! Default configuration constants for connectflow.
//!
//! Shared by the configuration types and the session engine so both agree on
//! media formats and timing.

/// Microphone capture rate requested from the device, in Hz.
///
/// The capture pipeline trusts whatever rate the device actually delivers and
/// declares it on every frame; this is only the preferred value.
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate of the agent's audio response stream, in Hz.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Number of samples in one capture window (one outbound audio frame).
pub const CAPTURE_WINDOW_SAMPLES: usize = 4096;

/// Polling interval of the capture thread when the source has no samples.
pub const CAPTURE_POLL_INTERVAL_MS: u64 = 10;

/// Still images sampled per second in video mode.
pub const VIDEO_FRAME_RATE: u32 = 5;

/// JPEG quality of sampled video frames (0.0 to 1.0).
pub const JPEG_QUALITY: f32 = 0.8;

/// Prefix the agent puts in front of input transcriptions it derived from
/// sign language rather than speech.
pub const SIGN_MARKER: &str = "[ASL]: ";

/// Upper bound on the wait for the channel's `opened` event.
pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default agent endpoint for the JSON-lines transport.
pub const AGENT_ADDRESS: &str = "127.0.0.1:7878";

/// Default voice requested from the agent.
pub const VOICE: &str = "Zephyr";

/// Default model requested from the agent.
pub const MODEL: &str = "native-audio-dialog";

/// Base instruction sent in the session setup.
pub const SYSTEM_INSTRUCTION: &str = "You are Connect Flow, an assistant focused on clear and \
     accessible communication. You receive live audio, and sometimes video, from the user. \
     Keep answers helpful, short and kind.";

/// Extra instruction appended to every setup, so signing is recognized once
/// video mode is switched on.
pub const SIGN_INSTRUCTION: &str = "When a video feed is shared, watch it for American Sign Language. \
     When you recognize signing, transcribe it as user input prefixed with \"[ASL]: \".";

/// MIME type of sampled video frames.
pub const IMAGE_MIME_TYPE: &str = "image/jpeg";
