//! connectflow - realtime voice and video sessions with a conversational agent
//!
//! Streams microphone audio (and, in video mode, sampled camera stills) to a
//! remote agent, plays its audio back gaplessly and assembles a
//! speaker-tagged transcript.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod channel;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod media;
pub mod playback;
pub mod session;
pub mod streaming;
pub mod transcript;
pub mod video;

// Composition root for the binary
#[cfg(feature = "cli")]
pub mod app;

// Device seams
pub use audio::AudioSource;
pub use media::{CaptureDevice, MediaDevices};
pub use playback::{OutputFactory, PlaybackOutput};
pub use video::VideoSource;

// Channel
pub use channel::{Connector, ServerEvent, SessionSetup};

// Session
pub use session::{
    FailureCause, SessionClient, SessionConfig, SessionController, SessionEvent, SessionEvents,
    SessionState, SessionSummary, StartOptions,
};

// Transcript
pub use transcript::{Speaker, Utterance};

// Error handling
pub use error::{ConnectFlowError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "Git hash should be 7 chars, got: {}", hash_part);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
