//! Error types for connectflow.

use crate::media::CaptureDevice;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectFlowError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Capture device errors
    #[error("Permission denied for {device}: {message}")]
    PermissionDenied {
        device: CaptureDevice,
        message: String,
    },

    #[error("{device} unavailable: {message}")]
    DeviceUnavailable {
        device: CaptureDevice,
        message: String,
    },

    // Playback errors
    #[error("Failed to decode audio chunk #{sequence}: {message}")]
    Decode { sequence: u64, message: String },

    #[error("Audio output failed: {message}")]
    AudioOutput { message: String },

    // Video errors
    #[error("Image encoding failed: {message}")]
    ImageEncode { message: String },

    // Transport errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // Session lifecycle errors
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Session was cancelled before it opened")]
    SessionCancelled,

    #[error("Session controller is no longer running")]
    ControllerGone,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ConnectFlowError {
    /// Returns true for failures local to one unit of work (a single chunk)
    /// that must not end the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ConnectFlowError::Decode { .. })
    }

    /// Returns true if a capture device refused access.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ConnectFlowError::PermissionDenied { .. })
    }
}

pub type Result<T> = std::result::Result<T, ConnectFlowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_invalid_value_display() {
        let error = ConnectFlowError::ConfigInvalidValue {
            key: "video.frame_rate".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for video.frame_rate: must be positive"
        );
    }

    #[test]
    fn test_permission_denied_display() {
        let error = ConnectFlowError::PermissionDenied {
            device: CaptureDevice::Camera,
            message: "user refused".to_string(),
        };
        assert_eq!(error.to_string(), "Permission denied for camera: user refused");
        assert!(error.is_permission_denied());
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_device_unavailable_display() {
        let error = ConnectFlowError::DeviceUnavailable {
            device: CaptureDevice::Microphone,
            message: "track ended".to_string(),
        };
        assert_eq!(error.to_string(), "microphone unavailable: track ended");
        assert!(!error.is_permission_denied());
    }

    #[test]
    fn test_decode_is_the_only_recoverable_error() {
        let decode = ConnectFlowError::Decode {
            sequence: 7,
            message: "odd byte count".to_string(),
        };
        assert_eq!(
            decode.to_string(),
            "Failed to decode audio chunk #7: odd byte count"
        );
        assert!(decode.is_recoverable());

        let transport = ConnectFlowError::Transport {
            message: "reset".to_string(),
        };
        assert!(!transport.is_recoverable());
    }

    #[test]
    fn test_invalid_state_display() {
        let error = ConnectFlowError::InvalidState {
            operation: "toggle video mode",
            state: "connecting".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Cannot toggle video mode while session is connecting"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let error: ConnectFlowError = io_error.into();
        assert!(error.to_string().contains("refused"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_error = toml::from_str::<toml::Value>("a = = b").unwrap_err();
        let error: ConnectFlowError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<ConnectFlowError>();
        assert_sync::<ConnectFlowError>();
    }
}
