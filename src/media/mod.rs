//! Access to capture devices.
//!
//! The session asks a [`MediaDevices`] implementation for a microphone and,
//! in video mode, a camera. Refusals come back as
//! [`ConnectFlowError::PermissionDenied`] so callers can tell them apart from
//! missing hardware.

mod mock;
mod system;

pub use mock::{DeviceBehavior, MockMediaDevices};
pub use system::{MicrophoneInput, SystemMediaDevices};

use crate::audio::source::AudioSource;
use crate::error::{ConnectFlowError, Result};
use crate::video::source::VideoSource;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Which capture device a failure concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureDevice {
    Microphone,
    Camera,
}

impl fmt::Display for CaptureDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureDevice::Microphone => write!(f, "microphone"),
            CaptureDevice::Camera => write!(f, "camera"),
        }
    }
}

/// Reported by capture producers to the session controller.
#[derive(Debug)]
pub enum MediaEvent {
    /// A track stopped delivering and its producer has shut down.
    TrackEnded {
        device: CaptureDevice,
        error: ConnectFlowError,
    },
}

/// Source of capture tracks.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire the microphone. The returned source is not started yet.
    async fn open_microphone(&self) -> Result<Box<dyn AudioSource>>;

    /// Acquire the camera.
    async fn open_camera(&self) -> Result<Box<dyn VideoSource>>;
}
