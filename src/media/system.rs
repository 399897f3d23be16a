use crate::audio::source::AudioSource;
use crate::audio::wav::WavAudioSource;
use crate::error::{ConnectFlowError, Result};
use crate::media::{CaptureDevice, MediaDevices};
use crate::video::source::{StillImageSource, VideoSource};
use async_trait::async_trait;
use std::path::PathBuf;

/// Where the microphone track comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicrophoneInput {
    /// A CPAL input device, by name or the preferred default, asked for
    /// `preferred_rate` when it supports it.
    Device {
        name: Option<String>,
        preferred_rate: u32,
    },
    /// A WAV file replayed in real time.
    Wav(PathBuf),
}

/// Device access for the command-line client.
///
/// The camera is a still image substitute; without one configured the camera
/// is reported unavailable.
#[derive(Debug, Clone)]
pub struct SystemMediaDevices {
    microphone: MicrophoneInput,
    still_image: Option<PathBuf>,
}

impl SystemMediaDevices {
    pub fn new(microphone: MicrophoneInput, still_image: Option<PathBuf>) -> Self {
        Self {
            microphone,
            still_image,
        }
    }
}

fn join_error(device: CaptureDevice, e: tokio::task::JoinError) -> ConnectFlowError {
    ConnectFlowError::DeviceUnavailable {
        device,
        message: format!("device open task failed: {}", e),
    }
}

#[async_trait]
impl MediaDevices for SystemMediaDevices {
    async fn open_microphone(&self) -> Result<Box<dyn AudioSource>> {
        match self.microphone.clone() {
            MicrophoneInput::Wav(path) => {
                tracing::info!(path = %path.display(), "Using WAV file as microphone");
                let source = tokio::task::spawn_blocking(move || WavAudioSource::open(&path))
                    .await
                    .map_err(|e| join_error(CaptureDevice::Microphone, e))??;
                Ok(Box::new(source))
            }
            #[cfg(feature = "cpal-audio")]
            MicrophoneInput::Device {
                name,
                preferred_rate,
            } => {
                let source = tokio::task::spawn_blocking(move || {
                    crate::audio::capture::CpalAudioSource::new(name.as_deref(), preferred_rate)
                })
                .await
                .map_err(|e| join_error(CaptureDevice::Microphone, e))??;
                Ok(Box::new(source))
            }
            #[cfg(not(feature = "cpal-audio"))]
            MicrophoneInput::Device { .. } => Err(ConnectFlowError::DeviceUnavailable {
                device: CaptureDevice::Microphone,
                message: "built without the cpal-audio feature".to_string(),
            }),
        }
    }

    async fn open_camera(&self) -> Result<Box<dyn VideoSource>> {
        let Some(path) = self.still_image.clone() else {
            return Err(ConnectFlowError::DeviceUnavailable {
                device: CaptureDevice::Camera,
                message: "no camera configured (set [video] still_image)".to_string(),
            });
        };
        tracing::info!(path = %path.display(), "Using still image as camera");
        let source = tokio::task::spawn_blocking(move || StillImageSource::open(&path))
            .await
            .map_err(|e| join_error(CaptureDevice::Camera, e))??;
        Ok(Box::new(source))
    }
}
