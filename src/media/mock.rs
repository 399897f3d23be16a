use crate::audio::source::{AudioSource, MockAudioSource};
use crate::error::{ConnectFlowError, Result};
use crate::media::{CaptureDevice, MediaDevices};
use crate::video::source::{MockVideoSource, VideoSource};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How a mock device answers an open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceBehavior {
    #[default]
    Grant,
    Deny,
    Unavailable,
    /// Never answers, like a permission prompt nobody clicks.
    Pending,
}

/// Mock device access for testing.
///
/// Sources registered with `with_microphone`/`with_camera` are handed out
/// first; later requests get fresh defaults.
#[derive(Default)]
pub struct MockMediaDevices {
    microphone: DeviceBehavior,
    camera: DeviceBehavior,
    microphones: Mutex<Vec<MockAudioSource>>,
    cameras: Mutex<Vec<MockVideoSource>>,
    microphone_requests: AtomicUsize,
    camera_requests: AtomicUsize,
}

impl MockMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_microphone(self, source: MockAudioSource) -> Self {
        if let Ok(mut queue) = self.microphones.lock() {
            queue.push(source);
        }
        self
    }

    pub fn with_camera(self, source: MockVideoSource) -> Self {
        if let Ok(mut queue) = self.cameras.lock() {
            queue.push(source);
        }
        self
    }

    pub fn microphone_behavior(mut self, behavior: DeviceBehavior) -> Self {
        self.microphone = behavior;
        self
    }

    pub fn camera_behavior(mut self, behavior: DeviceBehavior) -> Self {
        self.camera = behavior;
        self
    }

    pub fn microphone_requests(&self) -> usize {
        self.microphone_requests.load(Ordering::SeqCst)
    }

    pub fn camera_requests(&self) -> usize {
        self.camera_requests.load(Ordering::SeqCst)
    }
}

async fn answer(behavior: DeviceBehavior, device: CaptureDevice) -> Result<()> {
    match behavior {
        DeviceBehavior::Grant => Ok(()),
        DeviceBehavior::Deny => Err(ConnectFlowError::PermissionDenied {
            device,
            message: "access refused by user".to_string(),
        }),
        DeviceBehavior::Unavailable => Err(ConnectFlowError::DeviceUnavailable {
            device,
            message: "no such device".to_string(),
        }),
        DeviceBehavior::Pending => std::future::pending().await,
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn open_microphone(&self) -> Result<Box<dyn AudioSource>> {
        self.microphone_requests.fetch_add(1, Ordering::SeqCst);
        answer(self.microphone, CaptureDevice::Microphone).await?;
        let queued = self.microphones.lock().ok().and_then(|mut q| {
            if q.is_empty() { None } else { Some(q.remove(0)) }
        });
        Ok(Box::new(queued.unwrap_or_default()))
    }

    async fn open_camera(&self) -> Result<Box<dyn VideoSource>> {
        self.camera_requests.fetch_add(1, Ordering::SeqCst);
        answer(self.camera, CaptureDevice::Camera).await?;
        let queued = self.cameras.lock().ok().and_then(|mut q| {
            if q.is_empty() { None } else { Some(q.remove(0)) }
        });
        Ok(Box::new(queued.unwrap_or_default()))
    }
}
