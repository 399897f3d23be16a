use crate::error::{ConnectFlowError, Result};
use crate::media::CaptureDevice;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Uncompressed RGB8 picture, row-major, three bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl RawImage {
    /// Build an image, checking that the buffer matches the dimensions.
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || rgb.len() != expected {
            return Err(ConnectFlowError::ImageEncode {
                message: format!(
                    "{}x{} image needs {} bytes, got {}",
                    width,
                    height,
                    expected,
                    rgb.len()
                ),
            });
        }
        Ok(Self { width, height, rgb })
    }

    /// Single-colour image.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            width,
            height,
            rgb: rgb.repeat(pixels),
        }
    }
}

/// Camera-like track the frame sampler pulls from.
pub trait VideoSource: Send {
    /// Most recent picture, or `None` when no fresh frame is ready yet.
    ///
    /// An error means the track ended.
    fn latest_frame(&mut self) -> Result<Option<RawImage>>;

    /// Release the camera.
    fn stop(&mut self);
}

/// Camera substitute that shows the same picture forever.
pub struct StillImageSource {
    image: RawImage,
    stopped: bool,
}

impl StillImageSource {
    pub fn new(image: RawImage) -> Self {
        Self {
            image,
            stopped: false,
        }
    }

    /// Load any format the `image` crate can read (JPEG and PNG are enabled).
    pub fn open(path: &Path) -> Result<Self> {
        let decoded = image::open(path).map_err(|e| ConnectFlowError::DeviceUnavailable {
            device: CaptureDevice::Camera,
            message: format!("Failed to load {}: {}", path.display(), e),
        })?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Self::new(RawImage::new(width, height, rgb.into_raw())?))
    }
}

impl VideoSource for StillImageSource {
    fn latest_frame(&mut self) -> Result<Option<RawImage>> {
        if self.stopped {
            return Err(ConnectFlowError::DeviceUnavailable {
                device: CaptureDevice::Camera,
                message: "camera was stopped".to_string(),
            });
        }
        Ok(Some(self.image.clone()))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Mock camera for testing.
#[derive(Debug)]
pub struct MockVideoSource {
    frames: VecDeque<Option<RawImage>>,
    repeat: Option<RawImage>,
    end_after_frames: bool,
    stopped: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
    polls: Arc<AtomicUsize>,
}

impl MockVideoSource {
    /// A camera that always has a small grey frame ready.
    pub fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            repeat: Some(RawImage::solid(4, 4, [128, 128, 128])),
            end_after_frames: false,
            stopped: Arc::new(AtomicBool::new(false)),
            released: Arc::new(AtomicBool::new(false)),
            polls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue one poll result; `None` simulates a frame that is not ready.
    pub fn with_frame(mut self, frame: Option<RawImage>) -> Self {
        self.frames.push_back(frame);
        self
    }

    /// Picture returned once the queue is drained; `None` means never ready.
    pub fn with_repeating(mut self, frame: Option<RawImage>) -> Self {
        self.repeat = frame;
        self
    }

    /// Report the track as ended once the queue is drained.
    pub fn ending_after_frames(mut self) -> Self {
        self.end_after_frames = true;
        self
    }

    pub fn probe(&self) -> VideoProbe {
        VideoProbe {
            stopped: Arc::clone(&self.stopped),
            released: Arc::clone(&self.released),
            polls: Arc::clone(&self.polls),
        }
    }
}

impl Default for MockVideoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource for MockVideoSource {
    fn latest_frame(&mut self) -> Result<Option<RawImage>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(frame) = self.frames.pop_front() {
            return Ok(frame);
        }
        if self.end_after_frames {
            return Err(ConnectFlowError::DeviceUnavailable {
                device: CaptureDevice::Camera,
                message: "mock camera ended".to_string(),
            });
        }
        Ok(self.repeat.clone())
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

impl Drop for MockVideoSource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Observer sharing a [`MockVideoSource`]'s state.
#[derive(Debug, Clone)]
pub struct VideoProbe {
    stopped: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
    polls: Arc<AtomicUsize>,
}

impl VideoProbe {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// True once the camera was dropped.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}
