use crate::error::{ConnectFlowError, Result};
use crate::media::{CaptureDevice, MediaEvent};
use crate::streaming::frame::OutboundFrame;
use crate::video::ImageFrame;
use crate::video::source::{RawImage, VideoSource};
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Camera shared between the session and the sampler task.
pub type SharedCamera = Arc<Mutex<Box<dyn VideoSource>>>;

/// Offscreen drawing surface: the current picture plus its JPEG encoder.
///
/// Exists only while the sampler runs.
pub struct Surface {
    quality: u8,
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl Surface {
    /// `quality` is in 0.0 to 1.0 and maps to JPEG quality 1 to 100.
    pub fn new(quality: f32) -> Self {
        Self {
            quality: jpeg_quality(quality),
            pixels: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    /// Draw the picture onto the surface and encode it.
    pub fn capture(&mut self, sequence: u64, image: &RawImage) -> Result<ImageFrame> {
        self.pixels.clear();
        self.pixels.extend_from_slice(&image.rgb);
        self.width = image.width;
        self.height = image.height;

        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, self.quality)
            .encode(&self.pixels, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| ConnectFlowError::ImageEncode {
                message: e.to_string(),
            })?;

        Ok(ImageFrame {
            sequence,
            data,
            quality: self.quality,
            width: self.width,
            height: self.height,
        })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

fn jpeg_quality(quality: f32) -> u8 {
    if quality.is_nan() {
        return 80;
    }
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Periodically samples the camera while video mode is on.
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    period: Duration,
    quality: f32,
}

impl FrameSampler {
    pub fn new(frame_rate: u32, quality: f32) -> Self {
        Self {
            period: Duration::from_secs(1) / frame_rate.max(1),
            quality,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn the sampling task.
    ///
    /// Each tick polls the camera once; a tick with no fresh frame is
    /// skipped. Both `alive` and the handle's own flag are checked before
    /// every send. A camera error is reported on `events` and ends the task.
    pub fn start(
        &self,
        camera: SharedCamera,
        outbound: UnboundedSender<OutboundFrame>,
        events: UnboundedSender<MediaEvent>,
        alive: Arc<AtomicBool>,
    ) -> SamplerHandle {
        let running = Arc::new(AtomicBool::new(true));
        let task_running = Arc::clone(&running);
        let period = self.period;
        let quality = self.quality;

        let task = tokio::spawn(async move {
            let mut surface = Surface::new(quality);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sequence = 0u64;
            let live = || task_running.load(Ordering::SeqCst) && alive.load(Ordering::SeqCst);

            tracing::debug!(period_ms = period.as_millis() as u64, "Frame sampler started");
            loop {
                ticker.tick().await;
                if !live() {
                    break;
                }

                let polled = match camera.lock() {
                    Ok(mut source) => source.latest_frame(),
                    Err(_) => Err(ConnectFlowError::DeviceUnavailable {
                        device: CaptureDevice::Camera,
                        message: "camera lock poisoned".to_string(),
                    }),
                };

                let image = match polled {
                    Ok(Some(image)) => image,
                    Ok(None) => {
                        tracing::trace!("No fresh video frame, skipping tick");
                        continue;
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "Camera track ended");
                        if events
                            .send(MediaEvent::TrackEnded {
                                device: CaptureDevice::Camera,
                                error,
                            })
                            .is_err()
                        {
                            tracing::debug!("Session gone before camera failure was reported");
                        }
                        break;
                    }
                };

                let frame = match surface.capture(sequence, &image) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(error = %e, sequence, "Dropping video frame");
                        continue;
                    }
                };

                if !live() || outbound.send(OutboundFrame::Image(frame)).is_err() {
                    break;
                }
                sequence += 1;
            }
            tracing::debug!(frames = sequence, "Frame sampler stopped");
        });

        SamplerHandle { running, task }
    }
}

/// Handle to a running frame sampler.
pub struct SamplerHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Stop the timer and release the surface.
    pub fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}
