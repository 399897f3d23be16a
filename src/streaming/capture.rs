//! Microphone capture pipeline.
//!
//! Wraps an audio source and runs it on a dedicated thread:
//! - Fixed-size windows regardless of how the device chunks its callbacks
//! - Frames numbered in capture order
//! - Never waits on the transport (the outbound queue is unbounded)

use crate::audio::pcm::PcmFramer;
use crate::audio::source::AudioSource;
use crate::defaults;
use crate::error::Result;
use crate::media::{CaptureDevice, MediaEvent};
use crate::streaming::frame::OutboundFrame;
use crate::streaming::window::WindowBuffer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Configuration for the capture pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Samples per outbound frame.
    pub window_size: usize,
    /// Polling interval when no samples are available (ms).
    pub poll_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_size: defaults::CAPTURE_WINDOW_SAMPLES,
            poll_interval_ms: defaults::CAPTURE_POLL_INTERVAL_MS,
        }
    }
}

/// Microphone → window → PCM frame → channel.
pub struct CapturePipeline {
    source: Box<dyn AudioSource>,
    config: CaptureConfig,
}

impl CapturePipeline {
    pub fn new(source: Box<dyn AudioSource>, config: CaptureConfig) -> Self {
        Self { source, config }
    }

    /// Start the source and spawn the capture thread.
    ///
    /// The source is started on the calling thread so that a refusal is
    /// returned here. Afterwards, a source error stops the pipeline and is
    /// reported on `events`.
    pub fn start(
        mut self,
        outbound: UnboundedSender<OutboundFrame>,
        events: UnboundedSender<MediaEvent>,
        alive: Arc<AtomicBool>,
    ) -> Result<CaptureHandle> {
        self.source.start()?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let framer = PcmFramer::new(self.source.sample_rate());
        let mut window = WindowBuffer::new(self.config.window_size);
        let mut source = self.source;

        tracing::debug!(
            sample_rate = framer.sample_rate(),
            window_size = window.size(),
            "Capture pipeline started"
        );

        let thread = thread::spawn(move || {
            let live = || thread_running.load(Ordering::SeqCst) && alive.load(Ordering::SeqCst);
            let mut sequence = 0u64;

            'capture: while live() {
                match source.read_samples() {
                    Ok(samples) if !samples.is_empty() => {
                        for samples in window.push(&samples) {
                            if !live() {
                                break 'capture;
                            }
                            let frame = framer.frame(sequence, &samples);
                            if outbound.send(OutboundFrame::Audio(frame)).is_err() {
                                break 'capture;
                            }
                            sequence += 1;
                        }
                    }
                    Ok(_) => thread::sleep(poll_interval),
                    Err(error) => {
                        tracing::warn!(error = %error, "Microphone track ended");
                        if live()
                            && events
                                .send(MediaEvent::TrackEnded {
                                    device: CaptureDevice::Microphone,
                                    error,
                                })
                                .is_err()
                        {
                            tracing::debug!("Session gone before microphone failure was reported");
                        }
                        break;
                    }
                }
            }

            if let Err(e) = source.stop() {
                tracing::warn!(error = %e, "Failed to stop microphone");
            }
            thread_running.store(false, Ordering::SeqCst);
            tracing::debug!(frames = sequence, "Capture pipeline stopped");
        });

        Ok(CaptureHandle {
            running,
            thread: Some(thread),
        })
    }
}

/// Handle to control a running capture pipeline.
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CaptureHandle {
    /// Stop capturing and wait for the thread to release the source.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            join_capture(thread);
        }
    }

    /// Stop capturing without blocking the calling task.
    ///
    /// Inside a tokio runtime the thread is joined on the blocking pool and
    /// the source is released shortly after this returns. Outside one this
    /// is [`CaptureHandle::stop`].
    pub fn stop_in_background(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(thread) = self.thread.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => drop(runtime.spawn_blocking(move || join_capture(thread))),
            Err(_) => join_capture(thread),
        }
    }

    /// Returns true while the capture thread is delivering frames.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn join_capture(thread: thread::JoinHandle<()>) {
    if thread.join().is_err() {
        tracing::error!("Capture thread panicked");
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
