use crate::defaults;
use crate::error::{ConnectFlowError, Result};
use crate::media::CaptureDevice;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Trait for microphone-like sample sources.
///
/// This trait allows swapping implementations (real audio device, WAV file,
/// mock). Dropping a source must release the underlying device.
pub trait AudioSource: Send {
    /// Start delivering samples.
    fn start(&mut self) -> Result<()>;

    /// Stop delivering samples and release the device stream.
    fn stop(&mut self) -> Result<()>;

    /// Drain the samples captured since the last call.
    ///
    /// Returns mono `f32` samples in [-1, 1]. An empty vector means nothing
    /// is ready yet. An error means the track ended or failed; capture stops.
    fn read_samples(&mut self) -> Result<Vec<f32>>;

    /// Native sample rate of the delivered samples, in Hz.
    fn sample_rate(&self) -> u32;
}

/// How a [`MockAudioSource`] fails, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MockFailure {
    None,
    PermissionDenied,
    Unavailable,
}

/// Mock audio source for testing.
///
/// Use [`MockAudioSource::probe`] before handing the source away to observe
/// what was done with it.
#[derive(Debug)]
pub struct MockAudioSource {
    reads: VecDeque<Vec<f32>>,
    repeat: Option<Vec<f32>>,
    end_after_reads: bool,
    start_failure: MockFailure,
    sample_rate: u32,
    started: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
    read_count: Arc<AtomicUsize>,
}

impl MockAudioSource {
    /// Create a mock that delivers nothing until configured.
    pub fn new() -> Self {
        Self {
            reads: VecDeque::new(),
            repeat: None,
            end_after_reads: false,
            start_failure: MockFailure::None,
            sample_rate: defaults::INPUT_SAMPLE_RATE,
            started: Arc::new(AtomicBool::new(false)),
            released: Arc::new(AtomicBool::new(false)),
            read_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue one read worth of samples.
    pub fn with_read(mut self, samples: Vec<f32>) -> Self {
        self.reads.push_back(samples);
        self
    }

    /// Deliver the same samples on every read once the queue is drained.
    pub fn with_repeating(mut self, samples: Vec<f32>) -> Self {
        self.repeat = Some(samples);
        self
    }

    /// Report the track as ended once the queued reads are drained.
    pub fn ending_after_reads(mut self) -> Self {
        self.end_after_reads = true;
        self
    }

    /// Refuse to start with a permission error.
    pub fn with_permission_denied(mut self) -> Self {
        self.start_failure = MockFailure::PermissionDenied;
        self
    }

    /// Refuse to start because the device is gone.
    pub fn with_start_failure(mut self) -> Self {
        self.start_failure = MockFailure::Unavailable;
        self
    }

    /// Declare a different native sample rate.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Observer sharing this source's state.
    pub fn probe(&self) -> AudioProbe {
        AudioProbe {
            started: Arc::clone(&self.started),
            released: Arc::clone(&self.released),
            read_count: Arc::clone(&self.read_count),
        }
    }
}

/// Read-only view of a [`MockAudioSource`] that outlives it.
#[derive(Debug, Clone)]
pub struct AudioProbe {
    started: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
    read_count: Arc<AtomicUsize>,
}

impl AudioProbe {
    /// True while the source is started.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// True once the source was stopped or dropped.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Number of `read_samples` calls so far.
    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        match self.start_failure {
            MockFailure::PermissionDenied => Err(ConnectFlowError::PermissionDenied {
                device: CaptureDevice::Microphone,
                message: "mock permission refusal".to_string(),
            }),
            MockFailure::Unavailable => Err(ConnectFlowError::DeviceUnavailable {
                device: CaptureDevice::Microphone,
                message: "mock device missing".to_string(),
            }),
            MockFailure::None => {
                self.started.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.started.store(false, Ordering::SeqCst);
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        if let Some(samples) = self.reads.pop_front() {
            return Ok(samples);
        }
        if self.end_after_reads {
            return Err(ConnectFlowError::DeviceUnavailable {
                device: CaptureDevice::Microphone,
                message: "mock track ended".to_string(),
            });
        }
        Ok(self.repeat.clone().unwrap_or_default())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for MockAudioSource {
    fn drop(&mut self) {
        self.started.store(false, Ordering::SeqCst);
        self.released.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_returns_queued_reads_in_order() {
        let mut source = MockAudioSource::new()
            .with_read(vec![0.1, 0.2])
            .with_read(vec![0.3]);
        let probe = source.probe();

        assert_eq!(source.read_samples().unwrap(), vec![0.1, 0.2]);
        assert_eq!(source.read_samples().unwrap(), vec![0.3]);
        assert!(source.read_samples().unwrap().is_empty());
        assert_eq!(probe.read_count(), 3);
    }

    #[test]
    fn test_mock_repeats_after_queue() {
        let mut source = MockAudioSource::new()
            .with_read(vec![1.0])
            .with_repeating(vec![0.5; 4]);

        assert_eq!(source.read_samples().unwrap(), vec![1.0]);
        assert_eq!(source.read_samples().unwrap(), vec![0.5; 4]);
        assert_eq!(source.read_samples().unwrap(), vec![0.5; 4]);
    }

    #[test]
    fn test_mock_ends_after_reads() {
        let mut source = MockAudioSource::new()
            .with_read(vec![0.0; 8])
            .ending_after_reads();

        assert!(source.read_samples().is_ok());
        match source.read_samples() {
            Err(ConnectFlowError::DeviceUnavailable { device, .. }) => {
                assert_eq!(device, CaptureDevice::Microphone);
            }
            other => panic!("Expected DeviceUnavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_mock_permission_denied_on_start() {
        let mut source = MockAudioSource::new().with_permission_denied();
        let err = source.start().unwrap_err();
        assert!(err.is_permission_denied());
        assert!(!source.probe().is_started());
    }

    #[test]
    fn test_mock_start_stop_state() {
        let mut source = MockAudioSource::new();
        let probe = source.probe();

        source.start().unwrap();
        assert!(probe.is_started());
        assert!(!probe.is_released());

        source.stop().unwrap();
        assert!(!probe.is_started());
        assert!(probe.is_released());
    }

    #[test]
    fn test_mock_released_on_drop() {
        let mut source = MockAudioSource::new();
        let probe = source.probe();
        source.start().unwrap();
        let boxed: Box<dyn AudioSource> = Box::new(source);

        assert!(!probe.is_released());
        drop(boxed);
        assert!(probe.is_released());
        assert!(!probe.is_started());
    }

    #[test]
    fn test_mock_sample_rate() {
        let source = MockAudioSource::new().with_sample_rate(48000);
        assert_eq!(source.sample_rate(), 48000);
        assert_eq!(MockAudioSource::default().sample_rate(), 16000);
    }
}
