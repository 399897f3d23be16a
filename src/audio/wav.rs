//! WAV file microphone substitute.

use crate::audio::source::AudioSource;
use crate::clock::{Clock, SystemClock};
use crate::error::{ConnectFlowError, Result};
use crate::media::CaptureDevice;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Audio source that replays WAV data at real-time pace.
///
/// Samples are mixed to mono `f32` and delivered at the file's own rate, so
/// the capture pipeline declares that rate on every frame. Once the file is
/// exhausted the source keeps delivering silence, unless built with
/// [`WavAudioSource::ending_at_eof`].
pub struct WavAudioSource {
    samples: Vec<f32>,
    sample_rate: u32,
    delivered: u64,
    started_at: Option<Instant>,
    end_at_eof: bool,
    clock: Arc<dyn Clock>,
}

impl WavAudioSource {
    /// Create from any reader (for testing/flexibility).
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let wav_reader = hound::WavReader::new(reader).map_err(|e| unavailable(format!(
            "Failed to parse WAV data: {}",
            e
        )))?;

        let spec = wav_reader.spec();
        let channels = usize::from(spec.channels.max(1));
        let interleaved = read_as_f32(wav_reader, spec)?;

        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
            delivered: 0,
            started_at: None,
            end_at_eof: false,
            clock: Arc::new(SystemClock),
        })
    }

    /// Open a WAV file from disk.
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            unavailable(format!("Failed to open {}: {}", path.display(), e))
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Report the track as ended once the file is exhausted.
    pub fn ending_at_eof(mut self) -> Self {
        self.end_at_eof = true;
        self
    }

    /// Inject a clock (for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Total number of samples in the file.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn unavailable(message: String) -> ConnectFlowError {
    ConnectFlowError::DeviceUnavailable {
        device: CaptureDevice::Microphone,
        message,
    }
}

fn read_as_f32<R: Read>(reader: hound::WavReader<R>, spec: hound::WavSpec) -> Result<Vec<f32>> {
    let read_error = |e: hound::Error| unavailable(format!("Failed to read WAV samples: {}", e));
    match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(read_error),
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(read_error)
        }
    }
}

impl AudioSource for WavAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.started_at.is_none() {
            self.started_at = Some(self.clock.now());
            self.delivered = 0;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started_at = None;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let Some(started_at) = self.started_at else {
            return Ok(Vec::new());
        };

        let total = self.samples.len() as u64;
        if self.end_at_eof && self.delivered >= total {
            return Err(unavailable("WAV input ended".to_string()));
        }

        let elapsed = self.clock.now().saturating_duration_since(started_at);
        let due = (elapsed.as_secs_f64() * f64::from(self.sample_rate)) as u64;
        let due = if self.end_at_eof { due.min(total) } else { due };
        if due <= self.delivered {
            return Ok(Vec::new());
        }

        let mut chunk = Vec::with_capacity((due - self.delivered) as usize);
        for index in self.delivered..due {
            chunk.push(self.samples.get(index as usize).copied().unwrap_or(0.0));
        }
        self.delivered = due;
        Ok(chunk)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
