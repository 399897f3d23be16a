//! 16-bit PCM encoding of captured audio windows.

/// One outbound window of encoded microphone audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Position of the window in the capture stream, starting at 0.
    pub sequence: u64,
    /// Little-endian signed 16-bit PCM, mono.
    pub data: Vec<u8>,
    /// Rate the samples were captured at, in Hz.
    pub sample_rate: u32,
}

impl AudioFrame {
    /// MIME type declaring the encoding and the actual capture rate.
    pub fn mime_type(&self) -> String {
        pcm_mime_type(self.sample_rate)
    }

    /// Number of samples carried by this frame.
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }
}

/// MIME type for raw PCM16 audio at the given rate.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Convert one float sample to a signed 16-bit integer.
///
/// Out-of-range input is clamped; NaN becomes silence.
pub fn sample_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Encode float samples as little-endian PCM16 bytes.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }
    bytes
}

/// Turns capture windows into [`AudioFrame`]s tagged with the capture rate.
#[derive(Debug, Clone, Copy)]
pub struct PcmFramer {
    sample_rate: u32,
}

impl PcmFramer {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame(&self, sequence: u64, samples: &[f32]) -> AudioFrame {
        AudioFrame {
            sequence,
            data: encode_pcm16(samples),
            sample_rate: self.sample_rate,
        }
    }
}
