//! Decoding of inbound agent audio.

use crate::error::{ConnectFlowError, Result};
use crate::playback::timeline::frames_to_duration;
use std::time::Duration;

/// Raw encoded bytes of one agent audio chunk, tagged with arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundAudioChunk {
    pub sequence: u64,
    pub bytes: Vec<u8>,
}

impl InboundAudioChunk {
    pub fn new(sequence: u64, bytes: Vec<u8>) -> Self {
        Self { sequence, bytes }
    }
}

/// Decoded mono PCM ready to be scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PlaybackBuffer {
    /// Playing time of the buffer, rounded to the nearest nanosecond.
    ///
    /// Scheduling positions are kept in frames, so this value is only used
    /// for reporting.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        frames_to_duration(self.samples.len() as u64, self.sample_rate)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decode little-endian signed 16-bit mono PCM.
///
/// Empty and odd-length chunks are rejected with a [`ConnectFlowError::Decode`]
/// tagged with the chunk's sequence number.
pub fn decode_pcm16(chunk: &InboundAudioChunk, sample_rate: u32) -> Result<PlaybackBuffer> {
    if chunk.bytes.is_empty() {
        return Err(ConnectFlowError::Decode {
            sequence: chunk.sequence,
            message: "empty chunk".to_string(),
        });
    }
    if chunk.bytes.len() % 2 != 0 {
        return Err(ConnectFlowError::Decode {
            sequence: chunk.sequence,
            message: format!("odd byte count {}", chunk.bytes.len()),
        });
    }

    let samples = chunk
        .bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();

    Ok(PlaybackBuffer {
        samples,
        sample_rate,
    })
}
