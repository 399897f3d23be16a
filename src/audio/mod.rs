//! Microphone sources, PCM framing and (with `cpal-audio`) device I/O.

#[cfg(feature = "cpal-audio")]
pub mod capture;
#[cfg(feature = "cpal-audio")]
pub mod output;
pub mod pcm;
pub mod source;
pub mod wav;

pub use pcm::{AudioFrame, PcmFramer, encode_pcm16};
pub use source::{AudioProbe, AudioSource, MockAudioSource};
pub use wav::WavAudioSource;
