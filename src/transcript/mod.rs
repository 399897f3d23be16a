//! Transcript assembly: fragments in, speaker-tagged utterances out.

pub mod assembler;
pub mod marker;
pub mod types;

pub use assembler::TranscriptAssembler;
pub use marker::{MarkerPolicy, SignMarker};
pub use types::{Speaker, TranscriptChannel, TranscriptLog, Utterance};
