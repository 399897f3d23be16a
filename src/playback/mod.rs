//! Decode → schedule → play pipeline for the agent's audio.

pub mod decoder;
pub mod output;
pub mod scheduler;
pub mod timeline;

pub use decoder::{InboundAudioChunk, PlaybackBuffer, decode_pcm16};
pub use output::{
    OutputFactory, PlaybackLog, PlaybackOutput, ScheduledEntry, SlotId, VirtualOutput,
    VirtualOutputFactory,
};
pub use scheduler::{PlaybackScheduler, PlaybackSlot};
pub use timeline::{duration_to_frames, frames_to_duration};
