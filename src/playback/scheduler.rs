//! Gapless scheduling of agent audio with hard interruption.

use crate::error::Result;
use crate::playback::decoder::{InboundAudioChunk, decode_pcm16};
use crate::playback::output::{PlaybackOutput, SlotId};
use crate::playback::timeline::{first_frame_at_or_after, frames_to_duration};
use std::time::Duration;

/// A buffer that has been handed to the output and has not finished yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSlot {
    pub id: SlotId,
    pub sequence: u64,
    pub start: Duration,
    pub end: Duration,
}

/// Places decoded chunks back to back on the output timeline.
///
/// `cursor` is the frame where the next chunk may start. Each chunk starts
/// at `max(cursor, now)`, so uninterrupted chunks never gap or overlap.
/// [`PlaybackScheduler::interrupt`] cuts everything and resets the cursor.
pub struct PlaybackScheduler {
    output: Box<dyn PlaybackOutput>,
    sample_rate: u32,
    cursor: u64,
    active: Vec<PlaybackSlot>,
    next_slot: SlotId,
}

impl PlaybackScheduler {
    pub fn new(output: Box<dyn PlaybackOutput>, sample_rate: u32) -> Self {
        Self {
            output,
            sample_rate,
            cursor: 0,
            active: Vec::new(),
            next_slot: 0,
        }
    }

    /// Decode a chunk and schedule it right after everything queued so far.
    ///
    /// A decode failure leaves the scheduler unchanged.
    pub fn enqueue(&mut self, chunk: &InboundAudioChunk) -> Result<PlaybackSlot> {
        self.reap();
        let buffer = decode_pcm16(chunk, self.sample_rate)?;

        let now = first_frame_at_or_after(self.output.current_time(), self.sample_rate);
        let start_frame = self.cursor.max(now);
        let end_frame = start_frame + buffer.len() as u64;
        let start = frames_to_duration(start_frame, self.sample_rate);
        let id = self.next_slot;
        self.output.start_at(id, &buffer, start)?;
        self.next_slot += 1;

        let slot = PlaybackSlot {
            id,
            sequence: chunk.sequence,
            start,
            end: frames_to_duration(end_frame, self.sample_rate),
        };
        self.cursor = end_frame;
        self.active.push(slot);
        tracing::trace!(
            sequence = chunk.sequence,
            start_ms = start.as_millis() as u64,
            duration_ms = buffer.duration().as_millis() as u64,
            "Scheduled agent audio"
        );
        Ok(slot)
    }

    /// Stop every in-flight slot and reset the cursor.
    ///
    /// Returns the number of slots cut.
    pub fn interrupt(&mut self) -> usize {
        let cut = self.active.len();
        for slot in self.active.drain(..) {
            self.output.stop(slot.id);
        }
        self.cursor = 0;
        if cut > 0 {
            tracing::debug!(slots = cut, "Playback interrupted");
        }
        cut
    }

    /// Forget slots that finished playing on their own.
    pub fn reap(&mut self) -> usize {
        let now = self.output.current_time();
        let before = self.active.len();
        self.active.retain(|slot| slot.end > now);
        before - self.active.len()
    }

    /// Stop everything and close the output.
    pub fn shutdown(&mut self) {
        for slot in self.active.drain(..) {
            self.output.stop(slot.id);
        }
        self.cursor = 0;
        self.output.close();
    }

    pub fn cursor(&self) -> Duration {
        frames_to_duration(self.cursor, self.sample_rate)
    }

    pub fn active(&self) -> &[PlaybackSlot] {
        &self.active
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn now(&self) -> Duration {
        self.output.current_time()
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.output.close();
    }
}
