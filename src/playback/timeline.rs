//! Conversions between sample frames and output time.
//!
//! Positions are counted in frames and only turned into a `Duration` at the
//! output boundary. [`frames_to_duration`] rounds to the nearest nanosecond
//! and [`duration_to_frames`] rounds to the nearest frame, so a position made
//! from a frame count always maps back to that same frame.

use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Time of frame `frames` at `sample_rate`.
pub fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    let rate = u128::from(sample_rate.max(1));
    let nanos = (u128::from(frames) * NANOS_PER_SEC + rate / 2) / rate;
    Duration::from_nanos(nanos as u64)
}

/// Frame nearest to `at`.
pub fn duration_to_frames(at: Duration, sample_rate: u32) -> u64 {
    let rate = u128::from(sample_rate);
    ((at.as_nanos() * rate + NANOS_PER_SEC / 2) / NANOS_PER_SEC) as u64
}

/// First frame that does not start before `at`.
pub fn first_frame_at_or_after(at: Duration, sample_rate: u32) -> u64 {
    let frame = duration_to_frames(at, sample_rate);
    if frames_to_duration(frame, sample_rate) < at {
        frame + 1
    } else {
        frame
    }
}
