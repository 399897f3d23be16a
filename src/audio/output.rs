//! Speaker output using CPAL, mixing scheduled buffers on a frame timeline.

use crate::audio::capture::{SendableStream, with_suppressed_stderr};
use crate::error::{ConnectFlowError, Result};
use crate::playback::decoder::PlaybackBuffer;
use crate::playback::output::{OutputFactory, PlaybackOutput, SlotId};
use crate::playback::timeline::{duration_to_frames, frames_to_duration};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

enum TimelineCommand {
    Start {
        slot: SlotId,
        start_frame: u64,
        samples: Vec<f32>,
    },
    Stop(SlotId),
    StopAll,
}

struct Voice {
    slot: SlotId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// State owned by the audio callback thread.
struct Mixer {
    commands: Receiver<TimelineCommand>,
    voices: Vec<Voice>,
    frames: Arc<AtomicU64>,
}

impl Mixer {
    fn apply_commands(&mut self, now: u64) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                TimelineCommand::Start {
                    slot,
                    start_frame,
                    samples,
                } => self.voices.push(Voice {
                    slot,
                    start_frame: start_frame.max(now),
                    samples,
                }),
                TimelineCommand::Stop(slot) => self.voices.retain(|v| v.slot != slot),
                TimelineCommand::StopAll => self.voices.clear(),
            }
        }
    }

    /// Fill one interleaved output buffer and advance the timeline.
    fn render(&mut self, data: &mut [f32], channels: usize) {
        let mut frame = self.frames.load(Ordering::Acquire);
        self.apply_commands(frame);

        for out in data.chunks_mut(channels) {
            let mut mixed = 0.0_f32;
            for voice in &self.voices {
                if frame >= voice.start_frame && frame < voice.end_frame() {
                    mixed += voice.samples[(frame - voice.start_frame) as usize];
                }
            }
            let mixed = mixed.clamp(-1.0, 1.0);
            for sample in out.iter_mut() {
                *sample = mixed;
            }
            frame += 1;
        }

        self.voices.retain(|v| v.end_frame() > frame);
        self.frames.store(frame, Ordering::Release);
    }
}

/// Default speaker opened at the agent's output rate.
pub struct CpalPlaybackOutput {
    stream: Option<SendableStream>,
    commands: Sender<TimelineCommand>,
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl CpalPlaybackOutput {
    pub fn new(sample_rate: u32) -> Result<Self> {
        let (device, config) = with_suppressed_stderr(|| -> Result<_> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| output_error("no output device available"))?;

            let supported = device
                .supported_output_configs()
                .map_err(|e| output_error(e.to_string()))?
                .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
                .filter(|c| {
                    c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
                .min_by_key(|c| c.channels())
                .ok_or_else(|| {
                    output_error(format!("no f32 output config at {} Hz", sample_rate))
                })?;

            Ok((device, supported.with_sample_rate(SampleRate(sample_rate)).config()))
        })?;

        let channels = usize::from(config.channels.max(1));
        let (commands, receiver) = unbounded();
        let frames = Arc::new(AtomicU64::new(0));
        let mut mixer = Mixer {
            commands: receiver,
            voices: Vec::new(),
            frames: Arc::clone(&frames),
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mixer.render(data, channels);
                },
                |err| {
                    tracing::error!(error = %err, "Audio playback error");
                },
                None,
            )
            .map_err(|e| output_error(e.to_string()))?;
        stream.play().map_err(|e| output_error(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "Audio playback initialized"
        );

        Ok(Self {
            stream: Some(SendableStream(stream)),
            commands,
            frames,
            sample_rate,
        })
    }
}

fn output_error(message: impl Into<String>) -> ConnectFlowError {
    ConnectFlowError::AudioOutput {
        message: message.into(),
    }
}

impl PlaybackOutput for CpalPlaybackOutput {
    fn current_time(&self) -> Duration {
        frames_to_duration(self.frames.load(Ordering::Acquire), self.sample_rate)
    }

    fn start_at(&mut self, slot: SlotId, buffer: &PlaybackBuffer, at: Duration) -> Result<()> {
        if self.stream.is_none() {
            return Err(output_error("output is closed"));
        }
        self.commands
            .send(TimelineCommand::Start {
                slot,
                start_frame: duration_to_frames(at, self.sample_rate),
                samples: buffer.samples.clone(),
            })
            .map_err(|_| output_error("audio callback is gone"))
    }

    fn stop(&mut self, slot: SlotId) {
        if self.commands.send(TimelineCommand::Stop(slot)).is_err() {
            tracing::trace!(slot, "Stop after audio callback ended");
        }
    }

    fn close(&mut self) {
        if self.commands.send(TimelineCommand::StopAll).is_err() {
            tracing::trace!("Close after audio callback ended");
        }
        if let Some(stream) = self.stream.take()
            && let Err(e) = stream.0.pause()
        {
            tracing::warn!(error = %e, "Failed to pause output stream");
        }
    }
}

/// Opens the default speaker for each session.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalOutputFactory;

impl OutputFactory for CpalOutputFactory {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn PlaybackOutput>> {
        Ok(Box::new(CpalPlaybackOutput::new(sample_rate)?))
    }
}
