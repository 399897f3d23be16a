use crate::audio::source::AudioSource;
use crate::channel::{ChannelLink, ServerEvent};
use crate::clock::Clock;
use crate::error::Result;
use crate::media::MediaEvent;
use crate::playback::{InboundAudioChunk, PlaybackScheduler, PlaybackSlot};
use crate::session::summary::FinishedSession;
use crate::streaming::capture::{CaptureConfig, CaptureHandle, CapturePipeline};
use crate::transcript::{TranscriptAssembler, TranscriptChannel, TranscriptLog, Utterance};
use crate::video::{FrameSampler, SamplerHandle, SharedCamera, VideoSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;

/// Input the open session reacts to.
#[derive(Debug)]
pub(crate) enum SessionInput {
    /// `None` means the channel stream ended.
    Server(Option<ServerEvent>),
    Media(MediaEvent),
}

/// The single live connection object.
///
/// Owns every resource of an open session. Every producer it spawns checks
/// `alive`, which teardown clears first. Dropping the handle without
/// teardown still stops each resource through its own `Drop`.
pub(crate) struct SessionHandle {
    alive: Arc<AtomicBool>,
    link: ChannelLink,
    capture: Option<CaptureHandle>,
    camera: Option<SharedCamera>,
    sampler: Option<SamplerHandle>,
    frame_sampler: FrameSampler,
    scheduler: PlaybackScheduler,
    assembler: TranscriptAssembler,
    log: TranscriptLog,
    media_tx: mpsc::UnboundedSender<MediaEvent>,
    media_rx: mpsc::UnboundedReceiver<MediaEvent>,
    opened_at: Instant,
    video_mode: bool,
    audio_sequence: u64,
}

impl SessionHandle {
    pub fn new(
        link: ChannelLink,
        scheduler: PlaybackScheduler,
        assembler: TranscriptAssembler,
        frame_sampler: FrameSampler,
        opened_at: Instant,
    ) -> Self {
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        Self {
            alive: Arc::new(AtomicBool::new(true)),
            link,
            capture: None,
            camera: None,
            sampler: None,
            frame_sampler,
            scheduler,
            assembler,
            log: TranscriptLog::new(),
            media_tx,
            media_rx,
            opened_at,
            video_mode: false,
            audio_sequence: 0,
        }
    }

    /// Start streaming the microphone.
    pub fn start_capture(
        &mut self,
        microphone: Box<dyn AudioSource>,
        config: CaptureConfig,
    ) -> Result<()> {
        let handle = CapturePipeline::new(microphone, config).start(
            self.link.outbound.clone(),
            self.media_tx.clone(),
            Arc::clone(&self.alive),
        )?;
        self.capture = Some(handle);
        Ok(())
    }

    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }

    /// Keep the camera for the rest of the session.
    pub fn attach_camera(&mut self, camera: Box<dyn VideoSource>) {
        self.camera = Some(Arc::new(Mutex::new(camera)));
    }

    /// Start or stop the frame sampler. Returns the new video mode.
    ///
    /// Enabling requires an attached camera; without one this is a no-op
    /// returning `false`.
    pub fn set_video_mode(&mut self, enabled: bool) -> bool {
        if enabled == self.video_mode {
            return self.video_mode;
        }
        if enabled {
            let Some(camera) = &self.camera else {
                return false;
            };
            self.sampler = Some(self.frame_sampler.start(
                Arc::clone(camera),
                self.link.outbound.clone(),
                self.media_tx.clone(),
                Arc::clone(&self.alive),
            ));
        } else if let Some(sampler) = self.sampler.take() {
            sampler.stop();
        }
        self.video_mode = enabled;
        self.assembler.set_video_mode(enabled);
        tracing::info!(enabled, "Video mode changed");
        enabled
    }

    pub fn video_mode(&self) -> bool {
        self.video_mode
    }

    /// Wait for the next server or capture event.
    pub async fn next_input(&mut self) -> SessionInput {
        tokio::select! {
            event = self.link.inbound.recv() => SessionInput::Server(event),
            Some(event) = self.media_rx.recv() => SessionInput::Media(event),
        }
    }

    /// Decode and schedule one agent audio chunk.
    pub fn play_audio(&mut self, bytes: Vec<u8>) -> (u64, Result<PlaybackSlot>) {
        let sequence = self.audio_sequence;
        self.audio_sequence += 1;
        let chunk = InboundAudioChunk::new(sequence, bytes);
        (sequence, self.scheduler.enqueue(&chunk))
    }

    pub fn interrupt(&mut self) -> usize {
        self.scheduler.interrupt()
    }

    pub fn push_fragment(&mut self, channel: TranscriptChannel, text: &str) {
        self.assembler.push_fragment(channel, text);
    }

    /// Close the turn, append its utterances to the log and return them.
    pub fn complete_turn(&mut self) -> Vec<Utterance> {
        let utterances = self.assembler.turn_complete();
        self.log.extend(utterances.iter().cloned());
        utterances
    }

    pub fn transcript(&self) -> &[Utterance] {
        self.log.entries()
    }

    /// Release everything the session owns.
    pub fn teardown(mut self, clock: &dyn Clock) -> FinishedSession {
        self.alive.store(false, Ordering::SeqCst);

        if let Some(sampler) = self.sampler.take() {
            sampler.stop();
        }
        if let Some(mut capture) = self.capture.take() {
            capture.stop_in_background();
        }
        if let Some(camera) = self.camera.take()
            && let Ok(mut source) = camera.lock()
        {
            source.stop();
        }
        self.scheduler.shutdown();
        self.assembler.discard();

        let SessionHandle {
            link,
            log,
            opened_at,
            video_mode,
            ..
        } = self;
        link.close();

        tracing::debug!(utterances = log.len(), "Session torn down");
        FinishedSession {
            transcript: log.into_entries(),
            opened_at: Some(opened_at),
            ended_at: Some(clock.now()),
            video_mode,
        }
    }
}
