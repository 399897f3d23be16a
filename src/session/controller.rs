//! The session state machine.
//!
//! A [`SessionController`] runs as a single tokio task. Callers drive it
//! through a cloneable [`SessionClient`] and observe it through
//! [`SessionEvents`]. Every inbound channel event is handled on that task in
//! arrival order, so the scheduler and transcript log have one owner.

use crate::audio::source::AudioSource;
use crate::channel::{ChannelLink, Connector, ServerEvent, SessionSetup};
use crate::clock::{Clock, SystemClock};
use crate::defaults;
use crate::error::{ConnectFlowError, Result};
use crate::media::{MediaDevices, MediaEvent};
use crate::playback::{OutputFactory, PlaybackOutput, PlaybackScheduler};
use crate::session::config::SessionConfig;
use crate::session::handle::{SessionHandle, SessionInput};
use crate::session::state::{FailureCause, SessionState};
use crate::session::summary::{FinishedSession, SessionSummary};
use crate::transcript::{TranscriptAssembler, TranscriptChannel, Utterance};
use crate::video::{FrameSampler, VideoSource};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Options for [`SessionClient::start`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Acquire the camera and sample frames from the start.
    pub video_mode: bool,
}

/// Notifications from a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// A finalized utterance, already appended to the transcript log.
    Utterance(Utterance),
    /// The agent was interrupted; `cut` buffers were silenced.
    Interrupted { cut: usize },
    /// An inbound audio chunk could not be played and was skipped.
    AudioDropped { sequence: u64, reason: String },
    VideoMode(bool),
}

enum Command {
    Start {
        options: StartOptions,
        reply: oneshot::Sender<Result<()>>,
    },
    ToggleVideo {
        reply: oneshot::Sender<Result<bool>>,
    },
    Leave {
        metrics: Option<serde_json::Value>,
        reply: oneshot::Sender<SessionSummary>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
    Transcript {
        reply: oneshot::Sender<Vec<Utterance>>,
    },
}

/// Builds and spawns a session.
pub struct SessionController {
    config: SessionConfig,
    media: Arc<dyn MediaDevices>,
    connector: Arc<dyn Connector>,
    outputs: Arc<dyn OutputFactory>,
    clock: Arc<dyn Clock>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        media: Arc<dyn MediaDevices>,
        connector: Arc<dyn Connector>,
        outputs: Arc<dyn OutputFactory>,
    ) -> Self {
        Self {
            config,
            media,
            connector,
            outputs,
            clock: Arc::new(SystemClock),
        }
    }

    /// Clock used for the session duration.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run the controller on the current tokio runtime.
    ///
    /// The task lives until every [`SessionClient`] clone is dropped; it then
    /// tears down whatever is still open.
    pub fn spawn(self) -> (SessionClient, SessionEvents) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let actor = Actor {
            controller: self,
            phase: Phase::Idle,
            camera_request: None,
            events: events_tx,
        };
        tokio::spawn(actor.run(commands));
        (
            SessionClient {
                commands: commands_tx,
            },
            SessionEvents { events },
        )
    }
}

/// Handle for issuing commands to a spawned session.
#[derive(Clone)]
pub struct SessionClient {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionClient {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| ConnectFlowError::ControllerGone)?;
        answer.await.map_err(|_| ConnectFlowError::ControllerGone)
    }

    /// Acquire devices, open the channel and wait until it is open.
    ///
    /// Fails with [`ConnectFlowError::SessionCancelled`] if `leave` is called
    /// first, and with [`ConnectFlowError::InvalidState`] unless the session
    /// is idle.
    pub async fn start(&self, options: StartOptions) -> Result<()> {
        self.request(|reply| Command::Start { options, reply }).await?
    }

    /// Flip video mode and return the new value. Only valid while open.
    ///
    /// The first enable acquires the camera; a refusal is returned as
    /// [`ConnectFlowError::PermissionDenied`] and the session stays open.
    pub async fn toggle_video_mode(&self) -> Result<bool> {
        self.request(|reply| Command::ToggleVideo { reply }).await?
    }

    /// End the session and return its summary.
    pub async fn leave(&self, metrics: Option<serde_json::Value>) -> Result<SessionSummary> {
        self.request(|reply| Command::Leave { metrics, reply }).await
    }

    pub async fn state(&self) -> Result<SessionState> {
        self.request(|reply| Command::State { reply }).await
    }

    /// Utterances finalized so far.
    pub async fn transcript(&self) -> Result<Vec<Utterance>> {
        self.request(|reply| Command::Transcript { reply }).await
    }
}

/// Stream of [`SessionEvent`]s.
pub struct SessionEvents {
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionEvents {
    /// Next event, or `None` once the controller has stopped.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }
}

/// Resources acquired during `connecting`.
struct Connected {
    microphone: Box<dyn AudioSource>,
    camera: Option<Box<dyn VideoSource>>,
    output: Box<dyn PlaybackOutput>,
    link: ChannelLink,
}

struct Establish {
    media: Arc<dyn MediaDevices>,
    connector: Arc<dyn Connector>,
    outputs: Arc<dyn OutputFactory>,
    setup: SessionSetup,
    connect_timeout: Duration,
}

fn transport(message: String) -> ConnectFlowError {
    ConnectFlowError::Transport { message }
}

/// Acquire everything an open session needs. Dropping the future part way
/// releases whatever was acquired so far.
async fn establish(plan: Establish) -> Result<Connected> {
    let Establish {
        media,
        connector,
        outputs,
        mut setup,
        connect_timeout,
    } = plan;

    let microphone = media.open_microphone().await?;
    let camera = if setup.video_mode {
        Some(media.open_camera().await?)
    } else {
        None
    };
    let output = outputs.open(setup.output_sample_rate)?;

    setup.input_sample_rate = microphone.sample_rate();
    tracing::info!(
        connector = connector.name(),
        model = %setup.model,
        input_rate = setup.input_sample_rate,
        video_mode = setup.video_mode,
        "Connecting to agent"
    );
    let mut link = connector.connect(&setup).await?;

    tokio::time::timeout(connect_timeout, wait_opened(&mut link.inbound))
        .await
        .map_err(|_| {
            transport(format!(
                "Channel did not open within {} ms",
                connect_timeout.as_millis()
            ))
        })??;

    Ok(Connected {
        microphone,
        camera,
        output,
        link,
    })
}

async fn wait_opened(inbound: &mut mpsc::Receiver<ServerEvent>) -> Result<()> {
    loop {
        match inbound.recv().await {
            Some(ServerEvent::Opened) => return Ok(()),
            Some(ServerEvent::Closed { reason }) => {
                return Err(transport(format!("Channel closed before opening: {}", reason)));
            }
            Some(ServerEvent::Error { cause }) => {
                return Err(transport(format!("Channel failed before opening: {}", cause)));
            }
            None => return Err(transport("Channel ended before opening".to_string())),
            Some(_) => tracing::debug!("Ignoring server event received before open"),
        }
    }
}

enum Phase {
    Idle,
    Connecting {
        pending: BoxFuture<Result<Connected>>,
        waiter: oneshot::Sender<Result<()>>,
        video_mode: bool,
    },
    Open(Box<SessionHandle>),
    Finished {
        state: SessionState,
        finished: FinishedSession,
    },
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::Connecting { .. } => SessionState::Connecting,
            Phase::Open(_) => SessionState::Open,
            Phase::Finished { state, .. } => state.clone(),
        }
    }
}

/// Camera acquisition started by a video-mode toggle.
struct CameraRequest {
    pending: BoxFuture<Result<Box<dyn VideoSource>>>,
    reply: oneshot::Sender<Result<bool>>,
}

enum Step {
    Command(Command),
    Connected(Result<Connected>),
    Input(SessionInput),
    Camera(Result<Box<dyn VideoSource>>),
}

async fn phase_progress(phase: &mut Phase) -> Step {
    match phase {
        Phase::Connecting { pending, .. } => Step::Connected(pending.as_mut().await),
        Phase::Open(handle) => Step::Input(handle.next_input().await),
        Phase::Idle | Phase::Finished { .. } => std::future::pending().await,
    }
}

async fn camera_answer(request: &mut Option<CameraRequest>) -> Step {
    match request {
        Some(request) => Step::Camera(request.pending.as_mut().await),
        None => std::future::pending().await,
    }
}

fn respond<T>(reply: oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        tracing::debug!("Caller stopped waiting for a reply");
    }
}

fn emit(events: &mpsc::UnboundedSender<SessionEvent>, event: SessionEvent) {
    if events.send(event).is_err() {
        tracing::trace!("No session event listener");
    }
}

fn invalid_state(operation: &'static str, state: &SessionState) -> ConnectFlowError {
    ConnectFlowError::InvalidState {
        operation,
        state: state.to_string(),
    }
}

struct Actor {
    controller: SessionController,
    phase: Phase,
    camera_request: Option<CameraRequest>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let step = tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => break,
                },
                step = phase_progress(&mut self.phase) => step,
                step = camera_answer(&mut self.camera_request) => step,
            };
            match step {
                Step::Command(command) => self.handle_command(command),
                Step::Connected(result) => self.on_connected(result),
                Step::Input(input) => self.on_input(input),
                Step::Camera(result) => self.on_camera(result),
            }
        }
        self.shutdown();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { options, reply } => self.start(options, reply),
            Command::ToggleVideo { reply } => self.toggle_video(reply),
            Command::Leave { metrics, reply } => {
                let summary = self.leave(metrics);
                respond(reply, summary);
            }
            Command::State { reply } => respond(reply, self.phase.state()),
            Command::Transcript { reply } => respond(reply, self.transcript()),
        }
    }

    fn start(&mut self, options: StartOptions, reply: oneshot::Sender<Result<()>>) {
        if !matches!(self.phase, Phase::Idle) {
            respond(reply, Err(invalid_state("start", &self.phase.state())));
            return;
        }

        let config = &self.controller.config;
        let plan = Establish {
            media: Arc::clone(&self.controller.media),
            connector: Arc::clone(&self.controller.connector),
            outputs: Arc::clone(&self.controller.outputs),
            setup: SessionSetup {
                model: config.model.clone(),
                voice: config.voice.clone(),
                system_instruction: config.system_instruction.clone(),
                sign_instruction: config.sign_instruction.clone(),
                video_mode: options.video_mode,
                input_sample_rate: defaults::INPUT_SAMPLE_RATE,
                output_sample_rate: config.output_sample_rate,
            },
            connect_timeout: config.connect_timeout,
        };

        tracing::info!(video_mode = options.video_mode, "Starting session");
        self.phase = Phase::Connecting {
            pending: Box::pin(establish(plan)),
            waiter: reply,
            video_mode: options.video_mode,
        };
        emit(&self.events, SessionEvent::StateChanged(SessionState::Connecting));
    }

    fn on_connected(&mut self, result: Result<Connected>) {
        let Phase::Connecting {
            waiter, video_mode, ..
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return;
        };

        match result.and_then(|connected| self.open_session(connected, video_mode)) {
            Ok(handle) => {
                let video = handle.video_mode();
                self.phase = Phase::Open(Box::new(handle));
                tracing::info!(video_mode = video, "Session open");
                emit(&self.events, SessionEvent::StateChanged(SessionState::Open));
                if video {
                    emit(&self.events, SessionEvent::VideoMode(true));
                }
                respond(waiter, Ok(()));
            }
            Err(error) => {
                tracing::warn!(error = %error, "Session failed to start");
                let cause = FailureCause::from_error(&error);
                let finished = FinishedSession {
                    ended_at: Some(self.controller.clock.now()),
                    ..Default::default()
                };
                self.finish(SessionState::Error { cause }, finished);
                respond(waiter, Err(error));
            }
        }
    }

    fn open_session(&self, connected: Connected, video_mode: bool) -> Result<SessionHandle> {
        let config = &self.controller.config;
        let Connected {
            microphone,
            camera,
            output,
            link,
        } = connected;

        let mut handle = SessionHandle::new(
            link,
            PlaybackScheduler::new(output, config.output_sample_rate),
            TranscriptAssembler::new(config.marker.clone(), config.marker_policy),
            FrameSampler::new(config.frame_rate, config.jpeg_quality),
            self.controller.clock.now(),
        );
        handle.start_capture(microphone, config.capture.clone())?;
        if let Some(camera) = camera {
            handle.attach_camera(camera);
            handle.set_video_mode(video_mode);
        }
        Ok(handle)
    }

    fn toggle_video(&mut self, reply: oneshot::Sender<Result<bool>>) {
        let handle = match &mut self.phase {
            Phase::Open(handle) => handle,
            other => {
                let state = other.state();
                respond(reply, Err(invalid_state("toggle video mode", &state)));
                return;
            }
        };

        if self.camera_request.is_some() {
            respond(
                reply,
                Err(ConnectFlowError::InvalidState {
                    operation: "toggle video mode",
                    state: "waiting for the camera".to_string(),
                }),
            );
            return;
        }

        if handle.video_mode() {
            handle.set_video_mode(false);
            emit(&self.events, SessionEvent::VideoMode(false));
            respond(reply, Ok(false));
        } else if handle.has_camera() {
            let enabled = handle.set_video_mode(true);
            emit(&self.events, SessionEvent::VideoMode(enabled));
            respond(reply, Ok(enabled));
        } else {
            tracing::info!("Requesting camera");
            let media = Arc::clone(&self.controller.media);
            self.camera_request = Some(CameraRequest {
                pending: Box::pin(async move { media.open_camera().await }),
                reply,
            });
        }
    }

    fn on_camera(&mut self, result: Result<Box<dyn VideoSource>>) {
        let Some(CameraRequest { reply, .. }) = self.camera_request.take() else {
            return;
        };

        let answer = match (&mut self.phase, result) {
            (Phase::Open(handle), Ok(camera)) => {
                handle.attach_camera(camera);
                let enabled = handle.set_video_mode(true);
                emit(&self.events, SessionEvent::VideoMode(enabled));
                Ok(enabled)
            }
            (Phase::Open(_), Err(error)) => {
                tracing::warn!(error = %error, "Camera unavailable, video mode stays off");
                Err(error)
            }
            _ => Err(ConnectFlowError::SessionCancelled),
        };
        respond(reply, answer);
    }

    fn cancel_camera_request(&mut self) {
        if let Some(request) = self.camera_request.take() {
            respond(request.reply, Err(ConnectFlowError::SessionCancelled));
        }
    }

    fn leave(&mut self, metrics: Option<serde_json::Value>) -> SessionSummary {
        let finished = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Finished { state, finished } => {
                let summary = finished.summary(metrics);
                self.phase = Phase::Finished { state, finished };
                return summary;
            }
            Phase::Open(handle) => (*handle).teardown(self.controller.clock.as_ref()),
            Phase::Connecting {
                pending, waiter, ..
            } => {
                drop(pending);
                tracing::info!("Start cancelled by leave");
                respond(waiter, Err(ConnectFlowError::SessionCancelled));
                FinishedSession {
                    ended_at: Some(self.controller.clock.now()),
                    ..Default::default()
                }
            }
            Phase::Idle => FinishedSession::default(),
        };

        let summary = finished.summary(metrics);
        tracing::info!(
            utterances = summary.transcript.len(),
            duration_secs = summary.duration_secs,
            "Session closed"
        );
        self.finish(SessionState::Closed, finished);
        summary
    }

    fn finish(&mut self, state: SessionState, finished: FinishedSession) {
        self.cancel_camera_request();
        self.phase = Phase::Finished {
            state: state.clone(),
            finished,
        };
        emit(&self.events, SessionEvent::StateChanged(state));
    }

    fn on_input(&mut self, input: SessionInput) {
        let Phase::Open(handle) = &mut self.phase else {
            return;
        };

        let failure = match input {
            SessionInput::Server(Some(event)) => on_server_event(handle, &self.events, event),
            SessionInput::Server(None) => Some(FailureCause::Transport {
                message: "channel ended unexpectedly".to_string(),
            }),
            SessionInput::Media(MediaEvent::TrackEnded { device, error }) => {
                tracing::warn!(%device, error = %error, "Capture track ended");
                Some(FailureCause::from_error(&error))
            }
        };

        if let Some(cause) = failure {
            self.fail(cause);
        }
    }

    /// Tear down an open session into the error state.
    fn fail(&mut self, cause: FailureCause) {
        if !matches!(self.phase, Phase::Open(_)) {
            return;
        }
        let Phase::Open(handle) = std::mem::replace(&mut self.phase, Phase::Idle) else {
            return;
        };
        tracing::warn!(cause = %cause, "Session failed");
        let finished = (*handle).teardown(self.controller.clock.as_ref());
        self.finish(SessionState::Error { cause }, finished);
    }

    fn transcript(&self) -> Vec<Utterance> {
        match &self.phase {
            Phase::Open(handle) => handle.transcript().to_vec(),
            Phase::Finished { finished, .. } => finished.transcript.clone(),
            Phase::Idle | Phase::Connecting { .. } => Vec::new(),
        }
    }

    fn shutdown(mut self) {
        self.cancel_camera_request();
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Open(handle) => {
                (*handle).teardown(self.controller.clock.as_ref());
            }
            Phase::Connecting { waiter, .. } => {
                respond(waiter, Err(ConnectFlowError::SessionCancelled));
            }
            Phase::Idle | Phase::Finished { .. } => {}
        }
        tracing::debug!("Session controller stopped");
    }
}

/// Apply one channel event to an open session. Returns a cause when the
/// event ends the session.
fn on_server_event(
    handle: &mut SessionHandle,
    events: &mpsc::UnboundedSender<SessionEvent>,
    event: ServerEvent,
) -> Option<FailureCause> {
    match event {
        ServerEvent::AudioChunk(bytes) => {
            let (sequence, result) = handle.play_audio(bytes);
            match result {
                Ok(slot) => {
                    tracing::trace!(sequence, start = ?slot.start, end = ?slot.end, "Chunk scheduled");
                }
                Err(error) => {
                    tracing::warn!(sequence, error = %error, "Dropping audio chunk");
                    emit(
                        events,
                        SessionEvent::AudioDropped {
                            sequence,
                            reason: error.to_string(),
                        },
                    );
                }
            }
            None
        }
        ServerEvent::InputTranscript(text) => {
            handle.push_fragment(TranscriptChannel::Input, &text);
            None
        }
        ServerEvent::OutputTranscript(text) => {
            handle.push_fragment(TranscriptChannel::Output, &text);
            None
        }
        ServerEvent::TurnComplete => {
            for utterance in handle.complete_turn() {
                tracing::debug!(speaker = %utterance.speaker, "Utterance");
                emit(events, SessionEvent::Utterance(utterance));
            }
            None
        }
        ServerEvent::Interrupted => {
            let cut = handle.interrupt();
            tracing::debug!(cut, "Playback interrupted");
            emit(events, SessionEvent::Interrupted { cut });
            None
        }
        ServerEvent::Opened => {
            tracing::debug!("Ignoring repeated open");
            None
        }
        ServerEvent::Closed { reason } => Some(FailureCause::Transport {
            message: format!("channel closed: {}", reason),
        }),
        ServerEvent::Error { cause } => Some(FailureCause::Transport { message: cause }),
    }
}
