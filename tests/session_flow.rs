//! End-to-end session behavior against in-process devices and agent.

use connectflow::audio::{AudioProbe, MockAudioSource};
use connectflow::channel::{MemoryConnector, RemoteEnd, ServerEvent};
use connectflow::clock::ManualClock;
use connectflow::media::{CaptureDevice, DeviceBehavior, MediaDevices, MockMediaDevices};
use connectflow::playback::{PlaybackLog, VirtualOutputFactory, duration_to_frames};
use connectflow::session::{
    FailureCause, SessionClient, SessionConfig, SessionController, SessionEvent, SessionEvents,
    SessionState, StartOptions,
};
use connectflow::streaming::OutboundFrame;
use connectflow::transcript::{Speaker, Utterance};
use connectflow::video::MockVideoSource;
use connectflow::ConnectFlowError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const WAIT: Duration = Duration::from_secs(3);

struct Fixture {
    controller: SessionController,
    remotes: UnboundedReceiver<RemoteEnd>,
    clock: ManualClock,
    playback: PlaybackLog,
}

fn fixture(
    media: Arc<MockMediaDevices>,
    configure: impl FnOnce(MemoryConnector) -> MemoryConnector,
) -> Fixture {
    let clock = ManualClock::new();
    let (connector, remotes) = MemoryConnector::new();
    let outputs = VirtualOutputFactory::new(Arc::new(clock.clone()));
    let playback = outputs.log();
    let media: Arc<dyn MediaDevices> = media;
    let controller = SessionController::new(
        SessionConfig::default(),
        media,
        Arc::new(configure(connector)),
        Arc::new(outputs),
    )
    .with_clock(Arc::new(clock.clone()));
    Fixture {
        controller,
        remotes,
        clock,
        playback,
    }
}

struct Session {
    client: SessionClient,
    events: SessionEvents,
    remote: RemoteEnd,
    clock: ManualClock,
    playback: PlaybackLog,
}

async fn open_with(media: Arc<MockMediaDevices>, options: StartOptions) -> Session {
    let Fixture {
        controller,
        mut remotes,
        clock,
        playback,
    } = fixture(media, MemoryConnector::auto_opening);
    let (client, events) = controller.spawn();
    client.start(options).await.unwrap();
    let remote = remotes.recv().await.unwrap();
    Session {
        client,
        events,
        remote,
        clock,
        playback,
    }
}

async fn open() -> Session {
    open_with(Arc::new(MockMediaDevices::new()), StartOptions::default()).await
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Next event matching `pick`, skipping the rest.
async fn next_matching<T>(
    events: &mut SessionEvents,
    mut pick: impl FnMut(SessionEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Some(event) => {
                    if let Some(found) = pick(event) {
                        return found;
                    }
                }
                None => panic!("session stopped before the expected event"),
            }
        }
    })
    .await
    .unwrap()
}

async fn next_utterance(events: &mut SessionEvents) -> Utterance {
    next_matching(events, |event| match event {
        SessionEvent::Utterance(utterance) => Some(utterance),
        _ => None,
    })
    .await
}

async fn next_failure(events: &mut SessionEvents) -> FailureCause {
    next_matching(events, |event| match event {
        SessionEvent::StateChanged(SessionState::Error { cause }) => Some(cause),
        _ => None,
    })
    .await
}

/// 24 kHz PCM16 silence lasting `ms` milliseconds.
fn agent_audio(ms: usize) -> Vec<u8> {
    vec![0u8; 24 * ms * 2]
}

#[tokio::test]
async fn test_agent_audio_plays_back_to_back() {
    let session = open().await;
    for _ in 0..3 {
        session
            .remote
            .send(ServerEvent::AudioChunk(agent_audio(100)))
            .await;
    }

    wait_until(|| session.playback.scheduled().len() == 3).await;
    let scheduled = session.playback.scheduled();
    assert_eq!(scheduled[0].start, Duration::ZERO);
    for pair in scheduled.windows(2) {
        assert_eq!(pair[1].start, pair[0].start + pair[0].duration);
    }
    assert_eq!(scheduled[2].end(), Duration::from_millis(300));
}

#[tokio::test]
async fn test_uneven_agent_audio_stays_sample_contiguous() {
    let session = open().await;
    let lengths = [4801_usize, 1, 959, 2];
    for samples in lengths {
        session
            .remote
            .send(ServerEvent::AudioChunk(vec![0u8; samples * 2]))
            .await;
    }

    wait_until(|| session.playback.scheduled().len() == lengths.len()).await;
    let mut next_frame = 0;
    for (entry, samples) in session.playback.scheduled().iter().zip(lengths) {
        assert_eq!(duration_to_frames(entry.start, 24000), next_frame);
        next_frame += samples as u64;
    }
}

#[tokio::test]
async fn test_setup_carries_sign_instruction_without_video() {
    let session = open().await;
    assert!(!session.remote.setup.video_mode);
    assert!(session.remote.setup.instruction().contains("[ASL]: "));
}

#[tokio::test]
async fn test_late_chunk_starts_now() {
    let session = open().await;
    session.clock.advance(Duration::from_millis(500));
    session
        .remote
        .send(ServerEvent::AudioChunk(agent_audio(40)))
        .await;

    wait_until(|| session.playback.scheduled().len() == 1).await;
    assert_eq!(
        session.playback.scheduled()[0].start,
        Duration::from_millis(500)
    );
}

#[tokio::test]
async fn test_interrupt_cuts_playback_and_resets_cursor() {
    let mut session = open().await;
    for _ in 0..3 {
        session
            .remote
            .send(ServerEvent::AudioChunk(agent_audio(100)))
            .await;
    }
    wait_until(|| session.playback.scheduled().len() == 3).await;

    session.clock.advance(Duration::from_millis(50));
    session.remote.send(ServerEvent::Interrupted).await;
    let cut = next_matching(&mut session.events, |event| match event {
        SessionEvent::Interrupted { cut } => Some(cut),
        _ => None,
    })
    .await;
    assert_eq!(cut, 3);
    assert_eq!(session.playback.stopped().len(), 3);

    session
        .remote
        .send(ServerEvent::AudioChunk(agent_audio(100)))
        .await;
    wait_until(|| session.playback.scheduled().len() == 4).await;
    assert_eq!(
        session.playback.scheduled()[3].start,
        Duration::from_millis(50)
    );
}

#[tokio::test]
async fn test_bad_chunk_is_dropped_and_session_continues() {
    let mut session = open().await;
    session
        .remote
        .send(ServerEvent::AudioChunk(vec![1, 2, 3]))
        .await;
    session
        .remote
        .send(ServerEvent::AudioChunk(agent_audio(20)))
        .await;

    let sequence = next_matching(&mut session.events, |event| match event {
        SessionEvent::AudioDropped { sequence, .. } => Some(sequence),
        _ => None,
    })
    .await;
    assert_eq!(sequence, 0);

    wait_until(|| session.playback.scheduled().len() == 1).await;
    assert_eq!(session.playback.scheduled()[0].start, Duration::ZERO);
    assert_eq!(session.client.state().await.unwrap(), SessionState::Open);
}

#[tokio::test]
async fn test_output_fragments_become_one_agent_utterance() {
    let mut session = open().await;
    session
        .remote
        .send(ServerEvent::OutputTranscript("He".to_string()))
        .await;
    session
        .remote
        .send(ServerEvent::OutputTranscript("llo".to_string()))
        .await;
    session.remote.send(ServerEvent::TurnComplete).await;

    let utterance = next_utterance(&mut session.events).await;
    assert_eq!(utterance.speaker, Speaker::Agent);
    assert_eq!(utterance.text, "Hello");

    let transcript = session.client.transcript().await.unwrap();
    assert_eq!(transcript, vec![utterance]);
}

#[tokio::test]
async fn test_marked_input_is_attributed_to_signing() {
    let mut session = open().await;
    session
        .remote
        .send(ServerEvent::InputTranscript("[ASL]: ".to_string()))
        .await;
    session
        .remote
        .send(ServerEvent::InputTranscript("Thanks".to_string()))
        .await;
    session.remote.send(ServerEvent::TurnComplete).await;

    let utterance = next_utterance(&mut session.events).await;
    assert_eq!(utterance.speaker, Speaker::Signed);
    assert_eq!(utterance.text, "Thanks");
}

#[tokio::test]
async fn test_turn_emits_input_before_output() {
    let mut session = open().await;
    session
        .remote
        .send(ServerEvent::OutputTranscript("Hi there".to_string()))
        .await;
    session
        .remote
        .send(ServerEvent::InputTranscript("Hello".to_string()))
        .await;
    session.remote.send(ServerEvent::TurnComplete).await;

    let first = next_utterance(&mut session.events).await;
    let second = next_utterance(&mut session.events).await;
    assert_eq!((first.speaker, first.text.as_str()), (Speaker::User, "Hello"));
    assert_eq!(
        (second.speaker, second.text.as_str()),
        (Speaker::Agent, "Hi there")
    );
}

#[tokio::test]
async fn test_whitespace_turn_emits_nothing() {
    let mut session = open().await;
    session
        .remote
        .send(ServerEvent::InputTranscript("   ".to_string()))
        .await;
    session
        .remote
        .send(ServerEvent::OutputTranscript("\n".to_string()))
        .await;
    session.remote.send(ServerEvent::TurnComplete).await;
    session
        .remote
        .send(ServerEvent::OutputTranscript("ok".to_string()))
        .await;
    session.remote.send(ServerEvent::TurnComplete).await;

    let utterance = next_utterance(&mut session.events).await;
    assert_eq!(utterance.text, "ok");
    assert_eq!(session.client.transcript().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_microphone_audio_is_streamed_in_windows() {
    let microphone = MockAudioSource::new().with_repeating(vec![0.5; 1024]);
    let media = Arc::new(MockMediaDevices::new().with_microphone(microphone));
    let mut session = open_with(media, StartOptions::default()).await;

    let frame = tokio::time::timeout(WAIT, session.remote.next_frame())
        .await
        .unwrap()
        .unwrap();
    assert!(frame.is_audio());
    assert_eq!(frame.mime_type(), "audio/pcm;rate=16000");
    assert_eq!(frame.data().len(), 4096 * 2);
    assert_eq!(frame.sequence(), 0);

    let next = tokio::time::timeout(WAIT, session.remote.next_frame())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.sequence(), 1);
}

#[tokio::test]
async fn test_video_mode_start_sends_jpeg_stills() {
    let media = Arc::new(MockMediaDevices::new());
    let mut session = open_with(Arc::clone(&media), StartOptions { video_mode: true }).await;

    assert!(session.remote.setup.video_mode);
    let frame = tokio::time::timeout(WAIT, session.remote.next_frame())
        .await
        .unwrap()
        .unwrap();
    match frame {
        OutboundFrame::Image(image) => {
            assert_eq!(image.mime_type(), "image/jpeg");
            assert_eq!(image.quality, 80);
            assert_eq!(&image.data[..2], &[0xFF, 0xD8]);
        }
        other => panic!("Expected an image frame, got {:?}", other),
    }
    assert_eq!(media.camera_requests(), 1);
}

#[tokio::test]
async fn test_toggle_acquires_camera_once() {
    let media = Arc::new(MockMediaDevices::new());
    let mut session = open_with(Arc::clone(&media), StartOptions::default()).await;
    assert_eq!(media.camera_requests(), 0);

    assert!(session.client.toggle_video_mode().await.unwrap());
    let enabled = next_matching(&mut session.events, |event| match event {
        SessionEvent::VideoMode(enabled) => Some(enabled),
        _ => None,
    })
    .await;
    assert!(enabled);

    assert!(!session.client.toggle_video_mode().await.unwrap());
    assert!(session.client.toggle_video_mode().await.unwrap());
    assert_eq!(media.camera_requests(), 1);
}

#[tokio::test]
async fn test_refused_camera_keeps_session_open() {
    let media = Arc::new(MockMediaDevices::new().camera_behavior(DeviceBehavior::Deny));
    let session = open_with(media, StartOptions::default()).await;

    let error = session.client.toggle_video_mode().await.unwrap_err();
    assert!(error.is_permission_denied());
    assert_eq!(session.client.state().await.unwrap(), SessionState::Open);

    let summary = session.client.leave(None).await.unwrap();
    assert!(!summary.video_mode_enabled);
}

#[tokio::test]
async fn test_denied_camera_fails_video_start() {
    let microphone = MockAudioSource::new();
    let probe = microphone.probe();
    let media = Arc::new(
        MockMediaDevices::new()
            .with_microphone(microphone)
            .camera_behavior(DeviceBehavior::Deny),
    );
    let Fixture { controller, .. } = fixture(media, MemoryConnector::auto_opening);
    let (client, _events) = controller.spawn();

    let error = client
        .start(StartOptions { video_mode: true })
        .await
        .unwrap_err();
    assert!(error.is_permission_denied());

    let state = client.state().await.unwrap();
    match &state {
        SessionState::Error { cause } => {
            assert!(cause.is_permission_denied());
            assert_eq!(
                *cause,
                FailureCause::PermissionDenied {
                    device: CaptureDevice::Camera
                }
            );
        }
        other => panic!("Expected error state, got {:?}", other),
    }
    assert!(probe.is_released());
}

async fn assert_cancelled_start(
    media: Arc<MockMediaDevices>,
    configure: impl FnOnce(MemoryConnector) -> MemoryConnector,
    options: StartOptions,
    microphone: &AudioProbe,
) {
    let Fixture { controller, .. } = fixture(media, configure);
    let (client, _events) = controller.spawn();

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.start(options).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());
    assert_eq!(client.state().await.unwrap(), SessionState::Connecting);

    let summary = client.leave(None).await.unwrap();
    assert_eq!(summary.duration_secs, 0);
    assert!(summary.transcript.is_empty());

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(ConnectFlowError::SessionCancelled)));
    assert_eq!(client.state().await.unwrap(), SessionState::Closed);
    assert!(microphone.is_released());
    assert!(!microphone.is_started());
}

#[tokio::test]
async fn test_leave_while_connecting_cancels_start() {
    let microphone = MockAudioSource::new();
    let probe = microphone.probe();
    let media = Arc::new(MockMediaDevices::new().with_microphone(microphone));
    assert_cancelled_start(
        media,
        MemoryConnector::pending,
        StartOptions::default(),
        &probe,
    )
    .await;
}

#[tokio::test]
async fn test_leave_while_camera_prompt_is_open() {
    let microphone = MockAudioSource::new();
    let probe = microphone.probe();
    let media = Arc::new(
        MockMediaDevices::new()
            .with_microphone(microphone)
            .camera_behavior(DeviceBehavior::Pending),
    );
    assert_cancelled_start(
        Arc::clone(&media),
        MemoryConnector::auto_opening,
        StartOptions { video_mode: true },
        &probe,
    )
    .await;
    assert_eq!(media.camera_requests(), 1);
}

#[tokio::test]
async fn test_nothing_changes_after_transport_error() {
    let mut session = open().await;
    session
        .remote
        .send(ServerEvent::OutputTranscript("partial".to_string()))
        .await;
    session
        .remote
        .send(ServerEvent::Error {
            cause: "socket reset".to_string(),
        })
        .await;

    let cause = next_failure(&mut session.events).await;
    assert_eq!(
        cause,
        FailureCause::Transport {
            message: "socket reset".to_string()
        }
    );
    assert_eq!(session.playback.closed_count(), 1);

    assert!(
        !session
            .remote
            .send(ServerEvent::AudioChunk(agent_audio(100)))
            .await
    );
    assert!(!session.remote.send(ServerEvent::TurnComplete).await);
    assert!(session.playback.scheduled().is_empty());
    assert!(session.client.transcript().await.unwrap().is_empty());

    let summary = session.client.leave(None).await.unwrap();
    assert!(summary.transcript.is_empty());
    assert!(session.client.state().await.unwrap().is_terminal());
    assert!(matches!(
        session.client.state().await.unwrap(),
        SessionState::Error { .. }
    ));
}

#[tokio::test]
async fn test_nothing_changes_after_leave() {
    let mut session = open().await;
    session
        .remote
        .send(ServerEvent::AudioChunk(agent_audio(100)))
        .await;
    wait_until(|| session.playback.scheduled().len() == 1).await;

    session.client.leave(None).await.unwrap();
    assert!(
        !session
            .remote
            .send(ServerEvent::AudioChunk(agent_audio(100)))
            .await
    );
    assert_eq!(session.playback.scheduled().len(), 1);
    assert_eq!(session.playback.closed_count(), 1);
    let end = tokio::time::timeout(WAIT, session.remote.next_frame()).await;
    assert!(matches!(end, Ok(None)));

    let again = session
        .client
        .start(StartOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(again, ConnectFlowError::InvalidState { .. }));
}

#[tokio::test]
async fn test_microphone_track_end_is_an_error() {
    let microphone = MockAudioSource::new()
        .with_read(vec![0.0; 16])
        .ending_after_reads();
    let probe = microphone.probe();
    let media = Arc::new(MockMediaDevices::new().with_microphone(microphone));
    let mut session = open_with(media, StartOptions::default()).await;

    let cause = next_failure(&mut session.events).await;
    assert!(matches!(
        cause,
        FailureCause::DeviceUnavailable {
            device: CaptureDevice::Microphone,
            ..
        }
    ));
    wait_until(|| probe.is_released()).await;
}

#[tokio::test]
async fn test_camera_track_end_is_an_error() {
    let camera = MockVideoSource::new().ending_after_frames();
    let probe = camera.probe();
    let media = Arc::new(MockMediaDevices::new().with_camera(camera));
    let mut session = open_with(media, StartOptions { video_mode: true }).await;

    let cause = next_failure(&mut session.events).await;
    assert!(matches!(
        cause,
        FailureCause::DeviceUnavailable {
            device: CaptureDevice::Camera,
            ..
        }
    ));
    wait_until(|| probe.is_released()).await;
}

#[tokio::test]
async fn test_summary_reports_duration_transcript_and_metrics() {
    let mut session = open().await;
    session
        .remote
        .send(ServerEvent::InputTranscript("How are you?".to_string()))
        .await;
    session
        .remote
        .send(ServerEvent::OutputTranscript("Great!".to_string()))
        .await;
    session.remote.send(ServerEvent::TurnComplete).await;
    next_utterance(&mut session.events).await;
    next_utterance(&mut session.events).await;

    session.clock.advance(Duration::from_millis(61_200));
    let summary = session
        .client
        .leave(Some(serde_json::json!({ "round_trip_ms": 240 })))
        .await
        .unwrap();

    assert_eq!(summary.duration_secs, 61);
    assert_eq!(summary.transcript.len(), 2);
    assert_eq!(summary.transcript[0].speaker, Speaker::User);
    assert_eq!(summary.transcript[1].text, "Great!");
    assert_eq!(
        summary.metrics,
        Some(serde_json::json!({ "round_trip_ms": 240 }))
    );
    assert!(!summary.video_mode_enabled);

    let again = session.client.leave(None).await.unwrap();
    assert_eq!(again.duration_secs, 61);
    assert_eq!(again.transcript, summary.transcript);
    assert_eq!(
        session.client.state().await.unwrap(),
        SessionState::Closed
    );
}
