//! Terminal session entry point.
//!
//! Runs one session against a JSON-lines agent: microphone (or WAV file) in,
//! agent audio out, transcript printed as it is finalized.

use crate::channel::JsonLinesConnector;
use crate::cli::RunArgs;
use crate::config::Config;
use crate::error::{ConnectFlowError, Result};
use crate::media::{MicrophoneInput, SystemMediaDevices};
use crate::playback::{OutputFactory, VirtualOutputFactory};
use crate::session::{
    SessionConfig, SessionController, SessionEvent, SessionState, SessionSummary, StartOptions,
};
use crate::transcript::{Speaker, Utterance};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Counters reported as the summary's metrics snapshot.
#[derive(Debug, Default)]
struct RunStats {
    interruptions: usize,
    dropped_chunks: usize,
}

struct Console {
    quiet: bool,
    color: bool,
}

impl Console {
    fn new(quiet: bool) -> Self {
        Self {
            quiet,
            color: std::io::stdout().is_terminal(),
        }
    }

    fn status(&self, message: &str) {
        if !self.quiet {
            eprintln!("{}", message);
        }
    }

    fn label(&self, speaker: Speaker) -> String {
        let name = speaker.to_string();
        if !self.color {
            return name;
        }
        match speaker {
            Speaker::User => name.cyan().bold().to_string(),
            Speaker::Agent => name.green().bold().to_string(),
            Speaker::Signed => name.magenta().bold().to_string(),
        }
    }

    fn utterance(&self, utterance: &Utterance) {
        println!("{}: {}", self.label(utterance.speaker), utterance.text);
    }

    /// Print one event. Returns true once the session reached a terminal
    /// state.
    fn event(&self, event: &SessionEvent, stats: &mut RunStats) -> bool {
        match event {
            SessionEvent::Utterance(utterance) => self.utterance(utterance),
            SessionEvent::Interrupted { .. } => stats.interruptions += 1,
            SessionEvent::AudioDropped { sequence, reason } => {
                stats.dropped_chunks += 1;
                tracing::debug!(sequence, reason = %reason, "Agent audio chunk skipped");
            }
            SessionEvent::VideoMode(enabled) => {
                self.status(if *enabled {
                    "Video mode on"
                } else {
                    "Video mode off"
                });
            }
            SessionEvent::StateChanged(SessionState::Error { cause }) => {
                eprintln!("Session failed: {}", cause);
                if cause.is_permission_denied() {
                    eprintln!("Grant access to the device and start a new session.");
                }
                return true;
            }
            SessionEvent::StateChanged(state) => {
                tracing::debug!(%state, "Session state");
                return state.is_terminal();
            }
        }
        false
    }

    fn summary(&self, summary: &SessionSummary) {
        self.status(&format!(
            "Session lasted {}s with {} utterances{}",
            summary.duration_secs,
            summary.transcript.len(),
            if summary.video_mode_enabled {
                " (video mode on)"
            } else {
                ""
            }
        ));
    }
}

fn output_factory(mute: bool) -> Arc<dyn OutputFactory> {
    if mute {
        return Arc::new(VirtualOutputFactory::default());
    }
    #[cfg(feature = "cpal-audio")]
    {
        Arc::new(crate::audio::output::CpalOutputFactory)
    }
    #[cfg(not(feature = "cpal-audio"))]
    {
        tracing::warn!("Built without cpal-audio, agent audio is not played");
        Arc::new(VirtualOutputFactory::default())
    }
}

fn write_summary(path: &Path, summary: &SessionSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| ConnectFlowError::Other(format!("Failed to serialize summary: {}", e)))?;
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), "Summary written");
    Ok(())
}

/// Run `connectflow run` until the user leaves or the session fails.
pub async fn run_session(mut config: Config, args: RunArgs, quiet: bool) -> Result<()> {
    if let Some(device) = &args.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(address) = &args.address {
        config.agent.address = address.clone();
    }
    config.validate()?;

    let session_config = SessionConfig::from_config(&config);
    let microphone = match &args.input_wav {
        Some(path) => MicrophoneInput::Wav(path.clone()),
        None => MicrophoneInput::Device {
            name: config.audio.device.clone(),
            preferred_rate: config.audio.input_sample_rate,
        },
    };
    let media = Arc::new(SystemMediaDevices::new(
        microphone,
        config.video.still_image.clone(),
    ));
    let connector = Arc::new(JsonLinesConnector::new(
        config.agent.address.clone(),
        session_config.connect_timeout,
    ));

    let (client, mut events) =
        SessionController::new(session_config, media, connector, output_factory(args.mute))
            .spawn();
    let console = Console::new(quiet);
    let mut stats = RunStats::default();

    console.status(&format!("Connecting to {}...", config.agent.address));
    let started = tokio::select! {
        result = client.start(StartOptions { video_mode: args.video }) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    match started {
        None => {
            console.status("Cancelled");
            client.leave(None).await?;
            return Ok(());
        }
        Some(Err(e)) => {
            if e.is_permission_denied() {
                eprintln!("Grant access to the device and try again.");
            }
            return Err(e);
        }
        Some(Ok(())) => {}
    }
    console.status("Session open. Enter 'v' to toggle video mode, 'q' to leave.");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let deadline = async {
        match args.max_duration {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    if console.event(&event, &mut stats) {
                        break;
                    }
                }
                None => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "q" | "quit" => break,
                    "v" | "video" => {
                        if let Err(e) = client.toggle_video_mode().await {
                            eprintln!("Cannot toggle video mode: {}", e);
                        }
                    }
                    "" => {}
                    other => console.status(&format!("Unknown command '{}'", other)),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "Reading stdin failed");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => {
                console.status("Maximum duration reached");
                break;
            }
        }
    }

    let metrics = serde_json::json!({
        "interruptions": stats.interruptions,
        "dropped_chunks": stats.dropped_chunks,
        "client_version": crate::version_string(),
    });
    let summary = client.leave(Some(metrics)).await?;
    while let Some(event) = events.try_recv() {
        console.event(&event, &mut stats);
    }
    console.summary(&summary);
    if let Some(path) = &args.summary {
        write_summary(path, &summary)?;
    }

    match client.state().await? {
        SessionState::Error { cause } => Err(ConnectFlowError::Other(format!(
            "Session ended with an error: {}",
            cause
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FailureCause;
    use chrono::Utc;

    fn console() -> Console {
        Console {
            quiet: true,
            color: false,
        }
    }

    #[test]
    fn test_plain_labels() {
        let console = console();
        assert_eq!(console.label(Speaker::User), "user");
        assert_eq!(console.label(Speaker::Signed), "signed");
    }

    #[test]
    fn test_event_counts_and_terminal_detection() {
        let console = console();
        let mut stats = RunStats::default();

        assert!(!console.event(&SessionEvent::Interrupted { cut: 2 }, &mut stats));
        assert!(!console.event(
            &SessionEvent::AudioDropped {
                sequence: 4,
                reason: "odd".to_string()
            },
            &mut stats
        ));
        assert!(!console.event(
            &SessionEvent::Utterance(Utterance::new(Speaker::Agent, "Hi", Utc::now())),
            &mut stats
        ));
        assert!(!console.event(
            &SessionEvent::StateChanged(SessionState::Open),
            &mut stats
        ));
        assert!(console.event(
            &SessionEvent::StateChanged(SessionState::Closed),
            &mut stats
        ));
        assert!(console.event(
            &SessionEvent::StateChanged(SessionState::Error {
                cause: FailureCause::Transport {
                    message: "reset".to_string()
                }
            }),
            &mut stats
        ));

        assert_eq!(stats.interruptions, 1);
        assert_eq!(stats.dropped_chunks, 1);
    }

    #[test]
    fn test_write_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = SessionSummary {
            transcript: vec![Utterance::new(Speaker::User, "Hello", Utc::now())],
            duration_secs: 12,
            metrics: None,
            video_mode_enabled: false,
        };

        write_summary(&path, &summary).unwrap();
        let parsed: SessionSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, summary);
    }
}
