//! JSON-lines wire protocol between the client and the agent endpoint.
//!
//! One JSON object per line. Binary payloads are base64.

use crate::channel::{ServerEvent, SessionSetup};
use crate::streaming::frame::OutboundFrame;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Encoded media payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaBlob {
    pub mime_type: String,
    /// Base64 of the raw bytes.
    pub data: String,
}

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message of every connection.
    Setup {
        model: String,
        voice: String,
        system_instruction: String,
        input_audio_transcription: bool,
        output_audio_transcription: bool,
    },
    /// One captured audio window or video still.
    RealtimeInput { media: MediaBlob },
}

impl ClientMessage {
    pub fn setup(setup: &SessionSetup) -> Self {
        ClientMessage::Setup {
            model: setup.model.clone(),
            voice: setup.voice.clone(),
            system_instruction: setup.instruction(),
            input_audio_transcription: true,
            output_audio_transcription: true,
        }
    }

    pub fn realtime_input(frame: &OutboundFrame) -> Self {
        ClientMessage::RealtimeInput {
            media: MediaBlob {
                mime_type: frame.mime_type(),
                data: STANDARD.encode(frame.data()),
            },
        }
    }

    /// Serialize message to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Messages sent by the agent endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The session is ready for media.
    SetupComplete,
    /// Model output for the current turn. Every field is optional.
    ServerContent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_transcription: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_transcription: Option<String>,
        #[serde(default)]
        interrupted: bool,
        #[serde(default)]
        turn_complete: bool,
    },
    Error { message: String },
    /// The endpoint is about to close the connection.
    GoAway { reason: String },
}

impl ServerMessage {
    /// Serialize message to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Expand into session events.
    ///
    /// A `server_content` yields, in order: audio, interrupted, input
    /// fragment, output fragment, turn complete. Audio that is not valid
    /// base64 is dropped with a warning.
    pub fn into_events(self) -> Vec<ServerEvent> {
        match self {
            ServerMessage::SetupComplete => vec![ServerEvent::Opened],
            ServerMessage::ServerContent {
                audio,
                input_transcription,
                output_transcription,
                interrupted,
                turn_complete,
            } => {
                let mut events = Vec::new();
                if let Some(audio) = audio {
                    match STANDARD.decode(audio.as_bytes()) {
                        Ok(bytes) => events.push(ServerEvent::AudioChunk(bytes)),
                        Err(e) => tracing::warn!(error = %e, "Dropping undecodable audio payload"),
                    }
                }
                if interrupted {
                    events.push(ServerEvent::Interrupted);
                }
                if let Some(text) = input_transcription {
                    events.push(ServerEvent::InputTranscript(text));
                }
                if let Some(text) = output_transcription {
                    events.push(ServerEvent::OutputTranscript(text));
                }
                if turn_complete {
                    events.push(ServerEvent::TurnComplete);
                }
                events
            }
            ServerMessage::Error { message } => vec![ServerEvent::Error { cause: message }],
            ServerMessage::GoAway { reason } => vec![ServerEvent::Closed { reason }],
        }
    }

    /// Wire form of a single event, for endpoint implementations.
    pub fn from_event(event: &ServerEvent) -> Self {
        let mut content = Content::default();
        match event {
            ServerEvent::Opened => return ServerMessage::SetupComplete,
            ServerEvent::Closed { reason } => {
                return ServerMessage::GoAway {
                    reason: reason.clone(),
                };
            }
            ServerEvent::Error { cause } => {
                return ServerMessage::Error {
                    message: cause.clone(),
                };
            }
            ServerEvent::AudioChunk(bytes) => content.audio = Some(STANDARD.encode(bytes)),
            ServerEvent::InputTranscript(text) => content.input = Some(text.clone()),
            ServerEvent::OutputTranscript(text) => content.output = Some(text.clone()),
            ServerEvent::TurnComplete => content.turn_complete = true,
            ServerEvent::Interrupted => content.interrupted = true,
        }
        ServerMessage::ServerContent {
            audio: content.audio,
            input_transcription: content.input,
            output_transcription: content.output,
            interrupted: content.interrupted,
            turn_complete: content.turn_complete,
        }
    }
}

#[derive(Default)]
struct Content {
    audio: Option<String>,
    input: Option<String>,
    output: Option<String>,
    interrupted: bool,
    turn_complete: bool,
}
