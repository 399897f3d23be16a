//! Bidirectional link to the remote conversational agent.
//!
//! A [`Connector`] opens a [`ChannelLink`]: an unbounded queue of outbound
//! frames plus a stream of [`ServerEvent`]s. Dropping the link closes it.

pub mod memory;
pub mod protocol;
pub mod tcp;

pub use memory::{MemoryConnector, RemoteEnd};
pub use tcp::JsonLinesConnector;

use crate::error::Result;
use crate::streaming::frame::OutboundFrame;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Everything the agent can tell the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The channel is ready; media may flow.
    Opened,
    /// Encoded PCM16 of the agent's voice.
    AudioChunk(Vec<u8>),
    InputTranscript(String),
    OutputTranscript(String),
    TurnComplete,
    /// The user talked over the agent; pending speech must be cut.
    Interrupted,
    Closed { reason: String },
    Error { cause: String },
}

/// Parameters sent to the agent when the channel opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetup {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    /// Added to the instruction whenever set, since video mode can be
    /// switched on after the setup was sent.
    pub sign_instruction: Option<String>,
    pub video_mode: bool,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
}

impl SessionSetup {
    /// System instruction for this session.
    pub fn instruction(&self) -> String {
        match &self.sign_instruction {
            Some(sign) if !sign.trim().is_empty() => {
                format!("{}\n\n{}", self.system_instruction, sign)
            }
            _ => self.system_instruction.clone(),
        }
    }
}

/// An open channel.
pub struct ChannelLink {
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub inbound: mpsc::Receiver<ServerEvent>,
}

impl ChannelLink {
    /// Close both directions. Pending inbound events are discarded.
    pub fn close(mut self) {
        self.inbound.close();
    }
}

/// Opens channels to the agent.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a channel and send `setup`. Returns before `Opened` arrives.
    async fn connect(&self, setup: &SessionSetup) -> Result<ChannelLink>;

    fn name(&self) -> &str;
}
