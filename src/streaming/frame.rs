//! Outbound media frames handed to the remote channel.

use crate::audio::pcm::AudioFrame;
use crate::video::ImageFrame;

/// Anything the session sends to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Audio(AudioFrame),
    Image(ImageFrame),
}

impl OutboundFrame {
    pub fn mime_type(&self) -> String {
        match self {
            OutboundFrame::Audio(frame) => frame.mime_type(),
            OutboundFrame::Image(frame) => frame.mime_type().to_string(),
        }
    }

    /// Encoded payload bytes.
    pub fn data(&self) -> &[u8] {
        match self {
            OutboundFrame::Audio(frame) => &frame.data,
            OutboundFrame::Image(frame) => &frame.data,
        }
    }

    pub fn sequence(&self) -> u64 {
        match self {
            OutboundFrame::Audio(frame) => frame.sequence,
            OutboundFrame::Image(frame) => frame.sequence,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, OutboundFrame::Audio(_))
    }
}
