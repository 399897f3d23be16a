//! In-process channel for tests and demos.

use crate::channel::{ChannelLink, Connector, ServerEvent, SessionSetup};
use crate::error::{ConnectFlowError, Result};
use crate::streaming::frame::OutboundFrame;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

const INBOUND_CAPACITY: usize = 256;

/// The agent's side of a memory channel.
pub struct RemoteEnd {
    pub setup: SessionSetup,
    pub frames: mpsc::UnboundedReceiver<OutboundFrame>,
    pub events: mpsc::Sender<ServerEvent>,
}

impl RemoteEnd {
    /// Deliver an event. Returns false once the session dropped its end.
    pub async fn send(&self, event: ServerEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    pub async fn open(&self) -> bool {
        self.send(ServerEvent::Opened).await
    }

    /// Next frame the session sent, or `None` once it closed the link.
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        self.frames.recv().await
    }

    /// True once the session side no longer receives events.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

#[derive(Debug, Clone)]
enum Mode {
    Connect { auto_open: bool },
    Fail(String),
    Pending,
}

/// Connector whose remote ends are handed to the test.
pub struct MemoryConnector {
    remotes: mpsc::UnboundedSender<RemoteEnd>,
    mode: Mode,
    connects: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (remotes, rx) = mpsc::unbounded_channel();
        (
            Self {
                remotes,
                mode: Mode::Connect { auto_open: false },
                connects: AtomicUsize::new(0),
            },
            rx,
        )
    }

    /// Send `Opened` as soon as a session connects.
    pub fn auto_opening(mut self) -> Self {
        self.mode = Mode::Connect { auto_open: true };
        self
    }

    /// Refuse every connection with a transport error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.mode = Mode::Fail(message.into());
        self
    }

    /// Never complete a connection attempt.
    pub fn pending(mut self) -> Self {
        self.mode = Mode::Pending;
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, setup: &SessionSetup) -> Result<ChannelLink> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let auto_open = match &self.mode {
            Mode::Connect { auto_open } => *auto_open,
            Mode::Fail(message) => {
                return Err(ConnectFlowError::Transport {
                    message: message.clone(),
                });
            }
            Mode::Pending => std::future::pending().await,
        };

        let (outbound, frames) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::channel(INBOUND_CAPACITY);
        if auto_open && events.send(ServerEvent::Opened).await.is_err() {
            tracing::debug!("Inbound closed before open");
        }

        let remote = RemoteEnd {
            setup: setup.clone(),
            frames,
            events,
        };
        self.remotes
            .send(remote)
            .map_err(|_| ConnectFlowError::Transport {
                message: "memory endpoint is gone".to_string(),
            })?;

        Ok(ChannelLink { outbound, inbound })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::AudioFrame;

    fn setup() -> SessionSetup {
        SessionSetup {
            model: "m".to_string(),
            voice: "v".to_string(),
            system_instruction: "s".to_string(),
            sign_instruction: None,
            video_mode: false,
            input_sample_rate: 16000,
            output_sample_rate: 24000,
        }
    }

    #[tokio::test]
    async fn test_link_carries_both_directions() {
        let (connector, mut remotes) = MemoryConnector::new();
        let mut link = connector.connect(&setup()).await.unwrap();
        let mut remote = remotes.recv().await.unwrap();
        assert_eq!(remote.setup, setup());

        assert!(remote.open().await);
        assert_eq!(link.inbound.recv().await, Some(ServerEvent::Opened));

        let frame = OutboundFrame::Audio(AudioFrame {
            sequence: 0,
            data: vec![0, 0],
            sample_rate: 16000,
        });
        link.outbound.send(frame.clone()).unwrap();
        assert_eq!(remote.next_frame().await, Some(frame));
    }

    #[tokio::test]
    async fn test_auto_opening() {
        let (connector, _remotes) = MemoryConnector::new();
        let connector = connector.auto_opening();
        let mut link = connector.connect(&setup()).await.unwrap();
        assert_eq!(link.inbound.recv().await, Some(ServerEvent::Opened));
    }

    #[tokio::test]
    async fn test_failing_connector() {
        let (connector, _remotes) = MemoryConnector::new();
        let connector = connector.failing("refused");
        let result = connector.connect(&setup()).await;
        assert!(matches!(result, Err(ConnectFlowError::Transport { .. })));
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_close_is_visible_to_remote() {
        let (connector, mut remotes) = MemoryConnector::new();
        let link = connector.connect(&setup()).await.unwrap();
        let mut remote = remotes.recv().await.unwrap();

        link.close();
        assert!(remote.is_closed());
        assert!(remote.next_frame().await.is_none());
        assert!(!remote.send(ServerEvent::TurnComplete).await);
    }
}
