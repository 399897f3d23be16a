//! JSON-lines channel over TCP.

use crate::channel::protocol::{ClientMessage, ServerMessage};
use crate::channel::{ChannelLink, Connector, ServerEvent, SessionSetup};
use crate::error::{ConnectFlowError, Result};
use crate::streaming::frame::OutboundFrame;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;

const INBOUND_CAPACITY: usize = 256;

/// Connects to an agent endpoint speaking [`crate::channel::protocol`].
#[derive(Debug, Clone)]
pub struct JsonLinesConnector {
    address: String,
    connect_timeout: Duration,
}

impl JsonLinesConnector {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

fn transport(message: String) -> ConnectFlowError {
    ConnectFlowError::Transport { message }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[async_trait]
impl Connector for JsonLinesConnector {
    async fn connect(&self, setup: &SessionSetup) -> Result<ChannelLink> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| transport(format!("Timed out connecting to {}", self.address)))?
            .map_err(|e| transport(format!("Failed to connect to {}: {}", self.address, e)))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Could not disable Nagle");
        }

        let (reader, mut writer) = stream.into_split();

        let setup_json = ClientMessage::setup(setup)
            .to_json()
            .map_err(|e| ConnectFlowError::Protocol {
                message: format!("Failed to serialize setup: {}", e),
            })?;
        write_line(&mut writer, &setup_json)
            .await
            .map_err(|e| transport(format!("Failed to send setup: {}", e)))?;
        tracing::debug!(address = %self.address, model = %setup.model, "Setup sent");

        let (outbound, frames) = mpsc::unbounded_channel();
        let (events, inbound) = mpsc::channel(INBOUND_CAPACITY);

        tokio::spawn(write_frames(writer, frames, events.clone()));
        tokio::spawn(read_events(reader, events));

        Ok(ChannelLink { outbound, inbound })
    }

    fn name(&self) -> &str {
        "json-lines"
    }
}

async fn write_frames(
    mut writer: OwnedWriteHalf,
    mut frames: mpsc::UnboundedReceiver<OutboundFrame>,
    events: mpsc::Sender<ServerEvent>,
) {
    while let Some(frame) = frames.recv().await {
        let line = match ClientMessage::realtime_input(&frame).to_json() {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, sequence = frame.sequence(), "Skipping unserializable frame");
                continue;
            }
        };
        if let Err(e) = write_line(&mut writer, &line).await {
            tracing::warn!(error = %e, "Outbound stream failed");
            if events
                .send(ServerEvent::Error {
                    cause: format!("write failed: {}", e),
                })
                .await
                .is_err()
            {
                tracing::debug!("Session gone before write failure was reported");
            }
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!(error = %e, "Failed to shut down socket");
    }
}

async fn read_events(reader: OwnedReadHalf, events: mpsc::Sender<ServerEvent>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        let next = tokio::select! {
            line = lines.next_line() => line,
            _ = events.closed() => return,
        };

        let terminal = match next {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match ServerMessage::from_json(line) {
                    Ok(message) => {
                        for event in message.into_events() {
                            if events.send(event).await.is_err() {
                                return;
                            }
                        }
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Ignoring malformed server message");
                        continue;
                    }
                }
            }
            Ok(None) => ServerEvent::Closed {
                reason: "connection closed by peer".to_string(),
            },
            Err(e) => ServerEvent::Error {
                cause: format!("read failed: {}", e),
            },
        };

        if events.send(terminal).await.is_err() {
            tracing::debug!("Session gone before channel end was reported");
        }
        return;
    }
}
