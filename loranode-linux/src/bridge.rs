//! MAC bridge: TCP line protocol to the external MAC process.
//!
//! `MacLink` is the synchronous `MacLayer` handed to the node; it queues commands and tracks
//! whether a transmission is in flight. The run loop flushes the queue over the connection
//! after every callback.

use std::io;

use loranode_core::uplink::MAX_PAYLOAD_LEN;
use loranode_core::wire::{encode_command, MacCommand};
use loranode_core::{MacError, MacEvent, MacLayer, SessionParams};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

#[derive(Debug, Default)]
pub struct MacLink {
    outbox: Vec<MacCommand>,
    pending: bool,
}

impl MacLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the in-flight flag from an inbound event.
    pub fn observe(&mut self, event: &MacEvent) {
        if matches!(event, MacEvent::TransmissionComplete(_) | MacEvent::Reset) {
            self.pending = false;
        }
    }

    pub fn drain(&mut self) -> Vec<MacCommand> {
        std::mem::take(&mut self.outbox)
    }
}

impl MacLayer for MacLink {
    fn reset_session(&mut self) -> Result<(), MacError> {
        self.outbox.push(MacCommand::Reset);
        self.pending = false;
        Ok(())
    }

    fn set_session(&mut self, params: &SessionParams) -> Result<(), MacError> {
        self.outbox.push(MacCommand::Session(*params));
        Ok(())
    }

    fn submit_uplink(&mut self, port: u8, payload: &[u8]) -> Result<(), MacError> {
        if self.pending {
            return Err(MacError::Busy);
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(MacError::PayloadTooLarge(payload.len()));
        }
        self.outbox.push(MacCommand::Tx {
            port,
            payload: payload.to_vec(),
        });
        self.pending = true;
        Ok(())
    }

    fn is_transmission_pending(&self) -> bool {
        self.pending
    }
}

/// Connection to the MAC process.
pub struct BridgeConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl BridgeConnection {
    pub async fn connect(endpoint: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(endpoint).await?;
        stream.set_nodelay(true)?;
        let (read, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(read).lines(),
            writer,
        })
    }

    /// Next event line; `None` when the MAC closed the connection.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.lines.next_line().await
    }

    /// Send everything the node queued on `link`.
    pub async fn flush(&mut self, link: &mut MacLink) -> io::Result<()> {
        let commands = link.drain();
        if commands.is_empty() {
            return Ok(());
        }
        let mut buf = String::new();
        for cmd in &commands {
            buf.push_str(&encode_command(cmd));
            buf.push('\n');
        }
        self.writer.write_all(buf.as_bytes()).await?;
        self.writer.flush().await
    }
}
