//! Channel-backed mock serial link for driver tests.
//!
//! [`MockLink::new`] returns the link (handed to the driver) and a
//! [`MockLinkHandle`] the test keeps. The handle scripts inbound bytes and
//! observes everything the driver did to the link. When the test has fed
//! all its bytes, further reads pend forever, so timeout paths are
//! exercised with `tokio::time::pause` instead of wall-clock waits.

use crate::{
    error::Result,
    frame::{ACK_FRAME, NACK_FRAME, TFI_DEVICE_TO_HOST, data_checksum, length_checksum},
    link::SerialLink,
};
use bytes::BytesMut;
use tokio::sync::mpsc;

/// One recorded driver action on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    /// Bytes the driver wrote, one `write` call per entry.
    Write(Vec<u8>),
    /// Reset line transition.
    Reset(bool),
}

/// Test double implementing [`SerialLink`] over channels.
#[derive(Debug)]
pub struct MockLink {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    commands: mpsc::UnboundedSender<LinkCommand>,
}

/// Test-side controller for a [`MockLink`].
#[derive(Debug)]
pub struct MockLinkHandle {
    inbound: mpsc::UnboundedSender<Vec<u8>>,
    commands: mpsc::UnboundedReceiver<LinkCommand>,
}

impl MockLink {
    #[must_use]
    pub fn new() -> (Self, MockLinkHandle) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (
            MockLink {
                inbound: inbound_rx,
                commands: command_tx,
            },
            MockLinkHandle {
                inbound: inbound_tx,
                commands: command_rx,
            },
        )
    }
}

impl SerialLink for MockLink {
    async fn read(&mut self, buf: &mut BytesMut) -> Result<usize> {
        match self.inbound.recv().await {
            Some(chunk) => {
                buf.extend_from_slice(&chunk);
                Ok(chunk.len())
            }
            // Script exhausted: behave like a silent wire so the driver's
            // own timeout decides what happens next.
            None => std::future::pending().await,
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let _ = self.commands.send(LinkCommand::Write(bytes.to_vec()));
        Ok(())
    }

    async fn set_reset(&mut self, asserted: bool) -> Result<()> {
        let _ = self.commands.send(LinkCommand::Reset(asserted));
        Ok(())
    }
}

impl MockLinkHandle {
    /// Queue raw bytes for the driver to read as one chunk.
    pub fn feed(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.inbound.send(bytes.into());
    }

    /// Queue a data-link ACK.
    pub fn feed_ack(&self) {
        self.feed(ACK_FRAME);
    }

    /// Queue a data-link NACK.
    pub fn feed_nack(&self) {
        self.feed(NACK_FRAME);
    }

    /// Queue a well-formed device-to-host response frame.
    pub fn feed_response(&self, command: u8, params: &[u8]) {
        self.feed(device_frame(command, params));
    }

    /// Pop the next recorded link action, if any.
    pub fn next_command(&mut self) -> Option<LinkCommand> {
        self.commands.try_recv().ok()
    }

    /// Drain all recorded link actions.
    pub fn drain_commands(&mut self) -> Vec<LinkCommand> {
        let mut commands = Vec::new();
        while let Some(command) = self.next_command() {
            commands.push(command);
        }
        commands
    }

    /// Drain recorded writes only, dropping reset transitions.
    pub fn drain_writes(&mut self) -> Vec<Vec<u8>> {
        self.drain_commands()
            .into_iter()
            .filter_map(|command| match command {
                LinkCommand::Write(bytes) => Some(bytes),
                LinkCommand::Reset(_) => None,
            })
            .collect()
    }
}

/// Encode a device-to-host frame as it would arrive on the wire.
#[must_use]
pub fn device_frame(command: u8, params: &[u8]) -> Vec<u8> {
    let len = (params.len() + 2) as u8;
    let mut bytes = vec![
        0x00,
        0x00,
        0xFF,
        len,
        length_checksum(len),
        TFI_DEVICE_TO_HOST,
        command,
    ];
    bytes.extend_from_slice(params);
    bytes.push(data_checksum(TFI_DEVICE_TO_HOST, command, params));
    bytes.push(0x00);
    bytes
}
