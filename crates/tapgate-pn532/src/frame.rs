//! Wire format of one reader-chip frame.
//!
//! ```text
//! [00] [00] [FF] [LEN] [LCS] [TFI] [CMD] [params ...] [DCS] [00]
//!  preamble  |    |     |     |
//!       start codes     |     direction byte (0xD4 host->device)
//!                       LEN = 1 (TFI) + 1 (CMD) + params
//!                       LCS = (~LEN + 1) & 0xFF
//! DCS = (~(TFI + CMD + sum(params)) + 1) & 0xFF
//! ```
//!
//! ACK and NACK are fixed six-byte frames with no payload.

use crate::error::{Result, TransportError};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use tapgate_core::constants::MAX_FRAME_PARAMS;

pub const PREAMBLE: u8 = 0x00;
pub const START_CODE_1: u8 = 0x00;
pub const START_CODE_2: u8 = 0xFF;
pub const POSTAMBLE: u8 = 0x00;

/// Direction byte, host to device.
pub const TFI_HOST_TO_DEVICE: u8 = 0xD4;
/// Direction byte, device to host.
pub const TFI_DEVICE_TO_HOST: u8 = 0xD5;

pub const ACK_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00];
pub const NACK_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00];

/// Dummy byte that wakes the chip from power-down before a command.
pub const WAKEUP: u8 = 0x55;

/// Expected GetFirmwareVersion payload (IC 0x32, version 1.6, support 0x07).
pub const FIRMWARE_VERSION: [u8; 4] = [0x32, 0x01, 0x06, 0x07];

/// Command bytes used by this terminal.
pub mod commands {
    pub const DIAGNOSE: u8 = 0x00;
    pub const GET_FIRMWARE_VERSION: u8 = 0x02;
    pub const SAM_CONFIGURATION: u8 = 0x14;
    pub const IN_DATA_EXCHANGE: u8 = 0x40;
    pub const IN_LIST_PASSIVE_TARGET: u8 = 0x4A;
    pub const IN_RELEASE: u8 = 0x52;
}

/// One command or response payload: a command byte plus parameter bytes.
///
/// Transient value with no identity of its own; callers build one per
/// dialog and the driver hands back the response as a new `Frame`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: u8,
    params: Vec<u8>,
}

impl Frame {
    /// Create a frame.
    ///
    /// # Errors
    /// Returns `TransportError::FrameTooLarge` beyond 254 parameter bytes.
    pub fn new(command: u8, params: impl Into<Vec<u8>>) -> Result<Self> {
        let params = params.into();
        if params.len() > MAX_FRAME_PARAMS {
            return Err(TransportError::FrameTooLarge(params.len()));
        }
        Ok(Frame { command, params })
    }

    #[must_use]
    pub fn command(&self) -> u8 {
        self.command
    }

    #[must_use]
    pub fn params(&self) -> &[u8] {
        &self.params
    }

    /// Response command byte the chip echoes for this command.
    #[must_use]
    pub fn expected_response(&self) -> u8 {
        self.command.wrapping_add(1)
    }

    /// Encode into the full wire frame, preamble through postamble.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        // LEN counts TFI + CMD + params.
        let len = (self.params.len() + 2) as u8;

        let mut buf = BytesMut::with_capacity(self.params.len() + 8);
        buf.put_u8(PREAMBLE);
        buf.put_u8(START_CODE_1);
        buf.put_u8(START_CODE_2);
        buf.put_u8(len);
        buf.put_u8(length_checksum(len));
        buf.put_u8(TFI_HOST_TO_DEVICE);
        buf.put_u8(self.command);
        buf.put_slice(&self.params);
        buf.put_u8(data_checksum(TFI_HOST_TO_DEVICE, self.command, &self.params));
        buf.put_u8(POSTAMBLE);
        buf.freeze()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame[{:#04x}]({})", self.command, hex::encode(&self.params))
    }
}

/// Two's complement of LEN; `(LEN + LCS) & 0xFF == 0` for a valid header.
#[must_use]
pub fn length_checksum(len: u8) -> u8 {
    (!len).wrapping_add(1)
}

/// Two's complement of the byte sum over direction byte, command and
/// parameters; summing those bytes plus the checksum is zero mod 256.
#[must_use]
pub fn data_checksum(tfi: u8, command: u8, params: &[u8]) -> u8 {
    let sum = params
        .iter()
        .fold(tfi.wrapping_add(command), |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}
