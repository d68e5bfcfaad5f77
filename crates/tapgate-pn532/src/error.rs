use thiserror::Error;

/// Errors of the reader-chip link layer.
///
/// Checksum and frame-shape violations are hard protocol errors at this
/// layer; retrying them is the caller's decision (or the ACK/NACK step's),
/// never the decoder's.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No ACK or response frame arrived within the link timeout.
    #[error("Link timeout")]
    Timeout,

    /// Payload checksum did not sum to zero.
    #[error("Frame data checksum mismatch")]
    ChecksumMismatch,

    /// LEN and length-checksum bytes are inconsistent.
    #[error("Frame length checksum mismatch (len {len:#04x}, lcs {lcs:#04x})")]
    LengthChecksum { len: u8, lcs: u8 },

    /// Frame identifier (direction byte) was not device-to-host.
    #[error("Unexpected frame identifier {0:#04x}")]
    UnexpectedFrameIdentifier(u8),

    /// Response echoed a different command than the one sent.
    #[error("Unexpected response command: expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedResponse { expected: u8, actual: u8 },

    /// The command was never acknowledged on the data link level.
    #[error("No ACK after {0} attempts")]
    AckMissing(u32),

    /// GetFirmwareVersion returned a payload other than the supported one.
    #[error("Controller firmware mismatch")]
    FirmwareMismatch,

    /// InListPassiveTarget found zero targets.
    #[error("No target in field")]
    NoTarget,

    /// InDataExchange reported a non-zero status byte.
    #[error("Data exchange failed with status {0:#04x}")]
    Exchange(u8),

    /// A response frame arrived but its payload was empty or truncated.
    #[error("Empty or truncated response")]
    EmptyResponse,

    /// Command parameters exceed the 254-byte frame limit.
    #[error("Frame too large ({0} parameter bytes)")]
    FrameTooLarge(usize),

    /// No start sequence within a frame-length worth of bytes.
    #[error("Frame start sequence not found")]
    FrameSync,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
