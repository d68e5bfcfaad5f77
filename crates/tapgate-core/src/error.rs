use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid tag UID length: expected {expected} bytes, got {actual}")]
    InvalidUidLength { expected: usize, actual: usize },

    #[error("Invalid key length: expected 16 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    #[error("Invalid key slot: {0}")]
    InvalidKeySlot(u8),
}

pub type Result<T> = std::result::Result<T, Error>;
