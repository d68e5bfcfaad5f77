use tapgate_core::DnaStatus;
use tapgate_pn532::TransportError;
use thiserror::Error;

/// Errors of the tag session layer.
#[derive(Error, Debug)]
pub enum NfcError {
    /// The reader-chip link failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The tag answered with a non-OK status code.
    #[error("Tag status: {0}")]
    Tag(DnaStatus),

    /// A tag operation was attempted with no tag selected.
    #[error("No tag selected")]
    NotSelected,

    /// A key operation was attempted without an authenticated session.
    #[error("No authenticated session")]
    NotAuthenticated,

    #[error(transparent)]
    Core(#[from] tapgate_core::Error),
}

impl NfcError {
    /// The tag status code, if this error carries one.
    #[must_use]
    pub fn tag_status(&self) -> Option<DnaStatus> {
        match self {
            NfcError::Tag(status) => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, NfcError>;
