use thiserror::Error;

/// Failure of one remote-authority round-trip.
///
/// `Clone` because the terminal resolution of a request is shared through
/// [`PendingResponse`](crate::PendingResponse) snapshots.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    /// No response arrived before the request deadline.
    #[error("Request timed out")]
    Timeout,

    /// The request payload could not be published.
    #[error("Publishing request failed: {0}")]
    Publish(String),

    /// The request could not be encoded as a payload object.
    #[error("Request encoding failed: {0}")]
    Encode(String),

    /// A response arrived for this request but did not decode.
    #[error("Malformed response payload: {0}")]
    MalformedResponse(String),

    /// The remote authority answered with an error envelope.
    #[error("Remote authority error: {0}")]
    Remote(String),
}

pub type Result<T> = std::result::Result<T, CloudError>;
