//! Request correlation with the remote access authority.
//!
//! Outbound requests are JSON payloads published fire-and-forget; inbound
//! responses arrive on a separate channel and carry the `requestId` of the
//! request they answer. [`CloudRequest`] mints ids, tracks in-flight
//! requests with deadlines and resolves each caller's
//! [`PendingResponse`] exactly once — with the decoded payload, a remote
//! error, a publish failure or a timeout from the periodic sweep.

#![allow(async_fn_in_trait)]

pub mod error;
pub mod messages;
pub mod publish;
pub mod request;
pub mod response;

pub use error::{CloudError, Result};
pub use messages::{
    AuthorizePart1Request, AuthorizePart1Response, AuthorizePart2Request, AuthorizePart2Response,
    KeyDiversificationRequest, KeyDiversificationResponse, TerminalRequest,
};
pub use publish::{MockPublisher, Publisher};
pub use request::{CloudRequest, REQUEST_TOPIC};
pub use response::{PendingResponse, ResponseState};
