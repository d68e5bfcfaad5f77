//! Transport driver for the PN532 contactless reader chip.
//!
//! The PN532 is attached over a byte-oriented serial link and speaks a
//! framed command/response dialog: every host command is acknowledged on
//! the data link level before the chip sends its response frame. This
//! crate owns that dialog end to end — wire framing and checksums
//! ([`Frame`], [`LinkCodec`]), the ACK/NACK/retry/timeout rules
//! ([`Pn532`]) and the serial-link abstraction ([`SerialLink`]) with a
//! channel-backed mock for tests.
//!
//! It knows nothing about tags beyond target selection; authentication
//! lives in the layers above.

#![allow(async_fn_in_trait)]

pub mod codec;
pub mod driver;
pub mod error;
pub mod frame;
pub mod link;
pub mod mock;

pub use codec::{LinkCodec, LinkEvent};
pub use driver::{Pn532, SelectedTag};
pub use error::{Result, TransportError};
pub use frame::Frame;
pub use link::SerialLink;
pub use mock::{MockLink, MockLinkHandle};
