//! Tag session layer: the secure-element contract and the lifecycle
//! state machine that owns the reader from the tag-I/O task.
//!
//! The lifecycle waits for a tag, classifies it (ours, blank or foreign),
//! polls its presence while the state layer runs workflows against it,
//! and escalates persistent transport trouble to a controller reset.
//! Everything above this crate sees tags only through
//! [`TagEventSink`] events and the [`SecureElement`] operations.

#![allow(async_fn_in_trait)]

pub mod error;
pub mod events;
pub mod lifecycle;
pub mod mock;
pub mod ntag;
pub mod reader;

pub use error::{NfcError, Result};
pub use events::TagEventSink;
pub use lifecycle::{Phase, TagLifecycle};
pub use mock::{MockOp, MockSecureElement};
pub use ntag::SecureElement;
pub use reader::TagReader;
