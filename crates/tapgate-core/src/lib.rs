//! Core types shared by every tapgate crate.
//!
//! This crate carries no I/O: it defines the identifiers, key material
//! wrappers and error taxonomy that the transport driver, the cloud
//! correlation layer and the workflow state machines exchange.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use config::TerminalConfig;
pub use error::{Error, Result};
pub use types::{AesKey, DnaStatus, KeySlot, RequestId, TagUid};
