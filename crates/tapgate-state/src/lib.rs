//! Terminal workflow layer.
//!
//! Two workflows run against the tag in the field — authorization for a
//! personalized tag, personalization for a blank one — each a small state
//! machine stepped by pure functions from two contexts: the tag-I/O task
//! (secure-element side) and the control task (cloud side). The shared
//! [`Terminal`] handle holds the current state behind a mutex and applies
//! transitions atomically, dropping any step that raced a tag removal.

#![allow(async_fn_in_trait)]

pub mod authorize;
pub mod config;
pub mod control;
pub mod personalize;
pub mod terminal;

pub use authorize::AuthorizeState;
pub use config::StaticConfig;
pub use control::{CONTROL_TICK_INTERVAL, ControlLoop};
pub use personalize::PersonalizeState;
pub use terminal::{TagState, Terminal};
