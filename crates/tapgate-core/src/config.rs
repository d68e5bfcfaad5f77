//! Configuration collaborator interface.
//!
//! Provisioning (factory data, remote config ledger) lives outside this
//! core; the authentication components only consume the terminal key and a
//! configured flag through this seam.

use crate::types::AesKey;

pub trait TerminalConfig: Send + Sync {
    /// The terminal-slot key this installation authenticates tags with.
    fn terminal_key(&self) -> AesKey;

    /// Whether provisioning has completed. Workflows that need cloud
    /// round-trips must not start on an unconfigured terminal.
    fn is_configured(&self) -> bool;
}
