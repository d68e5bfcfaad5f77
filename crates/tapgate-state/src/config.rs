//! Plain configuration values for wiring and tests.
//!
//! Provisioning is out of scope here; anything that can produce a
//! terminal key implements [`TerminalConfig`], and this static variant
//! covers fixed deployments and test setups.

use tapgate_core::{AesKey, TerminalConfig};

#[derive(Debug, Clone)]
pub struct StaticConfig {
    terminal_key: Option<AesKey>,
}

impl StaticConfig {
    #[must_use]
    pub fn new(terminal_key: AesKey) -> Self {
        StaticConfig {
            terminal_key: Some(terminal_key),
        }
    }

    /// A terminal that has not been provisioned yet.
    #[must_use]
    pub fn unconfigured() -> Self {
        StaticConfig { terminal_key: None }
    }
}

impl TerminalConfig for StaticConfig {
    fn terminal_key(&self) -> AesKey {
        // Callers gate on `is_configured`; the factory key is a harmless
        // stand-in that never authenticates a personalized tag.
        self.terminal_key.unwrap_or(AesKey::FACTORY_DEFAULT)
    }

    fn is_configured(&self) -> bool {
        self.terminal_key.is_some()
    }
}
