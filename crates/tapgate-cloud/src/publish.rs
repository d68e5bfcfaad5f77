//! Outbound publishing seam to the remote authority.

use crate::error::{CloudError, Result};
use std::sync::Mutex;

/// Transport that carries serialized request payloads upstream.
///
/// Implementations deliver fire-and-forget; correlation and timeouts live
/// in [`CloudRequest`](crate::CloudRequest), not here.
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;
}

/// Capturing publisher for tests.
#[derive(Debug, Default)]
pub struct MockPublisher {
    published: Mutex<Vec<(String, String)>>,
    fail: Mutex<bool>,
}

impl MockPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail.
    pub fn fail_publishes(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|e| e.into_inner()) = fail;
    }

    /// All `(topic, payload)` pairs published so far.
    #[must_use]
    pub fn published(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The most recent payload, parsed as JSON.
    #[must_use]
    pub fn last_payload(&self) -> Option<serde_json::Value> {
        self.published()
            .last()
            .and_then(|(_, payload)| serde_json::from_str(payload).ok())
    }
}

impl Publisher for MockPublisher {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        if *self.fail.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(CloudError::Publish("mock publish failure".into()));
        }
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((topic.to_string(), payload));
        Ok(())
    }
}
