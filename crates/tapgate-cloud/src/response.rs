//! Shared handle for a response that has not arrived yet.

use crate::error::CloudError;
use std::sync::{Arc, Mutex, MutexGuard};

/// Resolution state of one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseState<T> {
    /// Still in flight.
    Pending,
    /// Decoded response payload.
    Ready(T),
    /// Resolved with a failure (timeout, publish error, bad payload).
    Failed(CloudError),
}

/// Cheaply clonable handle to a request's eventual outcome.
///
/// The correlation layer resolves it exactly once; any later resolution
/// attempt is a no-op. Consumers `poll()` a snapshot from their step loop,
/// never block on it.
#[derive(Debug)]
pub struct PendingResponse<T> {
    inner: Arc<Mutex<ResponseState<T>>>,
}

impl<T> Clone for PendingResponse<T> {
    fn clone(&self) -> Self {
        PendingResponse {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for PendingResponse<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PendingResponse<T> {
    #[must_use]
    pub fn new() -> Self {
        PendingResponse {
            inner: Arc::new(Mutex::new(ResponseState::Pending)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResponseState<T>> {
        // The critical sections only swap the enum value; recover the
        // state rather than cascading a panic from another thread.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolve with a decoded payload. Returns `false` if the request was
    /// already resolved (the value is dropped in that case).
    pub fn resolve(&self, value: T) -> bool {
        let mut state = self.lock();
        if matches!(*state, ResponseState::Pending) {
            *state = ResponseState::Ready(value);
            true
        } else {
            false
        }
    }

    /// Resolve with a failure. Returns `false` if already resolved.
    pub fn fail(&self, error: CloudError) -> bool {
        let mut state = self.lock();
        if matches!(*state, ResponseState::Pending) {
            *state = ResponseState::Failed(error);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(*self.lock(), ResponseState::Pending)
    }
}

impl<T: Clone> PendingResponse<T> {
    /// Snapshot of the current state. Never blocks on I/O.
    #[must_use]
    pub fn poll(&self) -> ResponseState<T> {
        self.lock().clone()
    }
}
