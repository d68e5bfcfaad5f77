//! Correlation of outbound requests with their eventual responses.
//!
//! Each request gets a process-unique [`RequestId`], an in-flight entry
//! with a deadline and a typed decode step, and a [`PendingResponse`]
//! handle for the caller. Responses arrive as raw JSON from the inbound
//! channel; an id that matches nothing is discarded (the workflow that
//! asked has moved on, usually because the tag was removed).

use crate::{
    error::CloudError,
    messages::TerminalRequest,
    publish::Publisher,
    response::PendingResponse,
};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tapgate_core::RequestId;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Topic all terminal requests are published on.
pub const REQUEST_TOPIC: &str = "terminal-request";

struct InFlight {
    deadline: Instant,
    /// Decodes the raw payload into the request's typed response and
    /// resolves the caller's handle. Owns the only strong obligation to
    /// resolve, so it runs exactly once.
    resolve: Box<dyn FnOnce(Result<Value, CloudError>) + Send>,
}

/// Request correlation layer over one [`Publisher`].
pub struct CloudRequest<P: Publisher> {
    publisher: P,
    counter: AtomicU64,
    inflight: Mutex<HashMap<RequestId, InFlight>>,
}

impl<P: Publisher> CloudRequest<P> {
    pub fn new(publisher: P) -> Self {
        CloudRequest {
            publisher,
            // 0 is the reserved "no request" sentinel.
            counter: AtomicU64::new(1),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock_inflight().len()
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<RequestId, InFlight>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish a typed request and hand back the response handle.
    ///
    /// Never returns an error: encoding or publish failures resolve the
    /// returned handle immediately, so callers have a single place to look
    /// for the outcome.
    pub async fn send_request<R: TerminalRequest>(
        &self,
        request: &R,
        timeout: Duration,
    ) -> PendingResponse<R::Response> {
        let pending = PendingResponse::new();

        let mut payload = match serde_json::to_value(request) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                pending.fail(CloudError::Encode("request is not a JSON object".into()));
                return pending;
            }
            Err(e) => {
                pending.fail(CloudError::Encode(e.to_string()));
                return pending;
            }
        };

        let id = RequestId::new(self.counter.fetch_add(1, Ordering::Relaxed));
        payload.insert("type".into(), Value::String(R::TYPE.into()));
        payload.insert("requestId".into(), Value::from(id.as_u64()));

        let resolver = pending.clone();
        let entry = InFlight {
            deadline: Instant::now() + timeout,
            resolve: Box::new(move |outcome| match outcome {
                Ok(value) => match serde_json::from_value::<R::Response>(value) {
                    Ok(response) => {
                        resolver.resolve(response);
                    }
                    Err(e) => {
                        resolver.fail(CloudError::MalformedResponse(e.to_string()));
                    }
                },
                Err(e) => {
                    resolver.fail(e);
                }
            }),
        };
        self.lock_inflight().insert(id, entry);

        debug!(%id, r#type = R::TYPE, "publishing terminal request");
        let body = Value::Object(payload).to_string();
        if let Err(e) = self.publisher.publish(REQUEST_TOPIC, body).await {
            warn!(%id, error = %e, "publish failed, resolving request immediately");
            if let Some(entry) = self.lock_inflight().remove(&id) {
                (entry.resolve)(Err(e));
            }
        }

        pending
    }

    /// Feed one raw response payload from the inbound channel.
    ///
    /// An unknown or already-resolved `requestId` is logged and discarded;
    /// only an uncorrelatable payload is an error to the caller.
    ///
    /// # Errors
    /// `MalformedResponse` when the payload is not JSON or lacks a numeric
    /// `requestId`.
    pub fn handle_response(&self, raw: &str) -> crate::error::Result<()> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| CloudError::MalformedResponse(e.to_string()))?;
        let id = value
            .get("requestId")
            .and_then(Value::as_u64)
            .map(RequestId::new)
            .ok_or_else(|| CloudError::MalformedResponse("missing requestId".into()))?;

        let Some(entry) = self.lock_inflight().remove(&id) else {
            warn!(%id, "response for unknown or timed-out request discarded");
            return Ok(());
        };

        if entry.deadline < Instant::now() {
            // Swept entries are already gone; this one merely raced the
            // sweep, so honor it.
            warn!(%id, "response arrived after its deadline");
        }

        if let Some(message) = value.get("error").and_then(Value::as_str) {
            (entry.resolve)(Err(CloudError::Remote(message.into())));
            return Ok(());
        }

        (entry.resolve)(Ok(value));
        Ok(())
    }

    /// Resolve every request whose deadline has passed with `Timeout`.
    ///
    /// Unexpired requests are never touched.
    pub fn check_timeouts(&self) {
        let now = Instant::now();

        let expired: Vec<(RequestId, InFlight)> = {
            let mut inflight = self.lock_inflight();
            let ids: Vec<RequestId> = inflight
                .iter()
                .filter(|(_, entry)| entry.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| inflight.remove(&id).map(|entry| (id, entry)))
                .collect()
        };

        // Resolution runs caller-provided decode closures; keep it outside
        // the in-flight lock.
        for (id, entry) in expired {
            warn!(%id, "request timed out");
            (entry.resolve)(Err(CloudError::Timeout));
        }
    }
}
