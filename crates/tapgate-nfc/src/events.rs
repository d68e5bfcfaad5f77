//! Events the tag lifecycle raises toward the terminal state.

use crate::ntag::SecureElement;
use std::sync::Arc;
use tapgate_core::TagUid;

/// Sink for tag lifecycle events.
///
/// Implemented by the terminal state handle; the lifecycle calls these
/// from the tag-I/O task. `on_tag_idle` is the lifecycle handing the
/// selected tag to the state layer for one workflow step, so tag commands
/// stay confined to the tag-I/O task.
pub trait TagEventSink: Send + Sync {
    /// A target was selected; classification has not run yet.
    async fn on_tag_found(&self);

    /// The tag authenticated against the terminal key.
    async fn on_tag_authenticated(&self, uid: TagUid);

    /// The tag carries the factory key set and can be personalized.
    async fn on_blank_tag(&self, uid: TagUid);

    /// Neither our key set nor factory-fresh.
    async fn on_unknown_tag(&self);

    /// The tag left the field (or the session was abandoned).
    async fn on_tag_removed(&self);

    /// The selected tag is present and idle; drive at most one tag-side
    /// workflow step.
    async fn on_tag_idle<S: SecureElement>(&self, element: &mut S);
}

/// A shared handle to a sink is itself a sink.
impl<T: TagEventSink> TagEventSink for Arc<T> {
    async fn on_tag_found(&self) {
        (**self).on_tag_found().await;
    }

    async fn on_tag_authenticated(&self, uid: TagUid) {
        (**self).on_tag_authenticated(uid).await;
    }

    async fn on_blank_tag(&self, uid: TagUid) {
        (**self).on_blank_tag(uid).await;
    }

    async fn on_unknown_tag(&self) {
        (**self).on_unknown_tag().await;
    }

    async fn on_tag_removed(&self) {
        (**self).on_tag_removed().await;
    }

    async fn on_tag_idle<S: SecureElement>(&self, element: &mut S) {
        (**self).on_tag_idle(element).await;
    }
}
