//! Shared terminal state handle.
//!
//! One value describes what the terminal is doing with the tag in front
//! of it. Both execution contexts and the UI collaborator observe it
//! through cheap snapshots; replacement happens atomically under the
//! lock. Workflow steps run on a snapshot *outside* the lock, and their
//! transition is applied only if the workflow is still in the state the
//! step was computed from — a removal that raced the step wins.

use crate::{
    authorize::{self, AuthorizeState},
    personalize::{self, PersonalizeState},
};
use std::{
    mem::discriminant,
    sync::{Arc, Mutex, MutexGuard},
};
use tapgate_cloud::{CloudRequest, Publisher};
use tapgate_core::{TagUid, TerminalConfig, constants::PERSONALIZE_GRACE_PERIOD};
use tapgate_nfc::{SecureElement, TagEventSink};
use tracing::{debug, info};

/// What the terminal is doing with the tag in front of it.
#[derive(Debug, Clone)]
pub enum TagState {
    /// No tag present.
    Idle,
    /// A tag was detected but not yet classified.
    Detected,
    /// A foreign tag is present; nothing to do with it.
    Unknown,
    /// Authorization workflow for an authenticated tag.
    Authorize { uid: TagUid, state: AuthorizeState },
    /// Personalization workflow for a blank tag.
    Personalize { uid: TagUid, state: PersonalizeState },
}

pub struct Terminal<P: Publisher> {
    state: Mutex<TagState>,
    cloud: Arc<CloudRequest<P>>,
    config: Arc<dyn TerminalConfig>,
}

impl<P: Publisher> Terminal<P> {
    pub fn new(cloud: Arc<CloudRequest<P>>, config: Arc<dyn TerminalConfig>) -> Self {
        Terminal {
            state: Mutex::new(TagState::Idle),
            cloud,
            config,
        }
    }

    #[must_use]
    pub fn cloud(&self) -> &Arc<CloudRequest<P>> {
        &self.cloud
    }

    /// Read-only view for the UI collaborator and tests.
    #[must_use]
    pub fn snapshot(&self) -> TagState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, TagState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn tag_found(&self) {
        info!("tag found");
        *self.lock() = TagState::Detected;
    }

    pub fn tag_authenticated(&self, uid: TagUid) {
        info!(%uid, "tag authenticated, starting authorization");
        *self.lock() = TagState::Authorize {
            uid,
            state: AuthorizeState::Start,
        };
    }

    pub fn blank_tag(&self, uid: TagUid) {
        if !self.config.is_configured() {
            // An unconfigured terminal cannot fetch diversified keys;
            // leave the blank tag alone.
            debug!(%uid, "blank tag ignored, terminal not configured");
            *self.lock() = TagState::Unknown;
            return;
        }
        info!(%uid, "blank tag, starting personalization");
        *self.lock() = TagState::Personalize {
            uid,
            state: PersonalizeState::begin(PERSONALIZE_GRACE_PERIOD),
        };
    }

    pub fn unknown_tag(&self) {
        info!("unknown tag");
        *self.lock() = TagState::Unknown;
    }

    pub fn tag_removed(&self) {
        info!("tag removed");
        *self.lock() = TagState::Idle;
    }

    /// Run at most one tag-context workflow step against the selected tag.
    pub async fn drive_tag_step<S: SecureElement>(&self, element: &mut S) {
        match self.snapshot() {
            TagState::Authorize { uid, state } => {
                if let Some(next) = authorize::step_on_tag(&state, element).await {
                    self.merge_authorize(uid, &state, next);
                }
            }
            TagState::Personalize { uid, state } => {
                if let Some(next) = personalize::step_on_tag(&state, element).await {
                    self.merge_personalize(uid, &state, next);
                }
            }
            _ => {}
        }
    }

    /// Run at most one control-context workflow step (cloud side).
    pub async fn drive_control_step(&self) {
        match self.snapshot() {
            TagState::Authorize { uid, state } => {
                if let Some(next) = authorize::step_on_control(&state, uid, &self.cloud).await {
                    self.merge_authorize(uid, &state, next);
                }
            }
            TagState::Personalize { uid, state } => {
                if let Some(next) = personalize::step_on_control(&state, uid, &self.cloud).await {
                    self.merge_personalize(uid, &state, next);
                }
            }
            _ => {}
        }
    }

    /// Apply an authorization transition unless the workflow moved on
    /// (or the tag was removed) while the step ran.
    fn merge_authorize(&self, uid: TagUid, stepped_from: &AuthorizeState, next: AuthorizeState) {
        let mut state = self.lock();
        match &*state {
            TagState::Authorize {
                uid: current_uid,
                state: current,
            } if *current_uid == uid && discriminant(current) == discriminant(stepped_from) => {
                *state = TagState::Authorize { uid, state: next };
            }
            _ => debug!("authorization state changed mid-step, dropping transition"),
        }
    }

    fn merge_personalize(
        &self,
        uid: TagUid,
        stepped_from: &PersonalizeState,
        next: PersonalizeState,
    ) {
        let mut state = self.lock();
        match &*state {
            TagState::Personalize {
                uid: current_uid,
                state: current,
            } if *current_uid == uid && discriminant(current) == discriminant(stepped_from) => {
                *state = TagState::Personalize { uid, state: next };
            }
            _ => debug!("personalization state changed mid-step, dropping transition"),
        }
    }
}

/// The lifecycle drives the terminal through this sink from the tag-I/O
/// task; the control loop shares the same `Arc`.
impl<P: Publisher> TagEventSink for Terminal<P> {
    async fn on_tag_found(&self) {
        self.tag_found();
    }

    async fn on_tag_authenticated(&self, uid: TagUid) {
        self.tag_authenticated(uid);
    }

    async fn on_blank_tag(&self, uid: TagUid) {
        self.blank_tag(uid);
    }

    async fn on_unknown_tag(&self) {
        self.unknown_tag();
    }

    async fn on_tag_removed(&self) {
        self.tag_removed();
    }

    async fn on_tag_idle<S: SecureElement>(&self, element: &mut S) {
        self.drive_tag_step(element).await;
    }
}
