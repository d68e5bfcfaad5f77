//! Personalization workflow for a factory-fresh tag.
//!
//! A blank tag first sits out a grace period (so a briefly presented tag
//! is not half-written), then the control task requests its diversified
//! key set, and the tag-I/O task rotates all five slots. The rotation is
//! idempotent: every slot is probed against both the factory key and its
//! target key first, so a re-run after a torn write finishes the job
//! instead of failing on it.

use tapgate_cloud::{
    CloudRequest, KeyDiversificationRequest, KeyDiversificationResponse, PendingResponse,
    Publisher, ResponseState,
};
use tapgate_core::{
    AesKey, KeySlot, TagUid,
    constants::{CLOUD_REQUEST_TIMEOUT, KEY_SLOT_COUNT},
};
use tapgate_nfc::{NfcError, Result as NfcResult, SecureElement};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Key version written with every rotated key.
const KEY_VERSION: u8 = 1;

#[derive(Debug, Clone)]
pub enum PersonalizeState {
    /// Grace period before any write happens.
    Wait { deadline: Instant },
    /// Key diversification round-trip in flight.
    AwaitKeys {
        response: PendingResponse<KeyDiversificationResponse>,
    },
    /// Keys in hand; rotate the tag's slots.
    UpdateTag { keys: [AesKey; KEY_SLOT_COUNT] },
    /// All five slots carry their diversified keys.
    Completed,
    Failed { message: String },
}

impl PersonalizeState {
    /// A fresh workflow with its grace deadline.
    #[must_use]
    pub fn begin(grace: std::time::Duration) -> Self {
        PersonalizeState::Wait {
            deadline: Instant::now() + grace,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PersonalizeState::Completed | PersonalizeState::Failed { .. }
        )
    }
}

/// Control-context step: grace timer and the key request round-trip.
pub async fn step_on_control<P: Publisher>(
    state: &PersonalizeState,
    uid: TagUid,
    cloud: &CloudRequest<P>,
) -> Option<PersonalizeState> {
    match state {
        PersonalizeState::Wait { deadline } => {
            if Instant::now() < *deadline {
                return None;
            }
            info!(%uid, "requesting diversified keys");
            let request = KeyDiversificationRequest { uid: uid.to_hex() };
            let response = cloud.send_request(&request, CLOUD_REQUEST_TIMEOUT).await;
            Some(PersonalizeState::AwaitKeys { response })
        }

        PersonalizeState::AwaitKeys { response } => match response.poll() {
            ResponseState::Pending => None,
            ResponseState::Ready(keys) => match keys.keys() {
                Ok(keys) => Some(PersonalizeState::UpdateTag { keys }),
                Err(err) => Some(PersonalizeState::Failed {
                    message: err.to_string(),
                }),
            },
            ResponseState::Failed(err) => Some(PersonalizeState::Failed {
                message: err.to_string(),
            }),
        },

        _ => None,
    }
}

/// Tag-context step: the key rotation itself.
pub async fn step_on_tag<S: SecureElement>(
    state: &PersonalizeState,
    element: &mut S,
) -> Option<PersonalizeState> {
    match state {
        PersonalizeState::UpdateTag { keys } => match rotate_keys(element, keys).await {
            Ok(()) => {
                info!("personalization complete");
                Some(PersonalizeState::Completed)
            }
            Err(err) => {
                warn!(%err, "personalization failed");
                Some(PersonalizeState::Failed {
                    message: err.to_string(),
                })
            }
        },
        _ => None,
    }
}

/// Determine which key a slot currently holds: its target key (from an
/// earlier, interrupted run) or the factory default.
async fn probe_slot<S: SecureElement>(
    element: &mut S,
    slot: KeySlot,
    target: &AesKey,
) -> NfcResult<AesKey> {
    match element.authenticate(slot, target).await {
        Ok(()) => return Ok(*target),
        Err(NfcError::Tag(_)) => {}
        Err(err) => return Err(err),
    }
    element
        .authenticate(slot, &AesKey::FACTORY_DEFAULT)
        .await?;
    Ok(AesKey::FACTORY_DEFAULT)
}

/// Rotate every slot to its diversified key, application slot last.
///
/// Changing the application key ends the authenticated session, so it has
/// to close the sequence; all other slots are rotated under one session
/// authenticated with whichever application key is currently live.
async fn rotate_keys<S: SecureElement>(
    element: &mut S,
    keys: &[AesKey; KEY_SLOT_COUNT],
) -> NfcResult<()> {
    let mut current = [AesKey::FACTORY_DEFAULT; KEY_SLOT_COUNT];
    for slot in KeySlot::ALL {
        let index = slot.as_u8() as usize;
        current[index] = probe_slot(element, slot, &keys[index]).await?;
    }

    let application = KeySlot::Application.as_u8() as usize;
    element
        .authenticate(KeySlot::Application, &current[application])
        .await?;

    for slot in KeySlot::ROTATION_ORDER {
        let index = slot.as_u8() as usize;
        if current[index] == keys[index] {
            debug!(%slot, "slot already rotated");
            continue;
        }
        element
            .change_key(slot, &current[index], &keys[index], KEY_VERSION)
            .await?;
    }
    Ok(())
}
