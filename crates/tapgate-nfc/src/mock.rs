//! In-memory secure element for workflow and lifecycle tests.

use crate::{
    error::{NfcError, Result},
    ntag::SecureElement,
};
use tapgate_core::{
    AesKey, DnaStatus, KeySlot, TagUid,
    constants::KEY_SLOT_COUNT,
};
use tapgate_pn532::SelectedTag;

/// One recorded operation on the mock element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    Select,
    GetUid,
    Authenticate(KeySlot),
    AuthenticateBegin(KeySlot),
    ChangeKey(KeySlot),
    FactoryProbe,
}

/// Models a tag with five keyed slots and DESFire-style session rules:
/// key changes need an authenticated application-key session, and
/// rotating the application key ends that session.
#[derive(Debug)]
pub struct MockSecureElement {
    uid: TagUid,
    keys: [AesKey; KEY_SLOT_COUNT],
    key_versions: [u8; KEY_SLOT_COUNT],
    challenge: [u8; 16],
    selected: bool,
    session: Option<KeySlot>,
    fail_change_key: Option<DnaStatus>,
    log: Vec<MockOp>,
}

impl MockSecureElement {
    /// A factory-fresh tag: all slots hold the all-zero key.
    #[must_use]
    pub fn factory_fresh(uid: TagUid) -> Self {
        MockSecureElement {
            uid,
            keys: [AesKey::FACTORY_DEFAULT; KEY_SLOT_COUNT],
            key_versions: [0; KEY_SLOT_COUNT],
            challenge: [0x11; 16],
            selected: false,
            session: None,
            fail_change_key: None,
            log: Vec::new(),
        }
    }

    /// A tag already carrying the given key set.
    #[must_use]
    pub fn with_keys(uid: TagUid, keys: [AesKey; KEY_SLOT_COUNT]) -> Self {
        MockSecureElement {
            keys,
            key_versions: [1; KEY_SLOT_COUNT],
            ..Self::factory_fresh(uid)
        }
    }

    pub fn set_challenge(&mut self, challenge: [u8; 16]) {
        self.challenge = challenge;
    }

    /// Make every subsequent `change_key` fail with `status`.
    pub fn fail_change_key(&mut self, status: Option<DnaStatus>) {
        self.fail_change_key = status;
    }

    #[must_use]
    pub fn key(&self, slot: KeySlot) -> &AesKey {
        &self.keys[slot.as_u8() as usize]
    }

    #[must_use]
    pub fn key_version(&self, slot: KeySlot) -> u8 {
        self.key_versions[slot.as_u8() as usize]
    }

    #[must_use]
    pub fn operations(&self) -> &[MockOp] {
        &self.log
    }

    fn require_selected(&self) -> Result<()> {
        if self.selected {
            Ok(())
        } else {
            Err(NfcError::NotSelected)
        }
    }
}

impl SecureElement for MockSecureElement {
    async fn select(&mut self, _tag: &SelectedTag) -> Result<()> {
        self.log.push(MockOp::Select);
        self.selected = true;
        self.session = None;
        Ok(())
    }

    async fn get_uid(&mut self) -> Result<TagUid> {
        self.require_selected()?;
        self.log.push(MockOp::GetUid);
        Ok(self.uid)
    }

    async fn authenticate(&mut self, slot: KeySlot, key: &AesKey) -> Result<()> {
        self.require_selected()?;
        self.log.push(MockOp::Authenticate(slot));

        if self.keys[slot.as_u8() as usize] == *key {
            self.session = Some(slot);
            Ok(())
        } else {
            self.session = None;
            Err(NfcError::Tag(DnaStatus::AuthenticationError))
        }
    }

    async fn authenticate_begin(&mut self, slot: KeySlot) -> Result<[u8; 16]> {
        self.require_selected()?;
        self.log.push(MockOp::AuthenticateBegin(slot));
        // The split handshake supersedes any local session.
        self.session = None;
        Ok(self.challenge)
    }

    async fn change_key(
        &mut self,
        slot: KeySlot,
        old: &AesKey,
        new: &AesKey,
        version: u8,
    ) -> Result<()> {
        self.require_selected()?;
        self.log.push(MockOp::ChangeKey(slot));

        if self.session != Some(KeySlot::Application) {
            return Err(NfcError::NotAuthenticated);
        }
        if let Some(status) = self.fail_change_key {
            return Err(NfcError::Tag(status));
        }
        // Changing any key but the application key requires the current
        // key, mixed into the command cryptogram on real hardware.
        if slot != KeySlot::Application && self.keys[slot.as_u8() as usize] != *old {
            return Err(NfcError::Tag(DnaStatus::PermissionDenied));
        }

        self.keys[slot.as_u8() as usize] = *new;
        self.key_versions[slot.as_u8() as usize] = version;
        if slot == KeySlot::Application {
            self.session = None;
        }
        Ok(())
    }

    async fn is_factory_default(&mut self) -> Result<bool> {
        self.require_selected()?;
        self.log.push(MockOp::FactoryProbe);
        Ok(self.keys.iter().all(AesKey::is_factory_default))
    }
}
