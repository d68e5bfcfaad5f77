//! Secure-element contract for the supported tag family (NTAG424 DNA).
//!
//! The AES secure-messaging byte encoding stays behind this trait; the
//! lifecycle and the workflows only ever see these operations and
//! [`DnaStatus`] codes. A hardware implementation drives the reader's
//! data-exchange pass-through; tests use
//! [`MockSecureElement`](crate::mock::MockSecureElement).

use crate::error::Result;
use tapgate_core::{AesKey, KeySlot, TagUid};
use tapgate_pn532::SelectedTag;

pub trait SecureElement: Send {
    /// Bind this element to the given selected target. Implicitly ends any
    /// previous authenticated session.
    async fn select(&mut self, tag: &SelectedTag) -> Result<()>;

    /// Read the 7-byte UID of the selected tag.
    async fn get_uid(&mut self) -> Result<TagUid>;

    /// Run the full mutual authentication for `slot` with a locally known
    /// key. On success the session is authenticated for key operations.
    ///
    /// # Errors
    /// `Tag(AuthenticationError)` when the key does not match.
    async fn authenticate(&mut self, slot: KeySlot, key: &AesKey) -> Result<()>;

    /// Start the split authentication for `slot` and return the tag's
    /// 16-byte challenge. The answering half lives with the remote
    /// authority, which holds the diversified key.
    async fn authenticate_begin(&mut self, slot: KeySlot) -> Result<[u8; 16]>;

    /// Change the key in `slot` from `old` to `new`.
    ///
    /// Requires an authenticated session with the application key.
    /// Changing the application key itself ends the session.
    async fn change_key(
        &mut self,
        slot: KeySlot,
        old: &AesKey,
        new: &AesKey,
        version: u8,
    ) -> Result<()>;

    /// Whether the tag still carries its factory key set.
    async fn is_factory_default(&mut self) -> Result<bool>;
}
