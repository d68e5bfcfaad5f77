use crate::{
    Result,
    constants::{AES_KEY_LENGTH, TAG_UID_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Fixed 7-byte identifier of an authenticated tag.
///
/// Copied by value once authentication succeeds and used as the correlation
/// key for workflows and remote-authority requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TagUid([u8; TAG_UID_LENGTH]);

impl TagUid {
    pub fn new(bytes: [u8; TAG_UID_LENGTH]) -> Self {
        TagUid(bytes)
    }

    /// Create a UID from a slice.
    ///
    /// # Errors
    /// Returns `Error::InvalidUidLength` if the slice is not exactly 7 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; TAG_UID_LENGTH] =
            bytes.try_into().map_err(|_| Error::InvalidUidLength {
                expected: TAG_UID_LENGTH,
                actual: bytes.len(),
            })?;
        Ok(TagUid(arr))
    }

    /// Parse from a plain (unseparated) hex string.
    ///
    /// # Errors
    /// Returns `Error::InvalidHex` on bad characters or wrong length.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Lowercase hex without separators, the form used in cloud payloads.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; TAG_UID_LENGTH] {
        &self.0
    }
}

/// Colon-separated uppercase hex, e.g. `AA:BB:CC:DD:EE:FF:00`.
impl fmt::Display for TagUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// Opaque 16-byte AES key.
///
/// # Security
/// - `Debug` is redacted; key bytes never reach logs at the value level.
/// - Comparison is constant-time (`subtle`).
/// - There is deliberately no `Serialize` implementation; the cloud codec
///   converts keys to hex explicitly at its boundary.
#[derive(Clone, Copy, Eq)]
pub struct AesKey([u8; AES_KEY_LENGTH]);

impl AesKey {
    /// The all-zero key every tag ships with from the factory.
    pub const FACTORY_DEFAULT: AesKey = AesKey([0u8; AES_KEY_LENGTH]);

    pub fn new(bytes: [u8; AES_KEY_LENGTH]) -> Self {
        AesKey(bytes)
    }

    /// Parse from a 32-character hex string.
    ///
    /// # Errors
    /// Returns `Error::InvalidHex` or `Error::InvalidKeyLength`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidHex(e.to_string()))?;
        let arr: [u8; AES_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidKeyLength(bytes.len()))?;
        Ok(AesKey(arr))
    }

    /// Lowercase hex encoding, for the cloud codec boundary only.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; AES_KEY_LENGTH] {
        &self.0
    }

    /// Whether this is the factory-default (all-zero) key.
    #[must_use]
    pub fn is_factory_default(&self) -> bool {
        *self == Self::FACTORY_DEFAULT
    }
}

impl PartialEq for AesKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AesKey(****)")
    }
}

/// One of the five independently keyed application areas on a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeySlot {
    Application = 0,
    Terminal = 1,
    Authorization = 2,
    Reserved1 = 3,
    Reserved2 = 4,
}

impl KeySlot {
    /// All slots, in probe order.
    pub const ALL: [KeySlot; 5] = [
        KeySlot::Application,
        KeySlot::Terminal,
        KeySlot::Authorization,
        KeySlot::Reserved1,
        KeySlot::Reserved2,
    ];

    /// Key rotation order during personalization.
    ///
    /// The application key (slot 0) is rotated last: changing it ends the
    /// authenticated session, so every other slot must be rotated first.
    pub const ROTATION_ORDER: [KeySlot; 5] = [
        KeySlot::Terminal,
        KeySlot::Authorization,
        KeySlot::Reserved1,
        KeySlot::Reserved2,
        KeySlot::Application,
    ];

    /// Create a key slot from its wire number.
    ///
    /// # Errors
    /// Returns `Error::InvalidKeySlot` for numbers outside 0-4.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(KeySlot::Application),
            1 => Ok(KeySlot::Terminal),
            2 => Ok(KeySlot::Authorization),
            3 => Ok(KeySlot::Reserved1),
            4 => Ok(KeySlot::Reserved2),
            _ => Err(Error::InvalidKeySlot(value)),
        }
    }

    #[inline]
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeySlot::Application => "application",
            KeySlot::Terminal => "terminal",
            KeySlot::Authorization => "authorization",
            KeySlot::Reserved1 => "reserved1",
            KeySlot::Reserved2 => "reserved2",
        };
        write!(f, "{name}")
    }
}

/// Opaque identifier of one outbound cloud request.
///
/// Minted monotonically by the correlation layer and never reused for the
/// lifetime of the process. `RequestId::NONE` is the reserved "no request"
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub const NONE: RequestId = RequestId(0);

    pub fn new(id: u64) -> Self {
        RequestId(id)
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status code returned by the secure-element tag for an application-level
/// command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnaStatus {
    OperationOk,
    NoSuchKey,
    LengthError,
    PermissionDenied,
    ParameterError,
    AuthenticationDelay,
    AuthenticationError,
    CommandAborted,
    MemoryError,
    Unknown(u8),
}

impl DnaStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => DnaStatus::OperationOk,
            0x40 => DnaStatus::NoSuchKey,
            0x7E => DnaStatus::LengthError,
            0x9D => DnaStatus::PermissionDenied,
            0x9E => DnaStatus::ParameterError,
            0xAD => DnaStatus::AuthenticationDelay,
            0xAE => DnaStatus::AuthenticationError,
            0xCA => DnaStatus::CommandAborted,
            0xEE => DnaStatus::MemoryError,
            other => DnaStatus::Unknown(other),
        }
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            DnaStatus::OperationOk => 0x00,
            DnaStatus::NoSuchKey => 0x40,
            DnaStatus::LengthError => 0x7E,
            DnaStatus::PermissionDenied => 0x9D,
            DnaStatus::ParameterError => 0x9E,
            DnaStatus::AuthenticationDelay => 0xAD,
            DnaStatus::AuthenticationError => 0xAE,
            DnaStatus::CommandAborted => 0xCA,
            DnaStatus::MemoryError => 0xEE,
            DnaStatus::Unknown(value) => value,
        }
    }

    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, DnaStatus::OperationOk)
    }
}

impl fmt::Display for DnaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnaStatus::Unknown(value) => write!(f, "unknown status {value:#04x}"),
            other => write!(f, "{other:?} ({:#04x})", other.as_u8()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn tag_uid_display_is_colon_separated() {
        let uid = TagUid::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00]);
        assert_eq!(uid.to_string(), "AA:BB:CC:DD:EE:FF:00");
        assert_eq!(uid.to_hex(), "aabbccddeeff00");
    }

    #[test]
    fn tag_uid_hex_round_trip() {
        let uid = TagUid::from_hex("04112233445566").unwrap();
        assert_eq!(TagUid::from_hex(&uid.to_hex()).unwrap(), uid);
    }

    #[rstest]
    #[case(&[0x04, 0x11, 0x22, 0x33][..])] // 4-byte UID: valid target, wrong family
    #[case(&[0u8; 10][..])]
    fn tag_uid_rejects_wrong_length(#[case] bytes: &[u8]) {
        assert!(TagUid::from_bytes(bytes).is_err());
    }

    #[test]
    fn aes_key_debug_is_redacted() {
        let key = AesKey::from_hex("f5e4b999d5aa629f193a874529c4aa2f").unwrap();
        assert_eq!(format!("{key:?}"), "AesKey(****)");
    }

    #[test]
    fn aes_key_factory_default() {
        assert!(AesKey::FACTORY_DEFAULT.is_factory_default());
        let key = AesKey::new([1u8; 16]);
        assert!(!key.is_factory_default());
        assert_ne!(key, AesKey::FACTORY_DEFAULT);
    }

    #[rstest]
    #[case(0, KeySlot::Application)]
    #[case(1, KeySlot::Terminal)]
    #[case(2, KeySlot::Authorization)]
    #[case(3, KeySlot::Reserved1)]
    #[case(4, KeySlot::Reserved2)]
    fn key_slot_wire_numbers(#[case] wire: u8, #[case] slot: KeySlot) {
        assert_eq!(KeySlot::from_u8(wire).unwrap(), slot);
        assert_eq!(slot.as_u8(), wire);
    }

    #[test]
    fn key_slot_rotation_order_ends_with_application() {
        assert_eq!(KeySlot::ROTATION_ORDER.len(), 5);
        assert_eq!(*KeySlot::ROTATION_ORDER.last().unwrap(), KeySlot::Application);
    }

    #[test]
    fn request_id_sentinel() {
        assert!(RequestId::NONE.is_none());
        assert!(!RequestId::new(1).is_none());
    }

    #[test]
    fn dna_status_round_trip() {
        for code in [0x00u8, 0x40, 0x7E, 0x9D, 0x9E, 0xAD, 0xAE, 0xCA, 0xEE, 0x42] {
            assert_eq!(DnaStatus::from_u8(code).as_u8(), code);
        }
        assert!(DnaStatus::OperationOk.is_ok());
        assert!(!DnaStatus::AuthenticationError.is_ok());
    }
}
