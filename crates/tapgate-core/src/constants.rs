//! Protocol and timing constants.

use std::time::Duration;

/// UID length of the supported tag family (NTAG424 7-byte UID).
pub const TAG_UID_LENGTH: usize = 7;

/// All tag keys are AES-128.
pub const AES_KEY_LENGTH: usize = 16;

/// Number of independently keyed application areas on a tag.
pub const KEY_SLOT_COUNT: usize = 5;

/// Maximum parameter bytes in one reader-chip frame.
pub const MAX_FRAME_PARAMS: usize = 254;

/// Per-command link timeout.
///
/// The reader chip datasheet specifies 89 ms for the dialog structure at
/// 115200 baud (6.2.2 Dialog structure).
pub const LINK_TIMEOUT: Duration = Duration::from_millis(89);

/// Serial baud rate of the reader-chip link.
pub const LINK_BAUD_RATE: u32 = 115_200;

/// Retries when a command is not ACKed on the data link level.
pub const ACK_RETRIES: u32 = 3;

/// Retries (NACK-and-retry) when a response frame is malformed.
pub const RESPONSE_RETRIES: u32 = 3;

/// Release/reselect attempts before the tag lifecycle escalates a
/// persistent tag error to a full controller reset.
pub const TAG_ERROR_RETRIES: u32 = 4;

/// Interval of the tag presence poll while a tag is selected (~10 Hz).
pub const PRESENCE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Grace period between detecting a blank tag and requesting diversified
/// keys from the remote authority.
pub const PERSONALIZE_GRACE_PERIOD: Duration = Duration::from_millis(3000);

/// Default deadline for one cloud round-trip.
pub const CLOUD_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
