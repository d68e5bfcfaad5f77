//! Serial-link seam between the driver and whatever carries the bytes.
//!
//! Production wires this to a UART at 115200 baud; tests use the
//! channel-backed [`MockLink`](crate::mock::MockLink). The driver never
//! touches a port type directly, only this trait.

use crate::error::Result;
use bytes::BytesMut;

/// A byte pipe to the reader chip plus its reset line.
///
/// `read` appends whatever bytes are available to `buf` and returns how
/// many arrived, waiting until at least one byte is present. Cancellation
/// safety matters: the driver drops the read future when the link timeout
/// fires, and no bytes may be lost when that happens.
pub trait SerialLink: Send {
    /// Wait for input and append it to `buf`. Returns the number of bytes
    /// appended (never zero).
    async fn read(&mut self, buf: &mut BytesMut) -> Result<usize>;

    /// Write the whole buffer to the chip.
    async fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Drive the reset line. `true` asserts reset (chip held down).
    async fn set_reset(&mut self, asserted: bool) -> Result<()>;
}
