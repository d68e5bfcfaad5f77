//! Tokio codec for the reader-chip byte stream.
//!
//! [`LinkCodec`] extracts data-link events — ACK, NACK or a validated
//! response frame — from the raw serial byte stream. The driver feeds it
//! from its receive buffer and owns all dialog semantics (what to do on a
//! NACK, when a timeout aborts); the codec's contract is purely:
//!
//! - leading noise before the `00 FF` start code is skipped, bounded by
//!   one maximum frame length;
//! - a malformed LEN/LCS header consumes only the offending header, never
//!   bytes that belong to the next frame;
//! - frame identifier and payload checksum are validated before a frame is
//!   surfaced; violations are hard errors, not retried here.

use crate::{
    error::TransportError,
    frame::{Frame, START_CODE_2, TFI_DEVICE_TO_HOST},
};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// One maximum frame worth of bytes; more noise than this without a start
/// sequence means the stream is unsynchronized beyond repair.
const MAX_SYNC_SKIP: usize = 255;

/// A decoded data-link event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The chip acknowledged the last command frame.
    Ack,
    /// The chip rejected the last frame checksum and wants a resend.
    Nack,
    /// A validated response frame.
    Response(Frame),
}

/// Stateless scanner over the serial stream (only the noise-skip counter
/// persists between calls).
#[derive(Debug, Default)]
pub struct LinkCodec {
    skipped: usize,
}

impl LinkCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the `00 FF` start pair, discarding noise in front of it.
    ///
    /// Returns `Ok(true)` once the buffer starts with the pair.
    fn sync(&mut self, src: &mut BytesMut) -> Result<bool, TransportError> {
        while src.len() >= 2 {
            if src[0] == 0x00 && src[1] == START_CODE_2 {
                self.skipped = 0;
                return Ok(true);
            }
            src.advance(1);
            self.skipped += 1;
            if self.skipped > MAX_SYNC_SKIP {
                self.skipped = 0;
                return Err(TransportError::FrameSync);
            }
        }
        Ok(false)
    }
}

impl Decoder for LinkCodec {
    type Item = LinkEvent;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LinkEvent>, TransportError> {
        if !self.sync(src)? {
            return Ok(None);
        }

        // Start pair + LEN + LCS.
        if src.len() < 4 {
            return Ok(None);
        }
        let len = src[2];
        let lcs = src[3];

        // ACK and NACK are zero-payload pseudo frames with their own
        // LEN/LCS patterns (6.2.1.3 of the datasheet).
        if len == 0x00 && lcs == 0xFF {
            src.advance(4);
            return Ok(Some(LinkEvent::Ack));
        }
        if len == 0xFF && lcs == 0x00 {
            src.advance(4);
            return Ok(Some(LinkEvent::Nack));
        }

        if len.wrapping_add(lcs) != 0 {
            // Consume the bad header only. Whatever follows may be the
            // start of the next frame and must stay in the buffer.
            src.advance(4);
            return Err(TransportError::LengthChecksum { len, lcs });
        }

        // LEN payload bytes (TFI + CMD + params) plus the trailing DCS.
        let total = 4 + len as usize + 1;
        if src.len() < total {
            return Ok(None);
        }

        // A real frame carries at least TFI and a command byte; a shorter
        // LEN (0 or 1) has nothing to index into.
        if len < 2 {
            src.advance(total);
            return Err(TransportError::EmptyResponse);
        }

        let payload = &src[4..4 + len as usize];
        let dcs = src[4 + len as usize];

        let tfi = payload[0];
        if tfi != TFI_DEVICE_TO_HOST {
            src.advance(total);
            return Err(TransportError::UnexpectedFrameIdentifier(tfi));
        }

        let sum = payload.iter().fold(dcs, |acc, b| acc.wrapping_add(*b));
        if sum != 0 {
            src.advance(total);
            return Err(TransportError::ChecksumMismatch);
        }

        let frame = Frame::new(payload[1], payload[2..].to_vec())?;
        src.advance(total);
        Ok(Some(LinkEvent::Response(frame)))
    }
}

impl Encoder<Frame> for LinkCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), TransportError> {
        dst.put_slice(&item.encode());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{ACK_FRAME, NACK_FRAME, commands, data_checksum, length_checksum};

    /// Build a device-to-host response frame on the wire.
    fn response_bytes(command: u8, params: &[u8]) -> Vec<u8> {
        let len = (params.len() + 2) as u8;
        let mut bytes = vec![0x00, 0x00, 0xFF, len, length_checksum(len), TFI_DEVICE_TO_HOST, command];
        bytes.extend_from_slice(params);
        bytes.push(data_checksum(TFI_DEVICE_TO_HOST, command, params));
        bytes.push(0x00);
        bytes
    }

    #[test]
    fn decodes_ack_and_nack() {
        let mut codec = LinkCodec::new();

        let mut buf = BytesMut::from(&ACK_FRAME[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(LinkEvent::Ack));

        let mut buf = BytesMut::from(&NACK_FRAME[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(LinkEvent::Nack));
    }

    #[test]
    fn decodes_response_frame() {
        let mut codec = LinkCodec::new();
        let mut buf = BytesMut::from(response_bytes(0x03, &[0x32, 0x01, 0x06, 0x07]).as_slice());

        let event = codec.decode(&mut buf).unwrap().unwrap();
        let LinkEvent::Response(frame) = event else {
            panic!("expected response frame");
        };
        assert_eq!(frame.command(), 0x03);
        assert_eq!(frame.params(), &[0x32, 0x01, 0x06, 0x07]);
    }

    #[test]
    fn skips_leading_noise() {
        let mut codec = LinkCodec::new();
        let mut bytes = vec![0x13, 0x37, 0x00, 0x42];
        bytes.extend_from_slice(&ACK_FRAME);
        let mut buf = BytesMut::from(bytes.as_slice());

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(LinkEvent::Ack));
    }

    #[test]
    fn unbounded_noise_is_a_sync_error() {
        let mut codec = LinkCodec::new();
        let mut buf = BytesMut::from(vec![0x42u8; 300].as_slice());

        assert!(matches!(
            codec.decode(&mut buf),
            Err(TransportError::FrameSync)
        ));
    }

    #[test]
    fn partial_frame_returns_none() {
        let mut codec = LinkCodec::new();
        let full = response_bytes(0x4B, &[0x01, 0x01, 0x00, 0x04, 0x08, 0x04, 0xAA, 0xBB, 0xCC, 0xDD]);

        for cut in 0..full.len() - 2 {
            let mut buf = BytesMut::from(&full[..cut]);
            assert_eq!(codec.decode(&mut buf).unwrap(), None, "cut at {cut}");
        }
    }

    #[test]
    fn bad_length_checksum_preserves_next_frame() {
        let mut codec = LinkCodec::new();

        // Malformed header followed by a pristine ACK.
        let mut bytes = vec![0x00, 0xFF, 0x05, 0x05];
        bytes.extend_from_slice(&ACK_FRAME);
        let mut buf = BytesMut::from(bytes.as_slice());

        assert!(matches!(
            codec.decode(&mut buf),
            Err(TransportError::LengthChecksum { len: 0x05, lcs: 0x05 })
        ));
        // The ACK behind it is still decodable.
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(LinkEvent::Ack));
    }

    #[test]
    fn zero_length_header_is_an_error_not_a_panic() {
        let mut codec = LinkCodec::new();

        // LEN=0, LCS=0 satisfies the length checksum but carries no
        // payload to validate; it must surface as an error.
        let mut buf = BytesMut::from(&[0x00, 0xFF, 0x00, 0x00, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(TransportError::EmptyResponse)
        ));

        // Same for LEN=1: a lone TFI with no command byte.
        let mut bytes = vec![0x00, 0xFF, 0x01, 0xFF, TFI_DEVICE_TO_HOST, 0x00];
        bytes.extend_from_slice(&ACK_FRAME);
        let mut buf = BytesMut::from(bytes.as_slice());
        assert!(matches!(
            codec.decode(&mut buf),
            Err(TransportError::EmptyResponse)
        ));
        // The stream stays synchronized past the runt frame.
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(LinkEvent::Ack));
    }

    #[test]
    fn bad_data_checksum_is_hard_error() {
        let mut codec = LinkCodec::new();
        let mut bytes = response_bytes(0x03, &[0x32, 0x01, 0x06, 0x07]);
        let dcs_index = bytes.len() - 2;
        bytes[dcs_index] ^= 0xFF;
        let mut buf = BytesMut::from(bytes.as_slice());

        assert!(matches!(
            codec.decode(&mut buf),
            Err(TransportError::ChecksumMismatch)
        ));
    }

    #[test]
    fn wrong_direction_byte_is_rejected() {
        let mut codec = LinkCodec::new();
        let mut bytes = response_bytes(0x03, &[0x01]);
        // Patch TFI to host-to-device and fix the checksum up again.
        bytes[5] = 0xD4;
        let dcs_index = bytes.len() - 2;
        bytes[dcs_index] = data_checksum(0xD4, 0x03, &[0x01]);
        let mut buf = BytesMut::from(bytes.as_slice());

        assert!(matches!(
            codec.decode(&mut buf),
            Err(TransportError::UnexpectedFrameIdentifier(0xD4))
        ));
    }

    #[test]
    fn encoder_round_trips_through_decoder() {
        let mut codec = LinkCodec::new();
        let frame = Frame::new(commands::DIAGNOSE, vec![0x06]).unwrap();

        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).unwrap();

        // A host frame is not decodable as a response (wrong direction),
        // but the framing itself must be intact.
        assert_eq!(&buf[..3], &[0x00, 0x00, 0xFF]);
        assert_eq!(buf[3].wrapping_add(buf[4]), 0);
    }
}
