//! Command/response dialog with the reader chip.
//!
//! Every command follows the same shape: write the frame, wait for the
//! data-link ACK (resending on NACK or silence), then wait for the
//! response frame (NACKing corrupted frames to request a resend). A
//! response timeout is aborted by sending an ACK, per section 6.2.2.1 d)
//! of the datasheet, so the chip does not keep an answer queued for a
//! dialog the host already gave up on.

use crate::{
    codec::{LinkCodec, LinkEvent},
    error::{Result, TransportError},
    frame::{ACK_FRAME, FIRMWARE_VERSION, Frame, NACK_FRAME, WAKEUP, commands},
    link::SerialLink,
};
use bytes::BytesMut;
use std::time::Duration;
use tapgate_core::constants::{ACK_RETRIES, LINK_TIMEOUT, RESPONSE_RETRIES};
use tokio::time::{self, Instant};
use tokio_util::codec::Decoder;
use tracing::{debug, error, warn};

/// Reset line hold time. RSTOUT is not wired, so a generous hold stands in
/// for observing the actual reset.
const RESET_HOLD: Duration = Duration::from_millis(10);
/// Settle time after releasing reset.
const RESET_SETTLE: Duration = Duration::from_millis(10);
/// Oscillator start-up after the wakeup byte (T_osc_start, up to 2ms).
const WAKEUP_SETTLE: Duration = Duration::from_millis(2);

/// Presence check round-trip budget.
const PRESENCE_TIMEOUT: Duration = Duration::from_millis(100);

/// A target selected by InListPassiveTarget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedTag {
    /// Logical target number assigned by the chip.
    pub target: u8,
    /// The tag UID as reported during anticollision.
    pub uid: Vec<u8>,
}

/// Driver for one reader chip on one serial link.
#[derive(Debug)]
pub struct Pn532<L: SerialLink> {
    link: L,
    codec: LinkCodec,
    buf: BytesMut,
}

impl<L: SerialLink> Pn532<L> {
    pub fn new(link: L) -> Self {
        Pn532 {
            link,
            codec: LinkCodec::new(),
            buf: BytesMut::with_capacity(512),
        }
    }

    /// Pulse the reset line, wake the chip and bring it into normal mode.
    ///
    /// After reset the chip requires SAMConfiguration as the first command;
    /// the firmware version is then verified so a swapped or misflashed
    /// chip fails loudly at startup instead of subtly later.
    ///
    /// # Errors
    /// Any dialog error, or `FirmwareMismatch` for an unsupported chip.
    pub async fn reset_controller(&mut self) -> Result<()> {
        debug!("resetting reader chip");

        self.link.set_reset(true).await?;
        time::sleep(RESET_HOLD).await;
        self.link.set_reset(false).await?;
        time::sleep(RESET_SETTLE).await;

        // HSU wakeup: the chip counts rising edges on the serial line, so a
        // dummy byte precedes the first real frame.
        self.link.write(&[WAKEUP]).await?;
        time::sleep(WAKEUP_SETTLE).await;

        // Anything stale from before the reset is garbage now.
        self.buf.clear();

        // Normal mode, 1s virtual-card timeout (0x14 * 50ms), IRQ enabled.
        let sam = Frame::new(commands::SAM_CONFIGURATION, vec![0x01, 0x14, 0x01])?;
        self.call_function(sam).await?;

        self.check_controller_firmware().await
    }

    /// Verify the chip reports the supported firmware version.
    pub async fn check_controller_firmware(&mut self) -> Result<()> {
        let request = Frame::new(commands::GET_FIRMWARE_VERSION, vec![])?;
        let response = self.call_function(request).await?;

        if response.params() != FIRMWARE_VERSION {
            error!(
                firmware = %hex::encode(response.params()),
                "unsupported reader firmware"
            );
            return Err(TransportError::FirmwareMismatch);
        }
        Ok(())
    }

    /// Wait for a type A tag to enter the field and select it.
    ///
    /// # Errors
    /// `NoTarget` when the poll window closes without a tag, `Timeout` when
    /// the chip itself never answers.
    pub async fn wait_for_new_tag(&mut self, timeout: Duration) -> Result<SelectedTag> {
        // One target, 106 kbps type A.
        let request = Frame::new(commands::IN_LIST_PASSIVE_TARGET, vec![0x01, 0x00])?;
        let response = self.call_function_with(request, timeout).await?;
        let params = response.params();

        if params.is_empty() {
            return Err(TransportError::EmptyResponse);
        }
        if params[0] == 0 {
            return Err(TransportError::NoTarget);
        }

        // [NbTg, Tg, SENS_RES (2), SEL_RES, NFCIDLength, NFCID1...]
        if params.len() < 6 {
            return Err(TransportError::EmptyResponse);
        }
        let target = params[1];
        let uid_length = params[5] as usize;
        let uid = params
            .get(6..6 + uid_length)
            .ok_or(TransportError::EmptyResponse)?
            .to_vec();

        debug!(target, uid = %hex::encode(&uid), "tag selected");
        Ok(SelectedTag { target, uid })
    }

    /// Attention-request presence check for the selected tag.
    ///
    /// Returns `false` once the tag has left the field.
    pub async fn check_tag_still_available(&mut self) -> Result<bool> {
        // NumTst 0x06: ISO/IEC 14443-4 card presence detection.
        let request = Frame::new(commands::DIAGNOSE, vec![0x06])?;
        let response = self.call_function_with(request, PRESENCE_TIMEOUT).await?;

        let params = response.params();
        if params.len() != 1 {
            return Err(TransportError::EmptyResponse);
        }
        if params[0] != 0x00 {
            debug!(status = params[0], "tag left the field");
            return Ok(false);
        }
        Ok(true)
    }

    /// Release the selected target so the field is free for the next tag.
    pub async fn release_tag(&mut self, tag: &SelectedTag) -> Result<()> {
        let request = Frame::new(commands::IN_RELEASE, vec![tag.target])?;
        self.call_function(request).await?;
        Ok(())
    }

    /// Exchange one APDU with the selected tag via InDataExchange.
    ///
    /// # Errors
    /// `Exchange` carries the chip's non-zero status byte (RF timeout, CRC
    /// failure and friends, see section 7.1 of the datasheet).
    pub async fn transceive(&mut self, tag: &SelectedTag, data: &[u8]) -> Result<Vec<u8>> {
        let mut params = Vec::with_capacity(data.len() + 1);
        params.push(tag.target);
        params.extend_from_slice(data);

        let request = Frame::new(commands::IN_DATA_EXCHANGE, params)?;
        let response = self.call_function(request).await?;

        let params = response.params();
        let (&status, payload) = params
            .split_first()
            .ok_or(TransportError::EmptyResponse)?;
        if status != 0x00 {
            return Err(TransportError::Exchange(status));
        }
        Ok(payload.to_vec())
    }

    /// Full dialog with the default link timeout.
    pub async fn call_function(&mut self, frame: Frame) -> Result<Frame> {
        self.call_function_with(frame, LINK_TIMEOUT).await
    }

    /// Full dialog: send, await ACK, await response.
    pub async fn call_function_with(&mut self, frame: Frame, timeout: Duration) -> Result<Frame> {
        let expected = frame.expected_response();
        self.send_command(&frame).await?;

        match self.receive_response(expected, timeout).await {
            Err(TransportError::Timeout) => {
                // Abort the pending response so it is not delivered into
                // the next dialog (6.2.2.1 d).
                self.link.write(&ACK_FRAME).await?;
                Err(TransportError::Timeout)
            }
            other => other,
        }
    }

    /// Write the command frame and wait for its data-link ACK, resending
    /// on NACK, silence or anything else unexpected. A link that stays
    /// silent through every attempt surfaces as `Timeout`; garbage or
    /// NACKs exhaust the budget as `AckMissing`.
    async fn send_command(&mut self, frame: &Frame) -> Result<()> {
        let encoded = frame.encode();
        let mut attempts = 0u32;
        let mut silent = true;

        loop {
            attempts += 1;
            self.link.write(&encoded).await?;

            let deadline = Instant::now() + LINK_TIMEOUT;
            match self.next_event(deadline).await {
                Ok(LinkEvent::Ack) => return Ok(()),
                Ok(LinkEvent::Nack) => {
                    silent = false;
                    warn!(command = frame.command(), "NACK instead of ACK");
                }
                Ok(LinkEvent::Response(response)) => {
                    silent = false;
                    warn!(command = response.command(), "response frame instead of ACK");
                }
                Err(TransportError::Io(io)) => return Err(TransportError::Io(io)),
                Err(TransportError::Timeout) => {
                    warn!(command = frame.command(), "no ACK within the link timeout");
                }
                Err(err) => {
                    silent = false;
                    warn!(command = frame.command(), %err, "unusable bytes instead of ACK");
                }
            }

            if attempts > ACK_RETRIES {
                error!(command = frame.command(), attempts, "command never acknowledged");
                return if silent {
                    Err(TransportError::Timeout)
                } else {
                    Err(TransportError::AckMissing(attempts))
                };
            }
        }
    }

    /// Wait for the response frame, NACKing corrupted or unexpected frames
    /// to request a resend.
    async fn receive_response(&mut self, expected: u8, timeout: Duration) -> Result<Frame> {
        let deadline = Instant::now() + timeout;
        let mut retries = RESPONSE_RETRIES;

        loop {
            let failure = match self.next_event(deadline).await {
                Ok(LinkEvent::Response(frame)) => {
                    if frame.command() == expected {
                        return Ok(frame);
                    }
                    TransportError::UnexpectedResponse {
                        expected,
                        actual: frame.command(),
                    }
                }
                // Stray ACK/NACK between command and response carries no
                // information here; keep scanning.
                Ok(LinkEvent::Ack | LinkEvent::Nack) => continue,
                Err(TransportError::Timeout) => return Err(TransportError::Timeout),
                Err(TransportError::Io(io)) => return Err(TransportError::Io(io)),
                Err(err) => err,
            };

            if retries == 0 {
                error!(%failure, "response unusable, retries exhausted");
                return Err(failure);
            }
            retries -= 1;
            warn!(%failure, "response unusable, requesting resend");
            self.link.write(&NACK_FRAME).await?;
        }
    }

    /// Next decoded link event, or `Timeout` at the deadline.
    async fn next_event(&mut self, deadline: Instant) -> Result<LinkEvent> {
        loop {
            if let Some(event) = self.codec.decode(&mut self.buf)? {
                return Ok(event);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout);
            }
            match time::timeout(remaining, self.link.read(&mut self.buf)).await {
                Ok(read) => {
                    read?;
                }
                Err(_) => return Err(TransportError::Timeout),
            }
        }
    }
}
