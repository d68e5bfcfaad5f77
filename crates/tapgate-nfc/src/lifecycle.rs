//! Tag lifecycle state machine, the heart of the tag-I/O task.
//!
//! One loop owns the reader and the secure element: wait for a tag,
//! classify it, poll its presence while workflows run against it, and
//! escalate persistent errors up to a controller reset. There is no
//! terminal state; the loop always returns to waiting.

use crate::{
    error::NfcError,
    events::TagEventSink,
    ntag::SecureElement,
    reader::TagReader,
};
use std::{sync::Arc, time::Duration};
use tapgate_core::{
    KeySlot, TagUid, TerminalConfig,
    constants::{PRESENCE_POLL_INTERVAL, TAG_ERROR_RETRIES},
};
use tapgate_pn532::{SelectedTag, TransportError};
use tokio::time;
use tracing::{debug, error, info, warn};

/// Poll window for a new tag entering the field.
const TAG_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Current lifecycle phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// No tag in the field.
    WaitForTag,
    /// A classified tag is selected; workflows may run against it.
    TagIdle(SelectedTag),
    /// A foreign tag is selected; wait for it to leave.
    TagUnknown(SelectedTag),
    /// Transport trouble; release/reselect until the retry budget is
    /// spent, then reset the controller.
    TagError { retries: u32 },
}

pub struct TagLifecycle<R, S, E> {
    reader: R,
    element: S,
    events: E,
    config: Arc<dyn TerminalConfig>,
    phase: Phase,
}

impl<R, S, E> TagLifecycle<R, S, E>
where
    R: TagReader,
    S: SecureElement,
    E: TagEventSink,
{
    pub fn new(reader: R, element: S, events: E, config: Arc<dyn TerminalConfig>) -> Self {
        TagLifecycle {
            reader,
            element,
            events,
            config,
            phase: Phase::WaitForTag,
        }
    }

    #[must_use]
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// The secure element, for wiring and test inspection.
    #[must_use]
    pub fn element(&self) -> &S {
        &self.element
    }

    /// Drive the lifecycle forever.
    pub async fn run(&mut self) -> ! {
        loop {
            self.poll_once().await;
        }
    }

    /// One lifecycle iteration. Public so tests can step deterministically.
    pub async fn poll_once(&mut self) {
        let phase = std::mem::replace(&mut self.phase, Phase::WaitForTag);
        self.phase = match phase {
            Phase::WaitForTag => self.wait_for_tag().await,
            Phase::TagIdle(tag) => self.poll_presence(tag, true).await,
            Phase::TagUnknown(tag) => self.poll_presence(tag, false).await,
            Phase::TagError { retries } => self.recover(retries).await,
        };
    }

    async fn wait_for_tag(&mut self) -> Phase {
        match self.reader.wait_for_new_tag(TAG_WAIT_TIMEOUT).await {
            Ok(tag) => self.classify(tag).await,
            Err(TransportError::NoTarget | TransportError::Timeout) => Phase::WaitForTag,
            Err(err) => {
                warn!(%err, "tag poll failed");
                Phase::TagError { retries: 0 }
            }
        }
    }

    /// Select and classify a freshly detected tag.
    async fn classify(&mut self, tag: SelectedTag) -> Phase {
        self.events.on_tag_found().await;

        if let Err(err) = self.element.select(&tag).await {
            warn!(%err, "tag selection failed");
            return self.abandon(Some(tag)).await;
        }

        let Ok(uid) = TagUid::from_bytes(&tag.uid) else {
            // Wrong UID length means wrong tag family; just wait it out.
            info!(uid = %hex::encode(&tag.uid), "unsupported tag family");
            self.events.on_unknown_tag().await;
            return Phase::TagUnknown(tag);
        };

        if self.config.is_configured() {
            match self
                .element
                .authenticate(KeySlot::Terminal, &self.config.terminal_key())
                .await
            {
                Ok(()) => {
                    // The anticollision id can be randomized; the real UID
                    // is only readable inside the authenticated session.
                    match self.element.get_uid().await {
                        Ok(uid) => {
                            info!(%uid, "tag authenticated");
                            self.events.on_tag_authenticated(uid).await;
                            return Phase::TagIdle(tag);
                        }
                        Err(err) => {
                            warn!(%err, "uid read failed after authentication");
                            return self.abandon(Some(tag)).await;
                        }
                    }
                }
                Err(NfcError::Tag(status)) => {
                    debug!(%uid, %status, "terminal key rejected, probing factory state");
                }
                Err(err) => {
                    warn!(%err, "terminal authentication failed");
                    return self.abandon(Some(tag)).await;
                }
            }
        }

        match self.element.is_factory_default().await {
            Ok(true) => {
                info!(%uid, "blank tag detected");
                self.events.on_blank_tag(uid).await;
                Phase::TagIdle(tag)
            }
            Ok(false) => {
                info!(%uid, "unknown tag");
                self.events.on_unknown_tag().await;
                Phase::TagUnknown(tag)
            }
            Err(NfcError::Tag(status)) => {
                debug!(%uid, %status, "factory probe rejected");
                self.events.on_unknown_tag().await;
                Phase::TagUnknown(tag)
            }
            Err(err) => {
                warn!(%err, "factory probe failed");
                self.abandon(Some(tag)).await
            }
        }
    }

    /// Presence poll for a selected tag; in the idle phase also hand the
    /// tag to the state layer for one workflow step.
    async fn poll_presence(&mut self, tag: SelectedTag, drive_workflows: bool) -> Phase {
        time::sleep(PRESENCE_POLL_INTERVAL).await;

        match self.reader.check_tag_still_available().await {
            Ok(true) => {
                if drive_workflows {
                    self.events.on_tag_idle(&mut self.element).await;
                    Phase::TagIdle(tag)
                } else {
                    Phase::TagUnknown(tag)
                }
            }
            Ok(false) => {
                debug!("tag removed");
                if let Err(err) = self.reader.release_tag(&tag).await {
                    warn!(%err, "release after removal failed");
                }
                self.events.on_tag_removed().await;
                Phase::WaitForTag
            }
            Err(err) => {
                warn!(%err, "presence check failed");
                self.abandon(Some(tag)).await
            }
        }
    }

    /// Abort the current session and enter the error phase. The state
    /// layer sees a removal; whatever was in flight is superseded.
    async fn abandon(&mut self, tag: Option<SelectedTag>) -> Phase {
        if let Some(tag) = tag
            && let Err(err) = self.reader.release_tag(&tag).await
        {
            debug!(%err, "release during error handling failed");
        }
        self.events.on_tag_removed().await;
        Phase::TagError { retries: 0 }
    }

    /// Error phase: give the field a beat, try to find a tag again, and
    /// after the retry budget reset the controller outright.
    async fn recover(&mut self, retries: u32) -> Phase {
        if retries >= TAG_ERROR_RETRIES {
            warn!("tag error persists, resetting controller");
            if let Err(err) = self.reader.reset_controller().await {
                // Nothing left to escalate to; keep looping and hope the
                // chip comes back.
                error!(%err, "controller reset failed");
            }
            return Phase::WaitForTag;
        }

        time::sleep(PRESENCE_POLL_INTERVAL).await;
        match self.reader.wait_for_new_tag(TAG_WAIT_TIMEOUT).await {
            Ok(tag) => self.classify(tag).await,
            Err(TransportError::NoTarget) => {
                // Field is empty and the link answers again.
                Phase::WaitForTag
            }
            Err(err) => {
                debug!(%err, retries, "recovery attempt failed");
                Phase::TagError {
                    retries: retries + 1,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSecureElement;
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };
    use tapgate_core::AesKey;
    use tapgate_pn532::Result as TransportResult;

    const TERMINAL_KEY: [u8; 16] = [0xA5; 16];

    struct TestConfig {
        configured: bool,
    }

    impl TerminalConfig for TestConfig {
        fn terminal_key(&self) -> AesKey {
            AesKey::new(TERMINAL_KEY)
        }

        fn is_configured(&self) -> bool {
            self.configured
        }
    }

    #[derive(Default)]
    struct MockReader {
        wait_results: VecDeque<TransportResult<SelectedTag>>,
        presence_results: VecDeque<TransportResult<bool>>,
        releases: u32,
        resets: u32,
    }

    impl TagReader for MockReader {
        async fn wait_for_new_tag(&mut self, _timeout: Duration) -> TransportResult<SelectedTag> {
            self.wait_results
                .pop_front()
                .unwrap_or(Err(TransportError::NoTarget))
        }

        async fn check_tag_still_available(&mut self) -> TransportResult<bool> {
            self.presence_results.pop_front().unwrap_or(Ok(true))
        }

        async fn release_tag(&mut self, _tag: &SelectedTag) -> TransportResult<()> {
            self.releases += 1;
            Ok(())
        }

        async fn reset_controller(&mut self) -> TransportResult<()> {
            self.resets += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
        auth_uid: Mutex<Option<TagUid>>,
        idle_steps: AtomicU32,
    }

    impl RecordingSink {
        fn record(&self, name: &str) {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(name.to_string());
        }

        fn names(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }
    }

    impl TagEventSink for &RecordingSink {
        async fn on_tag_found(&self) {
            self.record("found");
        }

        async fn on_tag_authenticated(&self, uid: TagUid) {
            *self.auth_uid.lock().unwrap_or_else(|e| e.into_inner()) = Some(uid);
            self.record("authenticated");
        }

        async fn on_blank_tag(&self, _uid: TagUid) {
            self.record("blank");
        }

        async fn on_unknown_tag(&self) {
            self.record("unknown");
        }

        async fn on_tag_removed(&self) {
            self.record("removed");
        }

        async fn on_tag_idle<S: SecureElement>(&self, _element: &mut S) {
            self.idle_steps.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn uid() -> TagUid {
        TagUid::new([0x04, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66])
    }

    fn selected(uid: TagUid) -> SelectedTag {
        SelectedTag {
            target: 1,
            uid: uid.as_bytes().to_vec(),
        }
    }

    fn lifecycle<'a>(
        reader: MockReader,
        element: MockSecureElement,
        sink: &'a RecordingSink,
        configured: bool,
    ) -> TagLifecycle<MockReader, MockSecureElement, &'a RecordingSink> {
        TagLifecycle::new(
            reader,
            element,
            sink,
            Arc::new(TestConfig { configured }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn authenticated_tag_enters_idle() {
        let mut reader = MockReader::default();
        reader.wait_results.push_back(Ok(selected(uid())));
        let element =
            MockSecureElement::with_keys(uid(), [AesKey::new(TERMINAL_KEY); 5]);
        let sink = RecordingSink::default();

        let mut lifecycle = lifecycle(reader, element, &sink, true);
        lifecycle.poll_once().await;

        assert_eq!(sink.names(), vec!["found", "authenticated"]);
        assert!(matches!(lifecycle.phase(), Phase::TagIdle(_)));

        // Present and idle: exactly one workflow step per poll.
        lifecycle.poll_once().await;
        assert_eq!(sink.idle_steps.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn authenticated_uid_is_read_through_the_session() {
        // The anticollision frame reports a different (randomizable) id
        // than the tag's real UID.
        let anticollision = TagUid::new([0x08, 0x99, 0x88, 0x77, 0x66, 0x55, 0x44]);
        let mut reader = MockReader::default();
        reader.wait_results.push_back(Ok(selected(anticollision)));
        let element =
            MockSecureElement::with_keys(uid(), [AesKey::new(TERMINAL_KEY); 5]);
        let sink = RecordingSink::default();

        let mut lifecycle = lifecycle(reader, element, &sink, true);
        lifecycle.poll_once().await;

        assert_eq!(sink.names(), vec!["found", "authenticated"]);
        let reported = *sink.auth_uid.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(reported, Some(uid()));
    }

    #[tokio::test(start_paused = true)]
    async fn blank_tag_is_reported_and_idles() {
        let mut reader = MockReader::default();
        reader.wait_results.push_back(Ok(selected(uid())));
        let element = MockSecureElement::factory_fresh(uid());
        let sink = RecordingSink::default();

        let mut lifecycle = lifecycle(reader, element, &sink, true);
        lifecycle.poll_once().await;

        assert_eq!(sink.names(), vec!["found", "blank"]);
        assert!(matches!(lifecycle.phase(), Phase::TagIdle(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_tag_is_unknown_and_not_driven() {
        let mut reader = MockReader::default();
        reader.wait_results.push_back(Ok(selected(uid())));
        let element = MockSecureElement::with_keys(uid(), [AesKey::new([0x77; 16]); 5]);
        let sink = RecordingSink::default();

        let mut lifecycle = lifecycle(reader, element, &sink, true);
        lifecycle.poll_once().await;
        assert_eq!(sink.names(), vec!["found", "unknown"]);
        assert!(matches!(lifecycle.phase(), Phase::TagUnknown(_)));

        lifecycle.poll_once().await;
        assert_eq!(sink.idle_steps.load(Ordering::Relaxed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_uid_length_is_unknown() {
        let mut reader = MockReader::default();
        reader.wait_results.push_back(Ok(SelectedTag {
            target: 1,
            uid: vec![0x04, 0x11, 0x22, 0x33], // 4-byte UID
        }));
        let element = MockSecureElement::factory_fresh(uid());
        let sink = RecordingSink::default();

        let mut lifecycle = lifecycle(reader, element, &sink, true);
        lifecycle.poll_once().await;
        assert_eq!(sink.names(), vec!["found", "unknown"]);
    }

    #[tokio::test(start_paused = true)]
    async fn removal_releases_and_returns_to_waiting() {
        let mut reader = MockReader::default();
        reader.wait_results.push_back(Ok(selected(uid())));
        reader.presence_results.push_back(Ok(false));
        let element =
            MockSecureElement::with_keys(uid(), [AesKey::new(TERMINAL_KEY); 5]);
        let sink = RecordingSink::default();

        let mut lifecycle = lifecycle(reader, element, &sink, true);
        lifecycle.poll_once().await;
        lifecycle.poll_once().await;

        assert_eq!(sink.names(), vec!["found", "authenticated", "removed"]);
        assert_eq!(lifecycle.phase(), &Phase::WaitForTag);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_errors_escalate_to_controller_reset() {
        let mut reader = MockReader::default();
        reader.wait_results.push_back(Ok(selected(uid())));
        reader
            .presence_results
            .push_back(Err(TransportError::AckMissing(4)));
        // Recovery attempts keep failing on the link.
        for _ in 0..TAG_ERROR_RETRIES {
            reader
                .wait_results
                .push_back(Err(TransportError::AckMissing(4)));
        }
        let element =
            MockSecureElement::with_keys(uid(), [AesKey::new(TERMINAL_KEY); 5]);
        let sink = RecordingSink::default();

        let mut lifecycle = lifecycle(reader, element, &sink, true);
        lifecycle.poll_once().await; // classify
        lifecycle.poll_once().await; // presence fails -> TagError
        assert_eq!(lifecycle.phase(), &Phase::TagError { retries: 0 });
        assert!(sink.names().contains(&"removed".to_string()));

        for _ in 0..TAG_ERROR_RETRIES {
            lifecycle.poll_once().await;
        }
        assert_eq!(
            lifecycle.phase(),
            &Phase::TagError {
                retries: TAG_ERROR_RETRIES
            }
        );

        // Budget spent: next poll resets the chip and starts over.
        lifecycle.poll_once().await;
        assert_eq!(lifecycle.phase(), &Phase::WaitForTag);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_field_keeps_waiting() {
        let reader = MockReader::default();
        let element = MockSecureElement::factory_fresh(uid());
        let sink = RecordingSink::default();

        let mut lifecycle = lifecycle(reader, element, &sink, true);
        lifecycle.poll_once().await;
        assert_eq!(lifecycle.phase(), &Phase::WaitForTag);
        assert!(sink.names().is_empty());
    }
}
