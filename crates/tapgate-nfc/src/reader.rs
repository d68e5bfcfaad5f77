//! Reader seam the lifecycle drives.
//!
//! [`Pn532`] is the production implementation; lifecycle tests script a
//! mock instead of a serial link.

use std::time::Duration;
use tapgate_pn532::{Pn532, Result, SelectedTag, SerialLink};

pub trait TagReader: Send {
    /// Poll for a new tag entering the field.
    async fn wait_for_new_tag(&mut self, timeout: Duration) -> Result<SelectedTag>;

    /// Whether the selected tag is still in the field.
    async fn check_tag_still_available(&mut self) -> Result<bool>;

    /// Release the selected target.
    async fn release_tag(&mut self, tag: &SelectedTag) -> Result<()>;

    /// Full chip reset, the escalation of last resort.
    async fn reset_controller(&mut self) -> Result<()>;
}

impl<L: SerialLink> TagReader for Pn532<L> {
    async fn wait_for_new_tag(&mut self, timeout: Duration) -> Result<SelectedTag> {
        Pn532::wait_for_new_tag(self, timeout).await
    }

    async fn check_tag_still_available(&mut self) -> Result<bool> {
        Pn532::check_tag_still_available(self).await
    }

    async fn release_tag(&mut self, tag: &SelectedTag) -> Result<()> {
        Pn532::release_tag(self, tag).await
    }

    async fn reset_controller(&mut self) -> Result<()> {
        Pn532::reset_controller(self).await
    }
}
