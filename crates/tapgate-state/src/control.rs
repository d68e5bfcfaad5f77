//! Control-context loop.
//!
//! Runs in its own task, owns no serial hardware: each tick sweeps the
//! request deadlines and drives at most one control-side workflow step.
//! Inbound response payloads are fed to the correlation layer by the
//! transport binding, not here.

use crate::terminal::Terminal;
use std::{sync::Arc, time::Duration};
use tapgate_cloud::Publisher;
use tokio::time;

/// Pace of the control loop; workflow latencies are dominated by cloud
/// round-trips, not by this.
pub const CONTROL_TICK_INTERVAL: Duration = Duration::from_millis(50);

pub struct ControlLoop<P: Publisher> {
    terminal: Arc<Terminal<P>>,
}

impl<P: Publisher> ControlLoop<P> {
    pub fn new(terminal: Arc<Terminal<P>>) -> Self {
        ControlLoop { terminal }
    }

    /// Drive the control context forever.
    pub async fn run(&self) -> ! {
        loop {
            self.tick().await;
            time::sleep(CONTROL_TICK_INTERVAL).await;
        }
    }

    /// One control iteration: timeout sweep, then one workflow step.
    pub async fn tick(&self) {
        self.terminal.cloud().check_timeouts();
        self.terminal.drive_control_step().await;
    }
}
