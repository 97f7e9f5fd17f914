//! Liveness prober
//!
//! Broadcasts the probe sentinel at a growing interval until stopped, so the
//! authority has something to acknowledge once it starts listening. The n-th
//! probe (0-indexed) goes out after sleeping `base + increment * n`. Growth is
//! linear and uncapped. Stopping interrupts both the sleep and a send in
//! flight, so a wedged channel cannot keep the prober alive.

use std::sync::Arc;
use std::time::Duration;

use chatproto::PROBE;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::{ChatChannel, Destination};

/// Interval growth for probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSchedule {
    pub base: Duration,
    pub increment: Duration,
}

impl Default for ProbeSchedule {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            increment: Duration::from_millis(10),
        }
    }
}

impl ProbeSchedule {
    /// Sleep before the given 0-indexed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_add(self.increment.saturating_mul(attempt))
    }
}

/// Spawns probe tasks
pub struct Prober;

impl Prober {
    /// Start probing `destination` in the background
    pub fn start(channel: Arc<dyn ChatChannel>, destination: Destination, schedule: ProbeSchedule) -> ProberHandle {
        debug!(%destination, ?schedule, "Prober::start: called");
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run(channel, destination, schedule, stop_rx));
        ProberHandle { stop_tx, task }
    }
}

async fn run(
    channel: Arc<dyn ChatChannel>,
    destination: Destination,
    schedule: ProbeSchedule,
    mut stop_rx: oneshot::Receiver<()>,
) -> u32 {
    let mut attempt: u32 = 0;
    loop {
        // A dropped handle counts as a stop request
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = tokio::time::sleep(schedule.delay(attempt)) => {}
        }

        // A send still in flight when stop arrives is abandoned
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            result = channel.send(&destination, PROBE) => {
                if let Err(e) = result {
                    warn!(attempt, error = %e, "Failed to send probe");
                }
            }
        }
        attempt = attempt.saturating_add(1);
    }
    debug!(attempts = attempt, "Prober stopped");
    attempt
}

/// Handle to a running prober
///
/// Stopping consumes the handle, so a prober can only be stopped once.
pub struct ProberHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<u32>,
}

impl ProberHandle {
    /// Signal the prober and wait until it has exited
    ///
    /// Returns how many probe sends completed, successfully or not. Once this
    /// returns no further probe will be sent.
    pub async fn stop(self) -> u32 {
        debug!("ProberHandle::stop: called");
        // The task may already be gone; joining below still settles it
        let _ = self.stop_tx.send(());
        match self.task.await {
            Ok(attempts) => attempts,
            Err(e) => {
                warn!(error = %e, "Prober task ended abnormally");
                0
            }
        }
    }
}
