//! Countdown shown to clients while a window is open.
//!
//! The countdown only changes the advertised remaining time; reaching zero
//! leaves the window open. Each start bumps a generation number that is also
//! written into the committed snapshot, so a tick from a cancelled task can
//! never overwrite newer state.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, interval_at};
use tracing::{debug, warn};

use crate::session::state::SessionSnapshot;
use crate::sse::{BroadcastHub, HubEvent};

pub const DEFAULT_WINDOW_SECS: u32 = 60;

pub struct WindowTimer {
    duration_secs: u32,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl WindowTimer {
    pub fn new(duration_secs: u32) -> Self {
        WindowTimer {
            duration_secs,
            generation: 0,
            handle: None,
        }
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops any running countdown and invalidates its pending ticks.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.generation += 1;
    }

    /// Starts a fresh countdown for the current generation. The caller must
    /// already have committed a snapshot carrying `generation()`.
    pub fn start(&mut self, snapshots: Arc<watch::Sender<SessionSnapshot>>, hub: BroadcastHub) {
        if let Some(stale) = self.handle.take() {
            warn!("countdown started without cancelling the previous one");
            stale.abort();
        }
        let generation = self.generation;
        let duration = self.duration_secs;
        self.handle = Some(tokio::spawn(run_countdown(
            generation, duration, snapshots, hub,
        )));
    }
}

impl Drop for WindowTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run_countdown(
    generation: u64,
    duration_secs: u32,
    snapshots: Arc<watch::Sender<SessionSnapshot>>,
    hub: BroadcastHub,
) {
    let period = Duration::from_secs(1);
    let mut ticker = interval_at(Instant::now() + period, period);
    let mut remaining = duration_secs;

    while remaining > 0 {
        ticker.tick().await;
        remaining -= 1;

        let applied = snapshots.send_if_modified(|snapshot| {
            if snapshot.timer_generation != generation || !snapshot.window.is_open {
                return false;
            }
            snapshot.window.remaining_seconds = remaining;
            true
        });
        if !applied {
            debug!(generation, "countdown superseded");
            return;
        }

        hub.publish(HubEvent::Timer {
            remaining_seconds: remaining,
        });
    }

    debug!(generation, "countdown finished, window remains open");
}
