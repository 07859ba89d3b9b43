//! Sliding-window usage tracking for a single key
//!
//! Records the instant of every send made with a key. Before each quota
//! decision the window drops entries at least one window old, so the
//! remaining length is the number of sends inside the trailing window.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Ordered send times for one key, oldest first.
#[derive(Debug, Clone, Default)]
pub struct UsageWindow {
    stamps: VecDeque<Instant>,
}

impl UsageWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every send that happened `window` or longer before `now`.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.stamps.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Prune, then report whether another send fits under `limit`.
    pub fn has_capacity(&mut self, now: Instant, window: Duration, limit: usize) -> bool {
        self.prune(now, window);
        self.stamps.len() < limit
    }

    /// Record a send at `now`. Callers pass non-decreasing instants.
    pub fn record(&mut self, now: Instant) {
        self.stamps.push_back(now);
    }

    /// Sends currently held (not pruned).
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
    }
}
