//! Key state machine and round-robin selection
//!
//! The manager owns a fixed, ordered list of keys and a cursor. All status,
//! window and cursor reads and writes happen inside one `tokio::sync::Mutex`
//! section that covers only the in-memory transition. Callers perform their
//! outbound I/O after the guard is dropped.
//!
//! `RateLimited` keys come back on their own once a full window has passed.
//! `Error` keys stay out of rotation until a success is reported for them.

use std::time::Duration;

use common::ApiKey;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::window::UsageWindow;

/// Health status of a pooled key.
///
/// Transitions:
/// - Active → RateLimited (429 reported)
/// - Active/RateLimited → Error (5xx or other 4xx reported)
/// - RateLimited → Active (window elapsed since the 429, checked lazily)
/// - any → Active (success reported, or operator reset)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Active,
    RateLimited { since: Instant },
    Error,
}

impl KeyStatus {
    /// Status label for stats/logging.
    pub fn label(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::RateLimited { .. } => "rate_limited",
            KeyStatus::Error => "error",
        }
    }
}

/// Quota settings applied to every key in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Sends allowed per key inside one window.
    pub max_requests_per_window: usize,
    /// Length of the sliding window, also the 429 recovery delay.
    pub window: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_requests_per_window: 20,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct KeyState {
    status: KeyStatus,
    window: UsageWindow,
    consecutive_error_count: u32,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
}

impl KeyState {
    fn new() -> Self {
        Self {
            status: KeyStatus::Active,
            window: UsageWindow::new(),
            consecutive_error_count: 0,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
        }
    }
}

#[derive(Debug)]
struct PoolEntry {
    key: ApiKey,
    state: KeyState,
}

#[derive(Debug)]
struct PoolState {
    entries: Vec<PoolEntry>,
    next_index: usize,
}

impl PoolState {
    fn position(&self, key: &ApiKey) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.key.secret() == key.secret())
    }
}

/// Point-in-time view of one key, safe to log or serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeySnapshot {
    pub name: String,
    pub fingerprint: String,
    pub status: &'static str,
    pub consecutive_error_count: u32,
    pub recent_requests: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining_secs: Option<u64>,
}

/// Aggregate pool counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub total_keys: usize,
    pub active_keys: usize,
    pub rate_limited_keys: usize,
    pub error_keys: usize,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Percentage of selections that were later reported successful.
    pub success_rate: f64,
}

/// Shared key pool. Construct once and hand out via `Arc`.
pub struct KeyManager {
    state: Mutex<PoolState>,
    settings: PoolSettings,
}

impl KeyManager {
    /// Build a pool from `keys` in the given order. Every key starts `Active`.
    ///
    /// An empty pool is allowed; selection on it always yields `None`.
    pub fn new(keys: Vec<ApiKey>, settings: PoolSettings) -> Self {
        if keys.is_empty() {
            warn!("key pool initialized without keys");
        }
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].iter().any(|k| k.secret() == key.secret()) {
                warn!(key = %key.name(), "duplicate key in pool, reports will resolve to the first copy");
            }
        }
        info!(
            keys = keys.len(),
            max_requests_per_window = settings.max_requests_per_window,
            window_secs = settings.window.as_secs(),
            "key pool initialized"
        );
        let entries = keys
            .into_iter()
            .map(|key| PoolEntry {
                key,
                state: KeyState::new(),
            })
            .collect();
        Self {
            state: Mutex::new(PoolState {
                entries,
                next_index: 0,
            }),
            settings,
        }
    }

    /// Like `new`, but rejects an empty key list.
    pub fn try_new(keys: Vec<ApiKey>, settings: PoolSettings) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::EmptyPool);
        }
        Ok(Self::new(keys, settings))
    }

    pub fn settings(&self) -> PoolSettings {
        self.settings
    }

    /// Number of keys in the pool (fixed at construction).
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Select the next usable key, round-robin from the cursor.
    ///
    /// Scans each key at most once. `Active` keys are usable while their
    /// window has room; `RateLimited` keys are reactivated once more than one
    /// window has passed since the 429 and then get the same quota check;
    /// `Error` keys are always skipped. The selected key's send is recorded
    /// and the cursor moves to the key after it.
    ///
    /// `None` means the whole pool is unusable right now.
    pub async fn get_next_available_key(&self) -> Option<ApiKey> {
        let mut pool = self.state.lock().await;
        let n = pool.entries.len();
        if n == 0 {
            warn!("no API key available: pool is empty");
            return None;
        }

        let now = Instant::now();
        let start = pool.next_index;

        for offset in 0..n {
            let idx = (start + offset) % n;
            let entry = &mut pool.entries[idx];
            if !self.is_usable(entry, now) {
                continue;
            }

            entry.state.window.record(now);
            entry.state.total_requests += 1;
            let key = entry.key.clone();
            debug!(
                key = %key.name(),
                recent_requests = entry.state.window.len(),
                "key selected"
            );
            pool.next_index = (idx + 1) % n;
            return Some(key);
        }

        let (active, rate_limited, errored) = count_statuses(&pool.entries);
        warn!(
            keys = n,
            throttled = active,
            rate_limited,
            errored,
            "no API key available"
        );
        None
    }

    /// Apply the lazy transitions for one candidate and decide if it is usable.
    fn is_usable(&self, entry: &mut PoolEntry, now: Instant) -> bool {
        let PoolSettings {
            max_requests_per_window,
            window,
        } = self.settings;

        match entry.state.status {
            KeyStatus::Error => false,
            KeyStatus::RateLimited { since } => {
                if now.saturating_duration_since(since) > window {
                    info!(key = %entry.key.name(), "rate limit window elapsed, key active again");
                    entry.state.status = KeyStatus::Active;
                    entry
                        .state
                        .window
                        .has_capacity(now, window, max_requests_per_window)
                } else {
                    false
                }
            }
            KeyStatus::Active => {
                let fits = entry
                    .state
                    .window
                    .has_capacity(now, window, max_requests_per_window);
                if !fits {
                    debug!(
                        key = %entry.key.name(),
                        limit = max_requests_per_window,
                        "key at self-imposed quota, skipping"
                    );
                }
                fits
            }
        }
    }

    /// Record the outcome of a call made with `key`.
    ///
    /// - 429 → `RateLimited` from now
    /// - 5xx → `Error`
    /// - 2xx → `Active`, error streak cleared
    /// - other 4xx → `Error` (request or credential misconfiguration)
    /// - anything else → counted as a failure, status unchanged
    ///
    /// Unknown keys are logged and ignored.
    pub async fn report_key_error(&self, key: &ApiKey, status_code: u16) {
        let mut pool = self.state.lock().await;
        let Some(idx) = pool.position(key) else {
            warn!(
                key = %key.name(),
                fingerprint = %key.fingerprint(),
                status_code,
                "outcome reported for key not in pool, ignoring"
            );
            return;
        };
        let name = key.name();
        let state = &mut pool.entries[idx].state;

        match status_code {
            429 => {
                state.status = KeyStatus::RateLimited {
                    since: Instant::now(),
                };
                state.consecutive_error_count += 1;
                state.failed_requests += 1;
                warn!(
                    key = %name,
                    status_code,
                    consecutive_errors = state.consecutive_error_count,
                    window_secs = self.settings.window.as_secs(),
                    "key rate limited by provider"
                );
            }
            500..=599 => {
                state.status = KeyStatus::Error;
                state.consecutive_error_count += 1;
                state.failed_requests += 1;
                warn!(
                    key = %name,
                    status_code,
                    consecutive_errors = state.consecutive_error_count,
                    "key marked error after server failure"
                );
            }
            200..=299 => {
                if state.status != KeyStatus::Active {
                    info!(key = %name, previous = state.status.label(), "key restored to active");
                }
                state.status = KeyStatus::Active;
                state.consecutive_error_count = 0;
                state.successful_requests += 1;
            }
            400..=499 => {
                state.status = KeyStatus::Error;
                state.consecutive_error_count += 1;
                state.failed_requests += 1;
                error!(
                    key = %name,
                    status_code,
                    "client error from provider, key marked error (check key or request configuration)"
                );
            }
            _ => {
                state.consecutive_error_count += 1;
                state.failed_requests += 1;
                warn!(key = %name, status_code, "unexpected status reported, key status unchanged");
            }
        }
    }

    /// Report a successful call. Same transition as reporting 200.
    pub async fn report_key_success(&self, key: &ApiKey) {
        self.report_key_error(key, 200).await;
    }

    /// Advance the cursor by one. No-op for pools of zero or one key.
    pub async fn rotate_index(&self) {
        let mut pool = self.state.lock().await;
        let n = pool.entries.len();
        if n > 1 {
            pool.next_index = (pool.next_index + 1) % n;
        }
    }

    /// Current cursor position.
    pub async fn next_index(&self) -> usize {
        self.state.lock().await.next_index
    }

    /// Force a key back to `Active` and clear its window and error streak.
    pub async fn reset_key(&self, key: &ApiKey) -> Result<()> {
        let mut pool = self.state.lock().await;
        let idx = pool
            .position(key)
            .ok_or_else(|| Error::KeyNotFound(key.name().to_string()))?;
        let state = &mut pool.entries[idx].state;
        state.status = KeyStatus::Active;
        state.consecutive_error_count = 0;
        state.window.clear();
        info!(key = %key.name(), "key reset to active");
        Ok(())
    }

    /// Current status of `key`, or `None` if it is not pooled.
    pub async fn status_of(&self, key: &ApiKey) -> Option<KeyStatus> {
        let pool = self.state.lock().await;
        pool.position(key).map(|idx| pool.entries[idx].state.status)
    }

    /// Snapshot of `key`, or `None` if it is not pooled.
    pub async fn snapshot_of(&self, key: &ApiKey) -> Option<KeySnapshot> {
        let pool = self.state.lock().await;
        let now = Instant::now();
        pool.position(key)
            .map(|idx| self.snapshot(&pool.entries[idx], now))
    }

    /// Snapshots of all keys in pool order.
    pub async fn snapshots(&self) -> Vec<KeySnapshot> {
        let pool = self.state.lock().await;
        let now = Instant::now();
        pool.entries
            .iter()
            .map(|entry| self.snapshot(entry, now))
            .collect()
    }

    fn snapshot(&self, entry: &PoolEntry, now: Instant) -> KeySnapshot {
        let rate_limit_remaining_secs = match entry.state.status {
            KeyStatus::RateLimited { since } => Some(
                self.settings
                    .window
                    .saturating_sub(now.saturating_duration_since(since))
                    .as_secs(),
            ),
            _ => None,
        };
        KeySnapshot {
            name: entry.key.name().to_string(),
            fingerprint: entry.key.fingerprint().to_string(),
            status: entry.state.status.label(),
            consecutive_error_count: entry.state.consecutive_error_count,
            recent_requests: entry.state.window.len(),
            total_requests: entry.state.total_requests,
            successful_requests: entry.state.successful_requests,
            failed_requests: entry.state.failed_requests,
            rate_limit_remaining_secs,
        }
    }

    /// Aggregate counters across the pool.
    pub async fn stats(&self) -> PoolStats {
        let pool = self.state.lock().await;
        let (active_keys, rate_limited_keys, error_keys) = count_statuses(&pool.entries);
        let total_requests: u64 = pool.entries.iter().map(|e| e.state.total_requests).sum();
        let successful_requests: u64 = pool
            .entries
            .iter()
            .map(|e| e.state.successful_requests)
            .sum();
        let failed_requests: u64 = pool.entries.iter().map(|e| e.state.failed_requests).sum();
        let success_rate = if total_requests > 0 {
            successful_requests as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };
        PoolStats {
            total_keys: pool.entries.len(),
            active_keys,
            rate_limited_keys,
            error_keys,
            total_requests,
            successful_requests,
            failed_requests,
            success_rate,
        }
    }

    /// Pool health summary.
    ///
    /// All keys active → healthy, some active → degraded, none → unhealthy.
    pub async fn health(&self) -> serde_json::Value {
        let keys = self.snapshots().await;
        let total = keys.len();
        let active = keys.iter().filter(|k| k.status == "active").count();
        let status = if total > 0 && active == total {
            "healthy"
        } else if active > 0 {
            "degraded"
        } else {
            "unhealthy"
        };
        serde_json::json!({
            "status": status,
            "keys_total": total,
            "keys_active": active,
            "keys": keys,
        })
    }
}

/// Count (active, rate_limited, error) statuses.
fn count_statuses(entries: &[PoolEntry]) -> (usize, usize, usize) {
    entries
        .iter()
        .fold((0, 0, 0), |(a, r, e), entry| match entry.state.status {
            KeyStatus::Active => (a + 1, r, e),
            KeyStatus::RateLimited { .. } => (a, r + 1, e),
            KeyStatus::Error => (a, r, e + 1),
        })
}
