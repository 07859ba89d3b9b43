//! API key pool for rate-limited providers
//!
//! Holds a fixed, ordered set of provider keys and selects them round-robin
//! for outbound calls. Each key carries a health status and a sliding window
//! of recent send times used to enforce a self-imposed per-key quota.
//!
//! Key lifecycle:
//! 1. Pool built from configured keys, every key `Active`
//! 2. Selection round-robin, skipping keys whose window is full
//! 3. Upstream 429 → `RateLimited` until one window has passed
//! 4. Upstream 5xx or 4xx → `Error`, skipped until a success is reported
//! 5. Reported success (200) → `Active` with the error streak cleared

pub mod error;
pub mod pool;
pub mod window;

pub use error::{Error, Result};
pub use pool::{KeyManager, KeySnapshot, KeyStatus, PoolSettings, PoolStats};
pub use window::UsageWindow;
