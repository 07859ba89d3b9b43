//! Retrying request dispatcher over a shared key pool
//!
//! `RequestDispatcher` performs one logical provider request: it asks the
//! `KeyManager` for a key, calls the injected `Transport`, reports the
//! classified outcome back to the pool and backs off exponentially between
//! attempts. Callers always get a `DispatchResult` value; transport faults
//! never escape.

pub mod backoff;
pub mod config;
pub mod dispatch;
pub mod telemetry;

pub use backoff::Backoff;
pub use config::DispatchConfig;
pub use dispatch::{DispatchResult, ErrorCode, RequestDispatcher};
