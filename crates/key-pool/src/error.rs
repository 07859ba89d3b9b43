//! Error types for pool administration
//!
//! Selection and outcome reporting never fail; these errors only come from
//! construction and operator actions.

/// Errors from pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("key pool is empty")]
    EmptyPool,

    #[error("key not found in pool: {0}")]
    KeyNotFound(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
