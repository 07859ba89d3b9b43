//! Service-specific error types

use thiserror::Error;

/// Batch input and output failures.
///
/// Per-item dispatch failures are not errors here: they are reported as
/// result lines with a non-`none` error code.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid payload on line {line}: {message}")]
    InvalidPayload { line: usize, message: String },

    #[error("failed to read input: {0}")]
    Input(#[source] std::io::Error),

    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
