//! Status classification for provider responses
//!
//! Maps an HTTP status and body to a `FailureKind`. Some providers report
//! throttling with a non-429 status and a "Rate limit exceeded" message, so
//! the body is checked before the status class.

use crate::FailureKind;

/// Body phrases that indicate the key was throttled.
const RATE_LIMIT_PATTERNS: &[&str] = &["rate limit exceeded", "rate_limit_exceeded"];

/// Whether a response body reports a rate limit (case-insensitive).
pub fn mentions_rate_limit(body: &str) -> bool {
    let lower = body.to_lowercase();
    RATE_LIMIT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Classify a response. `None` means success.
///
/// 2xx is success. 429 and rate-limit bodies are `RateLimited`. Other 5xx are
/// `ServerError`, other 4xx `ClientError`, anything else `Unknown`.
pub fn classify_status(status: u16, body: &str) -> Option<FailureKind> {
    match status {
        200..=299 => None,
        429 => Some(FailureKind::RateLimited),
        _ if mentions_rate_limit(body) => Some(FailureKind::RateLimited),
        500..=599 => Some(FailureKind::ServerError),
        400..=499 => Some(FailureKind::ClientError),
        _ => Some(FailureKind::Unknown),
    }
}
