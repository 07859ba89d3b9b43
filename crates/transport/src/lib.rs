//! Transport abstraction for outbound provider calls
//!
//! Defines the `Transport` trait that decouples the dispatcher from how a
//! payload reaches the provider. The transport boundary is the only place
//! where raw outcomes (HTTP statuses, connection faults, unreadable bodies)
//! are turned into a `TransportFailure`; everything downstream works with the
//! classified value.

pub mod classify;
pub mod http;

pub use classify::{classify_status, mentions_rate_limit};
pub use http::HttpTransport;

use common::ApiKey;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Failure category, used to drive key state transitions.
///
/// - RateLimited: the provider throttled this key (429 or a rate-limit body)
/// - ServerError: provider-side failure (5xx)
/// - ClientError: request or credential rejected (4xx other than 429)
/// - Unknown: no usable status (connection fault, timeout, unreadable body)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    RateLimited,
    ServerError,
    ClientError,
    Unknown,
}

impl FailureKind {
    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ServerError => "server_error",
            FailureKind::ClientError => "client_error",
            FailureKind::Unknown => "unknown",
        }
    }
}

/// Status code reported to the key pool for failures that carry no HTTP
/// status. The pool counts these as failures without changing key status.
pub const NO_STATUS: u16 = 0;

/// A classified failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: FailureKind,
    /// HTTP status observed, if any.
    pub status: Option<u16>,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: FailureKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP response. Returns `None` for 2xx responses
    /// that do not signal a rate limit.
    pub fn from_response(status: u16, body: &str) -> Option<Self> {
        classify_status(status, body).map(|kind| Self::new(kind, Some(status), snippet(body)))
    }

    /// Connection-level fault with no HTTP status.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, None, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, Some(429), message)
    }

    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::new(FailureKind::ServerError, Some(status), message)
    }

    pub fn client_error(status: u16, message: impl Into<String>) -> Self {
        Self::new(FailureKind::ClientError, Some(status), message)
    }

    /// Code fed to the key pool for this failure.
    ///
    /// Rate limits always report 429 (even when detected from the body).
    /// Server and client errors report the observed status when it is in the
    /// matching class, otherwise 500 / 400. Unknown failures report
    /// [`NO_STATUS`].
    pub fn status_code(&self) -> u16 {
        match self.kind {
            FailureKind::RateLimited => 429,
            FailureKind::ServerError => self
                .status
                .filter(|s| (500..=599).contains(s))
                .unwrap_or(500),
            FailureKind::ClientError => self
                .status
                .filter(|s| (400..=499).contains(s))
                .unwrap_or(400),
            FailureKind::Unknown => NO_STATUS,
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({status}): {}", self.kind.label(), self.message),
            None => write!(f, "{}: {}", self.kind.label(), self.message),
        }
    }
}

impl std::error::Error for TransportFailure {}

/// Errors building a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid transport configuration: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Result alias for transport construction.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Future returned by [`Transport::send`].
pub type SendFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<serde_json::Value, TransportFailure>> + Send + 'a>>;

/// One outbound call to the provider with a given key.
///
/// Implementations must not retry or rotate keys themselves; the dispatcher
/// owns that policy. Uses `Pin<Box<dyn Future>>` for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    /// Identifier for logging (e.g. "openrouter").
    fn id(&self) -> &str;

    /// Send `payload` authenticated with `key`.
    fn send<'a>(&'a self, payload: &'a serde_json::Value, key: &'a ApiKey) -> SendFuture<'a>;
}

/// Longest body excerpt kept in a failure message.
const SNIPPET_CHARS: usize = 200;

fn snippet(body: &str) -> String {
    body.chars().take(SNIPPET_CHARS).collect()
}
