//! Retry loop around a single provider call
//!
//! Each attempt selects a key, sends once, and reports the classified outcome
//! to the key pool. The pool lock is only taken inside `KeyManager` calls, so
//! neither the transport call nor the backoff sleep holds it. Dropping the
//! returned future during a backoff abandons the loop; outcomes already
//! reported to the pool stay recorded.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use key_pool::KeyManager;
use serde::Serialize;
use tracing::{Instrument, error, info, info_span, warn};
use transport::Transport;

use crate::backoff::Backoff;
use crate::config::DispatchConfig;
use crate::telemetry;

/// Outcome of a dispatch as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Success, the response is present.
    None,
    /// Every key was rate limited, in error, or over quota.
    NoKeyAvailable,
    /// All attempts failed.
    RetryMaxExceeded,
}

impl ErrorCode {
    /// Numeric code kept compatible with the translation tool's error table.
    pub fn code(&self) -> u32 {
        match self {
            ErrorCode::None => 0,
            ErrorCode::NoKeyAvailable => 1002,
            ErrorCode::RetryMaxExceeded => 1003,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ErrorCode::None => "none",
            ErrorCode::NoKeyAvailable => "no_key_available",
            ErrorCode::RetryMaxExceeded => "retry_max_exceeded",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::None => "Success",
            ErrorCode::NoKeyAvailable => "All API keys are rate-limited/exhausted",
            ErrorCode::RetryMaxExceeded => "Maximum retry attempts exceeded",
        }
    }
}

/// Result of `handle_request`. `response` is `Some` exactly when
/// `error_code` is `ErrorCode::None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    pub error_code: ErrorCode,
    pub response: Option<serde_json::Value>,
}

impl DispatchResult {
    pub fn success(response: serde_json::Value) -> Self {
        Self {
            error_code: ErrorCode::None,
            response: Some(response),
        }
    }

    pub fn no_key_available() -> Self {
        Self {
            error_code: ErrorCode::NoKeyAvailable,
            response: None,
        }
    }

    pub fn retry_max_exceeded() -> Self {
        Self {
            error_code: ErrorCode::RetryMaxExceeded,
            response: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code == ErrorCode::None
    }

    pub fn into_parts(self) -> (ErrorCode, Option<serde_json::Value>) {
        (self.error_code, self.response)
    }
}

/// Dispatcher bound to one key pool, one transport and one config.
pub struct RequestDispatcher {
    key_manager: Arc<KeyManager>,
    transport: Arc<dyn Transport>,
    config: DispatchConfig,
    backoff: Backoff,
}

impl RequestDispatcher {
    pub fn new(
        key_manager: Arc<KeyManager>,
        transport: Arc<dyn Transport>,
        config: DispatchConfig,
    ) -> Self {
        let backoff = config.backoff();
        Self {
            key_manager,
            transport,
            config,
            backoff,
        }
    }

    pub fn key_manager(&self) -> &Arc<KeyManager> {
        &self.key_manager
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Perform one logical request with retries.
    ///
    /// Returns `NoKeyAvailable` as soon as the pool has no usable key (not
    /// retried), `RetryMaxExceeded` after `1 + max_retries` failed attempts,
    /// and the provider response otherwise.
    pub async fn handle_request(&self, payload: &serde_json::Value) -> DispatchResult {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        let span = info_span!("dispatch", request_id = %request_id, transport = self.transport.id());
        let result = self.run(payload).instrument(span).await;
        telemetry::record_result(result.error_code);
        result
    }

    async fn run(&self, payload: &serde_json::Value) -> DispatchResult {
        let max_retries = self.config.max_retries;
        let mut retry_count = 0u32;

        while retry_count <= max_retries {
            let attempt = retry_count + 1;
            let Some(key) = self.key_manager.get_next_available_key().await else {
                warn!(attempt, "no API key available, abandoning request");
                return DispatchResult::no_key_available();
            };

            telemetry::record_attempt();
            match self.transport.send(payload, &key).await {
                Ok(response) => {
                    self.key_manager.report_key_success(&key).await;
                    info!(key = %key.name(), attempt, "request succeeded");
                    return DispatchResult::success(response);
                }
                Err(failure) => {
                    let status_code = failure.status_code();
                    self.key_manager.report_key_error(&key, status_code).await;
                    telemetry::record_failure(failure.kind);

                    if retry_count == max_retries {
                        warn!(
                            key = %key.name(),
                            attempt,
                            kind = failure.kind.label(),
                            status_code,
                            error = %failure,
                            "final attempt failed"
                        );
                        break;
                    }

                    let delay = self.backoff.delay(retry_count);
                    warn!(
                        key = %key.name(),
                        attempt,
                        kind = failure.kind.label(),
                        status_code,
                        error = %failure,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, backing off"
                    );
                    telemetry::record_backoff(delay);
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
            }
        }

        error!(attempts = max_retries + 1, "retry budget exhausted");
        DispatchResult::retry_max_exceeded()
    }

    /// Dispatch many payloads concurrently over the shared pool.
    ///
    /// At most `concurrency` requests are in flight (minimum 1). Results come
    /// back in input order.
    pub async fn handle_batch(
        &self,
        payloads: &[serde_json::Value],
        concurrency: usize,
    ) -> Vec<DispatchResult> {
        info!(items = payloads.len(), concurrency, "dispatching batch");
        let results: Vec<DispatchResult> = stream::iter(payloads)
            .map(|payload| self.handle_request(payload))
            .buffered(concurrency.max(1))
            .collect()
            .await;
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            items = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            "batch complete"
        );
        results
    }

    /// Send `probe` once through the normal retry path and report success.
    pub async fn health_check(&self, probe: &serde_json::Value) -> bool {
        let result = self.handle_request(probe).await;
        if !result.is_success() {
            warn!(error_code = result.error_code.label(), "health check failed");
        }
        result.is_success()
    }
}
