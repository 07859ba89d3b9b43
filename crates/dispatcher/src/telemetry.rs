//! Dispatch metrics
//!
//! Recorded through the `metrics` facade; without an installed recorder these
//! calls are no-ops. Names:
//!
//! - `dispatch_attempts_total` (counter)
//! - `dispatch_failures_total` (counter): label `kind`
//! - `dispatch_backoff_seconds` (histogram)
//! - `dispatch_results_total` (counter): label `outcome`

use std::time::Duration;

use transport::FailureKind;

use crate::dispatch::ErrorCode;

/// Histogram buckets for `dispatch_backoff_seconds`, from 0.5s to 5 minutes.
pub const BACKOFF_BUCKETS: &[f64] = &[0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 300.0];

/// One transport call was made.
pub fn record_attempt() {
    metrics::counter!("dispatch_attempts_total").increment(1);
}

/// A transport call failed with `kind`.
pub fn record_failure(kind: FailureKind) {
    metrics::counter!("dispatch_failures_total", "kind" => kind.label()).increment(1);
}

/// The dispatcher is about to sleep for `delay`.
pub fn record_backoff(delay: Duration) {
    metrics::histogram!("dispatch_backoff_seconds").record(delay.as_secs_f64());
}

/// A `handle_request` call finished with `code`.
pub fn record_result(code: ErrorCode) {
    metrics::counter!("dispatch_results_total", "outcome" => code.label()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full("dispatch_backoff_seconds".to_string()),
                BACKOFF_BUCKETS,
            )
            .expect("failed to set histogram buckets")
            .build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_attempt();
        record_failure(FailureKind::Unknown);
        record_backoff(Duration::from_secs(1));
        record_result(ErrorCode::None);
    }

    #[test]
    fn failures_and_results_carry_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_attempt();
        record_failure(FailureKind::RateLimited);
        record_failure(FailureKind::ServerError);
        record_result(ErrorCode::RetryMaxExceeded);

        let output = handle.render();
        assert!(output.contains("dispatch_attempts_total"));
        assert!(output.contains("kind=\"rate_limited\""));
        assert!(output.contains("kind=\"server_error\""));
        assert!(output.contains("outcome=\"retry_max_exceeded\""));
    }

    #[test]
    fn backoff_renders_as_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_backoff(Duration::from_secs(2));

        let output = handle.render();
        assert!(output.contains("dispatch_backoff_seconds_bucket"));
        assert!(output.contains("le=\"300\""));
        assert!(output.contains("le=\"+Inf\""));
    }
}
