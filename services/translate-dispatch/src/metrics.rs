//! Prometheus metrics exposition
//!
//! Installs the recorder that captures the dispatcher's counters, and adds
//! pool gauges taken at the end of a batch:
//!
//! - `pool_keys` (gauge): label `status`
//! - `pool_requests_total` (gauge): label `outcome`

use std::path::Path;

use dispatcher::telemetry::BACKOFF_BUCKETS;
use key_pool::PoolStats;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `dispatch_backoff_seconds` gets explicit buckets so it renders as a
/// histogram rather than a summary.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("dispatch_backoff_seconds".to_string()),
            BACKOFF_BUCKETS,
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Publish pool totals as gauges.
pub fn record_pool_stats(stats: &PoolStats) {
    metrics::gauge!("pool_keys", "status" => "active").set(stats.active_keys as f64);
    metrics::gauge!("pool_keys", "status" => "rate_limited").set(stats.rate_limited_keys as f64);
    metrics::gauge!("pool_keys", "status" => "error").set(stats.error_keys as f64);
    metrics::gauge!("pool_requests_total", "outcome" => "success")
        .set(stats.successful_requests as f64);
    metrics::gauge!("pool_requests_total", "outcome" => "failure")
        .set(stats.failed_requests as f64);
}

/// Write the Prometheus text exposition to `path`.
pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> std::io::Result<()> {
    std::fs::write(path, handle.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    /// Uses build_recorder() since only one global recorder can exist per
    /// process.
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

    fn stats() -> PoolStats {
        PoolStats {
            total_keys: 3,
            active_keys: 1,
            rate_limited_keys: 1,
            error_keys: 1,
            total_requests: 10,
            successful_requests: 7,
            failed_requests: 3,
            success_rate: 70.0,
        }
    }

    #[test]
    fn record_pool_stats_without_recorder_is_noop() {
        record_pool_stats(&stats());
    }

    #[test]
    fn pool_gauges_carry_status_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_pool_stats(&stats());

        let output = handle.render();
        let line = |prefix: &str| {
            output
                .lines()
                .find(|l| l.starts_with(prefix))
                .and_then(|l| l.rsplit(' ').next())
                .and_then(|v| v.parse::<f64>().ok())
        };
        assert_eq!(line("pool_keys{status=\"rate_limited\"}"), Some(1.0));
        assert_eq!(line("pool_requests_total{outcome=\"success\"}"), Some(7.0));
        assert_eq!(line("pool_requests_total{outcome=\"failure\"}"), Some(3.0));
    }

    #[test]
    fn dispatcher_histogram_renders_buckets() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        dispatcher::telemetry::record_backoff(std::time::Duration::from_secs(4));

        let output = handle.render();
        assert!(output.contains("dispatch_backoff_seconds_bucket"));
        assert!(output.contains("le=\"4\""));
    }

    #[test]
    fn snapshot_written_to_file() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);
        dispatcher::telemetry::record_attempt();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.prom");
        write_snapshot(&handle, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("dispatch_attempts_total"));
    }
}
