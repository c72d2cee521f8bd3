//! Metrics definitions for the member subscriber.
//!
//! All metrics follow Prometheus naming conventions:
//! - `ms_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! Recording is a no-op until a recorder is installed, so library users that
//! do not care about metrics pay nothing.

use crate::transport::MediaMode;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus metrics recorder and return the handle used to
/// render the exposition.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Subscribe sequences are dominated by transport round trips
        .set_buckets_for_metric(
            Matcher::Prefix("ms_subscribe_duration".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set subscribe duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Outcome label of a subscribe completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Success,
    Failure,
    /// Completion arrived under an invalidated generation.
    Stale,
}

impl SubscribeOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SubscribeOutcome::Success => "success",
            SubscribeOutcome::Failure => "failure",
            SubscribeOutcome::Stale => "stale",
        }
    }
}

// ============================================================================
// Subscription Metrics (Counters)
// ============================================================================

/// Record a transport subscribe request.
///
/// Metric: `ms_subscribe_requests_total`
/// Labels: `mode`
pub fn record_subscribe_request(mode: MediaMode) {
    counter!("ms_subscribe_requests_total", "mode" => mode.as_str()).increment(1);
}

/// Record a subscribe completion.
///
/// Metric: `ms_subscribe_outcomes_total`
/// Labels: `outcome`
pub fn record_subscribe_outcome(outcome: SubscribeOutcome) {
    counter!("ms_subscribe_outcomes_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record a retry sequence that ran out of candidates.
///
/// Metric: `ms_candidates_exhausted_total`
pub fn record_candidates_exhausted() {
    counter!("ms_candidates_exhausted_total").increment(1);
}

/// Record a renderer that failed to start on a surface.
///
/// Metric: `ms_renderer_start_failures_total`
pub fn record_renderer_start_failure() {
    counter!("ms_renderer_start_failures_total").increment(1);
}

/// Record an actor panic event.
///
/// Metric: `ms_actor_panics_total`
/// Labels: `actor_type`
///
/// Any non-zero value indicates a bug.
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("ms_actor_panics_total", "actor_type" => actor_type).increment(1);
}

// ============================================================================
// Latency Metrics (Histograms)
// ============================================================================

/// Record the time from the first request of a retry sequence to success.
///
/// Metric: `ms_subscribe_duration_seconds`
pub fn record_subscribe_duration(duration: Duration) {
    histogram!("ms_subscribe_duration_seconds").record(duration.as_secs_f64());
}

// ============================================================================
// Gauges
// ============================================================================

/// Metric: `ms_subscriptions_active`
pub fn set_subscriptions_active(count: usize) {
    // usize to f64 conversion is safe for realistic member counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("ms_subscriptions_active").set(count as f64);
}

/// Metric: `ms_members_active`
pub fn set_members_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("ms_members_active").set(count as f64);
}
