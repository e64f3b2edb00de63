//! Render pipeline metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder. Without a recorder these calls are no-ops.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const RENDERS_TOTAL: &str = "tryon_renders_total";
    pub const RENDER_DURATION_SECONDS: &str = "tryon_render_duration_seconds";
    pub const DETECTIONS_TOTAL: &str = "tryon_detections_total";
    pub const DETECTION_DURATION_SECONDS: &str = "tryon_detection_duration_seconds";
    pub const STALE_RESULTS_TOTAL: &str = "tryon_stale_results_total";
    pub const ASSET_LOAD_FAILURES_TOTAL: &str = "tryon_asset_load_failures_total";
}

/// Record the outcome of one render attempt.
pub fn record_render(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::RENDERS_TOTAL, &labels).increment(1);
    histogram!(names::RENDER_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a landmark detection call.
pub fn record_detection(source: &str, result: &str, duration_secs: f64) {
    let labels = [
        ("source", source.to_string()),
        ("result", result.to_string()),
    ];
    counter!(names::DETECTIONS_TOTAL, &labels).increment(1);
    histogram!(names::DETECTION_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a result dropped because a newer generation exists.
pub fn record_stale_result(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::STALE_RESULTS_TOTAL, &labels).increment(1);
}

/// Record an overlay asset that failed to load.
pub fn record_asset_failure() {
    counter!(names::ASSET_LOAD_FAILURES_TOTAL).increment(1);
}
