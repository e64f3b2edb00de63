//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return its render handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "tryon_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "tryon_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "tryon_http_requests_in_flight";

    // Uploads
    pub const UPLOADS_TOTAL: &str = "tryon_uploads_total";
    pub const UPLOAD_BYTES: &str = "tryon_upload_bytes";

    // Auth
    pub const AUTH_ATTEMPTS_TOTAL: &str = "tryon_auth_attempts_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "tryon_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an upload attempt.
pub fn record_upload(outcome: &str, bytes: usize) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::UPLOADS_TOTAL, &labels).increment(1);
    if outcome == "stored" {
        histogram!(names::UPLOAD_BYTES).record(bytes as f64);
    }
}

/// Record a signup or login attempt.
pub fn record_auth_attempt(action: &str, outcome: &str) {
    let labels = [
        ("action", action.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(names::AUTH_ATTEMPTS_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse per-file paths so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    if path.starts_with("/uploads/") {
        return "/uploads/:file".to_string();
    }
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
