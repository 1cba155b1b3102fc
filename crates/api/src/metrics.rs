// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics module
//!
//! Provides global metrics using the default Prometheus registry via macros and
//! an Axum-compatible exposition handler.

use std::sync::LazyLock;

use axum::{
    Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, TextEncoder, register_histogram_vec,
    register_int_counter, register_int_counter_vec,
};

use crate::error::ServerError;

/// Finalized responses, labeled by matched route and status code.
pub static REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "explorer_api_requests_total",
        "Total number of finalized API responses, labeled by route and status",
        &["route", "status"]
    )
    .expect("Failed to create explorer_api_requests_total counter vec")
});

/// Time spent producing a response, from the finalizer's point of view.
pub static REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "explorer_api_request_duration_seconds",
        "API request durations in seconds, labeled by route",
        &["route"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to create explorer_api_request_duration_seconds histogram")
});

/// Requests rejected by the rate limiter.
pub static RATE_LIMITED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "explorer_api_rate_limited_total",
        "Total number of requests rejected by the rate limiter"
    )
    .expect("Failed to create explorer_api_rate_limited_total counter")
});

/// Requests rejected by an authentication gate, labeled by guard.
pub static AUTH_REJECTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "explorer_api_auth_rejections_total",
        "Total number of requests rejected by an API key guard",
        &["guard"]
    )
    .expect("Failed to create explorer_api_auth_rejections_total counter vec")
});

/// Record a finalized response
///
/// # Arguments
/// * `route` - Matched route template, or `unmatched`
/// * `status` - Response status
/// * `duration_secs` - Time spent in the finalized router
pub fn record_request(route: &str, status: StatusCode, duration_secs: f64) {
    REQUESTS.with_label_values(&[route, status.as_str()]).inc();
    REQUEST_DURATION
        .with_label_values(&[route])
        .observe(duration_secs);
}

/// Record a rate limiter rejection
pub fn record_rate_limited() {
    RATE_LIMITED.inc();
}

/// Record an authentication rejection
///
/// # Arguments
/// * `guard` - Label of the rejecting guard (`api` or `admin`)
pub fn record_auth_rejection(guard: &str) {
    AUTH_REJECTIONS.with_label_values(&[guard]).inc();
}

/// Axum handler that exports metrics in Prometheus text format
pub async fn metrics_handler() -> Result<Response, ServerError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ServerError::Metrics {
            message: format!("failed to encode metrics: {e}"),
        })?;

    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response())
}

/// Router serving the exposition at its mount point
pub fn router() -> Router {
    Router::new().route("/", get(metrics_handler))
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    #[tokio::test]
    async fn exposition_uses_registry_content_type() {
        record_auth_rejection("admin");

        let response = metrics_handler().await.expect("metrics should encode");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            TextEncoder::new().format_type()
        );

        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body should be readable");
        let text = String::from_utf8(bytes.to_vec()).expect("exposition should be UTF-8");
        assert!(text.contains("explorer_api_auth_rejections_total{guard=\"admin\"}"));
    }

    #[test]
    fn request_counter_is_labeled() {
        record_request("/v0/shard/{shardID}/block", StatusCode::OK, 0.01);
        record_request("/v0/shard/{shardID}/block", StatusCode::OK, 0.02);

        let count = REQUESTS
            .with_label_values(&["/v0/shard/{shardID}/block", "200"])
            .get();
        assert!(count >= 2);
    }
}
