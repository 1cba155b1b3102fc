// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Transport finalizer
//!
//! Wraps a router's terminal response: records request metrics and converts
//! non-JSON error responses into the gateway's JSON error envelope. A response
//! is finalized at most once, so nested finalized routers compose.

use axum::{
    body::Body,
    extract::{MatchedPath, Request},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use crate::{error::error_body, metrics, middleware::json_body::is_json_content_type};

const UNMATCHED_ROUTE: &str = "unmatched";

/// Marker placed on responses that already passed a finalizer
#[derive(Debug, Clone, Copy)]
struct Finalized;

/// Finalize the response produced by the wrapped router
pub async fn finalize(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| UNMATCHED_ROUTE.to_string(), |path| path.as_str().to_string());
    let started = Instant::now();

    let mut response = next.run(req).await;
    if response.extensions().get::<Finalized>().is_some() {
        return response;
    }
    response.extensions_mut().insert(Finalized);

    let status = response.status();
    metrics::record_request(&route, status, started.elapsed().as_secs_f64());

    if (status.is_client_error() || status.is_server_error())
        && !is_json_content_type(response.headers())
    {
        let message = status.canonical_reason().unwrap_or("Error");
        let (mut parts, _) = response.into_parts();
        parts.headers.remove(header::CONTENT_LENGTH);
        parts.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        let body = error_body(status, message).to_string();
        return Response::from_parts(parts, Body::from(body));
    }

    response
}
