// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Middleware module for HTTP request processing
//!
//! This module provides the request-scoped policies applied in front of the
//! routing tree: rate limiting, API key gates, JSON body parsing and server
//! identity suppression. Compression, CORS and request tracing come from
//! `tower-http` and are layered in [`crate::server`].

pub mod auth;
pub mod json_body;
pub mod rate_limit;

use axum::{http::HeaderName, response::Response};

pub use auth::{AdminApiKeys, ApiKeySet, ApiKeys, Guard, verify_admin_api_key, verify_api_key};
pub use json_body::{BodyLimit, json_body_middleware};
pub use rate_limit::{RateLimitDecision, RateLimiter, rate_limiting_middleware};

/// Framework identity header removed from every response
pub const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

/// Drop headers that advertise the serving software
pub async fn strip_server_identity(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.remove(X_POWERED_BY);
    headers.remove(axum::http::header::SERVER);
    response
}
