// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! JSON request body parsing
//!
//! Requests declaring a JSON content type have their body read (up to the
//! configured limit) and parsed once before routing. The parsed document is
//! attached to the request for [`crate::extractors::JsonBody`]; malformed bodies
//! are answered with 400 and never reach a resource router.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use serde_json::Value;
use tracing::debug;

use crate::{error::ServerError, extractors::JsonBody};

mod error_hints {
    pub const MISSING_COMMA: &str =
        "check for missing or extra commas between object properties or array elements";
    pub const MISSING_BRACE: &str = "check for missing closing brace '}' for JSON object";
    pub const MISSING_BRACKET: &str = "check for missing closing bracket ']' for JSON array";
    pub const MISSING_QUOTES: &str =
        "check for missing or improperly escaped quotes around string values";
    pub const CONTROL_CHARS: &str = "JSON contains invalid control characters that must be escaped";
    pub const EXPECTED_VALUE: &str =
        "expected a valid JSON value (string, number, boolean, null, object, or array)";
    pub const DEFAULT_SYNTAX: &str = "check JSON formatting and structure";
    pub const TRUNCATED_JSON: &str =
        "unexpected end of JSON input, request appears to be truncated";
}

/// Largest body, in bytes, the parser will buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimit(pub usize);

/// Whether the headers declare a JSON payload (`application/json` or `*+json`)
pub(crate) fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .is_some_and(|essence| {
            essence.eq_ignore_ascii_case("application/json")
                || essence.to_ascii_lowercase().ends_with("+json")
        })
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

/// Parse JSON request bodies ahead of routing
pub async fn json_body_middleware(
    State(BodyLimit(limit)): State<BodyLimit>,
    req: Request,
    next: Next,
) -> Response {
    if !is_json_content_type(req.headers()) {
        return next.run(req).await;
    }

    if let Some(length) = declared_length(req.headers())
        && length > limit
    {
        debug!(length, limit, "rejecting oversized JSON body");
        return ServerError::PayloadTooLarge { limit_bytes: limit }.into_response();
    }

    let (mut parts, body) = req.into_parts();
    let bytes = match to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let err = err.into_inner();
            if err.is::<LengthLimitError>() {
                return ServerError::PayloadTooLarge { limit_bytes: limit }.into_response();
            }
            return ServerError::JsonError {
                message: format!("failed to read request body: {err}"),
            }
            .into_response();
        }
    };

    if !bytes.is_empty() {
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(document) => {
                parts.extensions.insert(JsonBody(document));
            }
            Err(err) => {
                debug!(error = %err, "rejecting malformed JSON body");
                return ServerError::JsonError {
                    message: describe_syntax_error(&err),
                }
                .into_response();
            }
        }
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

fn describe_syntax_error(err: &serde_json::Error) -> String {
    if err.is_eof() {
        error_hints::TRUNCATED_JSON.to_string()
    } else if err.is_syntax() {
        format!(
            "invalid JSON syntax at line {}, column {}: {}",
            err.line(),
            err.column(),
            get_json_syntax_hint(err)
        )
    } else {
        format!("JSON parsing error: {err}")
    }
}

/// Provides helpful hints for JSON syntax errors
fn get_json_syntax_hint(err: &serde_json::Error) -> &'static str {
    let err_msg = err.to_string();

    if err_msg.contains("expected ','") || err_msg.contains("trailing comma") {
        error_hints::MISSING_COMMA
    } else if err_msg.contains("expected '}'") {
        error_hints::MISSING_BRACE
    } else if err_msg.contains("expected ']'") {
        error_hints::MISSING_BRACKET
    } else if err_msg.contains("expected '\"'") {
        error_hints::MISSING_QUOTES
    } else if err_msg.contains("control character") {
        error_hints::CONTROL_CHARS
    } else if err_msg.contains("expected value") {
        error_hints::EXPECTED_VALUE
    } else {
        error_hints::DEFAULT_SYNTAX
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Bytes,
        http::{HeaderValue, Method, StatusCode},
        middleware,
        routing::post,
    };
    use tower::ServiceExt;

    use super::*;

    fn app(limit: usize) -> Router {
        Router::new()
            .route(
                "/",
                post(|body: Option<JsonBody>, raw: Bytes| async move {
                    format!("{}|{}", body.map(|b| b.0.to_string()).unwrap_or_default(), raw.len())
                }),
            )
            .layer(middleware::from_fn_with_state(
                BodyLimit(limit),
                json_body_middleware,
            ))
    }

    fn json_request(body: &'static str) -> Request {
        axum::http::Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("request should build")
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body should be readable");
        String::from_utf8(bytes.to_vec()).expect("body should be UTF-8")
    }

    #[test]
    fn json_content_types() {
        let mut headers = HeaderMap::new();
        assert!(!is_json_content_type(&headers));

        for value in [
            "application/json",
            "application/json; charset=utf-8",
            "Application/JSON",
            "application/vnd.api+json",
        ] {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
            assert!(is_json_content_type(&headers), "{value} should be JSON");
        }

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!is_json_content_type(&headers));
    }

    #[tokio::test]
    async fn valid_body_is_attached_and_preserved() {
        let response = app(1024)
            .oneshot(json_request(r#"{"shard":1}"#))
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, r#"{"shard":1}|11"#);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_with_hint() {
        let response = app(1024)
            .oneshot(json_request(r#"{"a": 1 "b": 2}"#))
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let text = body_text(response).await;
        assert!(text.contains("invalid JSON syntax at line 1"), "{text}");
        assert!(text.contains("commas"), "{text}");
    }

    #[tokio::test]
    async fn truncated_body_is_reported() {
        let response = app(1024)
            .oneshot(json_request(r#"{"a": [1, 2"#))
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("truncated"));
    }

    #[tokio::test]
    async fn empty_body_passes_through() {
        let response = app(1024)
            .oneshot(json_request(""))
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "|0");
    }

    #[tokio::test]
    async fn non_json_body_is_not_parsed() {
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("{not json"))
            .expect("request should build");

        let response = app(1024).oneshot(request).await.expect("infallible");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "|9");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let response = app(4)
            .oneshot(json_request(r#"{"a":1}"#))
            .await
            .expect("infallible");

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn oversized_declared_length_is_rejected_before_reading() {
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, "5000")
            .body(Body::from("{}"))
            .expect("request should build");

        let response = app(1024).oneshot(request).await.expect("infallible");
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
