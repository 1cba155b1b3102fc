// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Error handling module
//!
//! This module provides the error type shared by the server lifecycle and the
//! request-scoped policy layers, including HTTP response mapping.

use std::net::SocketAddr;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use shared_types::{Resource, ShardId, ShardIdError};
use thiserror::Error;

/// Comprehensive error types for server operations
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration validation errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Network binding errors
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        /// Socket address that failed to bind
        address: SocketAddr,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server startup errors
    #[error("Server startup failed: {source}")]
    Startup {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Server shutdown errors
    #[error("Server shutdown failed: {source}")]
    Shutdown {
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Task join errors for async operations
    #[error("Task join error: {source}")]
    TaskJoin {
        /// Underlying tokio join error
        #[source]
        source: tokio::task::JoinError,
    },

    /// Timeout errors for operations that exceed time limits
    #[error("Operation timed out after {timeout_seconds} seconds")]
    Timeout {
        /// Timeout duration in seconds
        timeout_seconds: u64,
    },

    /// Signal handling errors
    #[error("Signal handling error: {message}")]
    Signal {
        /// Error message
        message: String,
    },

    /// Metrics encoding errors
    #[error("Metrics error: {message}")]
    Metrics {
        /// Error message
        message: String,
    },

    /// JSON parsing errors with detailed context
    #[error("Invalid JSON request: {message}")]
    JsonError {
        /// Detailed error message
        message: String,
    },

    /// Request body larger than the configured limit
    #[error("Request body exceeds the {limit_bytes} byte limit")]
    PayloadTooLarge {
        /// Configured limit
        limit_bytes: usize,
    },

    /// No credential presented to an authentication gate
    #[error("{guard} required")]
    MissingApiKey {
        /// Name of the rejecting guard
        guard: &'static str,
    },

    /// Credential presented but not in the authorized set
    #[error("invalid {guard}")]
    InvalidApiKey {
        /// Name of the rejecting guard
        guard: &'static str,
    },

    /// Client exceeded its request allowance for the current window
    #[error("Too many requests, please try again later.")]
    RateLimited {
        /// Seconds until the client's window resets
        retry_after_seconds: u64,
    },

    /// Shard segment that does not form a valid shard identifier
    #[error("invalid shard: {source}")]
    InvalidShard {
        /// Validation failure
        #[source]
        source: ShardIdError,
    },

    /// Handler wired to a route that does not provide what it extracts
    #[error("Routing error: {message}")]
    Routing {
        /// Error message
        message: String,
    },

    /// Resource router mounted without a backing implementation
    #[error("{resource} is not available{}", on_shard(.shard.as_ref()))]
    ResourceUnavailable {
        /// Resource that was requested
        resource: Resource,
        /// Shard bound by the route, if any
        shard: Option<ShardId>,
    },
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Config { .. }
            | ServerError::Bind { .. }
            | ServerError::Startup { .. }
            | ServerError::Shutdown { .. }
            | ServerError::TaskJoin { .. }
            | ServerError::Signal { .. }
            | ServerError::Metrics { .. }
            | ServerError::Routing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            ServerError::JsonError { .. } | ServerError::InvalidShard { .. } => {
                StatusCode::BAD_REQUEST
            }
            ServerError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::MissingApiKey { .. } => StatusCode::UNAUTHORIZED,
            ServerError::InvalidApiKey { .. } => StatusCode::FORBIDDEN,
            ServerError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServerError::ResourceUnavailable { .. } => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

fn on_shard(shard: Option<&ShardId>) -> String {
    shard.map(|s| format!(" on shard {s}")).unwrap_or_default()
}

/// JSON envelope shared by every error response the gateway produces
pub fn error_body(status: StatusCode, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": message,
        "status": status.as_u16()
    })
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(error_body(status, &self.to_string()));
        let mut response = (status, body).into_response();

        if let ServerError::RateLimited {
            retry_after_seconds,
        } = self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_seconds));
        }

        response
    }
}

/// Convenient From implementations for common async error types
impl From<tokio::task::JoinError> for ServerError {
    fn from(source: tokio::task::JoinError) -> Self {
        Self::TaskJoin { source }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ServerError::MissingApiKey { guard: "API key" }.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServerError::InvalidApiKey { guard: "API key" }.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServerError::RateLimited {
                retry_after_seconds: 3
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ServerError::JsonError {
                message: "bad".to_string()
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::PayloadTooLarge { limit_bytes: 10 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[tokio::test]
    async fn rate_limited_response_has_retry_after() {
        let response = ServerError::RateLimited {
            retry_after_seconds: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from_static("42"))
        );

        let json = body_json(response).await;
        assert_eq!(json["status"], 429);
        assert_eq!(json["error"], "Too many requests, please try again later.");
    }

    #[tokio::test]
    async fn unavailable_resource_names_shard() {
        let error = ServerError::ResourceUnavailable {
            resource: Resource::Block,
            shard: ShardId::new("1").ok(),
        };
        assert_eq!(error.to_string(), "block is not available on shard 1");

        let json = body_json(error.into_response()).await;
        assert_eq!(json["status"], 501);

        let unsharded = ServerError::ResourceUnavailable {
            resource: Resource::Price,
            shard: None,
        };
        assert_eq!(unsharded.to_string(), "price is not available");
    }
}
