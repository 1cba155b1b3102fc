// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Custom extractors for resource routers
//!
//! [`JsonBody`] hands out the document parsed by the JSON body middleware and
//! [`ShardParam`] the shard bound by the `/shard/{shardID}` mount. Both offer an
//! optional form for routers that are mounted with and without a shard segment.

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, RawPathParams},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared_types::ShardId;

use crate::{error::ServerError, routes::SHARD_PARAM};

/// Request body parsed by [`crate::middleware::json_body_middleware`]
#[derive(Debug, Clone, PartialEq)]
pub struct JsonBody(pub Value);

impl JsonBody {
    /// Deserialize the document into a typed request
    ///
    /// # Errors
    ///
    /// `ServerError::JsonError` describing the mismatch when the document does
    /// not fit `T`.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, ServerError> {
        serde_json::from_value(self.0).map_err(|err| ServerError::JsonError {
            message: format!(
                "JSON data validation failed: {}",
                get_data_validation_hint(&err)
            ),
        })
    }
}

impl<S> FromRequestParts<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| ServerError::JsonError {
                message: "request body is empty, expected valid JSON".to_string(),
            })
    }
}

impl<S> OptionalFromRequestParts<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}

/// Provides helpful hints for data validation errors
fn get_data_validation_hint(err: &serde_json::Error) -> String {
    let err_msg = err.to_string();

    if err_msg.contains("invalid type") {
        if err_msg.contains("expected a string") {
            "expected a string value, but received a different data type".to_string()
        } else if ["expected u", "expected i", "expected f"]
            .iter()
            .any(|needle| err_msg.contains(needle))
        {
            "expected a numeric value, but received a different data type".to_string()
        } else if err_msg.contains("expected a boolean") {
            "expected a boolean value (true or false), but received a different data type"
                .to_string()
        } else if err_msg.contains("expected a sequence") {
            "expected an array, but received a different data type".to_string()
        } else if err_msg.contains("expected struct") || err_msg.contains("expected a map") {
            "expected a JSON object, but received a different data type".to_string()
        } else {
            format!("data type mismatch: {err_msg}")
        }
    } else if err_msg.contains("missing field") {
        format!("required field is missing: {err_msg}")
    } else if err_msg.contains("unknown field") {
        format!("unrecognized field found: {err_msg}")
    } else {
        err_msg
    }
}

/// Shard bound by the `/shard/{shardID}` mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardParam(pub ShardId);

async fn bound_shard<S>(parts: &mut Parts, state: &S) -> Result<Option<ShardId>, ServerError>
where
    S: Send + Sync,
{
    let Ok(params) = RawPathParams::from_request_parts(parts, state).await else {
        return Ok(None);
    };

    params
        .iter()
        .find(|(name, _)| *name == SHARD_PARAM)
        .map(|(_, value)| ShardId::new(value).map_err(|source| ServerError::InvalidShard { source }))
        .transpose()
}

impl<S> FromRequestParts<S> for ShardParam
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        bound_shard(parts, state)
            .await?
            .map(ShardParam)
            .ok_or_else(|| ServerError::Routing {
                message: format!("route does not bind {{{SHARD_PARAM}}}"),
            })
    }
}

impl<S> OptionalFromRequestParts<S> for ShardParam
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(bound_shard(parts, state).await?.map(ShardParam))
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, http::StatusCode, routing::get};
    use serde::Deserialize;
    use tower::ServiceExt;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct BlockQuery {
        #[allow(dead_code)]
        number: u64,
    }

    fn shard_echo() -> Router {
        let handler = |shard: Option<ShardParam>| async move {
            shard.map_or_else(|| "none".to_string(), |ShardParam(id)| id.to_string())
        };
        Router::new()
            .route("/shard/{shardID}/block", get(handler))
            .route("/price", get(handler))
    }

    async fn body_text(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(
                axum::http::Request::get(uri)
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("body should be readable");
        (status, String::from_utf8(bytes.to_vec()).expect("UTF-8"))
    }

    #[tokio::test]
    async fn shard_is_bound_from_path() {
        assert_eq!(
            body_text(shard_echo(), "/shard/2/block").await,
            (StatusCode::OK, "2".to_string())
        );
        assert_eq!(
            body_text(shard_echo(), "/price").await,
            (StatusCode::OK, "none".to_string())
        );
    }

    #[tokio::test]
    async fn required_shard_outside_shard_mount_is_an_error() {
        let app = Router::new().route("/price", get(|ShardParam(id): ShardParam| async move { id.to_string() }));
        let (status, _) = body_text(app, "/price").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn typed_deserialization_reports_mismatch() {
        let body = JsonBody(serde_json::json!({"number": "ten"}));
        let err = body.deserialize::<BlockQuery>().expect_err("should reject");
        assert!(matches!(err, ServerError::JsonError { .. }));
        assert!(err.to_string().contains("numeric value"), "{err}");

        let missing = JsonBody(serde_json::json!({}));
        let err = missing.deserialize::<BlockQuery>().expect_err("should reject");
        assert!(err.to_string().contains("required field is missing"), "{err}");
    }

    #[test]
    fn typed_deserialization_succeeds() {
        let body = JsonBody(serde_json::json!({"number": 10}));
        assert!(body.deserialize::<BlockQuery>().is_ok());
    }
}
