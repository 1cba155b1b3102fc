// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! API key authentication gates
//!
//! Two independent guards protect the gateway: one in front of `/v0`, one in
//! front of `/admin`. Each reads the presented key from the `x-api-key` header,
//! falling back to the `apiKey` query parameter. A missing key is rejected with
//! 401 and a key outside the guard's set with 403; rejected requests never reach
//! the protected routers. Keys are compared in constant time.

use std::{fmt, sync::Arc};

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::{error::ServerError, metrics};

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";
/// Query parameter accepted when the header is absent
pub const API_KEY_QUERY_PARAM: &str = "apiKey";

/// Set of authorized keys
#[derive(Clone, Default)]
pub struct ApiKeySet {
    keys: Arc<[Box<str>]>,
}

impl ApiKeySet {
    /// Build a set from configured keys, ignoring blank entries
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut keys: Vec<Box<str>> = keys
            .into_iter()
            .map(|key| key.as_ref().trim().into())
            .filter(|key: &Box<str>| !key.is_empty())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        Self { keys: keys.into() }
    }

    /// Whether `key` is authorized
    ///
    /// Every configured key is compared; only the length check may exit early.
    pub fn contains(&self, key: &str) -> bool {
        let presented = key.as_bytes();
        self.keys.iter().fold(false, |found, candidate| {
            let candidate = candidate.as_bytes();
            let matches =
                candidate.len() == presented.len() && bool::from(candidate.ct_eq(presented));
            found | matches
        })
    }

    /// Number of authorized keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key is authorized; such a guard rejects every request
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for ApiKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKeySet([{} redacted])", self.keys.len())
    }
}

/// Keys accepted by the `/v0` guard
#[derive(Debug, Clone, Default)]
pub struct ApiKeys(pub ApiKeySet);

/// Keys accepted by the `/admin` guard
#[derive(Debug, Clone, Default)]
pub struct AdminApiKeys(pub ApiKeySet);

/// Which guard rejected a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// `/v0` guard
    Api,
    /// `/admin` guard
    Admin,
}

impl Guard {
    /// Credential name used in rejection messages
    pub const fn credential(self) -> &'static str {
        match self {
            Self::Api => "API key",
            Self::Admin => "admin API key",
        }
    }

    /// Metrics label
    pub const fn label(self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Admin => "admin",
        }
    }
}

/// Key presented by the caller, header first
fn presented_key(req: &Request) -> Option<String> {
    if let Some(value) = req.headers().get(API_KEY_HEADER) {
        return value.to_str().ok().map(str::to_owned);
    }

    Query::<Vec<(String, String)>>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(pairs)| {
            pairs
                .into_iter()
                .find_map(|(name, value)| (name == API_KEY_QUERY_PARAM).then_some(value))
        })
}

/// Decide whether `req` carries a key from `keys`
///
/// # Errors
///
/// `MissingApiKey` when no key is presented, `InvalidApiKey` when the key is
/// not in the set.
pub fn authorize(keys: &ApiKeySet, guard: Guard, req: &Request) -> Result<(), ServerError> {
    let credential = guard.credential();
    match presented_key(req) {
        None => Err(ServerError::MissingApiKey { guard: credential }),
        Some(key) if key.is_empty() => Err(ServerError::MissingApiKey { guard: credential }),
        Some(key) if keys.contains(&key) => Ok(()),
        Some(_) => Err(ServerError::InvalidApiKey { guard: credential }),
    }
}

async fn enforce(keys: &ApiKeySet, guard: Guard, req: Request, next: Next) -> Response {
    match authorize(keys, guard, &req) {
        Ok(()) => next.run(req).await,
        Err(err) => {
            debug!(guard = guard.label(), path = %req.uri().path(), error = %err, "request rejected");
            metrics::record_auth_rejection(guard.label());
            err.into_response()
        }
    }
}

/// Gate for `/v0`
pub async fn verify_api_key(
    State(ApiKeys(keys)): State<ApiKeys>,
    req: Request,
    next: Next,
) -> Response {
    enforce(&keys, Guard::Api, req, next).await
}

/// Gate for `/admin`
pub async fn verify_admin_api_key(
    State(AdminApiKeys(keys)): State<AdminApiKeys>,
    req: Request,
    next: Next,
) -> Response {
    enforce(&keys, Guard::Admin, req, next).await
}

/// Log a warning for every guard that will reject all traffic
pub fn warn_if_unconfigured(api_keys: &ApiKeys, admin_keys: &AdminApiKeys) {
    if api_keys.0.is_empty() {
        warn!("no API keys configured [SERVER_AUTH__API_KEYS], /v0 will reject every request");
    }
    if admin_keys.0.is_empty() {
        warn!(
            "no admin API keys configured [SERVER_AUTH__ADMIN_API_KEYS], /admin will reject every request"
        );
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, http::StatusCode, middleware, routing::get};
    use tower::ServiceExt;

    use super::*;

    fn request(uri: &str, header: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(key) = header {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder.body(Body::empty()).expect("request should build")
    }

    fn keys() -> ApiKeySet {
        ApiKeySet::new(["alpha", " beta ", ""])
    }

    #[test]
    fn key_set_trims_and_skips_blank_entries() {
        let keys = keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("alpha"));
        assert!(keys.contains("beta"));
        assert!(!keys.contains(""));
    }

    #[test]
    fn key_set_matches_whole_keys_only() {
        let keys = ApiKeySet::new(["alpha-key", "alpha-key", "beta"]);
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("alpha-key"));
        for near_miss in ["alpha", "alpha-kez", "alpha-key ", "ALPHA-KEY", "bet", "betaa"] {
            assert!(!keys.contains(near_miss), "{near_miss}");
        }
    }

    #[test]
    fn key_set_debug_is_redacted() {
        let rendered = format!("{:?}", ApiKeys(keys()));
        assert!(!rendered.contains("alpha"));
        assert!(rendered.contains("2 redacted"));
    }

    #[test]
    fn header_key_is_checked() {
        assert!(authorize(&keys(), Guard::Api, &request("/", Some("alpha"))).is_ok());
        assert!(matches!(
            authorize(&keys(), Guard::Api, &request("/", Some("gamma"))),
            Err(ServerError::InvalidApiKey { guard: "API key" })
        ));
    }

    #[test]
    fn query_key_is_accepted_when_header_is_absent() {
        assert!(authorize(&keys(), Guard::Api, &request("/x?apiKey=beta", None)).is_ok());
        assert!(matches!(
            authorize(&keys(), Guard::Admin, &request("/x?apiKey=nope", None)),
            Err(ServerError::InvalidApiKey {
                guard: "admin API key"
            })
        ));
    }

    #[test]
    fn header_takes_precedence_over_query() {
        assert!(matches!(
            authorize(&keys(), Guard::Api, &request("/x?apiKey=alpha", Some("wrong"))),
            Err(ServerError::InvalidApiKey { .. })
        ));
    }

    #[test]
    fn missing_key_is_unauthorized() {
        for req in [request("/", None), request("/?apiKey=", None), request("/", Some(""))] {
            let err = authorize(&keys(), Guard::Api, &req).expect_err("should reject");
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn empty_set_rejects_everything() {
        let empty = ApiKeySet::default();
        let err = authorize(&empty, Guard::Admin, &request("/", Some("anything")))
            .expect_err("should reject");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn middleware_short_circuits() {
        let app = Router::new().route("/", get(|| async { "ok" })).layer(
            middleware::from_fn_with_state(ApiKeys(keys()), verify_api_key),
        );

        let rejected = app
            .clone()
            .oneshot(request("/", None))
            .await
            .expect("infallible");
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

        let accepted = app
            .oneshot(request("/", Some("alpha")))
            .await
            .expect("infallible");
        assert_eq!(accepted.status(), StatusCode::OK);
    }
}
