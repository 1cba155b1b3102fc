// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Test fixtures for routing tests
//!
//! Every resource slot is filled with a sentinel router that counts its hits
//! and echoes what it saw: resource, bound shard, path and parsed JSON body.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use api::{
    JsonBody, Resource, ResourceRouters, Server, ServerConfig, ShardParam, ShutdownConfig,
};
use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::OriginalUri,
    http::{HeaderMap, Method, Request, StatusCode, header},
    response::Response,
    routing::any,
};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Key accepted by `/v0` in [`ServerConfig::for_testing`]
pub const API_KEY: &str = "test-api-key";
/// Key accepted by `/admin` in [`ServerConfig::for_testing`]
pub const ADMIN_API_KEY: &str = "test-admin-key";

/// Hit counters for every sentinel router
#[derive(Debug, Clone, Default)]
pub struct Sentinels {
    hits: HashMap<Resource, Arc<AtomicUsize>>,
}

impl Sentinels {
    /// Sentinels for every resource
    pub fn all() -> Self {
        Self::for_resources(Resource::all().iter().copied())
    }

    /// Sentinels for the given resources only; other slots keep their defaults
    pub fn for_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        Self {
            hits: resources
                .into_iter()
                .map(|resource| (resource, Arc::new(AtomicUsize::new(0))))
                .collect(),
        }
    }

    /// Registry with a sentinel in each covered slot
    pub fn routers(&self) -> ResourceRouters {
        self.hits
            .iter()
            .fold(ResourceRouters::new(), |routers, (resource, hits)| {
                routers.with(*resource, sentinel(*resource, Arc::clone(hits)))
            })
    }

    /// Hits recorded by one sentinel
    pub fn hits(&self, resource: Resource) -> usize {
        self.hits
            .get(&resource)
            .map_or(0, |hits| hits.load(Ordering::SeqCst))
    }

    /// Hits recorded across all sentinels
    pub fn total(&self) -> usize {
        self.hits
            .values()
            .map(|hits| hits.load(Ordering::SeqCst))
            .sum()
    }
}

fn sentinel(resource: Resource, hits: Arc<AtomicUsize>) -> Router {
    let handler = move |shard: Option<ShardParam>,
                        body: Option<JsonBody>,
                        OriginalUri(uri): OriginalUri| {
        let hits = Arc::clone(&hits);
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            Json(json!({
                "resource": resource.name(),
                "shardID": shard.map(|ShardParam(id)| id.to_string()),
                "path": uri.path(),
                "body": body.map(|JsonBody(value)| value),
            }))
        }
    };

    Router::new()
        .route("/", any(handler.clone()))
        .route("/{*rest}", any(handler))
}

/// Application router for `config` with sentinels mounted
pub fn app(config: ServerConfig, sentinels: &Sentinels) -> Router {
    Server::with_resource_routers(config, ShutdownConfig::default(), &sentinels.routers())
        .expect("Failed to create server")
        .router()
}

/// GET request carrying an optional `x-api-key`
pub fn get(uri: &str, api_key: Option<&str>) -> Request<Body> {
    request(Method::GET, uri, api_key, Body::empty(), None)
}

/// Request with an optional key, body and content type
pub fn request(
    method: Method,
    uri: &str,
    api_key: Option<&str>,
    body: Body,
    content_type: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder.body(body).expect("Failed to build request")
}

/// Send one request through `app`
pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone()
        .oneshot(request)
        .await
        .expect("router is infallible")
}

/// Status, headers and JSON body of one exchange
pub async fn exchange(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = send(app, request).await;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("Failed to read response body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}
