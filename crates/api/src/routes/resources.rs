// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Resource router registry
//!
//! The gateway composes resource routers it does not implement itself. Callers
//! supply the routers they have; every other slot is filled with a placeholder
//! that answers 501, except `metrics`, which defaults to the Prometheus
//! exposition.

use std::collections::HashMap;

use axum::{Router, routing::any};
use shared_types::Resource;

use crate::{error::ServerError, extractors::ShardParam, metrics};

/// Routers to mount for each resource
#[derive(Debug, Clone, Default)]
pub struct ResourceRouters {
    routers: HashMap<Resource, Router>,
}

impl ResourceRouters {
    /// Registry with every slot defaulted
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide the router for `resource`, replacing any earlier one
    #[must_use]
    pub fn with(mut self, resource: Resource, router: Router) -> Self {
        self.routers.insert(resource, router);
        self
    }

    /// Whether a router was supplied for `resource`
    pub fn is_provided(&self, resource: Resource) -> bool {
        self.routers.contains_key(&resource)
    }

    /// Router to mount for `resource`
    pub fn router(&self, resource: Resource) -> Router {
        self.routers
            .get(&resource)
            .cloned()
            .unwrap_or_else(|| default_router(resource))
    }
}

fn default_router(resource: Resource) -> Router {
    match resource {
        Resource::Metrics => metrics::router(),
        other => placeholder_router(other),
    }
}

fn placeholder_router(resource: Resource) -> Router {
    let unavailable = move |shard: Option<ShardParam>| async move {
        ServerError::ResourceUnavailable {
            resource,
            shard: shard.map(|ShardParam(id)| id),
        }
    };

    Router::new()
        .route("/", any(unavailable))
        .route("/{*rest}", any(unavailable))
}
