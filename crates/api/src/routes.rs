// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Routes module
//!
//! Composes the resource routers into the gateway's routing tree:
//!
//! - `/v0/shard/{shardID}/<resource>` for every sharded resource plus the
//!   shard-independent ones, finalized at the shard mount
//! - `/v0/<resource>` for the shard-independent resources (`signature`,
//!   `price`, `metrics` and, when enabled, `rpc`)
//! - `/metrics`, `/api` and `/admin` at the top level
//!
//! `/v0` sits behind the API key gate and `/admin` behind the admin key gate.

pub mod resources;

use std::fmt;

use axum::{Router, middleware, routing::get};
use shared_types::{Resource, ResourceScope};
use tracing::debug;

pub use resources::ResourceRouters;

use crate::{
    config::{FeatureFlags, ServerConfig},
    metrics::metrics_handler,
    middleware::{
        AdminApiKeys, ApiKeySet, ApiKeys, auth::warn_if_unconfigured, verify_admin_api_key,
        verify_api_key,
    },
    transport::finalize,
};

/// Name of the path parameter bound by the shard mount
pub const SHARD_PARAM: &str = "shardID";
/// Prefix of the versioned API
pub const API_PREFIX: &str = "/v0";
/// Shard mount, relative to [`API_PREFIX`]
pub const SHARD_MOUNT: &str = "/shard/{shardID}";
/// Top-level metrics exposition
pub const METRICS_PATH: &str = "/metrics";

/// Authentication required to reach a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGuard {
    /// No credentials
    Open,
    /// `/v0` API key
    ApiKey,
    /// `/admin` API key
    AdminApiKey,
}

impl fmt::Display for RouteGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::ApiKey => write!(f, "api key"),
            Self::AdminApiKey => write!(f, "admin api key"),
        }
    }
}

/// One mount point of the routing tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Full mount path, with `{shardID}` where a shard is bound
    pub path: String,
    /// Resource served at the mount
    pub resource: Resource,
    /// Gate in front of the mount
    pub guard: RouteGuard,
    /// Whether a transport finalizer wraps the mount
    pub finalized: bool,
}

/// Wrap a router with the transport finalizer
fn finalized(router: Router) -> Router {
    router.layer(middleware::from_fn(finalize))
}

/// Router for `resource`, finalized at its mount point when required
fn mounted(resources: &ResourceRouters, resource: Resource) -> Router {
    let router = resources.router(resource);
    if resource.finalized_at_mount() {
        finalized(router)
    } else {
        router
    }
}

fn shard_independent_resources(flags: FeatureFlags) -> impl Iterator<Item = Resource> {
    Resource::in_scope(ResourceScope::ShardIndependent)
        .filter(move |resource| *resource != Resource::Rpc || flags.json_rpc_enabled)
}

/// Resource routers that vary by shard
pub fn unsharded_routes(resources: &ResourceRouters) -> Router {
    Resource::in_scope(ResourceScope::Sharded).fold(Router::new(), |router, resource| {
        router.nest(resource.mount_path(), mounted(resources, resource))
    })
}

/// Resource routers that ignore the shard segment
pub fn shard_independent_routes(resources: &ResourceRouters, flags: FeatureFlags) -> Router {
    if !flags.json_rpc_enabled {
        debug!("JSON-RPC is disabled, /rpc is not mounted");
    }

    shard_independent_resources(flags).fold(Router::new(), |router, resource| {
        router.nest(resource.mount_path(), mounted(resources, resource))
    })
}

/// Everything served under [`API_PREFIX`]
pub fn sharded_routes(resources: &ResourceRouters, flags: FeatureFlags) -> Router {
    let shard_independent = shard_independent_routes(resources, flags);
    let per_shard = unsharded_routes(resources).merge(shard_independent.clone());

    Router::new()
        .nest(SHARD_MOUNT, finalized(per_shard))
        .merge(shard_independent)
}

/// Create the gateway's routing tree with its authentication gates
pub fn create_routes(config: &ServerConfig, resources: &ResourceRouters) -> Router {
    let flags = config.feature_flags();
    let api_keys = ApiKeys(ApiKeySet::new(&config.auth.api_keys));
    let admin_keys = AdminApiKeys(ApiKeySet::new(&config.auth.admin_api_keys));
    warn_if_unconfigured(&api_keys, &admin_keys);

    let v0 = sharded_routes(resources, flags)
        .layer(middleware::from_fn_with_state(api_keys, verify_api_key));

    let admin = finalized(resources.router(Resource::Admin)).layer(
        middleware::from_fn_with_state(admin_keys, verify_admin_api_key),
    );

    Router::new()
        .nest(API_PREFIX, v0)
        .route(METRICS_PATH, get(metrics_handler))
        .nest(Resource::Api.mount_path(), mounted(resources, Resource::Api))
        .nest(Resource::Admin.mount_path(), admin)
}

/// Every mount point [`create_routes`] produces for `flags`
pub fn route_table(flags: FeatureFlags) -> Vec<RouteEntry> {
    let shard_prefix = format!("{API_PREFIX}{SHARD_MOUNT}");
    let mut table: Vec<RouteEntry> = Resource::in_scope(ResourceScope::Sharded)
        .map(|resource| RouteEntry {
            path: format!("{shard_prefix}{}", resource.mount_path()),
            resource,
            guard: RouteGuard::ApiKey,
            finalized: true,
        })
        .collect();

    for resource in shard_independent_resources(flags) {
        for prefix in [shard_prefix.as_str(), API_PREFIX] {
            table.push(RouteEntry {
                path: format!("{prefix}{}", resource.mount_path()),
                resource,
                guard: RouteGuard::ApiKey,
                finalized: true,
            });
        }
    }

    table.extend([
        RouteEntry {
            path: METRICS_PATH.to_string(),
            resource: Resource::Metrics,
            guard: RouteGuard::Open,
            finalized: false,
        },
        RouteEntry {
            path: Resource::Api.mount_path().to_string(),
            resource: Resource::Api,
            guard: RouteGuard::Open,
            finalized: true,
        },
        RouteEntry {
            path: Resource::Admin.mount_path().to_string(),
            resource: Resource::Admin,
            guard: RouteGuard::AdminApiKey,
            finalized: true,
        },
    ]);

    table
}
