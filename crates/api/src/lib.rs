// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Explorer API Gateway Implementation
//!
//! This crate provides the HTTP gateway in front of a sharded blockchain
//! explorer API, built with Axum. It applies request policies, authenticates
//! callers and composes resource routers into a versioned, shard-aware
//! routing tree.
//!
//! # Module Structure
//!
//! - [`config`]: Gateway configuration and environment management with hierarchical loading
//! - [`error`]: Error types and HTTP response handling with proper status codes
//! - [`middleware`]: Rate limiting, API key gates, JSON body parsing and header hygiene
//! - [`routes`]: Routing topology and the resource router registry
//! - [`extractors`]: Parsed JSON body and shard parameter extractors for resource routers
//! - [`transport`]: Response finalizer applied at resource mount points
//! - [`metrics`]: Prometheus metrics and exposition handler
//! - [`server`]: Policy stack, REST listener lifecycle and coordinated shutdown
//!
//! # Key Features
//!
//! - **Shard-Aware Routing**: Per-shard resources under `/v0/shard/{shardID}`
//! - **Authentication Gates**: Separate API key and admin key guards
//! - **Rate Limiting**: Fixed-window, per-client-IP limiting with `RateLimit-*` headers
//! - **Graceful Shutdown**: Idempotent close with a bounded drain period

pub mod config;
pub mod error;
pub mod extractors;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod transport;

pub use config::{Environment, FeatureFlags, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use extractors::{JsonBody, ShardParam};
pub use routes::{ResourceRouters, RouteEntry, RouteGuard, route_table};
pub use server::{LifecycleState, Server, ShutdownConfig, ShutdownHandle};
pub use shared_types::{Resource, ResourceScope, ShardId};
