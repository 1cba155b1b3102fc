// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server implementation module
//!
//! This module provides the main server struct for the explorer API gateway,
//! including the policy stack in front of the routing tree, the REST listener
//! lifecycle and coordinated graceful shutdown using `CancellationToken`.

use std::{
    fmt,
    net::SocketAddr,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use axum::{Router, http::HeaderName, middleware};
use hyper::Request;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info, info_span, warn};

use crate::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    middleware::{
        BodyLimit, RateLimiter, json_body_middleware, rate_limiting_middleware,
        strip_server_identity,
    },
    routes::{ResourceRouters, create_routes, route_table},
};

// Server constants
const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;

/// Configuration for server shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time to wait for in-flight requests after close
    pub graceful_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS),
        }
    }
}

/// State of a started REST listener, reported by [`ShutdownHandle::state`]
///
/// An unstarted server is a [`Server`]; [`Server::start`] consumes it and
/// returns the handle, or `None` when REST is disabled and nothing is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Accepting connections
    Listening,
    /// Stopped accepting connections
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening => write!(f, "listening"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Main server struct
#[derive(Debug)]
pub struct Server {
    /// Server configuration
    config: ServerConfig,
    /// Application router with every policy applied
    router: Router,
    /// Configuration for coordinated shutdown
    graceful_shutdown_config: ShutdownConfig,
}

impl Server {
    /// Create new server instance with every resource slot defaulted
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the configuration is invalid.
    pub fn new(config: ServerConfig, shutdown_config: ShutdownConfig) -> ServerResult<Self> {
        Self::with_resource_routers(config, shutdown_config, &ResourceRouters::new())
    }

    /// Create server mounting the supplied resource routers
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the configuration is invalid.
    pub fn with_resource_routers(
        config: ServerConfig,
        graceful_shutdown_config: ShutdownConfig,
        resources: &ResourceRouters,
    ) -> ServerResult<Self> {
        if config.rest.body_limit_bytes == 0 {
            return Err(ServerError::Config {
                message: "rest.body_limit_bytes must be greater than zero".to_string(),
            });
        }

        let router = Self::create_router(&config, resources);

        Ok(Self {
            config,
            router,
            graceful_shutdown_config,
        })
    }

    /// Create application router with middleware
    fn create_router(config: &ServerConfig, resources: &ResourceRouters) -> Router {
        for entry in route_table(config.feature_flags()) {
            debug!(
                path = %entry.path,
                guard = %entry.guard,
                finalized = entry.finalized,
                "mounting {}", entry.resource
            );
        }

        let mut router = create_routes(config, resources).layer(middleware::from_fn_with_state(
            BodyLimit(config.rest.body_limit_bytes),
            json_body_middleware,
        ));

        if let Some(rate_limiter) = RateLimiter::from_config(&config.rate_limiter) {
            info!(
                window_ms = rate_limiter.window().as_millis(),
                max = rate_limiter.max_requests(),
                "init REST API rate limiter"
            );
            router = router.layer(middleware::from_fn_with_state(
                rate_limiter,
                rate_limiting_middleware,
            ));
        } else {
            info!("REST API rate limiter is disabled [SERVER_RATE_LIMITER__ENABLED]");
        }

        let policies = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                    if let Some(request_id) = req.headers().get(REQUEST_ID_HEADER) {
                        info_span!("http_request", ?request_id)
                    } else {
                        error!("failed to extract id from request");
                        info_span!("http_request", request_id = "unknown")
                    }
                }),
            )
            .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
            .layer(CorsLayer::permissive())
            .layer(CompressionLayer::new());

        router
            .layer(middleware::map_response(strip_server_identity))
            .layer(policies)
    }

    /// Bind the REST listener and start serving in the background
    ///
    /// Returns `None` without binding anything when REST is disabled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address,
    /// or `ServerError::Startup` if the bound address cannot be read.
    pub async fn start(self) -> ServerResult<Option<ShutdownHandle>> {
        if !self.config.rest.enabled {
            info!("REST API is disabled [SERVER_REST__ENABLED]");
            return Ok(None);
        }

        info!("REST API starting...");
        let addr = self.config.socket_addr();
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                error!(
                    address = %addr,
                    port = addr.port(),
                    error = %source,
                    "error when starting up REST API"
                );
                return Err(ServerError::Bind {
                    address: addr,
                    source,
                });
            }
        };

        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        let cancellation_token = CancellationToken::new();
        let shutdown = cancellation_token.clone();
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown.cancelled().await;
                    info!("REST API stopped accepting connections");
                })
                .await
        });

        info!(
            address = %local_addr,
            environment = %self.config.environment,
            "REST API listening at http://{local_addr}",
        );

        Ok(Some(ShutdownHandle {
            local_addr,
            cancellation_token,
            closed: AtomicBool::new(false),
            task,
            graceful_timeout: self.graceful_shutdown_config.graceful_timeout,
        }))
    }

    /// Run the server until SIGINT or SIGTERM, then shut down gracefully
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address,
    /// or the error of [`ShutdownHandle::wait`].
    pub async fn run(self) -> ServerResult<()> {
        let Some(handle) = self.start().await? else {
            return Ok(());
        };

        let shutdown_token = handle.cancellation_token();
        tokio::spawn(async move {
            info!("spawning the graceful shutdown task");
            Self::shutdown_signal_handler(shutdown_token).await;
        });

        handle.wait().await
    }

    /// Wait for SIGINT or SIGTERM (CTRL+C off unix)
    async fn shutdown_signal() -> ServerResult<&'static str> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let register = |kind: SignalKind, name: &str| {
                signal(kind).map_err(|e| ServerError::Signal {
                    message: format!("failed to register {name} handler: {e}"),
                })
            };
            let mut sigterm = register(SignalKind::terminate(), "SIGTERM")?;
            let mut sigint = register(SignalKind::interrupt(), "SIGINT")?;

            tokio::select! {
                _ = sigterm.recv() => Ok("SIGTERM"),
                _ = sigint.recv() => Ok("SIGINT"),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c()
                .await
                .map_err(|e| ServerError::Signal {
                    message: format!("failed to install CTRL+C handler: {e}"),
                })?;
            Ok("CTRL+C")
        }
    }

    /// Handle shutdown signals and trigger coordinated cancellation
    ///
    /// # Arguments
    ///
    /// * `cancellation_token` - Token to cancel when shutdown signal is received
    async fn shutdown_signal_handler(cancellation_token: CancellationToken) {
        tokio::select! {
            signal = Self::shutdown_signal() => match signal {
                Ok(signal_name) => {
                    warn!("Shutdown signal {} received, closing REST API...", signal_name);
                    cancellation_token.cancel();
                }
                Err(e) => error!(error = %e, "shutdown signals unavailable"),
            },
            () = cancellation_token.cancelled() => {
                debug!("REST API already closed, shutdown signal handler exiting");
            }
        }
    }

    /// Application router, for serving without a listener
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Handle to a listening REST server
///
/// Dropping the handle leaves the server running; close it first.
#[derive(Debug)]
pub struct ShutdownHandle {
    local_addr: SocketAddr,
    cancellation_token: CancellationToken,
    closed: AtomicBool,
    task: JoinHandle<std::io::Result<()>>,
    graceful_timeout: Duration,
}

impl ShutdownHandle {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        if self.cancellation_token.is_cancelled() {
            LifecycleState::Closed
        } else {
            LifecycleState::Listening
        }
    }

    /// Token that closes the server when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Stop accepting connections; in-flight requests are allowed to finish
    ///
    /// Returns `false` when the server was already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) || self.cancellation_token.is_cancelled() {
            debug!("REST API already closed");
            return false;
        }

        info!(address = %self.local_addr, "closing REST API");
        self.cancellation_token.cancel();
        true
    }

    /// Wait until the server is closed and in-flight requests have finished
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Timeout` if requests are still running after the
    /// graceful timeout, `ServerError::Shutdown` if serving failed and
    /// `ServerError::TaskJoin` if the serving task panicked.
    pub async fn wait(self) -> ServerResult<()> {
        self.cancellation_token.cancelled().await;

        let mut task = self.task;
        match tokio::time::timeout(self.graceful_timeout, &mut task).await {
            Ok(joined) => joined?.map_err(|source| {
                error!(error = ?source, "Server error during shutdown");
                ServerError::Shutdown { source }
            }),
            Err(_) => {
                warn!(
                    timeout_seconds = self.graceful_timeout.as_secs(),
                    "graceful shutdown timed out, aborting in-flight requests"
                );
                task.abort();
                Err(ServerError::Timeout {
                    timeout_seconds: self.graceful_timeout.as_secs(),
                })
            }
        }
    }
}
