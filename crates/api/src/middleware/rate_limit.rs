// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Fixed-window rate limiting keyed by client IP
//!
//! Each client gets a counter that starts a window on its first request. Requests
//! beyond `max` inside the window are rejected with 429 until the window elapses.
//! Every response that passes through the limiter carries the standard
//! `RateLimit-*` headers; legacy `X-RateLimit-*` headers are never emitted.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{config::RateLimiterConfig, error::ServerError, metrics};

const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;

/// `RateLimit-Policy` response header
pub const RATE_LIMIT_POLICY: HeaderName = HeaderName::from_static("ratelimit-policy");
/// `RateLimit-Limit` response header
pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
/// `RateLimit-Remaining` response header
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
/// `RateLimit-Reset` response header
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Rate limiting middleware state
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    // per-client counters; each update holds the bucket's shard lock
    requests: Arc<DashMap<IpAddr, RequestCounter>>,
}

#[derive(Debug, Clone, Copy)]
struct RequestCounter {
    count: u32,
    window_start: Instant,
}

/// Outcome of counting one request against its client's window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests allowed per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Time until the current window resets
    pub reset_after: Duration,
    window: Duration,
}

impl RateLimitDecision {
    /// Seconds until reset, rounded up
    pub fn reset_seconds(&self) -> u64 {
        ceil_seconds(self.reset_after)
    }

    /// Write the `RateLimit-*` headers for this decision
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        let policy = format!("{};w={}", self.limit, ceil_seconds(self.window));
        if let Ok(policy) = HeaderValue::from_str(&policy) {
            headers.insert(RATE_LIMIT_POLICY, policy);
        }
        headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(RATE_LIMIT_RESET, HeaderValue::from(self.reset_seconds()));
    }
}

fn ceil_seconds(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

impl RateLimiter {
    /// Create a new rate limiter with the given window and per-window allowance
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            requests: Arc::new(DashMap::new()),
        }
    }

    /// Build the limiter when the configuration enables it
    pub fn from_config(config: &RateLimiterConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.window_ms.value(), config.max.get()))
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Requests allowed per window
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Count a request from `client` and decide whether it may proceed
    pub fn check(&self, client: IpAddr) -> RateLimitDecision {
        let now = Instant::now();

        if self.requests.len() > MAX_RATE_LIMIT_ENTRIES {
            self.cleanup_expired_entries(now);
        }

        let counter = *self
            .requests
            .entry(client)
            .and_modify(|counter| {
                if now.duration_since(counter.window_start) >= self.window {
                    counter.count = 1;
                    counter.window_start = now;
                } else {
                    counter.count = counter.count.saturating_add(1);
                }
            })
            .or_insert(RequestCounter {
                count: 1,
                window_start: now,
            });

        let elapsed = now.duration_since(counter.window_start);
        let allowed = counter.count <= self.max_requests;
        if !allowed {
            debug!(%client, count = counter.count, "rate limiting client");
        }

        RateLimitDecision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(counter.count),
            reset_after: self.window.saturating_sub(elapsed),
            window: self.window,
        }
    }

    /// Clean up expired entries using efficient retain operation
    fn cleanup_expired_entries(&self, now: Instant) {
        let entries_before = self.requests.len();

        self.requests
            .retain(|_, counter| now.duration_since(counter.window_start) < self.window);

        let entries_after = self.requests.len();
        let cleaned_up = entries_before.saturating_sub(entries_after);

        if cleaned_up > 0 {
            debug!("cleaned up {} expired rate limiter entries", cleaned_up);
        }

        // every window is still live, drop the oldest half
        if entries_after > MAX_RATE_LIMIT_ENTRIES {
            warn!(
                "rate limiter still has {} entries after cleanup, removing oldest",
                entries_after
            );

            let mut oldest_entries: Vec<_> = self
                .requests
                .iter()
                .map(|entry| (*entry.key(), entry.value().window_start))
                .collect();

            oldest_entries.sort_by_key(|(_, window_start)| *window_start);

            let entries_to_remove = entries_after - MAX_RATE_LIMIT_ENTRIES / 2;
            for (ip, _) in oldest_entries.into_iter().take(entries_to_remove) {
                self.requests.remove(&ip);
            }
        }
    }
}

/// Client identity used as the rate limit key
///
/// Requests served without connection info (in-process tests) share the
/// unspecified address.
pub fn client_ip(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(addr)| {
            addr.ip()
        })
}

/// Rate limiting middleware function
pub async fn rate_limiting_middleware(
    State(rate_limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_ip(&req);
    let decision = rate_limiter.check(client);

    if !decision.allowed {
        warn!(%client, limit = decision.limit, "rate limit exceeded");
        metrics::record_rate_limited();

        let mut response = ServerError::RateLimited {
            retry_after_seconds: decision.reset_seconds(),
        }
        .into_response();
        decision.apply_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(req).await;
    decision.apply_headers(response.headers_mut());
    response
}
