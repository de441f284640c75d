//! Fixed-window rate limiting keyed by client identity.
//!
//! Two independent tiers share one store: the API tier covers everything
//! under `/api`, the image tier covers `/uploads` and `/images`. A window
//! starts on the first request from a key and is reset on the first check
//! after its duration has elapsed.

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::AppConfig;

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateTier {
    Api,
    Images,
}

impl RateTier {
    /// Tier that governs `path`, if any.
    pub fn for_path(path: &str) -> Option<Self> {
        if under_prefix(path, "/api") {
            Some(RateTier::Api)
        } else if under_prefix(path, "/uploads") || under_prefix(path, "/images") {
            Some(RateTier::Images)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RateTier::Api => "api",
            RateTier::Images => "images",
        }
    }

    pub fn rejection_message(&self) -> &'static str {
        match self {
            RateTier::Api => "Too many API requests from this IP, please try again later.",
            RateTier::Images => "Too many image requests from this IP, please try again later.",
        }
    }
}

/// Segment-aware prefix match: `/api` and `/api/x` match, `/apix` does not.
pub(crate) fn under_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max: u32,
    pub window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Shared request counters. The in-process store serves a single server
/// instance; several instances need an implementation backed by a shared
/// counter service.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request from `key` against `tier` and report whether it may
    /// proceed. Rejected requests are not counted.
    async fn check_and_increment(&self, key: &str, tier: RateTier) -> RateDecision;

    async fn reset(&self);
}

struct Window {
    count: u32,
    started: Instant,
}

pub struct MemoryRateLimitStore {
    windows: DashMap<(RateTier, String), Window>,
    api: RatePolicy,
    images: RatePolicy,
}

impl MemoryRateLimitStore {
    pub fn new(api: RatePolicy, images: RatePolicy) -> Self {
        Self {
            windows: DashMap::new(),
            api,
            images,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let window = config.rate_limit_window();
        Self::new(
            RatePolicy {
                max: config.api.api_rate_limit,
                window,
            },
            RatePolicy {
                max: config.api.image_rate_limit,
                window,
            },
        )
    }

    pub fn policy(&self, tier: RateTier) -> RatePolicy {
        match tier {
            RateTier::Api => self.api,
            RateTier::Images => self.images,
        }
    }

    /// Drop windows whose duration has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|(tier, _), window| {
            now.saturating_duration_since(window.started) < self.policy(*tier).window
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked windows
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn check_and_increment(&self, key: &str, tier: RateTier) -> RateDecision {
        let policy = self.policy(tier);
        let now = Instant::now();

        // The entry guard holds the shard lock, so check and increment are atomic per key
        let mut window = self.windows.entry((tier, key.to_string())).or_insert_with(|| {
            debug!(client = %key, tier = tier.as_str(), "Opening rate limit window");
            Window { count: 0, started: now }
        });

        if now.saturating_duration_since(window.started) >= policy.window {
            window.count = 0;
            window.started = now;
        }

        let reset_after = policy
            .window
            .saturating_sub(now.saturating_duration_since(window.started));

        if window.count >= policy.max {
            return RateDecision {
                allowed: false,
                limit: policy.max,
                remaining: 0,
                reset_after,
            };
        }

        window.count += 1;
        RateDecision {
            allowed: true,
            limit: policy.max,
            remaining: policy.max - window.count,
            reset_after,
        }
    }

    async fn reset(&self) {
        self.windows.clear();
    }
}

/// Derive the client identity, trusting `trusted_hops` levels of
/// `X-Forwarded-For` in front of the socket peer.
pub fn client_identity(headers: &HeaderMap, peer: Option<IpAddr>, trusted_hops: usize) -> String {
    let forwarded: Vec<IpAddr> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|entry| entry.trim().parse().ok())
        .collect();

    // Nearest hop first: the socket peer, then forwarded entries right to left
    let mut chain = vec![peer];
    chain.extend(forwarded.into_iter().rev().map(Some));

    let index = trusted_hops.min(chain.len() - 1);
    chain
        .get(index)
        .copied()
        .flatten()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware state for the rate-limit stage.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    trusted_hops: usize,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, trusted_hops: usize) -> Self {
        Self { store, trusted_hops }
    }
}

pub async fn rate_limit(State(limiter): State<RateLimiter>, req: Request, next: Next) -> Response {
    let Some(tier) = RateTier::for_path(req.uri().path()) else {
        return next.run(req).await;
    };

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client = client_identity(req.headers(), peer, limiter.trusted_hops);
    let decision = limiter.store.check_and_increment(&client, tier).await;

    if !decision.allowed {
        warn!(
            client = %client,
            tier = tier.as_str(),
            retry_after_secs = decision.reset_after.as_secs(),
            "Rate limit exceeded"
        );
        return rejection(tier, &decision);
    }

    let mut response = next.run(req).await;
    insert_limit_headers(response.headers_mut(), &decision);
    response
}

fn rejection(tier: RateTier, decision: &RateDecision) -> Response {
    let mut response = (StatusCode::TOO_MANY_REQUESTS, tier.rejection_message()).into_response();
    let headers = response.headers_mut();
    insert_limit_headers(headers, decision);
    // Round up so clients never retry before the window has rotated
    let retry_after = decision.reset_after.as_secs() + u64::from(decision.reset_after.subsec_nanos() > 0);
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

fn insert_limit_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
}
