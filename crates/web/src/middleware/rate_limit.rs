//! Per-IP rate limiting using governor and `tower_governor`.
//!
//! - `auth_rate_limiter`: sign-in endpoints (~10/min)
//! - `api_rate_limiter`: JSON API (~100/min)
//!
//! Webhooks are not limited; they are authenticated by signature or token.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Proxy headers carrying the client IP, most trusted first.
const CLIENT_IP_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "fly-client-ip",
    "x-real-ip",
    "x-forwarded-for",
];

/// Key extractor that prefers proxy headers (Cloudflare, Fly.io) and falls
/// back to the socket address.
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();
        CLIENT_IP_HEADERS
            .iter()
            .find_map(|name| {
                headers
                    .get(*name)
                    .and_then(|v| v.to_str().ok())
                    // X-Forwarded-For is a chain; the client is first.
                    .and_then(|s| s.split(',').next())
                    .and_then(|s| s.trim().parse::<IpAddr>().ok())
            })
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Build a limiter that replenishes one token every `period_secs` with `burst` capacity.
///
/// # Panics
///
/// Panics if `period_secs` or `burst` is zero; callers pass constants.
fn limiter(period_secs: u64, burst: u32) -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(period_secs)
        .burst_size(burst)
        .finish()
        .expect("rate limiter period and burst are non-zero constants");
    GovernorLayer::new(Arc::new(config))
}

/// Sign-in endpoints: one request every 6 seconds, burst of 5.
#[must_use]
pub fn auth_rate_limiter() -> RateLimiterLayer {
    limiter(6, 5)
}

/// JSON API: one request per second, burst of 50.
#[must_use]
pub fn api_rate_limiter() -> RateLimiterLayer {
    limiter(1, 50)
}
