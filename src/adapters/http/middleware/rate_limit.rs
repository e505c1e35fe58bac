//! Rate limiting middleware for axum.
//!
//! Provides a per-IP throttle for abuse-prone routes (account lookup, OTP
//! dispatch, payment session creation), client IP extraction, and the
//! shared 429 response used everywhere a quota is exceeded.
//!
//! # Example
//!
//! ```ignore
//! use axum::{middleware, routing::post, Router};
//!
//! let throttle = ThrottleState::new(limiter.clone(), scopes::AUTH_CHECK, config.auth_check);
//!
//! let app = Router::new()
//!     .route("/api/auth/check", post(check_handler))
//!     .layer(middleware::from_fn_with_state(throttle, throttle_by_ip));
//! ```
//!
//! Handlers that also throttle on a request field (a phone number) call
//! [`enforce`] with the extra quotas after parsing the body.
//!
//! The payguard binary mounts only the payment endpoints, which throttle
//! inside the reconciler and reuse [`client_ip`] and
//! [`rate_limit_response`]. [`throttle_by_ip`] is exported for the
//! platform's other routes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::payment::UNKNOWN_CLIENT;
use crate::ports::{Quota, RateDecision, RateLimitKey, RateLimiter, RateRule};

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    /// Maximum requests allowed in the window.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Requests remaining in the current window.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
}

/// State for [`throttle_by_ip`]: which limiter, under which scope and rule.
#[derive(Clone)]
pub struct ThrottleState {
    limiter: Arc<dyn RateLimiter>,
    scope: &'static str,
    rule: RateRule,
}

impl ThrottleState {
    pub fn new(limiter: Arc<dyn RateLimiter>, scope: &'static str, rule: RateRule) -> Self {
        Self {
            limiter,
            scope,
            rule,
        }
    }
}

/// Middleware that admits at most the configured rule per client IP.
///
/// Adds `X-RateLimit-Limit` and `X-RateLimit-Remaining` to admitted
/// responses and short-circuits with 429 otherwise.
pub async fn throttle_by_ip(
    State(state): State<ThrottleState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(request.headers(), connect_info.as_ref());
    let key = RateLimitKey::new(state.scope, ip);

    let decision = state.limiter.check(&key, &state.rule);
    if !decision.allowed {
        tracing::warn!(key = %key, retry_after_ms = decision.retry_after_ms, "request throttled");
        return rate_limit_response(&decision);
    }

    let mut response = next.run(request).await;

    let status = state.limiter.status(&key, &state.rule);
    let headers = response.headers_mut();
    headers.insert(
        headers::X_RATELIMIT_LIMIT.clone(),
        HeaderValue::from(status.limit),
    );
    headers.insert(
        headers::X_RATELIMIT_REMAINING.clone(),
        HeaderValue::from(status.remaining),
    );
    response
}

/// Extract client IP from request headers, then the socket.
///
/// Order of precedence:
/// 1. X-Forwarded-For header (first IP in list)
/// 2. X-Real-IP header
/// 3. ConnectInfo socket address
///
/// Falls back to `"unknown"`, so callers without an address share a bucket.
pub fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    connect_info
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Create a 429 Too Many Requests response.
///
/// `Retry-After` is the delay rounded up to whole seconds, at least 1.
pub fn rate_limit_response(decision: &RateDecision) -> Response {
    let retry_after_secs = decision.retry_after_secs();
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": "Rate limit exceeded",
            "code": "RATE_LIMIT_EXCEEDED",
            "retry_after_secs": retry_after_secs
        })),
    )
        .into_response();

    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}

/// Rejection returned by handlers that check extra quotas themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRejection(pub RateDecision);

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        rate_limit_response(&self.0)
    }
}

/// Checks `quotas` in order and rejects on the first one exceeded.
pub fn enforce(limiter: &dyn RateLimiter, quotas: &[Quota]) -> Result<(), RateLimitRejection> {
    let decision = limiter.check_all(quotas);
    if decision.allowed {
        Ok(())
    } else {
        Err(RateLimitRejection(decision))
    }
}
