//! HTTP middleware for axum.
//!
//! This module contains middleware layers for cross-cutting concerns:
//!
//! - `rate_limit` - Per-IP throttling and the shared 429 response

pub mod rate_limit;

pub use rate_limit::{
    client_ip, enforce, rate_limit_response, throttle_by_ip, RateLimitRejection, ThrottleState,
};
