//! Rate limiting port for abuse-prone public endpoints.
//!
//! Admission control uses a sliding window plus a minimum spacing between
//! admissions. Checks are in-memory and never block on I/O, so the trait is
//! synchronous and safe to call inline from handlers.
//!
//! Quotas are per process. Behind a load balancer each instance enforces
//! its own budget; a shared counter store would be a second adapter for
//! this port.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Port for rate limiting operations.
pub trait RateLimiter: Send + Sync {
    /// Check whether an attempt on `key` is admitted under `rule`.
    ///
    /// Admitted attempts consume quota. Rejected attempts do not, but they
    /// still count as the most recent attempt for minimum-interval spacing.
    fn check(&self, key: &RateLimitKey, rule: &RateRule) -> RateDecision;

    /// Current quota for `key` without recording an attempt.
    fn status(&self, key: &RateLimitKey, rule: &RateRule) -> RateLimitStatus;

    /// Forget all history for `key` (admin operation).
    fn reset(&self, key: &RateLimitKey);

    /// Checks several quotas derived from one request, in order.
    ///
    /// Stops at the first rejection and returns it. Quotas checked before the
    /// rejection keep their admission.
    fn check_all(&self, quotas: &[Quota]) -> RateDecision {
        for quota in quotas {
            let decision = self.check(&quota.key, &quota.rule);
            if !decision.allowed {
                tracing::debug!(key = %quota.key, retry_after_ms = decision.retry_after_ms, "quota exceeded");
                return decision;
            }
        }
        RateDecision::allow()
    }
}

/// Composite admission key, rendered as `<scope>:<identifier>`.
///
/// The identifier is whatever the call site throttles on: a client IP, a
/// phone number or a merchant reference.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct RateLimitKey {
    pub scope: String,
    pub identifier: String,
}

impl RateLimitKey {
    pub fn new(scope: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.identifier)
    }
}

/// Limits applied to one key.
///
/// At most `max` admissions in any rolling `window_ms` interval, and no two
/// admissions closer than `min_interval_ms` (0 disables spacing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRateRule")]
pub struct RateRule {
    window_ms: u64,
    max: u32,
    min_interval_ms: u64,
}

impl RateRule {
    /// Creates a rule, rejecting a zero window or a zero maximum.
    pub fn new(window_ms: u64, max: u32, min_interval_ms: u64) -> Result<Self, RateRuleError> {
        if window_ms == 0 {
            return Err(RateRuleError::ZeroWindow);
        }
        if max == 0 {
            return Err(RateRuleError::ZeroMax);
        }
        Ok(Self {
            window_ms,
            max,
            min_interval_ms,
        })
    }

    /// `max` admissions per minute. A zero `max` is raised to 1.
    pub const fn per_minute(max: u32) -> Self {
        Self {
            window_ms: 60_000,
            max: if max == 0 { 1 } else { max },
            min_interval_ms: 0,
        }
    }

    /// Returns a copy with the given minimum spacing.
    pub const fn with_min_interval(mut self, min_interval_ms: u64) -> Self {
        self.min_interval_ms = min_interval_ms;
        self
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn min_interval_ms(&self) -> u64 {
        self.min_interval_ms
    }
}

#[derive(Deserialize)]
struct RawRateRule {
    window_ms: u64,
    max: u32,
    #[serde(default)]
    min_interval_ms: u64,
}

impl TryFrom<RawRateRule> for RateRule {
    type Error = RateRuleError;

    fn try_from(raw: RawRateRule) -> Result<Self, Self::Error> {
        RateRule::new(raw.window_ms, raw.max, raw.min_interval_ms)
    }
}

/// One key checked under one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    pub key: RateLimitKey,
    pub rule: RateRule,
}

impl Quota {
    pub fn new(key: RateLimitKey, rule: RateRule) -> Self {
        Self { key, rule }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Zero when allowed.
    pub retry_after_ms: u64,
}

impl RateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_ms: 0,
        }
    }

    pub fn deny(retry_after_ms: u64) -> Self {
        Self {
            allowed: false,
            retry_after_ms,
        }
    }

    /// Whole seconds for a `Retry-After` header, rounded up, at least 1.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after_ms.div_ceil(1000).max(1)
    }
}

/// Read-only view of a key's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Milliseconds until the next attempt could be admitted.
    pub retry_after_ms: u64,
}

/// Invalid rate rule parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateRuleError {
    #[error("rate rule window must be greater than zero")]
    ZeroWindow,

    #[error("rate rule max must be at least 1")]
    ZeroMax,
}
