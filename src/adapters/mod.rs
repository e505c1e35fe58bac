//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `rate_limiter` - In-process sliding-log limiter and entry-point presets
//! - `ledger` - Payment record store
//! - `entitlement` - Entitlement service, outbox and retry worker
//! - `provider` - Callback re-validation against the provider's order API
//! - `http` - Axum routes and middleware

pub mod entitlement;
pub mod http;
pub mod ledger;
pub mod provider;
pub mod rate_limiter;

pub use entitlement::{
    EntitlementRetrier, InMemoryEntitlementOutbox, InMemoryEntitlementService, RetrierConfig,
};
pub use ledger::InMemoryPaymentLedger;
pub use provider::{HttpCallbackVerifier, ProviderApiConfig, StaticCallbackVerifier};
pub use rate_limiter::{InMemoryRateLimiter, RateLimitConfig};
