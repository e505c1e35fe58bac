//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Admission Control
//!
//! - `RateLimiter` - Sliding-window + minimum-interval throttling
//!
//! ## Payment Ports
//!
//! - `PaymentLedger` - Payment records with atomic conditional upsert
//! - `CallbackVerifier` - Provider re-validation of redirect callbacks
//! - `EntitlementService` - Subscription update for completed payments
//! - `EntitlementOutbox` - Deferred entitlement delivery

mod callback_verifier;
mod entitlement;
mod payment_ledger;
mod rate_limiter;

pub use callback_verifier::{CallbackVerifier, VerifierError};
pub use entitlement::{
    EntitlementError, EntitlementGrant, EntitlementOutbox, EntitlementService, OutboxEntry,
    OutboxEntryStatus, DEFAULT_GRANT_MONTHS,
};
pub use payment_ledger::{LedgerError, PaymentLedger};
pub use rate_limiter::{
    Quota, RateDecision, RateLimitKey, RateLimitStatus, RateLimiter, RateRule, RateRuleError,
};
