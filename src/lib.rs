//! Payguard - Rate limiting and idempotent reconciliation of payment
//! provider notifications.
//!
//! Webhooks and redirect callbacks from the payment provider are
//! authenticated, deduplicated and folded into a payment ledger; the first
//! transition into a completed payment grants the payer's entitlement.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
