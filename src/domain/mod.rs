//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (timestamps, state machines, errors)
//! - `payment` - Payment event authentication, classification and reconciliation

pub mod foundation;
pub mod payment;
