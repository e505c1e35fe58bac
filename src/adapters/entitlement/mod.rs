//! Entitlement adapters.
//!
//! - `InMemoryEntitlementService` - Records and logs applied grants
//! - `InMemoryEntitlementOutbox` - Pending grants in insertion order
//! - `EntitlementRetrier` - Background worker draining the outbox

mod in_memory;
mod retrier;

pub use in_memory::{InMemoryEntitlementOutbox, InMemoryEntitlementService};
pub use retrier::{EntitlementRetrier, RetrierConfig, RetryReport};
