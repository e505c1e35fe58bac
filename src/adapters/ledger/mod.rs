//! Payment ledger adapters.
//!
//! - `InMemoryPaymentLedger` - Mutex-guarded map, atomic by construction

mod in_memory;

pub use in_memory::InMemoryPaymentLedger;
