//! PaymentLedger port - Durable store for payment records.
//!
//! The ledger is a narrow key/record interface keyed by merchant reference.
//! Its one write operation is an atomic conditional update: adapters must
//! read the current record, run [`fold`], and persist the result as one
//! indivisible step (a lock, a transaction or a compare-and-swap). A plain
//! read-then-write would let two concurrent deliveries of the same event
//! both see a pending record and both trigger the entitlement.
//!
//! [`fold`]: crate::domain::payment::fold

use async_trait::async_trait;

use crate::domain::payment::{MerchantReference, PaymentMutation, PaymentRecord, UpsertOutcome};

/// Port for reading and atomically updating payment records.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Fetch the record for a merchant reference, if any.
    async fn get_by_key(
        &self,
        merchant_reference_id: &MerchantReference,
    ) -> Result<Option<PaymentRecord>, LedgerError>;

    /// Fold `mutation` into the record for `merchant_reference_id` atomically.
    ///
    /// The fingerprint check runs inside the atomic section, so of two
    /// concurrent callers with the same fingerprint exactly one sees a write
    /// and the other sees `Transition::AlreadyApplied`.
    async fn upsert_if_new(
        &self,
        merchant_reference_id: &MerchantReference,
        mutation: &PaymentMutation,
    ) -> Result<UpsertOutcome, LedgerError>;
}

/// Errors raised by ledger adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Store could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// Concurrent writer won a compare-and-swap; the caller may retry.
    #[error("ledger write conflict on {0}")]
    Conflict(String),
}
