//! In-memory payment ledger for tests and single-process deployments.
//!
//! The whole map sits behind one `tokio::sync::Mutex`, which makes the
//! read-fold-write in `upsert_if_new` a single atomic step.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::payment::{
    fold, MerchantReference, PaymentMutation, PaymentRecord, UpsertOutcome,
};
use crate::ports::{LedgerError, PaymentLedger};

#[derive(Debug, Default)]
pub struct InMemoryPaymentLedger {
    records: Mutex<HashMap<MerchantReference, PaymentRecord>>,
}

impl InMemoryPaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryPaymentLedger {
    async fn get_by_key(
        &self,
        merchant_reference_id: &MerchantReference,
    ) -> Result<Option<PaymentRecord>, LedgerError> {
        Ok(self.records.lock().await.get(merchant_reference_id).cloned())
    }

    async fn upsert_if_new(
        &self,
        merchant_reference_id: &MerchantReference,
        mutation: &PaymentMutation,
    ) -> Result<UpsertOutcome, LedgerError> {
        let mut records = self.records.lock().await;
        let current = records.get(merchant_reference_id).cloned();

        let outcome = fold(current, mutation);
        if outcome.is_write() {
            records.insert(merchant_reference_id.clone(), outcome.record.clone());
        }
        Ok(outcome)
    }
}
