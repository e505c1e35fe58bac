//! The durable payment record and the pure fold that updates it.
//!
//! Ledger adapters run [`fold`] inside their atomic section. Keeping the
//! transition rules here means every adapter applies them the same way and
//! the rules are testable without a store.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::fingerprint::EventFingerprint;
use super::reference::MerchantReference;
use super::status::PaymentStatus;
use crate::domain::foundation::{StateMachine, Timestamp};

/// One payment, keyed by merchant reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub external_id: String,
    pub merchant_reference_id: MerchantReference,
    pub payer_id: Option<String>,
    pub status: PaymentStatus,
    pub amount: Option<String>,
    pub currency: Option<String>,

    /// Every notification already folded into this record. Only grows.
    pub applied_event_fingerprints: BTreeSet<EventFingerprint>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PaymentRecord {
    pub fn has_applied(&self, fingerprint: &EventFingerprint) -> bool {
        self.applied_event_fingerprints.contains(fingerprint)
    }
}

/// A classified notification, ready to be folded into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMutation {
    pub merchant_reference_id: MerchantReference,
    pub external_id: String,
    pub status: PaymentStatus,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub fingerprint: EventFingerprint,
    pub at: Timestamp,
}

/// What an upsert did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No record existed; one was created with the mutation's status.
    Created,

    /// A pending record moved to a final status.
    Advanced { from: PaymentStatus },

    /// Status unchanged; the fingerprint was recorded.
    Recorded,

    /// The fingerprint was already present. Nothing was written.
    AlreadyApplied,
}

/// Result of an atomic upsert: the record as stored and the transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub record: PaymentRecord,
    pub transition: Transition,
}

impl UpsertOutcome {
    /// True when this write moved the payment into `Completed` for the first
    /// time. Exactly one write per record can observe this.
    pub fn entered_completed(&self) -> bool {
        if self.record.status != PaymentStatus::Completed {
            return false;
        }
        matches!(
            self.transition,
            Transition::Created | Transition::Advanced { .. }
        )
    }

    /// True when the store must persist `record`.
    pub fn is_write(&self) -> bool {
        self.transition != Transition::AlreadyApplied
    }
}

/// Folds `mutation` into the current record.
///
/// - no record: create it with the mutation's status;
/// - fingerprint already applied: no-op;
/// - pending record and a final status: advance;
/// - anything else: keep the status, record the fingerprint.
pub fn fold(current: Option<PaymentRecord>, mutation: &PaymentMutation) -> UpsertOutcome {
    let Some(mut record) = current else {
        return UpsertOutcome {
            record: new_record(mutation),
            transition: Transition::Created,
        };
    };

    if record.has_applied(&mutation.fingerprint) {
        return UpsertOutcome {
            record,
            transition: Transition::AlreadyApplied,
        };
    }

    let transition = match record.status.transition_to(mutation.status) {
        Ok(next) => {
            let from = record.status;
            record.status = next;
            Transition::Advanced { from }
        }
        Err(_) => Transition::Recorded,
    };

    if record.amount.is_none() {
        record.amount = mutation.amount.clone();
    }
    if record.currency.is_none() {
        record.currency = mutation.currency.clone();
    }
    record
        .applied_event_fingerprints
        .insert(mutation.fingerprint.clone());
    record.updated_at = mutation.at;

    UpsertOutcome { record, transition }
}

fn new_record(mutation: &PaymentMutation) -> PaymentRecord {
    PaymentRecord {
        external_id: mutation.external_id.clone(),
        merchant_reference_id: mutation.merchant_reference_id.clone(),
        payer_id: mutation
            .merchant_reference_id
            .payer_id()
            .map(str::to_string),
        status: mutation.status,
        amount: mutation.amount.clone(),
        currency: mutation.currency.clone(),
        applied_event_fingerprints: BTreeSet::from([mutation.fingerprint.clone()]),
        created_at: mutation.at,
        updated_at: mutation.at,
    }
}
