//! Entitlement ports - Applying the business effect of a completed payment.
//!
//! A completed payment unlocks a subscription for the paying entity. The
//! [`EntitlementService`] performs that update; the [`EntitlementOutbox`]
//! holds grants whose first attempt failed so a background worker can
//! retry them after the payment record is already durable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::Timestamp;
use crate::domain::payment::{MerchantReference, PaymentRecord};

/// Subscription period granted by a completed payment.
pub const DEFAULT_GRANT_MONTHS: u32 = 3;

/// The entitlement owed for one completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementGrant {
    pub merchant_reference_id: MerchantReference,
    pub external_id: String,
    /// Paying entity; `None` when the reference does not name one.
    pub payer_id: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub months: u32,
    pub granted_at: Timestamp,
}

impl EntitlementGrant {
    /// Builds the grant for a record that just entered `Completed`.
    pub fn for_record(record: &PaymentRecord, months: u32) -> Self {
        Self {
            merchant_reference_id: record.merchant_reference_id.clone(),
            external_id: record.external_id.clone(),
            payer_id: record.payer_id.clone(),
            amount: record.amount.clone(),
            currency: record.currency.clone(),
            months,
            granted_at: record.updated_at,
        }
    }
}

/// Port for applying an entitlement downstream.
///
/// Called at most once per transition into `Completed`, plus retries from
/// the outbox. Implementations should treat a repeated grant for the same
/// merchant reference as a no-op.
#[async_trait]
pub trait EntitlementService: Send + Sync {
    async fn apply_entitlement(&self, grant: &EntitlementGrant) -> Result<(), EntitlementError>;
}

/// Delivery state of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxEntryStatus {
    Pending,
    Delivered,
    /// Gave up after the maximum number of attempts.
    DeadLettered,
}

/// A grant waiting for (re)delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub grant: EntitlementGrant,
    pub status: OutboxEntryStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: Timestamp,
}

impl OutboxEntry {
    /// Creates a pending entry. `attempts` counts the inline attempt that
    /// already failed.
    pub fn new(grant: EntitlementGrant, first_error: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            grant,
            status: OutboxEntryStatus::Pending,
            attempts: 1,
            last_error: Some(first_error.into()),
            enqueued_at: Timestamp::now(),
        }
    }
}

/// Port for deferred entitlement delivery.
#[async_trait]
pub trait EntitlementOutbox: Send + Sync {
    async fn enqueue(&self, entry: OutboxEntry) -> Result<(), EntitlementError>;

    /// Pending entries, oldest first, at most `limit`.
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, EntitlementError>;

    async fn mark_delivered(&self, id: Uuid) -> Result<(), EntitlementError>;

    /// Record a failed retry; the entry stays pending.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), EntitlementError>;

    async fn mark_dead_lettered(&self, id: Uuid, error: &str) -> Result<(), EntitlementError>;
}

/// Errors from entitlement delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntitlementError {
    /// Downstream rejected or could not be reached.
    #[error("entitlement delivery failed: {0}")]
    Delivery(String),

    /// Outbox entry does not exist.
    #[error("outbox entry not found: {0}")]
    NotFound(Uuid),

    /// Outbox store failed.
    #[error("outbox storage error: {0}")]
    Storage(String),
}
