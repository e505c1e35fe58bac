//! In-memory entitlement service and outbox.
//!
//! The service records every grant it applies and logs it; the binary uses
//! it until a subscription store is wired in. Both types support failure
//! injection for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::payment::MerchantReference;
use crate::ports::{
    EntitlementError, EntitlementGrant, EntitlementOutbox, EntitlementService, OutboxEntry,
    OutboxEntryStatus,
};

/// Entitlement service that keeps applied grants in memory.
///
/// A repeated grant for the same merchant reference is accepted and ignored.
#[derive(Debug, Default)]
pub struct InMemoryEntitlementService {
    applied: RwLock<Vec<EntitlementGrant>>,
    seen: RwLock<HashSet<MerchantReference>>,
    failures_remaining: AtomicU32,
    calls: AtomicU32,
}

impl InMemoryEntitlementService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` calls with a delivery error.
    pub fn fail_next(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Grants applied so far, one per merchant reference.
    pub async fn applied(&self) -> Vec<EntitlementGrant> {
        self.applied.read().await.clone()
    }

    /// Total calls, including failed and duplicate ones.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntitlementService for InMemoryEntitlementService {
    async fn apply_entitlement(&self, grant: &EntitlementGrant) -> Result<(), EntitlementError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(EntitlementError::Delivery(
                "subscription store unavailable".to_string(),
            ));
        }

        if !self
            .seen
            .write()
            .await
            .insert(grant.merchant_reference_id.clone())
        {
            tracing::debug!(reference = %grant.merchant_reference_id, "entitlement already applied");
            return Ok(());
        }

        tracing::info!(
            reference = %grant.merchant_reference_id,
            payer_id = grant.payer_id.as_deref().unwrap_or("-"),
            months = grant.months,
            "subscription activated"
        );
        self.applied.write().await.push(grant.clone());
        Ok(())
    }
}

/// Outbox kept in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryEntitlementOutbox {
    entries: RwLock<Vec<OutboxEntry>>,
}

impl InMemoryEntitlementOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, whatever its status.
    pub async fn entries(&self) -> Vec<OutboxEntry> {
        self.entries.read().await.clone()
    }

    async fn update<F>(&self, id: Uuid, apply: F) -> Result<(), EntitlementError>
    where
        F: FnOnce(&mut OutboxEntry),
    {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(EntitlementError::NotFound(id))?;
        apply(entry);
        Ok(())
    }
}

#[async_trait]
impl EntitlementOutbox for InMemoryEntitlementOutbox {
    async fn enqueue(&self, entry: OutboxEntry) -> Result<(), EntitlementError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, EntitlementError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.status == OutboxEntryStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<(), EntitlementError> {
        self.update(id, |e| {
            e.status = OutboxEntryStatus::Delivered;
            e.attempts += 1;
        })
        .await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), EntitlementError> {
        self.update(id, |e| {
            e.attempts += 1;
            e.last_error = Some(error.to_string());
        })
        .await
    }

    async fn mark_dead_lettered(&self, id: Uuid, error: &str) -> Result<(), EntitlementError> {
        self.update(id, |e| {
            e.status = OutboxEntryStatus::DeadLettered;
            e.attempts += 1;
            e.last_error = Some(error.to_string());
        })
        .await
    }
}
