//! EntitlementRetrier - Background delivery of deferred entitlements.
//!
//! When the inline entitlement call fails after a payment is committed, the
//! grant lands in the outbox. This worker polls the outbox and retries each
//! grant until it succeeds or runs out of attempts.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `poll_interval` | 5s | How often to check for pending grants |
//! | `batch_size` | 50 | Max grants retried per poll cycle |
//! | `max_attempts` | 8 | Attempts (inline one included) before dead-lettering |
//!
//! ## Graceful Shutdown
//!
//! On shutdown the current batch is finished and one final batch runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;

use crate::ports::{EntitlementError, EntitlementOutbox, EntitlementService};

/// Configuration for the EntitlementRetrier.
#[derive(Debug, Clone)]
pub struct RetrierConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub max_attempts: u32,
}

impl Default for RetrierConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 50,
            max_attempts: 8,
        }
    }
}

impl RetrierConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}

/// Counts from one retry batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub delivered: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// Background worker that drains the entitlement outbox.
pub struct EntitlementRetrier {
    outbox: Arc<dyn EntitlementOutbox>,
    service: Arc<dyn EntitlementService>,
    config: RetrierConfig,
}

impl EntitlementRetrier {
    pub fn new(
        outbox: Arc<dyn EntitlementOutbox>,
        service: Arc<dyn EntitlementService>,
        config: RetrierConfig,
    ) -> Self {
        Self {
            outbox,
            service,
            config,
        }
    }

    /// Run the retry loop until the shutdown signal is received.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), EntitlementError> {
        let mut interval = time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.process_batch().await?;
                        tracing::info!("entitlement retrier stopped");
                        return Ok(());
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.process_batch().await {
                        tracing::error!(error = %e, "entitlement retry batch failed");
                    }
                }
            }
        }
    }

    /// Retry one batch of pending grants.
    pub async fn process_batch(&self) -> Result<RetryReport, EntitlementError> {
        let entries = self.outbox.pending(self.config.batch_size).await?;
        let mut report = RetryReport::default();

        for entry in entries {
            match self.service.apply_entitlement(&entry.grant).await {
                Ok(()) => {
                    self.outbox.mark_delivered(entry.id).await?;
                    tracing::info!(
                        reference = %entry.grant.merchant_reference_id,
                        attempts = entry.attempts + 1,
                        "deferred entitlement delivered"
                    );
                    report.delivered += 1;
                }
                Err(e) if entry.attempts + 1 >= self.config.max_attempts => {
                    let error = e.to_string();
                    self.outbox.mark_dead_lettered(entry.id, &error).await?;
                    tracing::error!(
                        reference = %entry.grant.merchant_reference_id,
                        payer_id = entry.grant.payer_id.as_deref().unwrap_or("-"),
                        attempts = entry.attempts + 1,
                        error = %error,
                        "entitlement dead-lettered, manual follow-up required"
                    );
                    report.dead_lettered += 1;
                }
                Err(e) => {
                    let error = e.to_string();
                    self.outbox.mark_failed(entry.id, &error).await?;
                    tracing::warn!(
                        reference = %entry.grant.merchant_reference_id,
                        attempts = entry.attempts + 1,
                        error = %error,
                        "entitlement retry failed"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Run exactly one poll cycle.
    pub async fn poll_once(&self) -> Result<RetryReport, EntitlementError> {
        self.process_batch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::entitlement::{InMemoryEntitlementOutbox, InMemoryEntitlementService};
    use crate::domain::foundation::Timestamp;
    use crate::domain::payment::MerchantReference;
    use crate::ports::{EntitlementGrant, OutboxEntry, OutboxEntryStatus};

    fn entry(reference: &str) -> OutboxEntry {
        let grant = EntitlementGrant {
            merchant_reference_id: MerchantReference::new(reference).unwrap(),
            external_id: "sess-1".to_string(),
            payer_id: None,
            amount: None,
            currency: None,
            months: 3,
            granted_at: Timestamp::now(),
        };
        OutboxEntry::new(grant, "initial failure")
    }

    fn setup(
        max_attempts: u32,
    ) -> (
        EntitlementRetrier,
        Arc<InMemoryEntitlementOutbox>,
        Arc<InMemoryEntitlementService>,
    ) {
        let outbox = Arc::new(InMemoryEntitlementOutbox::new());
        let service = Arc::new(InMemoryEntitlementService::new());
        let retrier = EntitlementRetrier::new(
            outbox.clone(),
            service.clone(),
            RetrierConfig::default()
                .with_poll_interval(Duration::from_millis(10))
                .with_max_attempts(max_attempts),
        );
        (retrier, outbox, service)
    }

    // ══════════════════════════════════════════════════════════════
    // Batch Processing
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn delivers_pending_grants() {
        let (retrier, outbox, service) = setup(5);
        outbox.enqueue(entry("R1")).await.unwrap();
        outbox.enqueue(entry("R2")).await.unwrap();

        let report = retrier.poll_once().await.unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(service.applied().await.len(), 2);
        assert!(outbox.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_retry_stays_pending() {
        let (retrier, outbox, service) = setup(5);
        outbox.enqueue(entry("R1")).await.unwrap();
        service.fail_next(1);

        let report = retrier.poll_once().await.unwrap();

        assert_eq!(report.failed, 1);
        let pending = outbox.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 2);

        let report = retrier.poll_once().await.unwrap();
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (retrier, outbox, service) = setup(3);
        outbox.enqueue(entry("R1")).await.unwrap();
        service.fail_next(10);

        assert_eq!(retrier.poll_once().await.unwrap().failed, 1);
        assert_eq!(retrier.poll_once().await.unwrap().dead_lettered, 1);
        assert_eq!(retrier.poll_once().await.unwrap(), RetryReport::default());

        let entries = outbox.entries().await;
        assert_eq!(entries[0].status, OutboxEntryStatus::DeadLettered);
        assert_eq!(entries[0].attempts, 3);
    }

    // ══════════════════════════════════════════════════════════════
    // Run Loop
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn run_drains_and_stops_on_shutdown() {
        let (retrier, outbox, service) = setup(5);
        outbox.enqueue(entry("R1")).await.unwrap();
        let (tx, rx) = watch::channel(false);

        let worker = tokio::spawn(async move { retrier.run(rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("retrier did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(service.applied().await.len(), 1);
    }
}
