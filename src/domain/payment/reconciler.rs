//! Payment reconciler - Turns inbound provider notifications into ledger
//! updates that are applied exactly once.
//!
//! ## Pipeline
//!
//! 1. Throttle per caller IP and entry point (429)
//! 2. Authenticate: HMAC for webhooks, provider re-validation for redirect
//!    callbacks (401, or 503 when the provider is unreachable)
//! 3. Parse and throttle per merchant reference (400 / 429)
//! 4. Fingerprint and skip events already applied (200, no side effects)
//! 5. Classify and fold into the ledger atomically (500 on storage failure)
//! 6. Trigger the entitlement on the first transition into `Completed`
//!
//! ## Race Condition Handling
//!
//! The early fingerprint check is only a fast path. The ledger repeats it
//! inside its atomic upsert, so when two identical deliveries race, one
//! performs the transition and the other gets `AlreadyProcessed`. Only the
//! winner triggers the entitlement.
//!
//! ## Entitlement Delivery
//!
//! Once the ledger has committed a completion, the entitlement must not be
//! lost. The trigger runs on its own task, bounded by
//! `entitlement_timeout`, and a failed or timed-out attempt is written to
//! the outbox from that task. Dropping the request future (client
//! disconnect, request timeout) does not abort it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::classifier::EventClassifier;
use super::errors::ReconcileError;
use super::event::{EventSource, PaymentEvent, PaymentNotification};
use super::fingerprint::EventFingerprint;
use super::record::{PaymentMutation, Transition};
use super::signature::SignatureAuthenticator;
use super::status::PaymentStatus;
use crate::ports::{
    CallbackVerifier, EntitlementGrant, EntitlementOutbox, EntitlementService, LedgerError,
    OutboxEntry, PaymentLedger, RateLimitKey, RateLimiter, RateRule, DEFAULT_GRANT_MONTHS,
};

/// Scope for the per-reference quota.
const REFERENCE_SCOPE: &str = "payment:ref";

/// Attempts made to write a deferred grant to the outbox.
const ENQUEUE_ATTEMPTS: u32 = 3;

/// Pause before the first outbox retry; doubles after each attempt.
const ENQUEUE_BACKOFF: Duration = Duration::from_millis(100);

/// Identifier used when the caller address is not known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Tunables for [`PaymentReconciler`].
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound on every ledger call.
    pub ledger_timeout: Duration,
    /// Upper bound on the inline entitlement call and on each outbox write.
    pub entitlement_timeout: Duration,
    pub webhook_rule: RateRule,
    pub callback_rule: RateRule,
    pub reference_rule: RateRule,
    /// Subscription months granted per completed payment.
    pub grant_months: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            ledger_timeout: Duration::from_secs(5),
            entitlement_timeout: Duration::from_secs(5),
            webhook_rule: RateRule::per_minute(120),
            callback_rule: RateRule::per_minute(30),
            reference_rule: RateRule::per_minute(30),
            grant_months: DEFAULT_GRANT_MONTHS,
        }
    }
}

/// How the entitlement for an applied event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementDelivery {
    /// The event did not complete the payment.
    NotRequired,
    /// Applied inline.
    Delivered,
    /// Inline attempt failed; queued for the retry worker.
    Deferred,
}

/// Successful result of [`PaymentReconciler::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The event changed the ledger.
    Applied {
        status: PaymentStatus,
        entitlement: EntitlementDelivery,
    },
    /// The event was seen before; nothing changed.
    AlreadyProcessed { status: PaymentStatus },
}

impl IngestOutcome {
    /// Status of the record after this event.
    pub fn status(&self) -> PaymentStatus {
        match self {
            IngestOutcome::Applied { status, .. } | IngestOutcome::AlreadyProcessed { status } => {
                *status
            }
        }
    }
}

/// Orchestrates authentication, deduplication and ledger updates for
/// provider notifications.
pub struct PaymentReconciler {
    limiter: Arc<dyn RateLimiter>,
    ledger: Arc<dyn PaymentLedger>,
    entitlements: Arc<dyn EntitlementService>,
    outbox: Arc<dyn EntitlementOutbox>,
    callback_verifier: Arc<dyn CallbackVerifier>,
    config: ReconcilerConfig,
}

impl PaymentReconciler {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        ledger: Arc<dyn PaymentLedger>,
        entitlements: Arc<dyn EntitlementService>,
        outbox: Arc<dyn EntitlementOutbox>,
        callback_verifier: Arc<dyn CallbackVerifier>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            limiter,
            ledger,
            entitlements,
            outbox,
            callback_verifier,
            config,
        }
    }

    /// Reconcile one inbound event.
    ///
    /// `secret` is the shared webhook secret; it is unused for redirect
    /// callbacks, which are confirmed with the provider instead.
    pub async fn ingest(
        &self,
        event: &PaymentEvent,
        secret: &str,
    ) -> Result<IngestOutcome, ReconcileError> {
        // 1. Throttle per caller
        let client = event.client_ip.as_deref().unwrap_or(UNKNOWN_CLIENT);
        let caller_rule = match event.source {
            EventSource::Webhook => &self.config.webhook_rule,
            EventSource::RedirectCallback => &self.config.callback_rule,
        };
        self.throttle(&RateLimitKey::new(event.source.scope(), client), caller_rule)?;

        // 2-3. Authenticate and parse
        let notification = self.authenticate_and_parse(event, secret, client).await?;

        self.throttle(
            &RateLimitKey::new(REFERENCE_SCOPE, notification.merchant_reference_id.as_str()),
            &self.config.reference_rule,
        )?;

        // 4. Fast-path dedup
        let fingerprint = EventFingerprint::compute(
            &notification.external_id,
            &notification.provider_response_code,
            &notification.provider_status,
        );

        let existing = self
            .bounded("get_by_key", self.ledger.get_by_key(&notification.merchant_reference_id))
            .await?;
        if let Some(record) = existing.filter(|r| r.has_applied(&fingerprint)) {
            tracing::debug!(
                reference = %notification.merchant_reference_id,
                fingerprint = %fingerprint,
                "payment event already applied"
            );
            return Ok(IngestOutcome::AlreadyProcessed {
                status: record.status,
            });
        }

        // 5. Classify and fold
        let status = EventClassifier::classify(
            &notification.provider_response_code,
            &notification.provider_status,
        );
        let mutation = PaymentMutation {
            merchant_reference_id: notification.merchant_reference_id.clone(),
            external_id: notification.external_id.clone(),
            status,
            amount: notification.amount.clone(),
            currency: notification.currency.clone(),
            fingerprint,
            at: event.received_at,
        };

        let outcome = self
            .bounded(
                "upsert_if_new",
                self.ledger
                    .upsert_if_new(&notification.merchant_reference_id, &mutation),
            )
            .await?;

        if outcome.transition == Transition::AlreadyApplied {
            return Ok(IngestOutcome::AlreadyProcessed {
                status: outcome.record.status,
            });
        }

        tracing::info!(
            reference = %outcome.record.merchant_reference_id,
            external_id = %outcome.record.external_id,
            classified = %status,
            status = %outcome.record.status,
            transition = ?outcome.transition,
            "payment event applied"
        );

        // 6. Entitlement, exactly once per completion
        let entitlement = if outcome.entered_completed() {
            let grant = EntitlementGrant::for_record(&outcome.record, self.config.grant_months);
            self.trigger_entitlement(grant).await
        } else {
            EntitlementDelivery::NotRequired
        };

        Ok(IngestOutcome::Applied {
            status: outcome.record.status,
            entitlement,
        })
    }

    fn throttle(&self, key: &RateLimitKey, rule: &RateRule) -> Result<(), ReconcileError> {
        let decision = self.limiter.check(key, rule);
        if decision.allowed {
            return Ok(());
        }
        tracing::warn!(key = %key, retry_after_ms = decision.retry_after_ms, "payment event throttled");
        Err(ReconcileError::Throttled {
            retry_after_ms: decision.retry_after_ms,
        })
    }

    async fn authenticate_and_parse(
        &self,
        event: &PaymentEvent,
        secret: &str,
        client: &str,
    ) -> Result<PaymentNotification, ReconcileError> {
        match event.source {
            EventSource::Webhook => {
                let verified = SignatureAuthenticator::verify(
                    &event.raw_body,
                    event.signature_header.as_deref(),
                    secret,
                );
                if !verified {
                    tracing::warn!(client_ip = %client, "rejected unauthenticated payment webhook");
                    return Err(ReconcileError::Unauthenticated);
                }
                Ok(event.parse()?)
            }
            EventSource::RedirectCallback => {
                let notification = event.parse()?;
                match self.callback_verifier.confirm(&notification).await {
                    Ok(true) => Ok(notification),
                    Ok(false) => {
                        tracing::warn!(
                            client_ip = %client,
                            reference = %notification.merchant_reference_id,
                            "provider did not confirm redirect callback"
                        );
                        Err(ReconcileError::Unauthenticated)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "callback re-validation unavailable");
                        Err(ReconcileError::VerificationUnavailable(e.to_string()))
                    }
                }
            }
        }
    }

    /// Runs a ledger call under the configured timeout.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, ReconcileError> {
        match tokio::time::timeout(self.config.ledger_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(operation, error = %e, "ledger call failed");
                Err(ReconcileError::StorageTransient(e.to_string()))
            }
            Err(_) => {
                tracing::error!(
                    operation,
                    timeout_ms = self.config.ledger_timeout.as_millis() as u64,
                    "ledger call timed out"
                );
                Err(ReconcileError::StorageTransient(format!(
                    "{operation} timed out"
                )))
            }
        }
    }

    /// Hands the grant to a detached task and waits for its verdict.
    ///
    /// The task owns everything it needs, so it finishes even when this
    /// future is dropped after the ledger commit.
    async fn trigger_entitlement(&self, grant: EntitlementGrant) -> EntitlementDelivery {
        let reference = grant.merchant_reference_id.clone();
        let task = tokio::spawn(deliver_entitlement(
            self.entitlements.clone(),
            self.outbox.clone(),
            grant,
            self.config.entitlement_timeout,
        ));

        match task.await {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::error!(
                    reference = %reference,
                    error = %e,
                    "entitlement task aborted, manual follow-up required"
                );
                EntitlementDelivery::Deferred
            }
        }
    }
}

/// Applies the grant inline, falling back to the outbox.
async fn deliver_entitlement(
    entitlements: Arc<dyn EntitlementService>,
    outbox: Arc<dyn EntitlementOutbox>,
    grant: EntitlementGrant,
    timeout: Duration,
) -> EntitlementDelivery {
    let error = match tokio::time::timeout(timeout, entitlements.apply_entitlement(&grant)).await {
        Ok(Ok(())) => {
            tracing::info!(
                reference = %grant.merchant_reference_id,
                payer_id = grant.payer_id.as_deref().unwrap_or("-"),
                months = grant.months,
                "entitlement applied"
            );
            return EntitlementDelivery::Delivered;
        }
        Ok(Err(e)) => ReconcileError::DownstreamTriggerFailed(e.to_string()),
        Err(_) => ReconcileError::DownstreamTriggerFailed(format!(
            "entitlement call timed out after {}ms",
            timeout.as_millis()
        )),
    };

    tracing::warn!(
        reference = %grant.merchant_reference_id,
        error = %error,
        "entitlement deferred to outbox"
    );

    let entry = OutboxEntry::new(grant, error.to_string());
    let reference = entry.grant.merchant_reference_id.clone();
    let mut backoff = ENQUEUE_BACKOFF;
    for attempt in 1..=ENQUEUE_ATTEMPTS {
        let failure = match tokio::time::timeout(timeout, outbox.enqueue(entry.clone())).await {
            Ok(Ok(())) => return EntitlementDelivery::Deferred,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "outbox write timed out".to_string(),
        };

        if attempt == ENQUEUE_ATTEMPTS {
            tracing::error!(
                reference = %reference,
                attempts = attempt,
                error = %failure,
                "failed to enqueue entitlement, manual follow-up required"
            );
        } else {
            tracing::warn!(
                reference = %reference,
                attempt,
                error = %failure,
                "outbox write failed, retrying"
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }
    EntitlementDelivery::Deferred
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{
        fold, sign_payload, MerchantReference, PaymentRecord, UpsertOutcome,
    };
    use crate::ports::{
        EntitlementError, OutboxEntryStatus, RateDecision, RateLimitStatus, VerifierError,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::{Mutex, RwLock};
    use uuid::Uuid;

    const SECRET: &str = "whsec_reconciler_test";

    // ══════════════════════════════════════════════════════════════
    // Mock Implementations
    // ══════════════════════════════════════════════════════════════

    struct MockLimiter {
        deny_scope: Option<&'static str>,
    }

    impl RateLimiter for MockLimiter {
        fn check(&self, key: &RateLimitKey, _rule: &RateRule) -> RateDecision {
            match self.deny_scope {
                Some(scope) if key.scope == scope => RateDecision::deny(2500),
                _ => RateDecision::allow(),
            }
        }

        fn status(&self, _key: &RateLimitKey, rule: &RateRule) -> RateLimitStatus {
            RateLimitStatus {
                limit: rule.max(),
                remaining: rule.max(),
                retry_after_ms: 0,
            }
        }

        fn reset(&self, _key: &RateLimitKey) {}
    }

    #[derive(Default)]
    struct MockLedger {
        records: Mutex<HashMap<String, PaymentRecord>>,
        delay: Option<Duration>,
        fail: bool,
    }

    #[async_trait]
    impl PaymentLedger for MockLedger {
        async fn get_by_key(
            &self,
            merchant_reference_id: &MerchantReference,
        ) -> Result<Option<PaymentRecord>, LedgerError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(LedgerError::Unavailable("connection refused".into()));
            }
            let records = self.records.lock().await;
            Ok(records.get(merchant_reference_id.as_str()).cloned())
        }

        async fn upsert_if_new(
            &self,
            merchant_reference_id: &MerchantReference,
            mutation: &PaymentMutation,
        ) -> Result<UpsertOutcome, LedgerError> {
            let mut records = self.records.lock().await;
            let current = records.get(merchant_reference_id.as_str()).cloned();
            let outcome = fold(current, mutation);
            if outcome.is_write() {
                records.insert(
                    merchant_reference_id.as_str().to_string(),
                    outcome.record.clone(),
                );
            }
            Ok(outcome)
        }
    }

    #[derive(Default)]
    struct MockEntitlements {
        calls: AtomicU32,
        failing: bool,
        hanging: bool,
    }

    impl MockEntitlements {
        fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        fn hanging() -> Self {
            Self {
                hanging: true,
                ..Self::default()
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EntitlementService for MockEntitlements {
        async fn apply_entitlement(&self, _grant: &EntitlementGrant) -> Result<(), EntitlementError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hanging {
                std::future::pending::<()>().await;
            }
            if self.failing {
                Err(EntitlementError::Delivery("subscription service down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct MockOutbox {
        entries: RwLock<Vec<OutboxEntry>>,
        rejections_left: AtomicU32,
        enqueue_calls: AtomicU32,
    }

    #[async_trait]
    impl EntitlementOutbox for MockOutbox {
        async fn enqueue(&self, entry: OutboxEntry) -> Result<(), EntitlementError> {
            self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
            let rejected = self
                .rejections_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if rejected {
                return Err(EntitlementError::Storage("outbox locked".into()));
            }
            self.entries.write().await.push(entry);
            Ok(())
        }

        async fn pending(&self, _limit: usize) -> Result<Vec<OutboxEntry>, EntitlementError> {
            Ok(self.entries.read().await.clone())
        }

        async fn mark_delivered(&self, _id: Uuid) -> Result<(), EntitlementError> {
            Ok(())
        }

        async fn mark_failed(&self, _id: Uuid, _error: &str) -> Result<(), EntitlementError> {
            Ok(())
        }

        async fn mark_dead_lettered(&self, _id: Uuid, _error: &str) -> Result<(), EntitlementError> {
            Ok(())
        }
    }

    enum VerifierMode {
        Confirm,
        Deny,
        Unreachable,
    }

    struct MockVerifier(VerifierMode);

    #[async_trait]
    impl CallbackVerifier for MockVerifier {
        async fn confirm(&self, _n: &PaymentNotification) -> Result<bool, VerifierError> {
            match self.0 {
                VerifierMode::Confirm => Ok(true),
                VerifierMode::Deny => Ok(false),
                VerifierMode::Unreachable => Err(VerifierError::Transport("timeout".into())),
            }
        }
    }

    struct Harness {
        reconciler: PaymentReconciler,
        ledger: Arc<MockLedger>,
        entitlements: Arc<MockEntitlements>,
        outbox: Arc<MockOutbox>,
    }

    fn harness_with(
        limiter: MockLimiter,
        ledger: MockLedger,
        entitlements: MockEntitlements,
        verifier: VerifierMode,
    ) -> Harness {
        harness_with_outbox(limiter, ledger, entitlements, verifier, MockOutbox::default())
    }

    fn harness_with_outbox(
        limiter: MockLimiter,
        ledger: MockLedger,
        entitlements: MockEntitlements,
        verifier: VerifierMode,
        outbox: MockOutbox,
    ) -> Harness {
        let ledger = Arc::new(ledger);
        let entitlements = Arc::new(entitlements);
        let outbox = Arc::new(outbox);
        let config = ReconcilerConfig {
            ledger_timeout: Duration::from_millis(50),
            entitlement_timeout: Duration::from_millis(50),
            ..ReconcilerConfig::default()
        };
        let reconciler = PaymentReconciler::new(
            Arc::new(limiter),
            ledger.clone(),
            entitlements.clone(),
            outbox.clone(),
            Arc::new(MockVerifier(verifier)),
            config,
        );
        Harness {
            reconciler,
            ledger,
            entitlements,
            outbox,
        }
    }

    fn harness() -> Harness {
        harness_with(
            MockLimiter { deny_scope: None },
            MockLedger::default(),
            MockEntitlements::default(),
            VerifierMode::Confirm,
        )
    }

    fn webhook_body(code: &str, status: &str) -> Vec<u8> {
        format!(
            r#"{{"merchantReferenceId":"BULK_user42_001","orderId":"sess-1","amount":"150.00","currency":"EGP","responseCode":"{code}","status":"{status}"}}"#
        )
        .into_bytes()
    }

    fn signed_webhook(code: &str, status: &str) -> PaymentEvent {
        let body = webhook_body(code, status);
        let signature = sign_payload(SECRET, &body);
        PaymentEvent::webhook(body, Some(signature)).with_client_ip("203.0.113.9")
    }

    // ══════════════════════════════════════════════════════════════
    // Webhook Happy Path
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn paid_webhook_completes_and_grants_once() {
        let h = harness();

        let outcome = h.reconciler.ingest(&signed_webhook("000", "Paid"), SECRET).await.unwrap();

        assert_eq!(
            outcome,
            IngestOutcome::Applied {
                status: PaymentStatus::Completed,
                entitlement: EntitlementDelivery::Delivered,
            }
        );
        assert_eq!(h.entitlements.call_count(), 1);
    }

    #[tokio::test]
    async fn redelivery_is_already_processed() {
        let h = harness();
        let event = signed_webhook("000", "Paid");

        h.reconciler.ingest(&event, SECRET).await.unwrap();
        let second = h.reconciler.ingest(&event, SECRET).await.unwrap();

        assert_eq!(
            second,
            IngestOutcome::AlreadyProcessed {
                status: PaymentStatus::Completed
            }
        );
        assert_eq!(h.entitlements.call_count(), 1);
    }

    #[tokio::test]
    async fn pending_then_paid_grants_on_completion() {
        let h = harness();

        let first = h
            .reconciler
            .ingest(&signed_webhook("", "Pending"), SECRET)
            .await
            .unwrap();
        assert_eq!(first.status(), PaymentStatus::Pending);
        assert_eq!(h.entitlements.call_count(), 0);

        h.reconciler.ingest(&signed_webhook("000", "Paid"), SECRET).await.unwrap();
        assert_eq!(h.entitlements.call_count(), 1);
    }

    #[tokio::test]
    async fn late_failure_does_not_revert_completed() {
        let h = harness();
        h.reconciler.ingest(&signed_webhook("000", "Paid"), SECRET).await.unwrap();

        let outcome = h
            .reconciler
            .ingest(&signed_webhook("999", "Failed"), SECRET)
            .await
            .unwrap();

        assert_eq!(outcome.status(), PaymentStatus::Completed);
        let records = h.ledger.records.lock().await;
        assert_eq!(
            records["BULK_user42_001"].applied_event_fingerprints.len(),
            2
        );
    }

    // ══════════════════════════════════════════════════════════════
    // Rejections
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn bad_signature_is_unauthenticated() {
        let h = harness();
        let event = PaymentEvent::webhook(webhook_body("000", "Paid"), Some("deadbeef".into()));

        let err = h.reconciler.ingest(&event, SECRET).await.unwrap_err();

        assert_eq!(err, ReconcileError::Unauthenticated);
        assert!(h.ledger.records.lock().await.is_empty());
    }

    #[tokio::test]
    async fn empty_secret_rejects_even_valid_looking_events() {
        let h = harness();
        let err = h
            .reconciler
            .ingest(&signed_webhook("000", "Paid"), "")
            .await
            .unwrap_err();
        assert_eq!(err, ReconcileError::Unauthenticated);
    }

    #[tokio::test]
    async fn signed_but_unparseable_body_is_malformed() {
        let h = harness();
        let body = br#"{"orderId":"sess-1"}"#.to_vec();
        let signature = sign_payload(SECRET, &body);

        let err = h
            .reconciler
            .ingest(&PaymentEvent::webhook(body, Some(signature)), SECRET)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Malformed(_)));
    }

    #[tokio::test]
    async fn throttled_caller_is_rejected_before_authentication() {
        let h = harness_with(
            MockLimiter {
                deny_scope: Some("payment:webhook"),
            },
            MockLedger::default(),
            MockEntitlements::default(),
            VerifierMode::Confirm,
        );

        let err = h
            .reconciler
            .ingest(&signed_webhook("000", "Paid"), SECRET)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ReconcileError::Throttled {
                retry_after_ms: 2500
            }
        );
    }

    #[tokio::test]
    async fn per_reference_quota_applies_after_parsing() {
        let h = harness_with(
            MockLimiter {
                deny_scope: Some(REFERENCE_SCOPE),
            },
            MockLedger::default(),
            MockEntitlements::default(),
            VerifierMode::Confirm,
        );

        let err = h
            .reconciler
            .ingest(&signed_webhook("000", "Paid"), SECRET)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Throttled { .. }));
        assert!(h.ledger.records.lock().await.is_empty());
    }

    // ══════════════════════════════════════════════════════════════
    // Redirect Callbacks
    // ══════════════════════════════════════════════════════════════

    const CALLBACK_QUERY: &str =
        "sessionId=sess-1&merchantReferenceId=BULK_user42_001&responseCode=000&status=Paid";

    #[tokio::test]
    async fn confirmed_callback_is_applied() {
        let h = harness();
        let outcome = h
            .reconciler
            .ingest(&PaymentEvent::redirect_callback(CALLBACK_QUERY), SECRET)
            .await
            .unwrap();
        assert_eq!(outcome.status(), PaymentStatus::Completed);
        assert_eq!(h.entitlements.call_count(), 1);
    }

    #[tokio::test]
    async fn callback_disowned_by_provider_is_unauthenticated() {
        let h = harness_with(
            MockLimiter { deny_scope: None },
            MockLedger::default(),
            MockEntitlements::default(),
            VerifierMode::Deny,
        );
        let err = h
            .reconciler
            .ingest(&PaymentEvent::redirect_callback(CALLBACK_QUERY), SECRET)
            .await
            .unwrap_err();
        assert_eq!(err, ReconcileError::Unauthenticated);
        assert_eq!(h.entitlements.call_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_provider_is_verification_unavailable() {
        let h = harness_with(
            MockLimiter { deny_scope: None },
            MockLedger::default(),
            MockEntitlements::default(),
            VerifierMode::Unreachable,
        );
        let err = h
            .reconciler
            .ingest(&PaymentEvent::redirect_callback(CALLBACK_QUERY), SECRET)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::VerificationUnavailable(_)));
        assert!(err.is_retryable());
    }

    // ══════════════════════════════════════════════════════════════
    // Failure Semantics
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn ledger_failure_is_storage_transient() {
        let h = harness_with(
            MockLimiter { deny_scope: None },
            MockLedger {
                fail: true,
                ..MockLedger::default()
            },
            MockEntitlements::default(),
            VerifierMode::Confirm,
        );
        let err = h
            .reconciler
            .ingest(&signed_webhook("000", "Paid"), SECRET)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::StorageTransient(_)));
        assert_eq!(h.entitlements.call_count(), 0);
    }

    #[tokio::test]
    async fn slow_ledger_times_out_as_storage_transient() {
        let h = harness_with(
            MockLimiter { deny_scope: None },
            MockLedger {
                delay: Some(Duration::from_millis(500)),
                ..MockLedger::default()
            },
            MockEntitlements::default(),
            VerifierMode::Confirm,
        );
        let err = h
            .reconciler
            .ingest(&signed_webhook("000", "Paid"), SECRET)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ReconcileError::StorageTransient("get_by_key timed out".to_string())
        );
    }

    #[tokio::test]
    async fn failed_entitlement_is_deferred_not_returned() {
        let h = harness_with(
            MockLimiter { deny_scope: None },
            MockLedger::default(),
            MockEntitlements::failing(),
            VerifierMode::Confirm,
        );

        let outcome = h
            .reconciler
            .ingest(&signed_webhook("000", "Paid"), SECRET)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            IngestOutcome::Applied {
                status: PaymentStatus::Completed,
                entitlement: EntitlementDelivery::Deferred,
            }
        );
        let entries = h.outbox.entries.read().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, OutboxEntryStatus::Pending);
        assert_eq!(entries[0].grant.payer_id.as_deref(), Some("user42"));
        assert_eq!(entries[0].attempts, 1);
    }

    #[tokio::test]
    async fn hanging_entitlement_times_out_into_outbox() {
        let h = harness_with(
            MockLimiter { deny_scope: None },
            MockLedger::default(),
            MockEntitlements::hanging(),
            VerifierMode::Confirm,
        );

        let outcome = h
            .reconciler
            .ingest(&signed_webhook("000", "Paid"), SECRET)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            IngestOutcome::Applied {
                status: PaymentStatus::Completed,
                entitlement: EntitlementDelivery::Deferred,
            }
        );
        let entries = h.outbox.entries.read().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0]
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("timed out")));
    }

    #[tokio::test]
    async fn dropped_request_still_queues_the_grant() {
        let h = harness_with(
            MockLimiter { deny_scope: None },
            MockLedger::default(),
            MockEntitlements::hanging(),
            VerifierMode::Confirm,
        );

        // Cut the request off while the entitlement call is still pending.
        let cut = tokio::time::timeout(
            Duration::from_millis(10),
            h.reconciler.ingest(&signed_webhook("000", "Paid"), SECRET),
        )
        .await;
        assert!(cut.is_err());
        assert_eq!(
            h.ledger.records.lock().await["BULK_user42_001"].status,
            PaymentStatus::Completed
        );

        tokio::time::sleep(Duration::from_millis(200)).await;

        let entries = h.outbox.entries.read().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].grant.merchant_reference_id.as_str(), "BULK_user42_001");

        drop(entries);
        let redelivery = h
            .reconciler
            .ingest(&signed_webhook("000", "Paid"), SECRET)
            .await
            .unwrap();
        assert_eq!(
            redelivery,
            IngestOutcome::AlreadyProcessed {
                status: PaymentStatus::Completed
            }
        );
    }

    #[tokio::test]
    async fn outbox_write_is_retried() {
        let h = harness_with_outbox(
            MockLimiter { deny_scope: None },
            MockLedger::default(),
            MockEntitlements::failing(),
            VerifierMode::Confirm,
            MockOutbox {
                rejections_left: AtomicU32::new(2),
                ..MockOutbox::default()
            },
        );

        let outcome = h
            .reconciler
            .ingest(&signed_webhook("000", "Paid"), SECRET)
            .await
            .unwrap();

        assert_eq!(outcome.status(), PaymentStatus::Completed);
        assert_eq!(h.outbox.enqueue_calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.outbox.entries.read().await.len(), 1);
    }
}
