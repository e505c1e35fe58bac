//! Error types for payment event reconciliation.
//!
//! Each variant maps to the HTTP status the provider sees, which in turn
//! decides whether it redelivers.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::ValidationError;

/// Errors that stop a payment event from being reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Caller exceeded a rate limit.
    #[error("Too many requests, retry after {retry_after_ms} ms")]
    Throttled { retry_after_ms: u64 },

    /// Signature did not verify, or the provider disowned a callback.
    #[error("Unauthenticated payment event")]
    Unauthenticated,

    /// Body or query could not be parsed into a notification.
    #[error("Malformed payment event: {0}")]
    Malformed(String),

    /// Ledger failed or timed out. Nothing was committed.
    #[error("Storage error: {0}")]
    StorageTransient(String),

    /// Provider could not be reached to re-validate a callback.
    #[error("Verification unavailable: {0}")]
    VerificationUnavailable(String),

    /// Entitlement could not be applied after the record was committed.
    ///
    /// Recorded and retried from the outbox; never returned to a caller.
    #[error("Entitlement trigger failed: {0}")]
    DownstreamTriggerFailed(String),
}

impl ReconcileError {
    /// Returns true if the same event may succeed on a later delivery.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::Throttled { .. }
                | ReconcileError::StorageTransient(_)
                | ReconcileError::VerificationUnavailable(_)
                | ReconcileError::DownstreamTriggerFailed(_)
        )
    }

    /// Maps the error to the HTTP status returned to the provider.
    ///
    /// - 4xx: terminal for this event, the provider should not retry
    /// - 429/5xx: transient, the provider retries
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReconcileError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            ReconcileError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ReconcileError::Malformed(_) => StatusCode::BAD_REQUEST,
            ReconcileError::VerificationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            // The record is durable by the time this is raised
            ReconcileError::DownstreamTriggerFailed(_) => StatusCode::OK,

            ReconcileError::StorageTransient(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::Throttled { .. } => "RATE_LIMIT_EXCEEDED",
            ReconcileError::Unauthenticated => "UNAUTHENTICATED",
            ReconcileError::Malformed(_) => "MALFORMED_EVENT",
            ReconcileError::StorageTransient(_) => "STORAGE_UNAVAILABLE",
            ReconcileError::VerificationUnavailable(_) => "VERIFICATION_UNAVAILABLE",
            ReconcileError::DownstreamTriggerFailed(_) => "ENTITLEMENT_DEFERRED",
        }
    }
}

impl From<ValidationError> for ReconcileError {
    fn from(err: ValidationError) -> Self {
        ReconcileError::Malformed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ══════════════════════════════════════════════════════════════
    // Display
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn throttled_displays_delay() {
        let err = ReconcileError::Throttled {
            retry_after_ms: 1500,
        };
        assert_eq!(
            format!("{}", err),
            "Too many requests, retry after 1500 ms"
        );
    }

    #[test]
    fn validation_error_becomes_malformed() {
        let err: ReconcileError = ValidationError::empty_field("orderId").into();
        assert_eq!(
            err,
            ReconcileError::Malformed("Field 'orderId' cannot be empty".to_string())
        );
    }

    // ══════════════════════════════════════════════════════════════
    // Status Codes
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn terminal_errors_are_client_errors() {
        assert_eq!(
            ReconcileError::Unauthenticated.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ReconcileError::Malformed("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert!(!ReconcileError::Unauthenticated.is_retryable());
        assert!(!ReconcileError::Malformed("x".into()).is_retryable());
    }

    #[test]
    fn transient_errors_are_retryable() {
        let storage = ReconcileError::StorageTransient("timeout".into());
        assert_eq!(storage.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(storage.is_retryable());

        let verifier = ReconcileError::VerificationUnavailable("connect".into());
        assert_eq!(verifier.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(verifier.is_retryable());

        let throttled = ReconcileError::Throttled { retry_after_ms: 1 };
        assert_eq!(throttled.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(throttled.code(), "RATE_LIMIT_EXCEEDED");
    }

    #[test]
    fn deferred_trigger_never_fails_the_request() {
        let err = ReconcileError::DownstreamTriggerFailed("crm down".into());
        assert_eq!(err.status_code(), StatusCode::OK);
    }
}
