//! HTTP DTOs for payment notification endpoints.
//!
//! Request bodies are not modeled here: the webhook body must reach the
//! signature check as raw bytes, and the callback is read as a raw query.

use serde::Serialize;

use crate::domain::payment::{EntitlementDelivery, IngestOutcome, PaymentStatus, ReconcileError};

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Acknowledgement returned to the provider for a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub status: PaymentStatus,
    /// True when this delivery had been applied before.
    pub duplicate: bool,
}

impl From<IngestOutcome> for WebhookAck {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            received: true,
            status: outcome.status(),
            duplicate: matches!(outcome, IngestOutcome::AlreadyProcessed { .. }),
        }
    }
}

/// What the payer's browser should show after the redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    Success,
    Failed,
    Pending,
    /// Transient problem on our side; the page should retry shortly.
    Retry,
    Error,
}

/// Page-state body for the redirect callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackPage {
    pub state: PageState,
    pub message: String,
    /// Present when the entitlement could not be applied yet.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub activation_delayed: bool,
}

impl From<IngestOutcome> for CallbackPage {
    fn from(outcome: IngestOutcome) -> Self {
        let (state, message) = match outcome.status() {
            PaymentStatus::Completed => (PageState::Success, "Payment completed"),
            PaymentStatus::Failed => (PageState::Failed, "Payment failed"),
            PaymentStatus::Pending => (PageState::Pending, "Awaiting confirmation from the bank"),
        };
        let activation_delayed = matches!(
            outcome,
            IngestOutcome::Applied {
                entitlement: EntitlementDelivery::Deferred,
                ..
            }
        );
        Self {
            state,
            message: message.to_string(),
            activation_delayed,
        }
    }
}

impl From<&ReconcileError> for CallbackPage {
    fn from(err: &ReconcileError) -> Self {
        let state = if err.is_retryable() {
            PageState::Retry
        } else {
            PageState::Error
        };
        Self {
            state,
            message: err.to_string(),
            activation_delayed: false,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Response DTO
// ════════════════════════════════════════════════════════════════════════════════

/// Standard error response for API errors.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
