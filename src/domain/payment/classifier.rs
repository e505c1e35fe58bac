//! Provider vocabulary to payment outcome mapping.
//!
//! This table is the only place that decides what counts as a successful
//! payment. Call sites must not compare response codes themselves.
//!
//! Rules, in order:
//! 1. A status from the failure vocabulary is `Failed`, whatever the code.
//! 2. Response code `000` with a status from the success vocabulary is
//!    `Completed`.
//! 3. Anything else is `Pending`. An unrecognized code or status never
//!    produces a credit.

use super::status::PaymentStatus;

/// Response code the provider uses for an approved transaction.
pub const APPROVED_RESPONSE_CODE: &str = "000";

const SUCCESS_STATUSES: &[&str] = &["paid", "success", "succeeded", "captured"];

const FAILURE_STATUSES: &[&str] = &[
    "failed", "declined", "cancelled", "canceled", "expired", "rejected", "voided",
];

/// Maps provider response codes and statuses to a [`PaymentStatus`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EventClassifier;

impl EventClassifier {
    /// Classify a provider `(response_code, status)` pair.
    ///
    /// Matching trims whitespace and ignores ASCII case.
    pub fn classify(provider_response_code: &str, provider_status: &str) -> PaymentStatus {
        let code = provider_response_code.trim();
        let status = provider_status.trim().to_ascii_lowercase();

        if FAILURE_STATUSES.contains(&status.as_str()) {
            return PaymentStatus::Failed;
        }

        if code == APPROVED_RESPONSE_CODE && SUCCESS_STATUSES.contains(&status.as_str()) {
            return PaymentStatus::Completed;
        }

        PaymentStatus::Pending
    }
}
