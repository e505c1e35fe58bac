//! Payment status state machine.
//!
//! A payment only ever moves towards finality: `Pending` may settle into
//! `Completed` or `Failed`, and both of those are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::StateMachine;

/// Status of a payment as recorded in the ledger.
///
/// Also the output of the event classifier, so the vocabulary used to
/// describe an inbound event and a stored record is the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Outcome not yet known (or not trustworthy enough to act on).
    Pending,

    /// Provider confirmed the money moved.
    Completed,

    /// Provider reported a decline, cancellation or expiry.
    Failed,
}

impl PaymentStatus {
    /// Returns true once the payment can no longer change status.
    pub fn is_final(&self) -> bool {
        self.is_terminal()
    }

    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl StateMachine for PaymentStatus {
    fn valid_transitions(&self) -> &'static [Self] {
        match self {
            PaymentStatus::Pending => &[PaymentStatus::Completed, PaymentStatus::Failed],
            PaymentStatus::Completed | PaymentStatus::Failed => &[],
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
