//! CallbackVerifier port - Server-side re-validation of redirect callbacks.
//!
//! Redirect callbacks travel through the payer's browser and carry no
//! signature, so their query string is attacker controlled. Before one can
//! move money in the ledger, the claim is confirmed directly with the
//! provider.

use async_trait::async_trait;

use crate::domain::payment::PaymentNotification;

/// Port for confirming a callback with the payment provider.
#[async_trait]
pub trait CallbackVerifier: Send + Sync {
    /// Returns `Ok(true)` when the provider reports the same reference and
    /// the same outcome as the callback, `Ok(false)` when it disagrees or
    /// does not know the order.
    async fn confirm(&self, notification: &PaymentNotification) -> Result<bool, VerifierError>;
}

/// Errors reaching the provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifierError {
    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider returned status {0}")]
    UnexpectedStatus(u16),

    #[error("provider response could not be decoded: {0}")]
    Decode(String),
}
