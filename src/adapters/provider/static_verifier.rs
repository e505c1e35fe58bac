//! Callback verifier with a fixed answer, for tests and local runs.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::domain::payment::PaymentNotification;
use crate::ports::{CallbackVerifier, VerifierError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Confirm,
    Reject,
    Unavailable,
}

/// Verifier that always gives the same answer.
#[derive(Debug)]
pub struct StaticCallbackVerifier {
    answer: Answer,
    calls: AtomicU32,
}

impl StaticCallbackVerifier {
    fn with_answer(answer: Answer) -> Self {
        Self {
            answer,
            calls: AtomicU32::new(0),
        }
    }

    pub fn confirming() -> Self {
        Self::with_answer(Answer::Confirm)
    }

    /// Rejects every callback. Used when no provider API is configured.
    pub fn rejecting() -> Self {
        Self::with_answer(Answer::Reject)
    }

    pub fn unavailable() -> Self {
        Self::with_answer(Answer::Unavailable)
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallbackVerifier for StaticCallbackVerifier {
    async fn confirm(&self, _notification: &PaymentNotification) -> Result<bool, VerifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            Answer::Confirm => Ok(true),
            Answer::Reject => Ok(false),
            Answer::Unavailable => Err(VerifierError::Transport(
                "provider unavailable".to_string(),
            )),
        }
    }
}
