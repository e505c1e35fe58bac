//! Payment module - Authenticating and reconciling provider notifications.
//!
//! # Components
//!
//! - `SignatureAuthenticator` - HMAC-SHA256 check of webhook bodies
//! - `EventClassifier` - Provider vocabulary to [`PaymentStatus`]
//! - `PaymentRecord` / [`fold`] - The ledger record and its transition rules
//! - `PaymentReconciler` - The end-to-end ingest pipeline

mod classifier;
mod errors;
mod event;
mod fingerprint;
mod reconciler;
mod record;
mod reference;
mod signature;
mod status;

pub use classifier::{EventClassifier, APPROVED_RESPONSE_CODE};
pub use errors::ReconcileError;
pub use event::{EventSource, PaymentEvent, PaymentNotification};
pub use fingerprint::EventFingerprint;
pub use reconciler::{
    EntitlementDelivery, IngestOutcome, PaymentReconciler, ReconcilerConfig, UNKNOWN_CLIENT,
};
pub use record::{fold, PaymentMutation, PaymentRecord, Transition, UpsertOutcome};
pub use reference::MerchantReference;
pub use signature::{sign_payload, SignatureAuthenticator};
pub use status::PaymentStatus;
