//! Provider webhook signature verification.
//!
//! The provider signs the raw request body with HMAC-SHA256 using the shared
//! webhook secret and sends the hex digest in a header, optionally prefixed
//! with `sha256=`. Verification always runs on the exact bytes received,
//! before any parsing.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Optional prefix in front of the lowercase hex digest.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Length of the opaque body reference written to logs.
const LOG_REFERENCE_LEN: usize = 12;

/// Verifier for provider webhook signatures.
///
/// Fails closed: a missing secret, a missing header or anything that does
/// not match byte for byte is a rejection, never a skip.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureAuthenticator;

impl SignatureAuthenticator {
    /// Verifies `signature_header` against HMAC-SHA256(`secret`, `raw_body`).
    pub fn verify(raw_body: &[u8], signature_header: Option<&str>, secret: &str) -> bool {
        let reference = body_reference(raw_body);

        if secret.is_empty() {
            tracing::error!(body_ref = %reference, "webhook secret not configured, rejecting");
            return false;
        }

        let provided = match signature_header.map(str::trim) {
            Some(header) if !header.is_empty() => strip_prefix(header),
            _ => {
                tracing::warn!(body_ref = %reference, "missing webhook signature");
                return false;
            }
        };

        let Some(expected) = compute_signature(secret, raw_body) else {
            return false;
        };
        let expected = hex::encode(expected);

        let valid = constant_time_compare(expected.as_bytes(), provided.as_bytes());
        if !valid {
            tracing::warn!(
                body_ref = %reference,
                provided_len = provided.len(),
                "webhook signature mismatch"
            );
        }
        valid
    }
}

/// Strips an optional `sha256=` prefix. Only the exact lowercase form is
/// recognized.
fn strip_prefix(header: &str) -> &str {
    header.strip_prefix(SIGNATURE_PREFIX).unwrap_or(header)
}

/// Computes the raw HMAC-SHA256 digest of the body.
fn compute_signature(secret: &str, payload: &[u8]) -> Option<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Performs constant-time comparison of two byte slices.
///
/// Slices of different length are rejected before comparing.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Short digest of the body, safe to log.
fn body_reference(raw_body: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(raw_body));
    digest[..LOG_REFERENCE_LEN].to_string()
}

/// Computes the hex signature a provider would send for `payload`.
///
/// Used by tests and local tooling that need to forge valid deliveries.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    compute_signature(secret, payload)
        .map(hex::encode)
        .unwrap_or_default()
}
