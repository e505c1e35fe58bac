//! Event fingerprints used as the deduplication guard.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable identity of one provider notification.
///
/// SHA-256 over the length-prefixed `(external_id, response_code, status)`
/// triple, hex encoded. Length prefixes keep `("ab", "c")` and `("a", "bc")`
/// apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventFingerprint(String);

impl EventFingerprint {
    pub fn compute(external_id: &str, response_code: &str, status: &str) -> Self {
        let mut hasher = Sha256::new();
        for part in [external_id, response_code, status] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
