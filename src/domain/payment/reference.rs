//! Merchant reference value object.
//!
//! The merchant reference is the identifier we hand to the provider when a
//! payment session is created. It is the ledger key, and for bulk
//! subscription purchases it also names the paying entity:
//! `BULK_<payerId>_<suffix>` or the older `BULK<payerId>_<suffix>`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

const BULK_PREFIX: &str = "BULK";

/// Non-empty merchant reference as sent back by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MerchantReference(String);

impl MerchantReference {
    /// Creates a reference, trimming surrounding whitespace.
    pub fn new(value: impl AsRef<str>) -> Result<Self, ValidationError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ValidationError::empty_field("merchantReferenceId"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extracts the paying entity from a bulk reference.
    ///
    /// Returns `None` when the reference does not follow the bulk format.
    pub fn payer_id(&self) -> Option<&str> {
        let rest = self.0.strip_prefix(BULK_PREFIX)?;
        let rest = rest.strip_prefix('_').unwrap_or(rest);
        let (payer, suffix) = rest.split_once('_')?;

        if payer.is_empty() || suffix.is_empty() {
            return None;
        }
        Some(payer)
    }
}

impl fmt::Display for MerchantReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MerchantReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
