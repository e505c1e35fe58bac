//! Payment configuration

use std::time::Duration;

use axum::http::HeaderName;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::adapters::entitlement::RetrierConfig;
use crate::adapters::provider::ProviderApiConfig;
use crate::adapters::rate_limiter::RateLimitConfig;
use crate::domain::payment::ReconcilerConfig;
use crate::ports::DEFAULT_GRANT_MONTHS;

use super::error::ValidationError;

/// Payment configuration (provider webhook and callback handling)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Shared secret the provider signs webhook bodies with
    pub webhook_secret: SecretString,

    /// Header carrying the webhook signature
    #[serde(default = "default_signature_header")]
    pub signature_header: String,

    /// Upper bound on each ledger call, in milliseconds
    #[serde(default = "default_ledger_timeout_ms")]
    pub ledger_timeout_ms: u64,

    /// Upper bound on the inline entitlement call, in milliseconds
    #[serde(default = "default_entitlement_timeout_ms")]
    pub entitlement_timeout_ms: u64,

    /// Subscription months granted per completed payment
    #[serde(default = "default_grant_months")]
    pub grant_months: u32,

    /// Provider order API used to re-validate redirect callbacks
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Entitlement retry worker
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Provider API settings. All of `base_url`, `public_key` and
/// `api_password` must be present for callbacks to be re-validated.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub base_url: Option<String>,
    pub public_key: Option<String>,
    pub api_password: Option<SecretString>,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

/// Entitlement retry worker settings
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl PaymentConfig {
    /// Reconciler settings, taking per-caller rules from the rate limit section.
    pub fn reconciler_config(&self, limits: &RateLimitConfig) -> ReconcilerConfig {
        ReconcilerConfig {
            ledger_timeout: Duration::from_millis(self.ledger_timeout_ms),
            entitlement_timeout: Duration::from_millis(self.entitlement_timeout_ms),
            webhook_rule: limits.payment_webhook,
            callback_rule: limits.payment_callback,
            reference_rule: limits.payment_reference,
            grant_months: self.grant_months,
        }
    }

    pub fn retrier_config(&self) -> RetrierConfig {
        RetrierConfig {
            poll_interval: Duration::from_millis(self.retry.poll_interval_ms),
            batch_size: self.retry.batch_size,
            max_attempts: self.retry.max_attempts,
        }
    }

    /// Provider API settings, or `None` when callbacks cannot be re-validated.
    pub fn provider_api(&self) -> Option<ProviderApiConfig> {
        let p = &self.provider;
        match (&p.base_url, &p.public_key, &p.api_password) {
            (Some(base_url), Some(public_key), Some(api_password)) => Some(ProviderApiConfig {
                base_url: base_url.clone(),
                public_key: public_key.clone(),
                api_password: api_password.clone(),
                timeout: Duration::from_millis(p.timeout_ms),
            }),
            _ => None,
        }
    }

    /// Validate payment configuration
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.webhook_secret.expose_secret().trim().is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__WEBHOOK_SECRET"));
        }
        if HeaderName::from_bytes(self.signature_header.as_bytes()).is_err() {
            return Err(ValidationError::InvalidSignatureHeader(
                self.signature_header.clone(),
            ));
        }
        if self.ledger_timeout_ms == 0 || self.ledger_timeout_ms > 60_000 {
            return Err(ValidationError::InvalidLedgerTimeout);
        }
        if self.entitlement_timeout_ms == 0 || self.entitlement_timeout_ms > 60_000 {
            return Err(ValidationError::InvalidEntitlementTimeout);
        }
        if self.grant_months == 0 || self.grant_months > 120 {
            return Err(ValidationError::InvalidGrantMonths);
        }
        if self.retry.poll_interval_ms == 0
            || self.retry.batch_size == 0
            || self.retry.max_attempts == 0
        {
            return Err(ValidationError::InvalidRetrySettings);
        }
        self.provider.validate(production)
    }
}

impl ProviderSettings {
    fn validate(&self, production: bool) -> Result<(), ValidationError> {
        let Some(base_url) = &self.base_url else {
            return Ok(());
        };

        let parsed = url::Url::parse(base_url).map_err(|_| ValidationError::InvalidProviderUrl)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidProviderUrl);
        }
        if production && parsed.scheme() != "https" {
            return Err(ValidationError::ProviderUrlMustBeHttps);
        }

        let has_key = self.public_key.as_deref().is_some_and(|k| !k.is_empty());
        let has_password = self
            .api_password
            .as_ref()
            .is_some_and(|p| !p.expose_secret().is_empty());
        if !has_key || !has_password {
            return Err(ValidationError::IncompleteProviderCredentials);
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            public_key: None,
            api_password: None,
            timeout_ms: default_provider_timeout_ms(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_signature_header() -> String {
    "x-signature".to_string()
}

fn default_ledger_timeout_ms() -> u64 {
    5_000
}

fn default_entitlement_timeout_ms() -> u64 {
    5_000
}

fn default_grant_months() -> u32 {
    DEFAULT_GRANT_MONTHS
}

fn default_provider_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_batch_size() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    8
}
