//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Listen host must be an IP address: {0}")]
    InvalidHost(String),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid signature header name: {0}")]
    InvalidSignatureHeader(String),

    #[error("Ledger timeout must be between 1 ms and 60 s")]
    InvalidLedgerTimeout,

    #[error("Entitlement timeout must be between 1 ms and 60 s")]
    InvalidEntitlementTimeout,

    #[error("Invalid provider base URL")]
    InvalidProviderUrl,

    #[error("Provider base URL must use HTTPS in production")]
    ProviderUrlMustBeHttps,

    #[error("Provider public key and API password must be set together with the base URL")]
    IncompleteProviderCredentials,

    #[error("Entitlement retry settings must be non-zero")]
    InvalidRetrySettings,

    #[error("Granted months must be between 1 and 120")]
    InvalidGrantMonths,

    #[error("Rate limiter eviction settings must be non-zero")]
    InvalidEviction,
}
