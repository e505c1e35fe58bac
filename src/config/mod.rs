//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `PAYGUARD` prefix and nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use payguard::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod error;
mod payment;
mod server;

pub use error::{ConfigError, ValidationError};
pub use payment::{PaymentConfig, ProviderSettings, RetrySettings};
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

use crate::adapters::rate_limiter::RateLimitConfig;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Webhook secret, provider API and entitlement retry settings
    pub payment: PaymentConfig,

    /// Named throttling rules and limiter eviction
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `PAYGUARD` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `PAYGUARD__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `PAYGUARD__PAYMENT__WEBHOOK_SECRET=...` -> `payment.webhook_secret = ...`
    /// - `PAYGUARD__RATE_LIMIT__PAYMENT_WEBHOOK__MAX=240` -> `rate_limit.payment_webhook.max = 240`
    ///
    /// A rule overridden from the environment must set both `window_ms` and `max`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("PAYGUARD")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.payment.validate(self.is_production())?;

        let eviction = &self.rate_limit.eviction;
        if eviction.idle_multiplier == 0 || eviction.sweep_every == 0 {
            return Err(ValidationError::InvalidEviction);
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn set_minimal_env() {
        env::set_var("PAYGUARD__PAYMENT__WEBHOOK_SECRET", "whk_test_secret");
    }

    fn clear_env() {
        for key in [
            "PAYGUARD__PAYMENT__WEBHOOK_SECRET",
            "PAYGUARD__PAYMENT__SIGNATURE_HEADER",
            "PAYGUARD__SERVER__PORT",
            "PAYGUARD__SERVER__ENVIRONMENT",
            "PAYGUARD__RATE_LIMIT__PAYMENT_WEBHOOK__WINDOW_MS",
            "PAYGUARD__RATE_LIMIT__PAYMENT_WEBHOOK__MAX",
            "PAYGUARD__RATE_LIMIT__PAYMENT_WEBHOOK__MIN_INTERVAL_MS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.payment.webhook_secret.expose_secret(), "whk_test_secret");
        assert_eq!(config.payment.signature_header, "x-signature");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_webhook_secret_fails_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        assert!(AppConfig::load().is_err());
    }

    #[test]
    fn test_server_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
    }

    #[test]
    fn test_is_production() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("PAYGUARD__SERVER__ENVIRONMENT", "production");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_production());
    }

    #[test]
    fn test_custom_server_port() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("PAYGUARD__SERVER__PORT", "3000");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_rate_rule_override() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("PAYGUARD__RATE_LIMIT__PAYMENT_WEBHOOK__WINDOW_MS", "30000");
        env::set_var("PAYGUARD__RATE_LIMIT__PAYMENT_WEBHOOK__MAX", "10");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        let rule = config.rate_limit.payment_webhook;
        assert_eq!(rule.window_ms(), 30_000);
        assert_eq!(rule.max(), 10);
        assert_eq!(rule.min_interval_ms(), 0);
        assert_eq!(
            config.rate_limit.auth_check,
            RateLimitConfig::default().auth_check
        );
    }

    #[test]
    fn test_zero_max_rule_is_rejected_at_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("PAYGUARD__RATE_LIMIT__PAYMENT_WEBHOOK__WINDOW_MS", "30000");
        env::set_var("PAYGUARD__RATE_LIMIT__PAYMENT_WEBHOOK__MAX", "0");
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_err());
    }
}
