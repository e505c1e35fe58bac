//! Rate limit configuration types.
//!
//! Named rules for every throttled entry point, plus eviction settings for
//! the in-memory bucket table. Defaults match the production deployment.
//!
//! Only the `payment_*` rules are used by the payment endpoints this crate
//! serves. The account lookup, OTP and session creation presets (and
//! [`RateLimitConfig::otp_quotas`]) are exported for the platform's other
//! routes, which are mounted by their own services.

use serde::{Deserialize, Serialize};

use crate::ports::{Quota, RateLimitKey, RateRule};

/// Key scopes used by the throttled entry points.
pub mod scopes {
    pub const AUTH_CHECK: &str = "auth:check";
    pub const SMS_SEND: &str = "sms:send";
    pub const SMS_PHONE: &str = "sms:phone";
    pub const WA_SEND: &str = "wa:send";
    pub const WA_PHONE: &str = "wa:phone";
    pub const PAYMENT_CREATE: &str = "geidea:create";
    pub const PAYMENT_APPLE: &str = "geidea:apple";
}

/// Complete rate limit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Account existence lookups, per IP.
    pub auth_check: RateRule,
    /// SMS OTP dispatch, per IP.
    pub sms_send: RateRule,
    /// SMS OTP dispatch, per destination phone.
    pub sms_phone: RateRule,
    /// WhatsApp OTP dispatch, per IP.
    pub wa_send: RateRule,
    /// WhatsApp OTP dispatch, per destination phone.
    pub wa_phone: RateRule,
    /// Payment session creation, per IP.
    pub payment_create: RateRule,
    /// Apple Pay session creation, per IP.
    pub payment_apple: RateRule,
    /// Provider webhooks, per source IP.
    pub payment_webhook: RateRule,
    /// Redirect callbacks, per client IP.
    pub payment_callback: RateRule,
    /// Any payment event, per merchant reference.
    pub payment_reference: RateRule,
    pub eviction: EvictionConfig,
}

/// Eviction of idle buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionConfig {
    /// Buckets idle for this many windows are removed.
    pub idle_multiplier: u32,
    /// Run an inline sweep every N checks.
    pub sweep_every: u64,
    /// Background sweeper period.
    pub sweep_interval_secs: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            idle_multiplier: 3,
            sweep_every: 1024,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let otp_per_ip = RateRule::per_minute(10).with_min_interval(1_000);
        let otp_per_phone = RateRule::per_minute(3).with_min_interval(5_000);

        Self {
            auth_check: RateRule::per_minute(60),
            sms_send: otp_per_ip,
            sms_phone: otp_per_phone,
            wa_send: otp_per_ip,
            wa_phone: otp_per_phone,
            payment_create: RateRule::per_minute(20).with_min_interval(300),
            payment_apple: RateRule::per_minute(15).with_min_interval(500),
            payment_webhook: RateRule::per_minute(120),
            payment_callback: RateRule::per_minute(30),
            payment_reference: RateRule::per_minute(30),
            eviction: EvictionConfig::default(),
        }
    }
}

/// OTP delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpChannel {
    Sms,
    WhatsApp,
}

impl RateLimitConfig {
    /// Quotas for one OTP dispatch: per caller IP first, then per phone.
    pub fn otp_quotas(&self, channel: OtpChannel, client_ip: &str, phone: &str) -> Vec<Quota> {
        let (ip_scope, ip_rule, phone_scope, phone_rule) = match channel {
            OtpChannel::Sms => (scopes::SMS_SEND, self.sms_send, scopes::SMS_PHONE, self.sms_phone),
            OtpChannel::WhatsApp => (scopes::WA_SEND, self.wa_send, scopes::WA_PHONE, self.wa_phone),
        };
        vec![
            Quota::new(RateLimitKey::new(ip_scope, client_ip), ip_rule),
            Quota::new(RateLimitKey::new(phone_scope, phone), phone_rule),
        ]
    }
}
