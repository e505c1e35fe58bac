//! Provider order lookup over HTTP.
//!
//! Confirms a redirect callback by fetching the order from the provider
//! (`GET {base_url}/pgw/api/v1/direct/order/{orderId}`, basic auth with the
//! merchant public key and API password) and comparing what the provider
//! reports with what the browser claimed.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::payment::{EventClassifier, PaymentNotification};
use crate::ports::{CallbackVerifier, VerifierError};

const ORDER_PATH: &str = "/pgw/api/v1/direct/order";

/// Connection settings for the provider API.
#[derive(Clone)]
pub struct ProviderApiConfig {
    pub base_url: String,
    pub public_key: String,
    pub api_password: SecretString,
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderApiConfig")
            .field("base_url", &self.base_url)
            .field("public_key", &self.public_key)
            .field("api_password", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Callback verifier backed by the provider's order API.
pub struct HttpCallbackVerifier {
    config: ProviderApiConfig,
    http_client: reqwest::Client,
}

impl HttpCallbackVerifier {
    pub fn new(config: ProviderApiConfig) -> Result<Self, VerifierError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VerifierError::Transport(e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn order_url(&self, order_id: &str) -> String {
        format!(
            "{}{}/{}",
            self.config.base_url.trim_end_matches('/'),
            ORDER_PATH,
            order_id
        )
    }
}

/// True when the provider's view agrees with the callback on reference and
/// outcome.
fn provider_agrees(callback: &PaymentNotification, provider: &PaymentNotification) -> bool {
    if callback.merchant_reference_id != provider.merchant_reference_id {
        return false;
    }
    let claimed = EventClassifier::classify(
        &callback.provider_response_code,
        &callback.provider_status,
    );
    let actual = EventClassifier::classify(
        &provider.provider_response_code,
        &provider.provider_status,
    );
    claimed == actual
}

#[async_trait]
impl CallbackVerifier for HttpCallbackVerifier {
    async fn confirm(&self, notification: &PaymentNotification) -> Result<bool, VerifierError> {
        let url = self.order_url(&notification.external_id);

        let response = self
            .http_client
            .get(&url)
            .basic_auth(
                &self.config.public_key,
                Some(self.config.api_password.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| VerifierError::Transport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::warn!(order_id = %notification.external_id, "provider does not know callback order");
            return Ok(false);
        }

        if !response.status().is_success() {
            return Err(VerifierError::UnexpectedStatus(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| VerifierError::Transport(e.to_string()))?;
        let provider_view = match PaymentNotification::from_json(&body) {
            Ok(view) => view,
            Err(e) => return Err(VerifierError::Decode(e.to_string())),
        };

        let agrees = provider_agrees(notification, &provider_view);
        if !agrees {
            tracing::warn!(
                order_id = %notification.external_id,
                claimed_status = %notification.provider_status,
                provider_status = %provider_view.provider_status,
                "provider disagrees with redirect callback"
            );
        }
        Ok(agrees)
    }
}
