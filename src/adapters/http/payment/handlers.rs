//! HTTP handlers for payment notification endpoints.
//!
//! Both handlers hand the raw request to [`PaymentReconciler::ingest`] and
//! translate the outcome. The webhook answers the provider; the callback
//! answers the payer's browser with a page state.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Json, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use secrecy::{ExposeSecret, SecretString};

use crate::adapters::http::middleware::{client_ip, rate_limit_response};
use crate::domain::payment::{PaymentEvent, PaymentReconciler, ReconcileError};
use crate::ports::RateDecision;

use super::dto::{CallbackPage, ErrorResponse, WebhookAck};

/// Default header carrying the webhook signature.
pub const DEFAULT_SIGNATURE_HEADER: &str = "x-signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for payment endpoints.
#[derive(Clone)]
pub struct PaymentAppState {
    pub reconciler: Arc<PaymentReconciler>,
    pub webhook_secret: Arc<SecretString>,
    pub signature_header: HeaderName,
}

impl PaymentAppState {
    pub fn new(reconciler: Arc<PaymentReconciler>, webhook_secret: SecretString) -> Self {
        Self {
            reconciler,
            webhook_secret: Arc::new(webhook_secret),
            signature_header: HeaderName::from_static(DEFAULT_SIGNATURE_HEADER),
        }
    }

    pub fn with_signature_header(mut self, header: HeaderName) -> Self {
        self.signature_header = header;
        self
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/payments/webhook - Provider server-to-server notification
pub async fn handle_webhook(
    State(state): State<PaymentAppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, PaymentApiError> {
    let signature = headers
        .get(&state.signature_header)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let event = PaymentEvent::webhook(body.to_vec(), signature)
        .with_client_ip(client_ip(&headers, connect_info.as_ref()));

    let outcome = state
        .reconciler
        .ingest(&event, state.webhook_secret.expose_secret())
        .await?;

    Ok(Json(WebhookAck::from(outcome)))
}

/// GET /api/payments/callback - Payer redirected back from the hosted page
///
/// Always answers with a page state, using the error's status code when
/// reconciliation did not go through.
pub async fn handle_callback(
    State(state): State<PaymentAppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let event = PaymentEvent::redirect_callback(query.unwrap_or_default())
        .with_client_ip(client_ip(&headers, connect_info.as_ref()));

    match state
        .reconciler
        .ingest(&event, state.webhook_secret.expose_secret())
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(CallbackPage::from(outcome))).into_response(),
        Err(err) => {
            let mut response = (err.status_code(), Json(CallbackPage::from(&err))).into_response();
            if let ReconcileError::Throttled { retry_after_ms } = err {
                let secs = RateDecision::deny(retry_after_ms).retry_after_secs();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
            response
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts reconciliation errors to HTTP responses.
#[derive(Debug)]
pub struct PaymentApiError(ReconcileError);

impl From<ReconcileError> for PaymentApiError {
    fn from(err: ReconcileError) -> Self {
        Self(err)
    }
}

impl IntoResponse for PaymentApiError {
    fn into_response(self) -> Response {
        if let ReconcileError::Throttled { retry_after_ms } = self.0 {
            return rate_limit_response(&RateDecision::deny(retry_after_ms));
        }

        let error = ErrorResponse::new(self.0.code(), self.0.to_string());
        (self.0.status_code(), Json(error)).into_response()
    }
}
