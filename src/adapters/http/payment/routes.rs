//! Axum router configuration for payment notification endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{handle_callback, handle_webhook, PaymentAppState};

/// Create the payment notification router.
///
/// # Routes
/// - `POST /webhook` - Provider webhook (signature verified)
/// - `GET /callback` - Payer redirect (re-validated with the provider)
pub fn payment_routes() -> Router<PaymentAppState> {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/callback", get(handle_callback))
}

/// Create the complete payment module router, suitable for mounting at `/api`.
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .nest("/api", payment_router())
///     .with_state(app_state);
/// ```
pub fn payment_router() -> Router<PaymentAppState> {
    Router::new().nest("/payments", payment_routes())
}
