//! HTTP adapter for payment provider notifications.
//!
//! - `POST /api/payments/webhook` - signed server-to-server notification
//! - `GET /api/payments/callback` - payer redirect back from the hosted page

mod dto;
mod handlers;
mod routes;

pub use dto::{CallbackPage, ErrorResponse, PageState, WebhookAck};
pub use handlers::{
    handle_callback, handle_webhook, PaymentApiError, PaymentAppState, DEFAULT_SIGNATURE_HEADER,
};
pub use routes::{payment_router, payment_routes};
