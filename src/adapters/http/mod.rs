//! HTTP adapters - REST API implementations.
//!
//! `payment` exposes the provider notification endpoints; `middleware`
//! holds the throttling layer shared with the other abuse-prone routes.

pub mod middleware;
pub mod payment;

use std::time::Duration;

use axum::http::HeaderName;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

// Re-export key types for convenience
pub use payment::payment_router;
pub use payment::PaymentAppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Build the full application router mounted under `/api`.
///
/// Requests get an `x-request-id` (generated when absent and echoed back),
/// are traced, and are cut off after `request_timeout`.
pub fn app_router(state: PaymentAppState, request_timeout: Duration) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::new(request_id));

    Router::new()
        .nest("/api", payment_router())
        .layer(middleware)
        .with_state(state)
}
