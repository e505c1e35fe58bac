//! Payment provider adapters.
//!
//! - `HttpCallbackVerifier` - Re-validates redirect callbacks via the order API
//! - `StaticCallbackVerifier` - Fixed answer for tests and local runs

mod http_verifier;
mod static_verifier;

pub use http_verifier::{HttpCallbackVerifier, ProviderApiConfig};
pub use static_verifier::StaticCallbackVerifier;
