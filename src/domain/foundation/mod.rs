//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, the state machine trait and validation errors
//! used across the payment domain.

mod errors;
mod state_machine;
mod timestamp;

pub use errors::ValidationError;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
