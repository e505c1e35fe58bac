//! Rate limiter adapters.
//!
//! Implementations of the RateLimiter port.
//!
//! ## Available Adapters
//!
//! - `InMemoryRateLimiter` - Sliding-window limiter for a single process
//!
//! ## Usage
//!
//! ```ignore
//! use payguard::adapters::rate_limiter::{InMemoryRateLimiter, RateLimitConfig};
//!
//! let config = RateLimitConfig::default();
//! let limiter = Arc::new(InMemoryRateLimiter::new(config.eviction));
//! let sweeper = limiter.clone().spawn_sweeper(Duration::from_secs(60), shutdown_rx);
//! ```

mod config;
mod in_memory;

pub use config::{scopes, EvictionConfig, OtpChannel, RateLimitConfig};
pub use in_memory::InMemoryRateLimiter;
