//! Per-client rate limiting.
//!
//! Token buckets keyed by client identity (normalized IP), refilled in whole
//! windows. Applied as the outermost admission middleware so rejected
//! clients never reach authentication or the messaging session.

pub mod ip;
pub mod limiter;
pub mod middleware;

pub use ip::{extract_client_ip, normalize_ip};
pub use limiter::{RateLimitConfig, RateLimitResult, RateLimiter};
pub use middleware::rate_limit_by_ip;
