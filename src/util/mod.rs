//! Small control primitives shared by the rest of the daemon.

pub mod address;
pub mod debounce;
pub mod rate_limit;
pub mod retry;
pub mod sanitize;

pub use address::is_valid_address;
pub use debounce::DebounceGuard;
pub use rate_limit::RateLimiter;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use sanitize::sanitize_commit_message;
