pub mod retry;

pub use retry::{calculate_backoff, retry_with_backoff, RetryConfig};
