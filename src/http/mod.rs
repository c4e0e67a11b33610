//! HTTP download support with retry and error classification.

mod client;
mod retry;

pub use client::HttpClient;
pub use retry::{MAX_ATTEMPTS, NonRetryableError, RETRY_DELAY};
