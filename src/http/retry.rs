//! Classification of download failures into retryable and permanent ones.

use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;

/// Maximum number of attempts for a download.
pub const MAX_ATTEMPTS: usize = 3;

/// Default delay between attempts.
pub const RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Download failures that another attempt cannot fix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonRetryableError {
    /// HTTP 401
    Unauthorized(String),
    /// HTTP 403
    Forbidden(String),
    /// HTTP 404
    NotFound(String),
    /// Any other 4xx status
    ClientError(StatusCode, String),
}

impl fmt::Display for NonRetryableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NonRetryableError::Unauthorized(url) => {
                write!(f, "Authentication required to download {}", url)
            }
            NonRetryableError::Forbidden(url) => write!(f, "Access to {} is forbidden", url),
            NonRetryableError::NotFound(url) => write!(f, "Archive not found: {}", url),
            NonRetryableError::ClientError(status, url) => {
                write!(f, "Request for {} failed with HTTP {}", url, status.as_u16())
            }
        }
    }
}

impl std::error::Error for NonRetryableError {}

/// Returns the permanent failure an HTTP status represents, if any.
/// 5xx responses and transport errors are worth retrying.
pub fn classify_status(status: StatusCode, url: &str) -> Option<NonRetryableError> {
    let url = url.to_string();
    match status {
        StatusCode::UNAUTHORIZED => Some(NonRetryableError::Unauthorized(url)),
        StatusCode::FORBIDDEN => Some(NonRetryableError::Forbidden(url)),
        StatusCode::NOT_FOUND => Some(NonRetryableError::NotFound(url)),
        // 408 and 429 are transient by definition
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => None,
        s if s.is_client_error() => Some(NonRetryableError::ClientError(s, url)),
        _ => None,
    }
}

/// Converts an error from `error_for_status()` into an `anyhow::Error`,
/// wrapping permanent failures in [`NonRetryableError`].
pub fn check_retryable(error: reqwest::Error, url: &str) -> anyhow::Error {
    match error.status().and_then(|s| classify_status(s, url)) {
        Some(permanent) => anyhow::Error::from(permanent),
        None => anyhow::Error::from(error),
    }
}

pub fn is_retryable(error: &anyhow::Error) -> bool {
    error.downcast_ref::<NonRetryableError>().is_none()
}
