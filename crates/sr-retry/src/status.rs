//! Retryable HTTP status classification.

/// True when an upstream HTTP status warrants a retry.
///
/// The retryable set is {408, 409, 425, 429} plus every 5xx. Everything
/// else (including all other 4xx) is a terminal caller error.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 425 | 429) || status >= 500
}
