//! Fetch error taxonomy
//!
//! Every adapter failure is mapped onto one of these variants. The rate
//! limiter retries the retryable ones; the fetcher absorbs the rest into
//! the pass summary.

use robodigest_common::errors::AppError;
use std::time::Duration;
use thiserror::Error;

/// Longest body excerpt kept on a malformed-response error
pub const BODY_SAMPLE_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network error from {provider}: {message}")]
    TransientNetwork { provider: String, message: String },

    #[error("rate limited by {provider}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("malformed response from {provider}: {message}")]
    MalformedResponse {
        provider: String,
        message: String,
        sample: String,
    },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("{provider} returned status {status}: {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] AppError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn transient(provider: &str, message: impl Into<String>) -> Self {
        FetchError::TransientNetwork {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn rate_limited(provider: &str) -> Self {
        FetchError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
        }
    }

    /// Malformed body; the sample is cut to [`BODY_SAMPLE_CHARS`]
    pub fn malformed(provider: &str, message: impl Into<String>, body: &str) -> Self {
        FetchError::MalformedResponse {
            provider: provider.to_string(),
            message: message.into(),
            sample: body_sample(body),
        }
    }

    pub fn upstream(provider: &str, status: u16, message: impl Into<String>) -> Self {
        FetchError::Upstream {
            provider: provider.to_string(),
            status,
            message: message.into(),
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(provider, status.as_u16(), err.to_string());
        }
        let message = error_chain(&err);
        if err.is_decode() {
            return FetchError::malformed(provider, message, "");
        }
        FetchError::transient(provider, message)
    }

    /// Map a non-success HTTP status onto the taxonomy.
    ///
    /// 412 is the video platform's anti-scraping answer and is treated
    /// like 429.
    pub fn from_status(provider: &str, status: u16, message: impl Into<String>) -> Self {
        match status {
            429 | 412 => FetchError::rate_limited(provider),
            408 | 500..=599 => FetchError::transient(provider, message),
            _ => FetchError::upstream(provider, status, message),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::TransientNetwork { .. } | FetchError::RateLimited { .. }
        )
    }

    /// Per-attempt backoff unit, in seconds, for retryable errors
    pub fn backoff_base(&self) -> Option<u64> {
        match self {
            FetchError::TransientNetwork { .. } => Some(2),
            FetchError::RateLimited { .. } => Some(5),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    /// Short label for metrics and summaries
    pub fn label(&self) -> &'static str {
        match self {
            FetchError::TransientNetwork { .. } => "transient_network",
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::MalformedResponse { .. } => "malformed_response",
            FetchError::ValidationFailed(_) => "validation_failed",
            FetchError::Upstream { .. } => "upstream",
            FetchError::Storage(_) => "storage",
            FetchError::Config(_) => "config",
            FetchError::Cancelled => "cancelled",
        }
    }
}

/// Render an error with its sources, outermost first
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Cut a response body down to a loggable excerpt on a char boundary
pub fn body_sample(body: &str) -> String {
    match body.char_indices().nth(BODY_SAMPLE_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            FetchError::from_status("video", 412, "blocked"),
            FetchError::RateLimited { .. }
        ));
        assert!(matches!(
            FetchError::from_status("arxiv", 503, "down"),
            FetchError::TransientNetwork { .. }
        ));
        assert!(matches!(
            FetchError::from_status("github", 404, "missing"),
            FetchError::Upstream { status: 404, .. }
        ));
    }

    #[test]
    fn test_retry_classification() {
        assert!(FetchError::rate_limited("newsapi").is_retryable());
        assert_eq!(FetchError::rate_limited("newsapi").backoff_base(), Some(5));
        assert_eq!(FetchError::transient("rss", "reset").backoff_base(), Some(2));
        assert!(!FetchError::ValidationFailed("empty title".into()).is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
    }

    #[test]
    fn test_body_sample_truncates_on_char_boundary() {
        let body = "机".repeat(300);
        let sample = body_sample(&body);
        assert_eq!(sample.chars().count(), BODY_SAMPLE_CHARS + 3);
        assert_eq!(body_sample("short"), "short");
    }
}
