//! Error vocabulary shared across the crawl & parse engine.

use thiserror::Error;

/// Abstract failure kinds a fetch or parse attempt can resolve to.
///
/// The retry/dead-letter decision in the crawl and parse workers is a pure
/// function of `(kind, retry_count)` rather than string-matched exceptions.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Connection timeout, TLS handshake failure, 5xx, broker unavailable, HR timeout.
    #[error("transient error: {message}")]
    Transient { message: String },

    /// 4xx (except 429), DNS not-found, invalid scheme, size-cap exceeded.
    #[error("permanent error: {message}")]
    Permanent { message: String },

    /// HTTP 429, optionally carrying the server's `Retry-After` hint.
    #[error("rate limited{}", retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// Malformed body, missing linked resources, OCR failure.
    #[error("parse structural error: {message}")]
    ParseStructural { message: String },

    /// Blob store write/read failure.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Task was cancelled; not a failure, carries no retry semantics.
    #[error("cancelled")]
    Cancelled,

    /// Broker transport error (enqueue/dequeue round-trip failed).
    #[error("broker error: {message}")]
    Broker { message: String },

    /// Configuration is missing or self-contradictory.
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// Convenience alias used at every crate boundary in the engine.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    pub fn parse_structural(message: impl Into<String>) -> Self {
        Self::ParseStructural {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn broker(message: impl Into<String>) -> Self {
        Self::Broker {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this kind ever warrants a retry (as opposed to an immediate
    /// dead-letter, independent of `retry_count`).
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Transient { .. } => true,
            EngineError::Permanent { .. } => false,
            EngineError::RateLimited { .. } => true,
            EngineError::ParseStructural { .. } => true,
            EngineError::Storage { .. } => true,
            EngineError::Cancelled => false,
            EngineError::Broker { .. } => true,
            EngineError::Config { .. } => false,
        }
    }

    /// `delay_seconds = min(300, 60 * 2^retry_count)` unless this error
    /// carries a `Retry-After` hint, which is used as a floor instead.
    pub fn retry_delay_seconds(&self, retry_count: u32) -> u64 {
        let standard = 60u64.saturating_mul(1u64 << retry_count.min(32)).min(300);
        match self {
            EngineError::RateLimited {
                retry_after_secs: Some(secs),
            } => (*secs).max(standard),
            _ => standard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped_at_300() {
        let err = EngineError::transient("boom");
        assert_eq!(err.retry_delay_seconds(0), 60);
        assert_eq!(err.retry_delay_seconds(1), 120);
        assert_eq!(err.retry_delay_seconds(2), 240);
        assert_eq!(err.retry_delay_seconds(3), 300);
        assert_eq!(err.retry_delay_seconds(10), 300);
    }

    #[test]
    fn rate_limited_uses_retry_after_as_floor() {
        let err = EngineError::rate_limited(Some(500));
        assert_eq!(err.retry_delay_seconds(0), 500);
        let err = EngineError::rate_limited(Some(10));
        assert_eq!(err.retry_delay_seconds(3), 300);
    }

    #[test]
    fn permanent_and_cancelled_are_not_retryable() {
        assert!(!EngineError::permanent("nope").is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
        assert!(EngineError::transient("x").is_retryable());
    }
}
