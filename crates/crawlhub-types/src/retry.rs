//! Delayed-retry and dead-letter envelopes around a [`FrontierURL`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::frontier::FrontierURL;

/// A `FrontierURL` waiting for `retry_after` to elapse before it is promoted
/// back onto the frontier. Ordered by `retry_after` ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryEntry {
    pub url: FrontierURL,
    pub retry_after: DateTime<Utc>,
}

impl RetryEntry {
    pub fn new(url: FrontierURL, delay_secs: u64) -> Self {
        Self {
            retry_after: Utc::now() + Duration::seconds(delay_secs as i64),
            url,
        }
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.retry_after <= now
    }
}

/// A `FrontierURL` that exceeded its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub url: FrontierURL,
    pub died_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(url: FrontierURL, reason: impl Into<String>) -> Self {
        Self {
            url,
            died_at: Utc::now(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn retry_entry_not_ready_immediately_for_nonzero_delay() {
        let f = FrontierURL::new(Url::parse("https://example.com/").unwrap(), "job-1");
        let entry = RetryEntry::new(f, 60);
        assert!(!entry.is_ready(Utc::now()));
        assert!(entry.is_ready(Utc::now() + Duration::seconds(61)));
    }

    #[test]
    fn retry_entry_ready_immediately_for_zero_delay() {
        let f = FrontierURL::new(Url::parse("https://example.com/").unwrap(), "job-1");
        let entry = RetryEntry::new(f, 0);
        assert!(entry.is_ready(Utc::now()));
    }
}
