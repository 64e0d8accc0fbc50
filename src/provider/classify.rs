//! Heuristic error classification shared by all adapters
//!
//! Remote vendors disagree on error formats, so failures are classified from
//! message text and status codes into a fixed taxonomy. The kind drives retry
//! and hedging decisions and is surfaced as a stable error code to callers.

use serde::{Deserialize, Serialize};

/// Fixed error taxonomy attached to every failed generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Overloaded,
    Unavailable,
    Timeout,
    RateLimited,
    InvalidKey,
    SafetyBlocked,
    Connection,
    Unknown,
}

/// Keywords in an error message that indicate a transient, retryable failure
const RETRYABLE_KEYWORDS: [&str; 10] = [
    "server disconnected",
    "connection reset",
    "connection refused",
    "timeout",
    "network",
    "unavailable",
    "overloaded",
    "503",
    "502",
    "504",
];

const SAFETY_KEYWORDS: [&str; 7] = [
    "safety",
    "blocked",
    "content_policy",
    "content policy",
    "sensitive",
    "moderation",
    "violation",
];

impl ErrorKind {
    /// Classify an error message into a taxonomy kind
    pub fn classify(error: &str) -> ErrorKind {
        let lower = error.to_lowercase();

        if lower.contains("overloaded") || (lower.contains("503") && lower.contains("unavailable"))
        {
            ErrorKind::Overloaded
        } else if lower.contains("503") || lower.contains("unavailable") {
            ErrorKind::Unavailable
        } else if lower.contains("timeout") || lower.contains("timed out") {
            ErrorKind::Timeout
        } else if lower.contains("quota") || lower.contains("rate") {
            ErrorKind::RateLimited
        } else if lower.contains("api_key") || lower.contains("api key") || lower.contains("invalid")
        {
            ErrorKind::InvalidKey
        } else if SAFETY_KEYWORDS.iter().any(|k| lower.contains(k)) {
            ErrorKind::SafetyBlocked
        } else if lower.contains("server disconnected") || lower.contains("connection") {
            ErrorKind::Connection
        } else {
            ErrorKind::Unknown
        }
    }

    /// Only transient kinds are retried or hedged with the same prompt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Overloaded
                | ErrorKind::Unavailable
                | ErrorKind::Timeout
                | ErrorKind::Connection
        )
    }

    /// Stable code string for user-visible errors and notifications
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Overloaded => "overloaded",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::InvalidKey => "invalid_key",
            ErrorKind::SafetyBlocked => "safety_blocked",
            ErrorKind::Connection => "connection",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// Check if an error message indicates a transient failure worth retrying
pub fn is_retryable_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    RETRYABLE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Check if an error message indicates a content/safety-policy rejection
pub fn is_safety_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    SAFETY_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_taxonomy() {
        assert_eq!(ErrorKind::classify("model is overloaded"), ErrorKind::Overloaded);
        assert_eq!(
            ErrorKind::classify("HTTP 503 service unavailable"),
            ErrorKind::Overloaded
        );
        assert_eq!(ErrorKind::classify("service unavailable"), ErrorKind::Unavailable);
        assert_eq!(ErrorKind::classify("request timeout"), ErrorKind::Timeout);
        assert_eq!(ErrorKind::classify("quota exceeded"), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::classify("invalid api_key"), ErrorKind::InvalidKey);
        assert_eq!(
            ErrorKind::classify("blocked by safety filter"),
            ErrorKind::SafetyBlocked
        );
        assert_eq!(ErrorKind::classify("connection reset by peer"), ErrorKind::Connection);
        assert_eq!(ErrorKind::classify("something odd"), ErrorKind::Unknown);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Overloaded.is_retryable());
        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::Connection.is_retryable());
        assert!(!ErrorKind::SafetyBlocked.is_retryable());
        assert!(!ErrorKind::InvalidKey.is_retryable());
        assert!(!ErrorKind::RateLimited.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn test_retryable_keywords() {
        assert!(is_retryable_error("upstream returned 502"));
        assert!(is_retryable_error("Server Disconnected"));
        assert!(!is_retryable_error("invalid api key"));
    }

    #[test]
    fn test_safety_keywords() {
        assert!(is_safety_error("violates content policy"));
        assert!(is_safety_error("flagged by moderation"));
        assert!(!is_safety_error("timeout"));
    }
}
