//! Severity classification for caught errors.
//!
//! Classification is a pure function over the error's type name and message.
//! Keyword lists are checked in priority order critical > high > medium >
//! low; the first matching bucket wins. Matching is case-insensitive on
//! both inputs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Keywords that indicate the process itself is compromised.
const CRITICAL_KEYWORDS: &[&str] = &[
    "memoryerror",
    "systemexit",
    "keyboardinterrupt",
    "out of memory",
    "allocation failed",
];

/// Keywords that indicate an authentication or authorization failure.
const HIGH_KEYWORDS: &[&str] = &[
    "authentication",
    "unauthorized",
    "forbidden",
    "permission denied",
    "invalid credentials",
    "api key",
    "access denied",
];

/// Keywords that indicate a transient infrastructure failure.
const MEDIUM_KEYWORDS: &[&str] = &[
    "timeout",
    "connection",
    "network",
    "unavailable",
    "service",
    "rate limit",
    "quota exceeded",
];

/// Coarse severity bucket assigned to an error.
///
/// Ordering follows severity: `Critical` is the greatest variant, so
/// comparisons like `severity >= Severity::High` read naturally.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Default bucket for unrecognized errors.
    Low,
    /// Transient infrastructure failure (timeouts, connectivity, rate
    /// limits). Retryable.
    Medium,
    /// Authentication or authorization failure. Not retryable.
    High,
    /// Process-level failure. Not retryable.
    Critical,
}

impl Severity {
    /// Whether the retry executor should attempt the operation again.
    ///
    /// Transient (`Medium`) and unclassified (`Low`) errors are retried;
    /// authentication failures and process-level errors are surfaced
    /// immediately.
    pub fn is_retryable(self) -> bool {
        matches!(self, Severity::Medium | Severity::Low)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Classify an error by its type name and message.
///
/// This is a pure function: the same inputs always produce the same bucket.
pub fn classify(error_type: &str, message: &str) -> Severity {
    let haystack = format!("{} {}", error_type, message).to_lowercase();

    if contains_any(&haystack, CRITICAL_KEYWORDS) {
        Severity::Critical
    } else if contains_any(&haystack, HIGH_KEYWORDS) {
        Severity::High
    } else if contains_any(&haystack, MEDIUM_KEYWORDS) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Classify a concrete error value using its static type name and display
/// message.
pub fn classify_error<E: std::error::Error>(error: &E) -> Severity {
    classify(std::any::type_name::<E>(), &error.to_string())
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| haystack.contains(keyword))
}

#[cfg(test)]
mod tests {
    //! Unit tests for severity classification.

    use super::*;

    #[derive(Debug)]
    struct TimeoutError(String);

    impl fmt::Display for TimeoutError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for TimeoutError {}

    /// Tests each bucket with a representative message.
    #[test]
    fn test_classify_buckets() {
        assert_eq!(classify("MemoryError", "allocation request"), Severity::Critical);
        assert_eq!(classify("ApiError", "401 unauthorized"), Severity::High);
        assert_eq!(classify("IoError", "connection refused"), Severity::Medium);
        assert_eq!(classify("ValueError", "unexpected token"), Severity::Low);
    }

    /// Tests that buckets are checked in priority order: a message matching
    /// both the high and medium lists lands in high.
    #[test]
    fn test_classify_priority_order() {
        let severity = classify("ApiError", "authentication timeout");
        assert_eq!(severity, Severity::High);

        let severity = classify("SystemExit", "connection unauthorized");
        assert_eq!(severity, Severity::Critical);
    }

    /// Tests that matching is case-insensitive on both inputs.
    #[test]
    fn test_classify_case_insensitive() {
        assert_eq!(classify("apierror", "PERMISSION DENIED"), Severity::High);
        assert_eq!(classify("IOERROR", "Rate Limit reached"), Severity::Medium);
    }

    /// Tests that the type name participates in matching, so an error type
    /// named `TimeoutError` classifies as medium even with a bland message.
    #[test]
    fn test_classify_error_uses_type_name() {
        let error = TimeoutError("deadline elapsed".to_string());
        assert_eq!(classify_error(&error), Severity::Medium);
    }

    /// Tests the message path of `classify_error`.
    #[test]
    fn test_classify_error_uses_message() {
        let error = std::io::Error::other("invalid credentials for account");
        assert_eq!(classify_error(&error), Severity::High);
    }

    /// Validates severity ordering and the retryability split.
    ///
    /// Assertions:
    /// - Confirms `Severity::Critical > Severity::High > Severity::Medium >
    ///   Severity::Low`.
    /// - Ensures only `Medium` and `Low` are retryable.
    #[test]
    fn test_severity_ordering_and_retryability() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);

        assert!(!Severity::Critical.is_retryable());
        assert!(!Severity::High.is_retryable());
        assert!(Severity::Medium.is_retryable());
        assert!(Severity::Low.is_retryable());
    }

    /// Validates `Severity` display strings used in logs and API payloads.
    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Low.to_string(), "low");
        assert_eq!(Severity::Medium.to_string(), "medium");
        assert_eq!(Severity::High.to_string(), "high");
        assert_eq!(Severity::Critical.to_string(), "critical");
    }
}
