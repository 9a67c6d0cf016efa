//! Error classification for LLM transport failures.
//!
//! Maps a raw [`LlmError`] onto the small set of classes the retry policy
//! understands. Rate-limit responses carry their retry hint in the body, which
//! is searched with a pattern rather than parsed as a schema.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::llm::LlmError;

static RETRY_AFTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)retry[_\-\s]?after["']?\s*[:=]\s*["']?(\d+(?:\.\d+)?)"#).expect("valid regex")
});

static TRY_AGAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)try again in (\d+(?:\.\d+)?)\s*s").expect("valid regex"));

/// Longest retry hint honoured; larger values are clamped.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

const BILLING_MARKERS: &[&str] = &["billing", "credit balance", "insufficient_quota", "payment required"];

/// Classification of a failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum ErrorClass {
    /// Likely to succeed if retried after a short wait.
    Transient,
    /// Provider asked us to slow down; `retry_after` if it said how long.
    RateLimited { retry_after: Option<Duration> },
    /// Retrying cannot help (auth, billing, malformed request).
    Permanent,
    /// Nothing recognisable; retried conservatively.
    Unknown,
}

impl ErrorClass {
    /// Short label for logs and journal entries.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::RateLimited { .. } => "rate_limited",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Unknown => "unknown",
        }
    }
}

/// Classify an LLM transport failure.
pub fn classify(error: &LlmError) -> ErrorClass {
    match error {
        LlmError::Unauthenticated => ErrorClass::Permanent,
        LlmError::HttpStatus { status, body } => classify_status(*status, body),
        LlmError::InvalidResponse(_) | LlmError::Parse(_) => ErrorClass::Transient,
        LlmError::Network {
            timed_out, connect, ..
        } => {
            if *timed_out || *connect {
                ErrorClass::Transient
            } else {
                ErrorClass::Unknown
            }
        }
    }
}

fn classify_status(status: u16, body: &str) -> ErrorClass {
    match status {
        429 => ErrorClass::RateLimited {
            retry_after: extract_retry_after(body),
        },
        400 | 402 if is_billing_error(body) => ErrorClass::Permanent,
        400 | 401 | 402 | 403 | 404 | 413 | 422 => ErrorClass::Permanent,
        500..=599 => ErrorClass::Transient,
        _ => ErrorClass::Unknown,
    }
}

/// Whether an error body describes a billing or quota problem.
pub fn is_billing_error(body: &str) -> bool {
    let lower = body.to_lowercase();
    BILLING_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Search an error body for a machine-provided retry hint, in seconds.
pub fn extract_retry_after(body: &str) -> Option<Duration> {
    let captures = RETRY_AFTER_RE
        .captures(body)
        .or_else(|| TRY_AGAIN_RE.captures(body))?;
    let secs: f64 = captures.get(1)?.as_str().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs.min(MAX_RETRY_AFTER.as_secs_f64())).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_and_not_found_are_permanent() {
        for status in [401, 403, 404] {
            assert_eq!(classify(&LlmError::http(status, "nope")), ErrorClass::Permanent);
        }
        assert_eq!(classify(&LlmError::Unauthenticated), ErrorClass::Permanent);
    }

    #[test]
    fn test_plain_bad_request_is_permanent() {
        let err = LlmError::http(400, r#"{"error":{"type":"invalid_request_error","message":"bad field"}}"#);
        assert_eq!(classify(&err), ErrorClass::Permanent);
    }

    #[test]
    fn test_billing_bad_request_is_permanent() {
        let err = LlmError::http(400, "Your credit balance is too low");
        assert!(is_billing_error("Your credit balance is too low"));
        assert_eq!(classify(&err), ErrorClass::Permanent);
    }

    #[test]
    fn test_server_errors_are_transient() {
        assert_eq!(classify(&LlmError::http(500, "oops")), ErrorClass::Transient);
        assert_eq!(classify(&LlmError::http(529, "overloaded")), ErrorClass::Transient);
    }

    #[test]
    fn test_malformed_response_is_transient() {
        assert_eq!(classify(&LlmError::InvalidResponse("x".into())), ErrorClass::Transient);
        assert_eq!(classify(&LlmError::Parse("eof".into())), ErrorClass::Transient);
    }

    #[test]
    fn test_rate_limit_extracts_retry_after() {
        let err = LlmError::http(429, r#"{"error": "slow down", "retry_after": 7}"#);
        assert_eq!(
            classify(&err),
            ErrorClass::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
    }

    #[test]
    fn test_rate_limit_without_hint() {
        let err = LlmError::http(429, "too many requests");
        assert_eq!(classify(&err), ErrorClass::RateLimited { retry_after: None });
    }

    #[test]
    fn test_extract_retry_after_variants() {
        assert_eq!(extract_retry_after("retry_after: 7"), Some(Duration::from_secs(7)));
        assert_eq!(extract_retry_after("Retry-After=12"), Some(Duration::from_secs(12)));
        assert_eq!(extract_retry_after(r#""retry_after":"2.5""#), Some(Duration::from_millis(2500)));
        assert_eq!(extract_retry_after("please try again in 3s"), Some(Duration::from_secs(3)));
        assert_eq!(extract_retry_after("no hint here"), None);
    }

    #[test]
    fn test_oversized_retry_after_is_clamped() {
        let err = LlmError::http(429, "retry_after: 99999999999999999999999");
        assert_eq!(
            classify(&err),
            ErrorClass::RateLimited {
                retry_after: Some(MAX_RETRY_AFTER)
            }
        );
        let overflow = format!("retry_after: {}", "9".repeat(400));
        assert_eq!(extract_retry_after(&overflow), None);
        assert_eq!(extract_retry_after("Retry-After: 7200"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_network_failures() {
        assert_eq!(classify(&LlmError::timeout("deadline")), ErrorClass::Transient);
        assert_eq!(classify(&LlmError::connect("refused")), ErrorClass::Transient);
        let other = LlmError::Network {
            message: "tls".into(),
            timed_out: false,
            connect: false,
        };
        assert_eq!(classify(&other), ErrorClass::Unknown);
    }

    #[test]
    fn test_unrecognised_status_is_unknown() {
        assert_eq!(classify(&LlmError::http(418, "teapot")), ErrorClass::Unknown);
    }

    #[test]
    fn test_labels() {
        assert_eq!(ErrorClass::Transient.label(), "transient");
        assert_eq!(ErrorClass::RateLimited { retry_after: None }.label(), "rate_limited");
        assert_eq!(ErrorClass::Permanent.label(), "permanent");
        assert_eq!(ErrorClass::Unknown.label(), "unknown");
    }
}
