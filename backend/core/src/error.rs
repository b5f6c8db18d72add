//! Failure taxonomy for inference calls.
//!
//! Every exhausted-call failure is classified into one of a small set of
//! kinds by matching the raw failure text. Connectivity-shaped failures are
//! kept distinct from content/protocol failures: the former are what makes
//! trying the next server worthwhile, and they map to a shorter suggested
//! backoff than quota or billing problems.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-visible classification of an inference failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimit,
    Timeout,
    Auth,
    Billing,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RateLimit => "rate_limit",
            FailureKind::Timeout => "timeout",
            FailureKind::Auth => "auth",
            FailureKind::Billing => "billing",
            FailureKind::Unknown => "unknown",
        }
    }

    /// Suggested wait before the caller retries the whole call, if any.
    /// Quota and billing problems warrant a much longer pause than plain
    /// connectivity trouble; auth and unknown failures gain nothing from
    /// waiting.
    pub fn suggested_backoff(&self) -> Option<Duration> {
        match self {
            FailureKind::RateLimit => Some(Duration::from_secs(30)),
            FailureKind::Billing => Some(Duration::from_secs(120)),
            FailureKind::Timeout => Some(Duration::from_secs(5)),
            FailureKind::Auth | FailureKind::Unknown => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substrings that mark a connectivity failure (connect/read timeouts and
/// the usual socket error codes). Matched case-insensitively.
const CONNECTIVITY_MARKERS: &[&str] = &[
    "timed out",
    "timeout",
    "connection refused",
    "econnrefused",
    "refused",
    "connection reset",
    "econnreset",
    "reset by peer",
    "unreachable",
    "enotfound",
    "name or service not known",
    "not found",
    "broken pipe",
    "epipe",
];

const RATE_LIMIT_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "429",
    "quota",
    "overloaded",
];

const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "401",
    "403",
    "forbidden",
    "api key",
    "authentication",
    "invalid token",
];

const BILLING_MARKERS: &[&str] = &[
    "billing",
    "payment",
    "insufficient funds",
    "insufficient credit",
    "credit balance",
];

/// Classify a raw failure message into a [`FailureKind`].
///
/// Protocol `error` frames are passed through verbatim upstream, so this
/// matches on wording: quota-style text wins over everything else, then
/// billing, then auth, then connectivity shapes.
pub fn classify_failure(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    let matches_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if matches_any(RATE_LIMIT_MARKERS) {
        FailureKind::RateLimit
    } else if matches_any(BILLING_MARKERS) {
        FailureKind::Billing
    } else if matches_any(AUTH_MARKERS) {
        FailureKind::Auth
    } else if matches_any(CONNECTIVITY_MARKERS) {
        FailureKind::Timeout
    } else {
        FailureKind::Unknown
    }
}

/// Raised after every candidate server has failed. `message` carries the
/// joined per-target detail so operators can tell "every server refused"
/// apart from "every server was unreachable".
#[derive(Debug, Clone, Error)]
#[error("inference failed ({kind}): {message}")]
pub struct LlmwsFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl LlmwsFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build a failure from raw text, classifying it by content.
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify_failure(&message),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_wording_is_rate_limit() {
        assert_eq!(
            classify_failure("server replied 429: quota exceeded"),
            FailureKind::RateLimit
        );
        assert_eq!(
            classify_failure("Rate limit hit, try again later"),
            FailureKind::RateLimit
        );
    }

    #[test]
    fn connectivity_codes_are_timeouts() {
        for msg in [
            "connect timed out after 10s",
            "Connection refused (os error 111)",
            "connection reset by peer",
            "host unreachable",
            "broken pipe",
        ] {
            assert_eq!(classify_failure(msg), FailureKind::Timeout, "{msg}");
        }
    }

    #[test]
    fn auth_and_billing_wording() {
        assert_eq!(classify_failure("401 Unauthorized"), FailureKind::Auth);
        assert_eq!(
            classify_failure("payment required: billing issue"),
            FailureKind::Billing
        );
    }

    #[test]
    fn unmatched_text_is_unknown() {
        assert_eq!(
            classify_failure("model exploded in a novel way"),
            FailureKind::Unknown
        );
    }

    #[test]
    fn backoff_ordering() {
        let rate = FailureKind::RateLimit.suggested_backoff().unwrap();
        let billing = FailureKind::Billing.suggested_backoff().unwrap();
        let timeout = FailureKind::Timeout.suggested_backoff().unwrap();
        assert!(rate > timeout);
        assert!(billing > timeout);
        assert!(FailureKind::Unknown.suggested_backoff().is_none());
    }

    #[test]
    fn failure_display_carries_kind_and_detail() {
        let err = LlmwsFailure::classified("ws://a: refused; ws://b: refused");
        assert_eq!(err.kind, FailureKind::Timeout);
        assert!(err.to_string().contains("ws://a"));
        assert!(err.to_string().contains("ws://b"));
    }
}
