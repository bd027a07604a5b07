//! Classification error taxonomy with retry classification.
//!
//! Every failure a single week can hit on its way from message batch to
//! normalized labels is represented here. The retry policy queries
//! `is_retriable()` / `retry_category()` without string matching.
//!
//! ## Retry categories
//!
//! | Category         | Retriable | Raised by                               |
//! |------------------|-----------|-----------------------------------------|
//! | Input            | no        | batch serialization before dispatch     |
//! | Transient        | yes       | service did not answer (network/5xx)    |
//! | RateLimit        | yes       | service answered 429                    |
//! | ParseFailure     | yes       | fence stripping / YAML parse            |
//! | IntegrityFailure | yes       | parsed value fails the schema checks    |
//! | Configuration    | no        | client cannot be built or authenticated |
//! | Cancelled        | no        | caller requested shutdown               |

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification used by the retry policy to decide whether to try again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Batch was malformed before it ever reached the service.
    Input,
    /// Network / backend failure.
    Transient,
    /// Service-imposed rate limit.
    RateLimit,
    /// Response text could not be parsed into a structured value.
    ParseFailure,
    /// Response parsed but does not match the four-category schema.
    IntegrityFailure,
    /// Invalid or missing configuration.
    Configuration,
    /// Explicitly cancelled by the caller.
    Cancelled,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::Transient | Self::RateLimit | Self::ParseFailure | Self::IntegrityFailure
        )
    }
}

impl fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Transient => write!(f, "transient"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::IntegrityFailure => write!(f, "integrity_failure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The per-week step at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Serializing the week's messages into the request batch.
    Serialize,
    /// Calling the classification service.
    Invoke,
    /// Removing the enclosing code fence from the response.
    FenceStrip,
    /// Parsing the response text as YAML.
    Parse,
    /// Checking the parsed value against the category schema.
    Validate,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialize => write!(f, "serialize"),
            Self::Invoke => write!(f, "invoke"),
            Self::FenceStrip => write!(f, "fence_strip"),
            Self::Parse => write!(f, "parse"),
            Self::Validate => write!(f, "validate"),
        }
    }
}

/// Unified error type for classifying one week bucket.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    // ── Not retried ───────────────────────────────────────────────────────
    /// The message batch is malformed before dispatch.
    #[error("Input error: {0}")]
    Input(String),

    // ── Retriable ─────────────────────────────────────────────────────────
    /// The classification service failed to respond.
    #[error("Service failure: {0}")]
    Service(String),

    /// The classification service rejected the call with a rate limit.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The response opens a code fence that is never closed.
    #[error("Parse failure: response opens a code fence that is never closed")]
    UnterminatedFence,

    /// The response text is not valid YAML.
    #[error("Parse failure: {0}")]
    Parse(String),

    /// The response parsed but violates the category schema.
    #[error("Integrity failure: {0}")]
    Integrity(String),

    // ── Not retried ───────────────────────────────────────────────────────
    /// Configuration is invalid or missing required fields.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The operation was cancelled.
    #[error("Cancelled")]
    Cancelled,
}

impl ClassifyError {
    /// Classify this error for retry logic.
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            Self::Input(_) => RetryCategory::Input,
            Self::Service(_) => RetryCategory::Transient,
            Self::RateLimited(_) => RetryCategory::RateLimit,
            Self::UnterminatedFence | Self::Parse(_) => RetryCategory::ParseFailure,
            Self::Integrity(_) => RetryCategory::IntegrityFailure,
            Self::Configuration(_) => RetryCategory::Configuration,
            Self::Cancelled => RetryCategory::Cancelled,
        }
    }

    /// Returns `true` if the retry policy may try the week again.
    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }

    /// Which per-week step produced this error.
    pub fn stage(&self) -> FailureStage {
        match self {
            Self::Input(_) => FailureStage::Serialize,
            Self::Service(_) | Self::RateLimited(_) | Self::Configuration(_) | Self::Cancelled => {
                FailureStage::Invoke
            }
            Self::UnterminatedFence => FailureStage::FenceStrip,
            Self::Parse(_) => FailureStage::Parse,
            Self::Integrity(_) => FailureStage::Validate,
        }
    }
}
