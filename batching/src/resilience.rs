//! Resilience — composable retry policy for a fallible async operation.
//!
//! The policy knows nothing about weeks, prompts or parsing: it re-runs an
//! operation until it succeeds, returns a non-retriable error, or runs out of
//! attempts.
//!
//! ```text
//! attempt 1 ─ Err(retriable) ─ sleep(backoff(1)) ─ attempt 2 ─ ... ─ attempt N
//!     │                                               │
//!     └─ Ok ─▶ Retried { value, attempts }            └─ Err ─▶ RetryError { attempts, error }
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use batching::resilience::{Backoff, RetryPolicy};
//!
//! let policy = RetryPolicy::new(3, Backoff::fixed_millis(1_000));
//! let labels = policy.run("2026-01-12", |attempt| classify_week(attempt)).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ClassifyError;

/// Errors the policy can reason about.
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

impl Retriable for ClassifyError {
    fn is_retriable(&self) -> bool {
        ClassifyError::is_retriable(self)
    }
}

/// Wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same wait after every failure.
    Fixed(Duration),
    /// `base * 2^(failures - 1)`, capped.
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    pub fn fixed_millis(ms: u64) -> Self {
        Self::Fixed(Duration::from_millis(ms))
    }

    /// Wait after the `failures`-th consecutive failure (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            Self::Fixed(wait) => wait,
            Self::Exponential { base, cap } => {
                let shift = failures.saturating_sub(1).min(31);
                base.checked_mul(1u32 << shift).unwrap_or(cap).min(cap)
            }
        }
    }
}

/// A successful value and how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// The last error once the policy gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub error: E,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} attempt(s))", self.error, self.attempts)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Bounded-attempt retry with a backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::fixed_millis(1_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }

    /// Run `op` until it succeeds or the policy gives up.
    ///
    /// `op` receives the 1-based attempt number. A `max_attempts` of zero is
    /// treated as one.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<Retried<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retriable + fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "succeeded after retry");
                    }
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                    });
                }
                Err(error) if !error.is_retriable() => {
                    warn!(label, attempt, error = %error, "non-retriable failure");
                    return Err(RetryError {
                        attempts: attempt,
                        error,
                    });
                }
                Err(error) if attempt >= max_attempts => {
                    warn!(label, attempt, error = %error, "retry budget exhausted");
                    return Err(RetryError {
                        attempts: attempt,
                        error,
                    });
                }
                Err(error) => {
                    let wait = self.backoff.delay(attempt);
                    warn!(
                        label,
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %error,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}
