//! Concurrent per-week classification.
//!
//! Every week bucket becomes one task in a `JoinSet`. A semaphore bounds how
//! many weeks talk to the classification service at once:
//!
//! ```text
//! Vec<WeekBucket>
//!   → JoinSet::spawn(classify_week, bucket_i) × N   (≤ max_concurrent in flight)
//!   → slot[i] = WeekOutcome                         (completion order is irrelevant)
//! ```
//!
//! ## Failure policy
//!
//! Each week retries under the configured `RetryPolicy`. The first week that
//! still fails aborts the remaining tasks and fails the whole dispatch; no
//! partial report is ever returned.

use std::sync::Arc;
use std::time::Instant;

use batching::{normalize_response, RetryPolicy, WeekBucket, WeekResult};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::errors::PipelineError;
use crate::prompts::classify_prompt;
use crate::telemetry::WeekTelemetry;

/// Default upper bound on weeks classified at the same time.
pub const DEFAULT_MAX_CONCURRENT_WEEKS: usize = 4;

/// One classified week together with its metrics.
#[derive(Debug, Clone)]
pub struct WeekOutcome {
    pub result: WeekResult,
    pub telemetry: WeekTelemetry,
}

pub struct Dispatcher {
    classifier: Arc<dyn Classifier>,
    policy: RetryPolicy,
    max_concurrent: usize,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(classifier: Arc<dyn Classifier>, policy: RetryPolicy) -> Self {
        Self {
            classifier,
            policy,
            max_concurrent: DEFAULT_MAX_CONCURRENT_WEEKS,
            cancel: CancellationToken::new(),
        }
    }

    /// Zero is treated as one.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Classify every bucket. Outcomes come back in input order.
    pub async fn dispatch(
        &self,
        buckets: Vec<WeekBucket>,
    ) -> Result<Vec<WeekOutcome>, PipelineError> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if buckets.is_empty() {
            return Ok(Vec::new());
        }

        let total = buckets.len();
        info!(
            weeks = total,
            max_concurrent = self.max_concurrent,
            max_attempts = self.policy.max_attempts,
            "Dispatching weeks"
        );

        let sem = Arc::new(Semaphore::new(self.max_concurrent));
        let mut join_set: JoinSet<(usize, Result<WeekOutcome, PipelineError>)> = JoinSet::new();

        for (slot, bucket) in buckets.into_iter().enumerate() {
            let sem = sem.clone();
            let classifier = self.classifier.clone();
            let policy = self.policy;

            join_set.spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let lost = PipelineError::WorkerLost {
                            reason: format!("week {}: {e}", bucket.week_key()),
                        };
                        return (slot, Err(lost));
                    }
                };
                let outcome = classify_week(classifier.as_ref(), &policy, &bucket).await;
                (slot, outcome)
            });
        }

        let mut slots: Vec<Option<WeekOutcome>> = (0..total).map(|_| None).collect();

        loop {
            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!(pending = join_set.len(), "Dispatch cancelled");
                    join_set.abort_all();
                    return Err(PipelineError::Cancelled);
                }
                next = join_set.join_next() => next,
            };

            let Some(joined) = joined else { break };
            match joined {
                Ok((slot, Ok(outcome))) => slots[slot] = Some(outcome),
                Ok((_, Err(err))) => {
                    warn!(error = %err, pending = join_set.len(), "Week failed, aborting dispatch");
                    join_set.abort_all();
                    return Err(err);
                }
                Err(e) => {
                    join_set.abort_all();
                    return Err(PipelineError::WorkerLost {
                        reason: e.to_string(),
                    });
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(slot, outcome)| {
                outcome.ok_or_else(|| PipelineError::WorkerLost {
                    reason: format!("no outcome for bucket {slot}"),
                })
            })
            .collect()
    }
}

/// Serialize, invoke and normalize one week under the retry policy.
///
/// An empty batch short-circuits to an empty result without a service call.
async fn classify_week(
    classifier: &dyn Classifier,
    policy: &RetryPolicy,
    bucket: &WeekBucket,
) -> Result<WeekOutcome, PipelineError> {
    let start = Instant::now();
    let week_key = bucket.week_key();
    let message_count = bucket.messages().len();

    let batch = bucket
        .to_batch()
        .map_err(|e| PipelineError::week_failed(week_key, 0, e))?;

    if batch.is_empty() {
        debug!(week_key = %week_key, "Empty batch, skipping classification");
        let result = WeekResult::empty(week_key);
        let telemetry = WeekTelemetry::new(&result, message_count, 0, start.elapsed());
        return Ok(WeekOutcome { result, telemetry });
    }

    let prompt = classify_prompt(&batch);
    let prompt = prompt.as_str();
    let label = week_key.to_string();

    let retried = policy
        .run(&label, move |attempt| async move {
            debug!(week_key = %week_key, attempt, "Classifying week");
            let raw = classifier.classify(prompt).await?;
            normalize_response(&raw)
        })
        .await
        .map_err(|e| PipelineError::week_failed(week_key, e.attempts, e.error))?;

    let result = WeekResult::from_normalized(week_key, retried.value);
    for warning in &result.warnings {
        warn!(week_key = %week_key, warning = %warning, "Normalization warning");
    }

    let telemetry = WeekTelemetry::new(&result, message_count, retried.attempts, start.elapsed());
    info!(
        week_key = %week_key,
        messages = message_count,
        attempts = retried.attempts,
        items = telemetry.item_count,
        elapsed_ms = telemetry.elapsed_ms,
        "Week classified"
    );

    Ok(WeekOutcome { result, telemetry })
}
