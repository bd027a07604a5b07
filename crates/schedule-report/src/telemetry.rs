//! Structured telemetry for report runs.
//!
//! Captures per-week and per-run metrics. One sink:
//! - `telemetry_path` (when configured): append-only JSONL, one line per run

use std::path::Path;
use std::time::Duration;

use batching::{WeekKey, WeekResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::state_machine::TransitionRecord;

/// Metrics for one week's classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekTelemetry {
    pub week_key: WeekKey,
    pub message_count: usize,
    /// Attempts consumed; 0 when the week short-circuited without a call.
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub item_count: usize,
    pub warnings: usize,
}

impl WeekTelemetry {
    pub fn new(result: &WeekResult, message_count: usize, attempts: u32, elapsed: Duration) -> Self {
        Self {
            week_key: result.week_key,
            message_count,
            attempts,
            elapsed_ms: elapsed.as_millis() as u64,
            item_count: result.item_count(),
            warnings: result.warnings.len(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunStatus {
    Done { total_items: usize },
    Aborted { reason: String },
}

/// Complete record of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTelemetry {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub message_count: usize,
    pub outcome: RunStatus,
    /// Weeks that completed, ascending by week key.
    pub weeks: Vec<WeekTelemetry>,
    pub transitions: Vec<TransitionRecord>,
}

impl RunTelemetry {
    pub fn total_attempts(&self) -> u32 {
        self.weeks.iter().map(|w| w.attempts).sum()
    }

    /// Log a one-line summary of the run.
    pub fn log_summary(&self) {
        let elapsed_ms = (self.finished_at - self.started_at).num_milliseconds();
        match &self.outcome {
            RunStatus::Done { total_items } => info!(
                weeks = self.weeks.len(),
                messages = self.message_count,
                items = total_items,
                attempts = self.total_attempts(),
                elapsed_ms,
                "Report run complete"
            ),
            RunStatus::Aborted { reason } => warn!(
                weeks_completed = self.weeks.len(),
                messages = self.message_count,
                elapsed_ms,
                reason = %reason,
                "Report run aborted"
            ),
        }
    }
}

/// Append run telemetry as one JSON line.
///
/// Failures are logged, never propagated: telemetry must not fail a run.
pub fn append_telemetry(telemetry: &RunTelemetry, path: &Path) {
    match serde_json::to_string(telemetry) {
        Ok(json) => {
            use std::io::Write;
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append telemetry: {e}");
                    } else {
                        info!(path = %path.display(), "Appended run telemetry");
                    }
                }
                Err(e) => warn!("Failed to open telemetry file: {e}"),
            }
        }
        Err(e) => warn!("Failed to serialize telemetry: {e}"),
    }
}
