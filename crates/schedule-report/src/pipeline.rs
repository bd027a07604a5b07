//! End-to-end report run.
//!
//! ```text
//! Init ─▶ Bucketed ─▶ Dispatching ─▶ Merged ─▶ Done
//!                         │
//!                         └──▶ Aborted
//! ```
//!
//! Every step goes through the `StateMachine`, so the transition log in the
//! returned `RunOutcome` (and in telemetry) is the authoritative history.

use std::path::PathBuf;
use std::sync::Arc;

use batching::{bucket_by_week, merge_week_results, MergedReport, Message};
use chrono::Utc;
use tracing::{info, warn};

use crate::classifier::Classifier;
use crate::config::ReportConfig;
use crate::dispatcher::Dispatcher;
use crate::errors::PipelineError;
use crate::state_machine::{PipelineState, StateMachine, TransitionRecord};
use crate::telemetry::{append_telemetry, RunStatus, RunTelemetry};

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: MergedReport,
    pub transitions: Vec<TransitionRecord>,
    pub telemetry: RunTelemetry,
}

pub struct Pipeline {
    dispatcher: Dispatcher,
    telemetry_path: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            telemetry_path: None,
        }
    }

    /// Pipeline wired from configuration around an existing classifier.
    pub fn from_config(config: &ReportConfig, classifier: Arc<dyn Classifier>) -> Self {
        let dispatcher = Dispatcher::new(classifier, config.retry.policy())
            .with_max_concurrent(config.max_concurrent_weeks);
        Self::new(dispatcher).with_telemetry_path(config.telemetry_path.clone())
    }

    pub fn with_telemetry_path(mut self, path: Option<PathBuf>) -> Self {
        self.telemetry_path = path;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Bucket, classify and merge `messages`.
    ///
    /// Returns a report only when every week succeeded. Telemetry is recorded
    /// for aborted runs as well.
    pub async fn run(&self, messages: Vec<Message>) -> Result<RunOutcome, PipelineError> {
        let started_at = Utc::now();
        let message_count = messages.len();
        let mut machine = StateMachine::new();

        let buckets = bucket_by_week(messages);
        let week_count = buckets.len();
        machine.advance(
            PipelineState::Bucketed,
            Some(&format!("{message_count} messages in {week_count} weeks")),
        )?;
        info!(
            messages = message_count,
            weeks = week_count,
            "Messages bucketed by week"
        );

        machine.advance(PipelineState::Dispatching, None)?;
        let outcomes = match self.dispatcher.dispatch(buckets).await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                let reason = err.to_string();
                machine.abort(&reason)?;
                warn!(
                    week_key = ?err.week_key().map(|k| k.to_string()),
                    state = %machine.summary(),
                    "Run aborted: {reason}"
                );
                let telemetry = RunTelemetry {
                    started_at,
                    finished_at: Utc::now(),
                    message_count,
                    outcome: RunStatus::Aborted { reason },
                    weeks: Vec::new(),
                    transitions: machine.into_transitions(),
                };
                self.record(&telemetry);
                return Err(err);
            }
        };

        let (results, weeks): (Vec<_>, Vec<_>) = outcomes
            .into_iter()
            .map(|outcome| (outcome.result, outcome.telemetry))
            .unzip();
        let report = merge_week_results(results);
        let summary = report.summary();
        machine.advance(
            PipelineState::Merged,
            Some(&format!("{} items", summary.total)),
        )?;
        info!(
            weeks = summary.weeks,
            items = summary.total,
            warnings = summary.warnings,
            categories = ?summary.counts,
            "Weekly results merged"
        );

        machine.advance(PipelineState::Done, None)?;
        info!(state = %machine.summary(), "Run complete");

        let transitions = machine.into_transitions();
        let telemetry = RunTelemetry {
            started_at,
            finished_at: Utc::now(),
            message_count,
            outcome: RunStatus::Done {
                total_items: summary.total,
            },
            weeks,
            transitions: transitions.clone(),
        };
        self.record(&telemetry);

        Ok(RunOutcome {
            report,
            transitions,
            telemetry,
        })
    }

    fn record(&self, telemetry: &RunTelemetry) {
        telemetry.log_summary();
        if let Some(path) = &self.telemetry_path {
            append_telemetry(telemetry, path);
        }
    }
}
