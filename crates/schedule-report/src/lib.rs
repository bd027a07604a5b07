//! Weekly schedule-request report runner.
//!
//! Wires the deterministic `batching` core to a classification service:
//!
//! | Module          | Purpose                                                  |
//! |-----------------|----------------------------------------------------------|
//! | `config`        | `ReportConfig` from defaults, TOML, environment          |
//! | `source`        | Exported message dumps → `Message`                       |
//! | `prompts`       | Instruction text and per-week prompt assembly            |
//! | `classifier`    | `Classifier` trait, Gemini and OpenAI-compatible clients |
//! | `dispatcher`    | Bounded concurrent per-week classification with retry    |
//! | `state_machine` | Run states and the legal-transition log                  |
//! | `pipeline`      | End-to-end run returning a `RunOutcome`                  |
//! | `telemetry`     | Per-week and per-run metrics, JSONL sink                 |
//! | `sink`          | Report rendering (YAML/JSON) and summary table           |
//! | `errors`        | `PipelineError`                                          |

#![allow(clippy::uninlined_format_args)]

pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod pipeline;
pub mod prompts;
pub mod sink;
pub mod source;
pub mod state_machine;
pub mod telemetry;

pub use classifier::{build_classifier, Classifier};
pub use config::{Provider, ReportConfig, RetrySettings};
pub use dispatcher::{Dispatcher, WeekOutcome};
pub use errors::PipelineError;
pub use pipeline::{Pipeline, RunOutcome};
pub use source::{load_messages, prepare_messages, RawMessage, SourceOptions};
pub use state_machine::{PipelineState, StateMachine, TransitionRecord};
pub use telemetry::{RunStatus, RunTelemetry, WeekTelemetry};
