//! Weekly batch classification core.
//!
//! Deterministic building blocks for turning a flat stream of schedule-request
//! chat messages into a categorized report. Nothing in this crate performs
//! network I/O; the classification service is reached through the
//! application crate and only its raw text response flows back in here.
//!
//! ## Modules
//!
//! | Module        | Purpose                                                   |
//! |---------------|-----------------------------------------------------------|
//! | `message`     | Immutable `Message` record                                |
//! | `category`    | Closed four-label `Category` set and `LabeledItem`        |
//! | `week`        | `WeekKey`, `WeekRange`, `WeekBucket`, week partitioning   |
//! | `normalize`   | Fence stripping and strict four-category normalization    |
//! | `report`      | `WeekResult`, `MergedReport`, deterministic merge         |
//! | `resilience`  | Composable retry policy for a fallible async operation    |
//! | `errors`      | Error taxonomy with retry classification                  |
//!
//! ## Data flow
//!
//! ```text
//! Vec<Message> ─ bucket_by_week ─▶ Vec<WeekBucket>
//!   ─ (external classify per bucket) ─▶ raw text
//!   ─ normalize_response ─▶ Normalized ─▶ WeekResult
//!   ─ merge_week_results ─▶ MergedReport
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod category;
pub mod errors;
pub mod message;
pub mod normalize;
pub mod report;
pub mod resilience;
pub mod week;

pub use category::{Category, CategoryLabels, LabeledItem};
pub use errors::{ClassifyError, FailureStage, RetryCategory};
pub use message::Message;
pub use normalize::{normalize_response, strip_code_fence, NormalizationWarning, Normalized};
pub use report::{merge_week_results, MergedReport, ReportSummary, WeekResult};
pub use resilience::{Backoff, Retriable, Retried, RetryError, RetryPolicy};
pub use week::{bucket_by_week, WeekBucket, WeekKey, WeekRange};
