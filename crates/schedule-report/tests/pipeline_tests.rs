//! End-to-end pipeline runs against an in-process scripted classifier.
//!
//! No classification service is contacted; each week's responses are
//! scripted by week range.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use batching::{Backoff, ClassifyError, FailureStage, Message, RetryPolicy};
use chrono::NaiveDate;
use schedule_report::{
    prepare_messages, Classifier, Dispatcher, Pipeline, PipelineError, PipelineState, RawMessage,
    RunStatus, SourceOptions,
};
use tokio_util::sync::CancellationToken;

// ── Helpers ──────────────────────────────────────────────────────────────────

type Reply = Result<String, ClassifyError>;

/// Replies per week range, in call order. Unscripted weeks get `fallback`.
struct ScriptedClassifier {
    script: Mutex<HashMap<String, VecDeque<Reply>>>,
    fallback: String,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClassifier {
    fn new() -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            fallback: "absence: []".to_string(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn reply(self, week_range: &str, reply: Reply) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(week_range.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    fn calls_for(&self, week_range: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.as_str() == week_range)
            .count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, prompt: &str) -> Result<String, ClassifyError> {
        let week = week_range_of(prompt);
        self.calls.lock().unwrap().push(week.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .script
            .lock()
            .unwrap()
            .get_mut(&week)
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// The week range of the batch embedded in a prompt (not the worked example).
fn week_range_of(prompt: &str) -> String {
    let batch = prompt
        .rsplit("Input (YAML):\n")
        .next()
        .unwrap()
        .trim_end_matches("Output (YAML):")
        .trim();
    let value: serde_yaml::Value = serde_yaml::from_str(batch).unwrap();
    value["week_range"].as_str().unwrap().to_string()
}

const WEEK_A: &str = "2026-01-12 -> 2026-01-18";
const WEEK_B: &str = "2026-01-19 -> 2026-01-25";

fn msg(id: i64, name: &str, date: &str, time: &str, text: &str) -> Message {
    let ts = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .unwrap()
        .and_time(time.parse().unwrap());
    Message::new(id, name, ts, text)
}

fn late(id: i64, name: &str, date: &str) -> String {
    format!(
        "late_arrival:\n  - message_id: {id}\n    name: {name}\n    dates: [\"{date}\"]\n    info: Late until 10am\n"
    )
}

fn pipeline(classifier: Arc<ScriptedClassifier>, max_concurrent: usize) -> Pipeline {
    let dispatcher = Dispatcher::new(classifier, RetryPolicy::new(3, Backoff::fixed_millis(1000)))
        .with_max_concurrent(max_concurrent);
    Pipeline::new(dispatcher)
}

fn two_weeks() -> Vec<Message> {
    vec![
        msg(20, "B", "2026-01-20", "08:15:00", "Coming in late today"),
        msg(10, "A", "2026-01-13", "00:41:00", "Could I come in late around 10am"),
    ]
}

// ── Merge ordering ───────────────────────────────────────────────────────────

#[tokio::test]
async fn late_arrivals_merge_in_week_order() {
    let classifier = Arc::new(
        ScriptedClassifier::new()
            .reply(WEEK_A, Ok(late(10, "A", "2026-01-13")))
            .reply(WEEK_B, Ok(late(20, "B", "2026-01-20"))),
    );

    let outcome = pipeline(classifier.clone(), 4).run(two_weeks()).await.unwrap();
    let report = outcome.report;

    let names: Vec<&str> = report
        .labels
        .late_arrival
        .iter()
        .map(|i| i.name.as_str())
        .collect();
    assert_eq!(names, vec!["A", "B"]);
    assert!(report.labels.absence.is_empty());
    assert!(report.labels.half_day_absence.is_empty());
    assert!(report.labels.remote_work.is_empty());
    assert_eq!(report.weekly_breakdown.len(), 2);
    assert_eq!(classifier.total_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn merge_order_ignores_completion_order() {
    // Overlapping and one-at-a-time dispatch produce the same report.
    let slow = Arc::new(
        ScriptedClassifier::new()
            .with_delay(Duration::from_millis(50))
            .reply(WEEK_A, Ok(late(10, "A", "2026-01-13")))
            .reply(WEEK_B, Ok(late(20, "B", "2026-01-20"))),
    );
    let fast = Arc::new(
        ScriptedClassifier::new()
            .reply(WEEK_A, Ok(late(10, "A", "2026-01-13")))
            .reply(WEEK_B, Ok(late(20, "B", "2026-01-20"))),
    );

    let concurrent = pipeline(slow, 4).run(two_weeks()).await.unwrap();
    let sequential = pipeline(fast, 1).run(two_weeks()).await.unwrap();
    assert_eq!(concurrent.report, sequential.report);
}

// ── Normalization through the pipeline ───────────────────────────────────────

#[tokio::test]
async fn missing_categories_default_to_empty() {
    let classifier = Arc::new(
        ScriptedClassifier::new().reply(WEEK_A, Ok(late(10, "A", "2026-01-13"))),
    );
    let messages = vec![msg(10, "A", "2026-01-13", "00:41:00", "late")];

    let report = pipeline(classifier, 4).run(messages).await.unwrap().report;
    let week = &report.weekly_breakdown[0];
    assert_eq!(week.labels.late_arrival.len(), 1);
    assert!(week.labels.absence.is_empty());
    assert!(week.warnings.is_empty());
}

#[tokio::test]
async fn fenced_and_plain_replies_agree() {
    let body = late(10, "A", "2026-01-13");
    let plain = Arc::new(ScriptedClassifier::new().reply(WEEK_A, Ok(body.clone())));
    let fenced = Arc::new(
        ScriptedClassifier::new().reply(WEEK_A, Ok(format!("```yaml\n{body}```"))),
    );
    let messages = || vec![msg(10, "A", "2026-01-13", "00:41:00", "late")];

    let from_plain = pipeline(plain, 4).run(messages()).await.unwrap();
    let from_fenced = pipeline(fenced, 4).run(messages()).await.unwrap();
    assert_eq!(from_plain.report, from_fenced.report);
}

#[tokio::test]
async fn malformed_category_is_warned_and_counted() {
    let classifier = Arc::new(ScriptedClassifier::new().reply(
        WEEK_A,
        Ok("absence: none\nlate_arrival: []\nmood: happy\n".to_string()),
    ));
    let messages = vec![msg(10, "A", "2026-01-13", "09:00:00", "hi")];

    let report = pipeline(classifier, 4).run(messages).await.unwrap().report;
    assert!(report.labels.is_empty());
    assert_eq!(report.weekly_breakdown[0].warnings.len(), 2);
    assert_eq!(report.summary().warnings, 2);
}

// ── Retry and abort ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let classifier = Arc::new(
        ScriptedClassifier::new()
            .reply(WEEK_A, Err(ClassifyError::RateLimited("HTTP 429".into())))
            .reply(WEEK_A, Ok("```yaml\nabsence: [".to_string()))
            .reply(WEEK_A, Ok(late(10, "A", "2026-01-13"))),
    );
    let messages = vec![msg(10, "A", "2026-01-13", "00:41:00", "late")];

    let outcome = pipeline(classifier.clone(), 4).run(messages).await.unwrap();
    assert_eq!(classifier.calls_for(WEEK_A), 3);
    assert_eq!(outcome.telemetry.weeks[0].attempts, 3);
    assert_eq!(outcome.report.labels.late_arrival.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_week_yields_no_report() {
    let classifier = Arc::new(
        ScriptedClassifier::new()
            .reply(WEEK_A, Ok(late(10, "A", "2026-01-13")))
            .reply(WEEK_B, Ok("not: [yaml".to_string()))
            .reply(WEEK_B, Ok("not: [yaml".to_string()))
            .reply(WEEK_B, Ok("not: [yaml".to_string())),
    );

    let err = pipeline(classifier.clone(), 4)
        .run(two_weeks())
        .await
        .unwrap_err();

    match err {
        PipelineError::WeekFailed {
            week_key,
            stage,
            attempts,
            ..
        } => {
            assert_eq!(week_key.range().to_string(), WEEK_B);
            assert_eq!(stage, FailureStage::Parse);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(classifier.calls_for(WEEK_B), 3);
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_in_flight_weeks() {
    let classifier = Arc::new(ScriptedClassifier::new().with_delay(Duration::from_secs(3600)));
    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(classifier, RetryPolicy::default())
        .with_cancellation(cancel.clone());
    let pipeline = Pipeline::new(dispatcher);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
    });

    let err = pipeline.run(two_weeks()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn in_flight_weeks_never_exceed_bound() {
    let classifier = Arc::new(ScriptedClassifier::new().with_delay(Duration::from_millis(100)));
    let messages: Vec<Message> = (0..6)
        .map(|week| {
            let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap() + chrono::Days::new(7 * week);
            msg(week as i64, "N", &date.to_string(), "09:00:00", "remote today")
        })
        .collect();

    let outcome = pipeline(classifier.clone(), 2).run(messages).await.unwrap();
    assert_eq!(outcome.report.weekly_breakdown.len(), 6);
    assert_eq!(classifier.total_calls(), 6);
    assert!(classifier.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert!(classifier.max_in_flight.load(Ordering::SeqCst) >= 1);
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_input_makes_no_calls() {
    let classifier = Arc::new(ScriptedClassifier::new());
    let outcome = pipeline(classifier.clone(), 4).run(Vec::new()).await.unwrap();

    assert_eq!(classifier.total_calls(), 0);
    assert!(outcome.report.labels.is_empty());
    assert_eq!(
        outcome.transitions.last().map(|t| t.to),
        Some(PipelineState::Done)
    );
    assert!(matches!(
        outcome.telemetry.outcome,
        RunStatus::Done { total_items: 0 }
    ));
}

#[tokio::test]
async fn exported_dump_flows_through_local_dates() {
    // 20:00 UTC Sunday is Monday morning at +07:00, so both land in week B.
    let raw: Vec<RawMessage> = serde_json::from_str(
        r#"[
            {"message_id": 1, "date": "2026-01-18T20:00:00Z", "sender_name": "A", "text": "late today"},
            {"message_id": 2, "date": "2026-01-19T02:00:00Z", "sender_id": 9, "text": "  remote  "},
            {"message_id": 3, "date": "2026-01-19T03:00:00Z", "sender_name": "C", "text": " "}
        ]"#,
    )
    .unwrap();
    let options = SourceOptions {
        utc_offset_minutes: 420,
        ..SourceOptions::default()
    };
    let messages = prepare_messages(raw, &options).unwrap();
    assert_eq!(messages.len(), 2);

    let classifier = Arc::new(ScriptedClassifier::new());
    let outcome = pipeline(classifier.clone(), 4).run(messages).await.unwrap();
    assert_eq!(classifier.calls_for(WEEK_B), 1);
    assert_eq!(outcome.report.weekly_breakdown.len(), 1);
    assert_eq!(outcome.telemetry.weeks[0].message_count, 2);
}
