//! Exported chat-message dumps → `Message` records.
//!
//! Fetching from the chat platform happens elsewhere; this module only reads
//! a JSON array of raw records and prepares them for week bucketing.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::Context;
use batching::{ClassifyError, Message};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, info};

/// Sender identifier as exported; some dumps use numbers, some strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SenderId {
    Number(i64),
    Text(String),
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One record of an exported dump.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(alias = "id")]
    pub message_id: i64,
    /// RFC 3339 instant, or a zone-less `YYYY-MM-DDTHH:MM:SS` read as UTC.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, alias = "from_id")]
    pub sender_id: Option<SenderId>,
    #[serde(default, alias = "from")]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// Preparation options for a dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceOptions {
    /// Offset applied to every instant before taking its calendar date.
    pub utc_offset_minutes: i32,
    /// Inclusive lower bound on the local date.
    pub since: Option<NaiveDate>,
    /// Inclusive upper bound on the local date.
    pub until: Option<NaiveDate>,
}

/// Read a JSON array of raw records from `path`.
pub fn read_raw_messages(path: &Path) -> anyhow::Result<Vec<RawMessage>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read messages from {}", path.display()))?;
    let raw: Vec<RawMessage> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse messages in {}", path.display()))?;
    debug!(path = %path.display(), records = raw.len(), "Read message dump");
    Ok(raw)
}

/// Read and prepare a dump in one step.
pub fn load_messages(path: &Path, options: &SourceOptions) -> anyhow::Result<Vec<Message>> {
    let raw = read_raw_messages(path)?;
    let messages = prepare_messages(raw, options)?;
    Ok(messages)
}

/// Turn raw records into messages.
///
/// Records without a date or with blank text are dropped, text is trimmed,
/// a missing sender name becomes `User <sender_id>`, repeated ids keep the
/// first occurrence, and the optional date window is applied last.
pub fn prepare_messages(
    raw: Vec<RawMessage>,
    options: &SourceOptions,
) -> Result<Vec<Message>, ClassifyError> {
    let offset = FixedOffset::east_opt(options.utc_offset_minutes * 60).ok_or_else(|| {
        ClassifyError::Configuration(format!(
            "UTC offset of {} minutes is out of range",
            options.utc_offset_minutes
        ))
    })?;

    let total = raw.len();
    let mut seen = HashSet::new();
    let mut messages = Vec::with_capacity(total);

    for record in raw {
        let Some(date) = record.date.as_deref() else {
            continue;
        };
        let text = record.text.trim();
        if text.is_empty() {
            continue;
        }
        if !seen.insert(record.message_id) {
            debug!(message_id = record.message_id, "Dropping duplicate message");
            continue;
        }

        let timestamp = local_timestamp(date, offset).ok_or_else(|| {
            ClassifyError::Input(format!(
                "message {} has an unreadable date: {date:?}",
                record.message_id
            ))
        })?;

        let local_date = timestamp.date();
        if options.since.is_some_and(|since| local_date < since)
            || options.until.is_some_and(|until| local_date > until)
        {
            continue;
        }

        let sender_name = match record.sender_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => match &record.sender_id {
                Some(id) => format!("User {id}"),
                None => "User".to_string(),
            },
        };

        messages.push(Message::new(record.message_id, sender_name, timestamp, text));
    }

    info!(
        records = total,
        kept = messages.len(),
        "Prepared messages"
    );
    Ok(messages)
}

fn local_timestamp(value: &str, offset: FixedOffset) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Some(instant.with_timezone(&offset).naive_local());
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()?;
    Some(naive.and_utc().with_timezone(&offset).naive_local())
}
