//! Calendar-week partitioning of messages.
//!
//! A week runs Monday through Sunday and is keyed by its Monday. Buckets only
//! exist for weeks that contain at least one message.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ClassifyError;
use crate::message::Message;

/// Separator between the Monday and Sunday of a rendered week range.
pub const WEEK_RANGE_SEPARATOR: &str = " -> ";

/// Timestamp format used when a message is written into a request batch.
const BATCH_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// The Monday that starts a calendar week. Ordered by date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekKey(NaiveDate);

impl WeekKey {
    /// Key of the week containing `date`.
    pub fn for_date(date: NaiveDate) -> Self {
        let offset = i64::from(date.weekday().num_days_from_monday());
        Self(date - Duration::days(offset))
    }

    pub fn monday(self) -> NaiveDate {
        self.0
    }

    pub fn sunday(self) -> NaiveDate {
        self.0 + Duration::days(6)
    }

    pub fn range(self) -> WeekRange {
        WeekRange {
            monday: self.monday(),
            sunday: self.sunday(),
        }
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for WeekKey {
    type Err = String;

    /// Parses an ISO date; the date must be a Monday.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|e| format!("invalid week key '{s}': {e}"))?;
        let key = Self::for_date(date);
        if key.0 != date {
            return Err(format!("week key '{s}' is not a Monday"));
        }
        Ok(key)
    }
}

/// Inclusive Monday–Sunday span of a week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekRange {
    pub monday: NaiveDate,
    pub sunday: NaiveDate,
}

impl fmt::Display for WeekRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.monday.format("%Y-%m-%d"),
            WEEK_RANGE_SEPARATOR,
            self.sunday.format("%Y-%m-%d")
        )
    }
}

impl FromStr for WeekRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mon, sun) = s
            .split_once(WEEK_RANGE_SEPARATOR.trim())
            .ok_or_else(|| format!("invalid week range '{s}'"))?;
        let parse = |part: &str| {
            NaiveDate::parse_from_str(part.trim(), "%Y-%m-%d")
                .map_err(|e| format!("invalid week range '{s}': {e}"))
        };
        Ok(Self {
            monday: parse(mon)?,
            sunday: parse(sun)?,
        })
    }
}

impl Serialize for WeekRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WeekRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Messages of one calendar week, ordered by `(timestamp, id)`.
///
/// Built only by [`bucket_by_week`] (or [`WeekBucket::empty`]) and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekBucket {
    week_key: WeekKey,
    messages: Vec<Message>,
}

impl WeekBucket {
    fn new(week_key: WeekKey, mut messages: Vec<Message>) -> Self {
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Self { week_key, messages }
    }

    /// A bucket with no messages.
    pub fn empty(week_key: WeekKey) -> Self {
        Self {
            week_key,
            messages: Vec::new(),
        }
    }

    pub fn week_key(&self) -> WeekKey {
        self.week_key
    }

    pub fn week_range(&self) -> WeekRange {
        self.week_key.range()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Render the week's messages as the YAML batch sent for classification.
    ///
    /// An empty bucket renders as an empty string.
    pub fn to_batch(&self) -> Result<String, ClassifyError> {
        if self.messages.is_empty() {
            return Ok(String::new());
        }

        let doc = BatchDocument {
            week_range: self.week_range().to_string(),
            messages: self
                .messages
                .iter()
                .map(|m| BatchEntry {
                    message_id: m.id,
                    name: &m.sender_name,
                    date: m.timestamp.format(BATCH_TIMESTAMP_FORMAT).to_string(),
                    message: &m.text,
                })
                .collect(),
        };

        serde_yaml::to_string(&doc).map_err(|e| {
            ClassifyError::Input(format!("week {} batch serialization: {e}", self.week_key))
        })
    }
}

#[derive(Serialize)]
struct BatchDocument<'a> {
    week_range: String,
    messages: Vec<BatchEntry<'a>>,
}

#[derive(Serialize)]
struct BatchEntry<'a> {
    message_id: i64,
    name: &'a str,
    date: String,
    message: &'a str,
}

/// Partition messages into calendar-week buckets, ascending by week key.
pub fn bucket_by_week(messages: impl IntoIterator<Item = Message>) -> Vec<WeekBucket> {
    let mut weeks: BTreeMap<WeekKey, Vec<Message>> = BTreeMap::new();
    for message in messages {
        let key = WeekKey::for_date(message.timestamp.date());
        weeks.entry(key).or_default().push(message);
    }

    weeks
        .into_iter()
        .map(|(key, msgs)| WeekBucket::new(key, msgs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn msg(id: i64, at: &str) -> Message {
        Message::new(id, format!("user {id}"), ts(at), format!("message {id}"))
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn week_key_is_the_monday() {
        assert_eq!(WeekKey::for_date(date("2026-01-13")).to_string(), "2026-01-12");
        assert_eq!(WeekKey::for_date(date("2026-01-12")).to_string(), "2026-01-12");
        assert_eq!(WeekKey::for_date(date("2026-01-18")).to_string(), "2026-01-12");
        assert_eq!(WeekKey::for_date(date("2026-01-19")).to_string(), "2026-01-19");
    }

    #[test]
    fn week_key_crosses_year_boundary() {
        assert_eq!(WeekKey::for_date(date("2026-01-01")).to_string(), "2025-12-29");
    }

    #[test]
    fn week_range_display_and_parse() {
        let range = WeekKey::for_date(date("2026-01-16")).range();
        assert_eq!(range.to_string(), "2026-01-12 -> 2026-01-18");
        assert_eq!("2026-01-12 -> 2026-01-18".parse::<WeekRange>(), Ok(range));
    }

    #[test]
    fn week_key_parse_rejects_non_monday() {
        assert!("2026-01-12".parse::<WeekKey>().is_ok());
        assert!("2026-01-13".parse::<WeekKey>().is_err());
    }

    #[test]
    fn same_week_messages_share_a_bucket() {
        let buckets = bucket_by_week(vec![
            msg(1, "2026-01-13 09:00"),
            msg(2, "2026-01-16 10:00"),
            msg(3, "2026-01-20 08:30"),
        ]);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].week_key().to_string(), "2026-01-12");
        assert_eq!(buckets[0].messages().len(), 2);
        assert_eq!(buckets[1].week_key().to_string(), "2026-01-19");
        assert_eq!(buckets[1].messages()[0].id, 3);
    }

    #[test]
    fn buckets_sorted_and_messages_ordered_by_time_then_id() {
        let buckets = bucket_by_week(vec![
            msg(9, "2026-01-21 08:00"),
            msg(5, "2026-01-14 12:00"),
            msg(4, "2026-01-14 12:00"),
            msg(1, "2026-01-15 07:00"),
            msg(2, "2026-01-13 23:11"),
        ]);
        let keys: Vec<String> = buckets.iter().map(|b| b.week_key().to_string()).collect();
        assert_eq!(keys, vec!["2026-01-12", "2026-01-19"]);

        let ids: Vec<i64> = buckets[0].messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 4, 5, 1]);
    }

    #[test]
    fn every_message_lands_in_exactly_one_bucket() {
        let input: Vec<Message> = (0..40)
            .map(|i| {
                let day = date("2026-01-01") + Duration::days(i);
                Message::new(i, "u", day.and_hms_opt(9, 0, 0).unwrap(), "t")
            })
            .collect();
        let buckets = bucket_by_week(input.clone());

        let mut seen: Vec<i64> = buckets
            .iter()
            .flat_map(|b| b.messages().iter().map(|m| m.id))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..40).collect::<Vec<_>>());

        for bucket in &buckets {
            for m in bucket.messages() {
                assert_eq!(WeekKey::for_date(m.timestamp.date()), bucket.week_key());
            }
        }
    }

    #[test]
    fn empty_input_yields_no_buckets() {
        assert!(bucket_by_week(Vec::new()).is_empty());
    }

    #[test]
    fn batch_lists_messages_with_week_range() {
        let buckets = bucket_by_week(vec![msg(1042, "2026-01-13 00:41")]);
        let batch = buckets[0].to_batch().unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&batch).unwrap();

        assert_eq!(doc["week_range"].as_str(), Some("2026-01-12 -> 2026-01-18"));
        let first = &doc["messages"][0];
        assert_eq!(first["message_id"].as_i64(), Some(1042));
        assert_eq!(first["name"].as_str(), Some("user 1042"));
        assert_eq!(first["date"].as_str(), Some("2026-01-13 00:41"));
        assert_eq!(first["message"].as_str(), Some("message 1042"));
    }

    #[test]
    fn empty_bucket_renders_empty_batch() {
        let bucket = WeekBucket::empty(WeekKey::for_date(date("2026-01-12")));
        assert_eq!(bucket.to_batch().unwrap(), "");
    }
}
