use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single chat message as delivered by the message source.
///
/// `timestamp` is already expressed in the calendar (local) time used for
/// week partitioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_name: String,
    pub timestamp: NaiveDateTime,
    pub text: String,
}

impl Message {
    pub fn new(
        id: i64,
        sender_name: impl Into<String>,
        timestamp: NaiveDateTime,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            sender_name: sender_name.into(),
            timestamp,
            text: text.into(),
        }
    }
}
