//! Instruction text for the classification service.

/// Fixed instructions sent ahead of every week's batch.
pub const CLASSIFY_INSTRUCTIONS: &str = r#"You are an assistant that sorts work-schedule request messages.

Classify each message into one of these categories:
- absence: a full day or several days of leave (day off, leave, off work)
- late_arrival: arriving late or starting later than usual
- half_day_absence: leave for half a day (morning off, afternoon off)
- remote_work: working remotely, working online, work from home

Ignore messages that fit none of the categories.

Example:
Input (YAML):
week_range: 2026-01-12 -> 2026-01-18
messages:
- message_id: 1042
  name: Nguyen Duy Thang
  date: 2026-01-13 00:41
  message: Could I come in late around 10am today, personal matter
- message_id: 1047
  name: Tin Lu
  date: 2026-01-13 23:11
  message: I'd like to work remotely today (14/1), I have a fever

Output (YAML):
absence: []
late_arrival:
  - message_id: 1042
    name: Nguyen Duy Thang
    dates:
      - "2026-01-13"
    info: "Late until 10am"
half_day_absence: []
remote_work:
  - message_id: 1047
    name: Tin Lu
    dates:
      - "2026-01-14"
    info: "Remote due to fever"

Rules:
- Return only YAML, no other text
- dates must be a list of days in YYYY-MM-DD format
- If a message mentions a day as d/m (for example 14/1), convert it to YYYY-MM-DD using the year of the send date
- If no specific day is mentioned, use the send date
- info should be short, at most 50 characters
- If no message belongs to a category, use an empty list []"#;

/// Full request text for one week's serialized batch.
pub fn classify_prompt(batch: &str) -> String {
    format!("{CLASSIFY_INSTRUCTIONS}\n\nInput (YAML):\n{batch}\n\nOutput (YAML):")
}
