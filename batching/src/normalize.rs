//! Response normalization: raw classification text to strict four-category labels.
//!
//! ```text
//! raw text
//!   ├─ trim
//!   ├─ strip_code_fence      ──▶ UnterminatedFence
//!   ├─ YAML parse            ──▶ Parse
//!   ├─ top-level mapping?    ──▶ Integrity
//!   └─ per category
//!        ├─ absent / null    → []
//!        ├─ sequence         → decode items (bad item ──▶ Integrity)
//!        └─ anything else    → [] + NotASequence warning
//! ```
//!
//! Any error fails the whole week; categories that did parse are not salvaged.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::category::{Category, CategoryLabels, LabeledItem};
use crate::errors::ClassifyError;

const FENCE: &str = "```";

/// A shape problem that was defaulted instead of failing the week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationWarning {
    /// A known category held something other than a list; it was emptied.
    NotASequence { category: Category, found: String },
    /// A top-level key outside the category set was ignored.
    UnknownKey { key: String },
}

impl fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotASequence { category, found } => {
                write!(f, "category '{category}' is a {found}, not a list; treated as empty")
            }
            Self::UnknownKey { key } => write!(f, "unknown key '{key}' ignored"),
        }
    }
}

/// Output of a successful normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub labels: CategoryLabels,
    pub warnings: Vec<NormalizationWarning>,
}

/// Remove an optional enclosing code fence.
///
/// Text that does not start with a fence is returned trimmed. A leading fence
/// may carry a tag (`yaml`, `YAML`, `yml`, ...) on its opening line; the
/// closing fence may share the last content line. A leading fence without a
/// closing one is an error.
pub fn strip_code_fence(text: &str) -> Result<&str, ClassifyError> {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix(FENCE) else {
        return Ok(trimmed);
    };
    let Some(body) = rest.strip_suffix(FENCE) else {
        return Err(ClassifyError::UnterminatedFence);
    };

    let interior = match body.split_once('\n') {
        Some((tag, interior)) if is_fence_tag(tag) => interior,
        _ => body,
    };
    Ok(interior.trim())
}

fn is_fence_tag(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'))
}

/// Normalize one week's raw classification response.
pub fn normalize_response(raw: &str) -> Result<Normalized, ClassifyError> {
    let body = strip_code_fence(raw)?;

    let value: Value = serde_yaml::from_str(body)
        .map_err(|e| ClassifyError::Parse(format!("response is not valid YAML: {e}")))?;

    let Value::Mapping(map) = value else {
        return Err(ClassifyError::Integrity(format!(
            "expected a mapping of categories, found {}",
            kind(&value)
        )));
    };

    normalize_mapping(&map)
}

fn normalize_mapping(map: &Mapping) -> Result<Normalized, ClassifyError> {
    let mut out = Normalized::default();

    for (key, value) in map {
        let category = match key.as_str().map(str::parse::<Category>) {
            Some(Ok(category)) => category,
            _ => {
                out.warnings.push(NormalizationWarning::UnknownKey {
                    key: describe_key(key),
                });
                continue;
            }
        };

        match value {
            Value::Null => {}
            Value::Sequence(items) => {
                let decoded = items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| decode_item(category, idx, item))
                    .collect::<Result<Vec<_>, _>>()?;
                *out.labels.get_mut(category) = decoded;
            }
            other => out.warnings.push(NormalizationWarning::NotASequence {
                category,
                found: kind(other).to_string(),
            }),
        }
    }

    Ok(out)
}

fn decode_item(category: Category, idx: usize, value: &Value) -> Result<LabeledItem, ClassifyError> {
    let at = || format!("{category}[{idx}]");

    let Value::Mapping(map) = value else {
        return Err(ClassifyError::Integrity(format!(
            "{} is a {}, expected a mapping",
            at(),
            kind(value)
        )));
    };

    let message_id = match map.get("message_id") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| ClassifyError::Integrity(format!("{} has no integer message_id", at())))?;

    let name = scalar_text(map.get("name"))
        .ok_or_else(|| ClassifyError::Integrity(format!("{}.name is not text", at())))?;
    let info = scalar_text(map.get("info"))
        .ok_or_else(|| ClassifyError::Integrity(format!("{}.info is not text", at())))?;

    let dates = match map.get("dates") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(seq)) => seq
            .iter()
            .map(|d| {
                scalar_text(Some(d)).ok_or_else(|| {
                    ClassifyError::Integrity(format!("{}.dates holds a {}", at(), kind(d)))
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::String(s)) => vec![s.clone()],
        Some(other) => {
            return Err(ClassifyError::Integrity(format!(
                "{}.dates is a {}, expected a list",
                at(),
                kind(other)
            )))
        }
    };

    Ok(LabeledItem {
        message_id,
        name,
        dates,
        info,
    })
}

/// Text of a scalar; absent or null reads as empty.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => Some(String::new()),
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(_) => None,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn describe_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => kind(other).to_string(),
    }
}
