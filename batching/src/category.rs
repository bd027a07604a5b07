//! The closed set of schedule-request categories and the items filed under them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the four schedule-request labels.
///
/// The set is closed: adding or removing a variant changes the report schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Full-day or multi-day leave.
    Absence,
    /// Arriving late.
    LateArrival,
    /// Morning-only or afternoon-only leave.
    HalfDayAbsence,
    /// Working remotely.
    RemoteWork,
}

impl Category {
    /// All categories in report order.
    pub const ALL: [Category; 4] = [
        Category::Absence,
        Category::LateArrival,
        Category::HalfDayAbsence,
        Category::RemoteWork,
    ];

    /// Wire name used in classification responses and serialized reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absence => "absence",
            Self::LateArrival => "late_arrival",
            Self::HalfDayAbsence => "half_day_absence",
            Self::RemoteWork => "remote_work",
        }
    }

    /// Human-readable heading for report consumers.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Absence => "Leave",
            Self::LateArrival => "Late arrival",
            Self::HalfDayAbsence => "Half-day leave",
            Self::RemoteWork => "Remote work",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// A message the classification service filed under a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledItem {
    pub message_id: i64,
    pub name: String,
    /// ISO `YYYY-MM-DD` dates the request applies to, in response order.
    pub dates: Vec<String>,
    /// Short free-text summary.
    pub info: String,
}

/// Items per category. All four categories are always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLabels {
    #[serde(default)]
    pub absence: Vec<LabeledItem>,
    #[serde(default)]
    pub late_arrival: Vec<LabeledItem>,
    #[serde(default)]
    pub half_day_absence: Vec<LabeledItem>,
    #[serde(default)]
    pub remote_work: Vec<LabeledItem>,
}

impl CategoryLabels {
    pub fn get(&self, category: Category) -> &[LabeledItem] {
        match category {
            Category::Absence => &self.absence,
            Category::LateArrival => &self.late_arrival,
            Category::HalfDayAbsence => &self.half_day_absence,
            Category::RemoteWork => &self.remote_work,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut Vec<LabeledItem> {
        match category {
            Category::Absence => &mut self.absence,
            Category::LateArrival => &mut self.late_arrival,
            Category::HalfDayAbsence => &mut self.half_day_absence,
            Category::RemoteWork => &mut self.remote_work,
        }
    }

    /// `(category, items)` pairs in report order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &[LabeledItem])> {
        Category::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    /// Append every category's items from `other`, preserving order.
    pub fn extend_from(&mut self, other: &CategoryLabels) {
        for category in Category::ALL {
            self.get_mut(category)
                .extend(other.get(category).iter().cloned());
        }
    }

    /// Total number of items across all categories.
    pub fn len(&self) -> usize {
        self.iter().map(|(_, items)| items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64) -> LabeledItem {
        LabeledItem {
            message_id: id,
            name: format!("user {id}"),
            dates: vec!["2026-01-13".into()],
            info: String::new(),
        }
    }

    #[test]
    fn category_round_trips_through_wire_name() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
        assert!("nghi".parse::<Category>().is_err());
    }

    #[test]
    fn empty_labels_serialize_all_four_keys() {
        let yaml = serde_yaml::to_string(&CategoryLabels::default()).unwrap();
        for category in Category::ALL {
            assert!(yaml.contains(&format!("{}: []", category.as_str())), "{yaml}");
        }
    }

    #[test]
    fn extend_from_appends_in_order() {
        let mut acc = CategoryLabels::default();
        acc.late_arrival.push(item(1));

        let mut next = CategoryLabels::default();
        next.late_arrival.push(item(2));
        next.remote_work.push(item(3));

        acc.extend_from(&next);
        let ids: Vec<i64> = acc.late_arrival.iter().map(|i| i.message_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(acc.remote_work.len(), 1);
        assert_eq!(acc.len(), 3);
    }
}
