//! Per-week results and the merged report.
//!
//! `merge_week_results` sorts by week key before concatenating, so the merged
//! report never depends on the order in which weeks finished classifying.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::category::{Category, CategoryLabels};
use crate::normalize::{NormalizationWarning, Normalized};
use crate::week::{WeekKey, WeekRange};

/// Normalized classification of one week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekResult {
    pub week_key: WeekKey,
    pub week_range: WeekRange,
    pub labels: CategoryLabels,
    /// Shape problems that were defaulted during normalization.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<NormalizationWarning>,
}

impl WeekResult {
    /// All four categories empty.
    pub fn empty(week_key: WeekKey) -> Self {
        Self {
            week_key,
            week_range: week_key.range(),
            labels: CategoryLabels::default(),
            warnings: Vec::new(),
        }
    }

    pub fn from_normalized(week_key: WeekKey, normalized: Normalized) -> Self {
        Self {
            week_key,
            week_range: week_key.range(),
            labels: normalized.labels,
            warnings: normalized.warnings,
        }
    }

    pub fn item_count(&self) -> usize {
        self.labels.len()
    }
}

/// The terminal artifact of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedReport {
    /// Items per category, concatenated in ascending week order.
    pub labels: CategoryLabels,
    /// Per-week results, ascending by week key.
    pub weekly_breakdown: Vec<WeekResult>,
}

/// Counts derived from a merged report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub counts: BTreeMap<Category, usize>,
    pub total: usize,
    pub weeks: usize,
    pub warnings: usize,
}

impl MergedReport {
    pub fn summary(&self) -> ReportSummary {
        let counts: BTreeMap<Category, usize> = self
            .labels
            .iter()
            .map(|(category, items)| (category, items.len()))
            .collect();
        ReportSummary {
            total: counts.values().sum(),
            counts,
            weeks: self.weekly_breakdown.len(),
            warnings: self.weekly_breakdown.iter().map(|w| w.warnings.len()).sum(),
        }
    }
}

/// Merge per-week results that may arrive in any order.
pub fn merge_week_results(mut results: Vec<WeekResult>) -> MergedReport {
    results.sort_by_key(|r| r.week_key);

    let mut labels = CategoryLabels::default();
    for result in &results {
        labels.extend_from(&result.labels);
    }

    MergedReport {
        labels,
        weekly_breakdown: results,
    }
}
