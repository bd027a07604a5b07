//! Report output.
//!
//! The format follows the output file's extension: `.json` writes
//! pretty-printed JSON, anything else YAML.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use batching::{Category, MergedReport, ReportSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Yaml,
    Json,
}

impl ReportFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

pub fn render_report(report: &MergedReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Yaml => serde_yaml::to_string(report).context("failed to render report as YAML"),
        ReportFormat::Json => {
            serde_json::to_string_pretty(report).context("failed to render report as JSON")
        }
    }
}

/// Write `report` to `path`, creating parent directories as needed.
pub fn write_report(path: &Path, report: &MergedReport) -> Result<()> {
    let rendered = render_report(report, ReportFormat::for_path(path))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, rendered)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    tracing::info!(path = %path.display(), "Report written");
    Ok(())
}

/// Human-readable summary table.
pub fn format_summary(summary: &ReportSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<18} {:>5}", "Category", "Count");
    for category in Category::ALL {
        let count = summary.counts.get(&category).copied().unwrap_or(0);
        let _ = writeln!(out, "{:<18} {:>5}", category.display_name(), count);
    }
    let _ = writeln!(out, "{:<18} {:>5}", "Total", summary.total);
    let _ = write!(
        out,
        "{} week(s), {} normalization warning(s)",
        summary.weeks, summary.warnings
    );
    out
}
