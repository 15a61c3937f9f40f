use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use crate::schema_version::{ProtocolVersion, SchemaVersion};

/// Fields a migration step deleted, grouped by where they lived
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReport {
    pub top_level: Vec<String>,
    pub meta: Vec<String>,
    /// Keyed by the entry's index in the input document
    pub entries: BTreeMap<usize, Vec<String>>,
}

impl RemovalReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.top_level.is_empty() && self.meta.is_empty() && self.entries.is_empty()
    }

    /// Record removals for one entry; entries with nothing removed are not listed
    pub fn record_entry(&mut self, index: usize, fields: Vec<String>) {
        if !fields.is_empty() {
            self.entries.insert(index, fields);
        }
    }

    /// Number of entries each field was removed from, ordered by field name
    pub fn entry_field_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for fields in self.entries.values() {
            for field in fields {
                *counts.entry(field.as_str()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Human-readable summary, one line per non-empty category
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if !self.top_level.is_empty() {
            lines.push(format!("Top-level fields removed: {}", self.top_level.join(", ")));
        }

        if !self.meta.is_empty() {
            lines.push(format!("Meta fields removed: {}", self.meta.join(", ")));
        }

        let counts = self.entry_field_counts();
        if !counts.is_empty() {
            let parts: Vec<String> = counts
                .iter()
                .map(|(field, count)| {
                    let noun = if *count == 1 { "entry" } else { "entries" };
                    format!("{} ({} {})", field, count, noun)
                })
                .collect();
            lines.push(format!("Entry fields removed: {}", parts.join(", ")));
        }

        lines
    }
}

/// Everything a single migration step changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub source_version: SchemaVersion,
    pub target_version: SchemaVersion,
    pub migrated_at: String,
    pub removed: RemovalReport,
    /// Indices of entries whose `created_at` was filled from the document timestamp
    pub backfilled_created_at: Vec<usize>,
}

impl MigrationReport {
    pub fn new(source_version: SchemaVersion, target_version: SchemaVersion, migrated_at: String) -> Self {
        Self {
            source_version,
            target_version,
            migrated_at,
            removed: RemovalReport::new(),
            backfilled_created_at: Vec::new(),
        }
    }

    pub fn summary(&self) -> String {
        let mut lines = self.removed.summary_lines();

        if !self.backfilled_created_at.is_empty() {
            let count = self.backfilled_created_at.len();
            let noun = if count == 1 { "entry" } else { "entries" };
            lines.push(format!("created_at backfilled from document timestamp: {} {}", count, noun));
        }

        if lines.is_empty() {
            lines.push("No fields changed".to_string());
        }

        lines.join("\n")
    }
}

/// Available output formats for migration reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Console,
    Json,
    Yaml,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(ReportFormat::Console),
            "json" => Ok(ReportFormat::Json),
            "yaml" => Ok(ReportFormat::Yaml),
            other => Err(format!("Unknown report format '{}'. Expected: console, json or yaml", other)),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Console => write!(f, "console"),
            ReportFormat::Json => write!(f, "json"),
            ReportFormat::Yaml => write!(f, "yaml"),
        }
    }
}

/// Renders migration reports in the configured format
pub struct MigrationReporter {
    output_format: ReportFormat,
}

impl MigrationReporter {
    pub fn new() -> Self {
        Self {
            output_format: ReportFormat::Console,
        }
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn format_report(&self, report: &MigrationReport) -> Result<String, ReportError> {
        match self.output_format {
            ReportFormat::Console => Ok(self.format_console_report(report)),
            ReportFormat::Json => serde_json::to_string_pretty(report)
                .map_err(|e| ReportError::SerializationError(e.to_string())),
            ReportFormat::Yaml => serde_yaml::to_string(report)
                .map_err(|e| ReportError::SerializationError(e.to_string())),
        }
    }

    fn format_console_report(&self, report: &MigrationReport) -> String {
        let mut output = String::new();

        output.push_str("=== Migration Summary ===\n");
        output.push_str(&format!(
            "Version: {} → {}\n",
            ProtocolVersion::new(report.source_version.clone()),
            ProtocolVersion::new(report.target_version.clone()),
        ));
        output.push_str(&format!("Migrated at: {}\n\n", report.migrated_at));

        for line in report.summary().lines() {
            output.push_str(&format!("  • {}\n", line));
        }

        output
    }
}

impl Default for MigrationReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_removal_report() -> RemovalReport {
        let mut removed = RemovalReport::new();
        removed.top_level.push("signature".to_string());
        removed.meta.push("x_statistics".to_string());
        removed.record_entry(0, vec!["summary".to_string(), "tags".to_string()]);
        removed.record_entry(1, Vec::new());
        removed.record_entry(2, vec!["tags".to_string()]);
        removed
    }

    #[test]
    fn test_record_entry_skips_empty() {
        let removed = sample_removal_report();
        assert_eq!(removed.entries.len(), 2);
        assert!(!removed.entries.contains_key(&1));
    }

    #[test]
    fn test_entry_field_counts_grouped_and_sorted() {
        let removed = sample_removal_report();
        let counts: Vec<_> = removed.entry_field_counts().into_iter().collect();
        assert_eq!(counts, vec![("summary", 1), ("tags", 2)]);
    }

    #[test]
    fn test_summary_lines() {
        let lines = sample_removal_report().summary_lines();
        assert_eq!(
            lines,
            vec![
                "Top-level fields removed: signature".to_string(),
                "Meta fields removed: x_statistics".to_string(),
                "Entry fields removed: summary (1 entry), tags (2 entries)".to_string(),
            ]
        );
    }

    #[test]
    fn test_summary_is_independent_of_entry_order() {
        let mut forward = RemovalReport::new();
        forward.record_entry(0, vec!["moods".to_string()]);
        forward.record_entry(1, vec!["created_at".to_string(), "moods".to_string()]);

        let mut reversed = RemovalReport::new();
        reversed.record_entry(0, vec!["created_at".to_string(), "moods".to_string()]);
        reversed.record_entry(1, vec!["moods".to_string()]);

        assert_eq!(forward.summary_lines(), reversed.summary_lines());
    }

    #[test]
    fn test_empty_report_summary() {
        let report = MigrationReport::new(SchemaVersion::V1_1_1, SchemaVersion::V1_2_0, "t".to_string());
        assert_eq!(report.summary(), "No fields changed");
    }

    #[test]
    fn test_report_format_from_str() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("yaml".parse::<ReportFormat>().unwrap(), ReportFormat::Yaml);
        assert!("html".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_format_console_report() {
        let mut report = MigrationReport::new(
            SchemaVersion::V1_1_1,
            SchemaVersion::V1_2_0,
            "2024-05-01T08:30:00.000000Z".to_string(),
        );
        report.removed = sample_removal_report();

        let formatted = MigrationReporter::new().format_report(&report).unwrap();
        assert!(formatted.contains("Migration Summary"));
        assert!(formatted.contains("nalt-protocol/1.1.1 → nalt-protocol/1.2.0"));
        assert!(formatted.contains("tags (2 entries)"));
    }

    #[test]
    fn test_format_json_report() {
        let mut report = MigrationReport::new(SchemaVersion::V1_1_0, SchemaVersion::V1_1_1, "t".to_string());
        report.backfilled_created_at = vec![0, 2];

        let formatted = MigrationReporter::new()
            .with_format(ReportFormat::Json)
            .format_report(&report)
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&formatted).unwrap();
        assert_eq!(parsed["backfilled_created_at"], serde_json::json!([0, 2]));
        assert_eq!(parsed["target_version"]["minor"], 1);
    }

    #[test]
    fn test_format_yaml_report() {
        let mut report = MigrationReport::new(SchemaVersion::V1_1_1, SchemaVersion::V1_2_0, "t".to_string());
        report.removed = sample_removal_report();

        let formatted = MigrationReporter::new()
            .with_format(ReportFormat::Yaml)
            .format_report(&report)
            .unwrap();
        let parsed: MigrationReport = serde_yaml::from_str(&formatted).unwrap();
        assert_eq!(parsed, report);
    }
}
