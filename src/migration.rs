use serde_json::{Map, Value};
use thiserror::Error;
use crate::{
    clock::{Clock, SystemClock},
    removal_rule::{apply_removals, Container, SLIM_CORE_REMOVALS},
    reporter::MigrationReport,
    schema_version::{ProtocolVersion, SchemaVersion, PROTOCOL_NAME},
};

/// A protocol document: one JSON object per user record
pub type Document = Map<String, Value>;

/// The supported version transitions, in chain order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationStep {
    /// Drops the document `timestamp` and moves it onto entries as `created_at`
    V1_1_0ToV1_1_1,
    /// Slim-core: strips every non-essential field
    V1_1_1ToV1_2_0,
}

impl MigrationStep {
    pub const ALL: [MigrationStep; 2] = [MigrationStep::V1_1_0ToV1_1_1, MigrationStep::V1_1_1ToV1_2_0];

    pub fn source_version(&self) -> SchemaVersion {
        match self {
            MigrationStep::V1_1_0ToV1_1_1 => SchemaVersion::V1_1_0,
            MigrationStep::V1_1_1ToV1_2_0 => SchemaVersion::V1_1_1,
        }
    }

    pub fn target_version(&self) -> SchemaVersion {
        match self {
            MigrationStep::V1_1_0ToV1_1_1 => SchemaVersion::V1_1_1,
            MigrationStep::V1_1_1ToV1_2_0 => SchemaVersion::V1_2_0,
        }
    }

    /// Resolve the single step from `from` to `to`.
    ///
    /// Only adjacent versions are connected; skipping and downgrading are rejected.
    pub fn between(from: &SchemaVersion, to: &SchemaVersion) -> Result<Self, MigrationError> {
        Self::ALL
            .into_iter()
            .find(|step| &step.source_version() == from && &step.target_version() == to)
            .ok_or_else(|| MigrationError::NoMigrationPath {
                from: from.clone(),
                to: to.clone(),
            })
    }

    /// Warning text when the document does not look like this step's input.
    ///
    /// Purely advisory; the migration itself accepts any object.
    pub fn source_version_advisory(&self, doc: &Document) -> Option<String> {
        let found = doc.get("spec_version").and_then(Value::as_str).unwrap_or("unknown");
        let (accepted, expected) = match self {
            MigrationStep::V1_1_0ToV1_1_1 => {
                let expected = ProtocolVersion::new(self.source_version()).to_string();
                (found == expected, expected)
            }
            MigrationStep::V1_1_1ToV1_2_0 => {
                let family = format!("{}/1.1", PROTOCOL_NAME);
                (found.starts_with(&family), format!("{}.x", family))
            }
        };

        if accepted {
            None
        } else {
            Some(format!("Document version is '{}', expected '{}'", found, expected))
        }
    }
}

/// A migrated document together with what changed
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub document: Document,
    pub report: MigrationReport,
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("No migration path from {from} to {to}; supported steps are 1.1.0 → 1.1.1 and 1.1.1 → 1.2.0")]
    NoMigrationPath { from: SchemaVersion, to: SchemaVersion },
}

/// Applies version-to-version migrations.
///
/// Every step works on a deep copy; the input document is never touched.
pub struct MigrationPipeline<C: Clock = SystemClock> {
    clock: C,
}

impl MigrationPipeline<SystemClock> {
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl Default for MigrationPipeline<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MigrationPipeline<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    pub fn migrate(&self, step: MigrationStep, doc: &Document) -> MigrationOutcome {
        match step {
            MigrationStep::V1_1_0ToV1_1_1 => self.migrate_1_1_0_to_1_1_1(doc),
            MigrationStep::V1_1_1ToV1_2_0 => self.migrate_1_1_1_to_1_2_0(doc),
        }
    }

    /// 1.1.0 → 1.1.1: the top-level `timestamp` becomes each entry's `created_at`
    /// unless the entry already has one.
    pub fn migrate_1_1_0_to_1_1_1(&self, doc: &Document) -> MigrationOutcome {
        let step = MigrationStep::V1_1_0ToV1_1_1;
        let mut new_doc = doc.clone();
        let mut report = self.start_report(step);

        let doc_timestamp = new_doc.shift_remove("timestamp");
        if doc_timestamp.is_some() {
            report.removed.top_level.push("timestamp".to_string());
        }
        let backfill = doc_timestamp.filter(has_timestamp_value);

        match new_doc.get_mut("entries") {
            Some(Value::Array(items)) => {
                if let Some(ref timestamp) = backfill {
                    for (index, item) in items.iter_mut().enumerate() {
                        if let Value::Object(entry) = item {
                            if !entry.contains_key("created_at") {
                                entry.insert("created_at".to_string(), timestamp.clone());
                                report.backfilled_created_at.push(index);
                            }
                        }
                    }
                }
            }
            Some(_) => {}
            None => {
                new_doc.insert("entries".to_string(), Value::Array(Vec::new()));
            }
        }

        self.finish(step, new_doc, report)
    }

    /// 1.1.1 → 1.2.0: removes every field listed in [`SLIM_CORE_REMOVALS`]
    /// and records exactly what was present.
    pub fn migrate_1_1_1_to_1_2_0(&self, doc: &Document) -> MigrationOutcome {
        let step = MigrationStep::V1_1_1ToV1_2_0;
        let mut new_doc = doc.clone();
        let mut report = self.start_report(step);

        report.removed.top_level = apply_removals(&mut new_doc, SLIM_CORE_REMOVALS, Container::TopLevel);

        if let Some(Value::Object(meta)) = new_doc.get_mut("meta") {
            report.removed.meta = apply_removals(meta, SLIM_CORE_REMOVALS, Container::Meta);
        }

        if let Some(Value::Array(entries)) = new_doc.get_mut("entries") {
            for (index, item) in entries.iter_mut().enumerate() {
                if let Value::Object(entry) = item {
                    let removed = apply_removals(entry, SLIM_CORE_REMOVALS, Container::Entry);
                    report.removed.record_entry(index, removed);
                }
            }
        }

        self.finish(step, new_doc, report)
    }

    fn start_report(&self, step: MigrationStep) -> MigrationReport {
        MigrationReport::new(
            step.source_version(),
            step.target_version(),
            self.clock.migration_timestamp(),
        )
    }

    fn finish(&self, step: MigrationStep, mut doc: Document, report: MigrationReport) -> MigrationOutcome {
        doc.insert(
            "spec_version".to_string(),
            Value::String(ProtocolVersion::new(step.target_version()).to_string()),
        );
        doc.insert("x_migrated_at".to_string(), Value::String(report.migrated_at.clone()));

        tracing::info!(
            from = %step.source_version(),
            to = %step.target_version(),
            removed_top_level = report.removed.top_level.len(),
            removed_meta = report.removed.meta.len(),
            entries_touched = report.removed.entries.len(),
            backfilled = report.backfilled_created_at.len(),
            "migration step complete"
        );

        MigrationOutcome { document: doc, report }
    }
}

/// Null and empty-string timestamps carry nothing worth copying onto entries
fn has_timestamp_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn pipeline() -> MigrationPipeline<FixedClock> {
        MigrationPipeline::with_clock(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()))
    }

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_step_between_adjacent_versions() {
        assert_eq!(
            MigrationStep::between(&SchemaVersion::V1_1_0, &SchemaVersion::V1_1_1).unwrap(),
            MigrationStep::V1_1_0ToV1_1_1
        );
        assert_eq!(
            MigrationStep::between(&SchemaVersion::V1_1_1, &SchemaVersion::V1_2_0).unwrap(),
            MigrationStep::V1_1_1ToV1_2_0
        );
    }

    #[test]
    fn test_step_between_rejects_skip_and_downgrade() {
        assert!(MigrationStep::between(&SchemaVersion::V1_1_0, &SchemaVersion::V1_2_0).is_err());
        assert!(MigrationStep::between(&SchemaVersion::V1_2_0, &SchemaVersion::V1_1_1).is_err());
        assert!(MigrationStep::between(&SchemaVersion::V1_1_1, &SchemaVersion::V1_1_1).is_err());
    }

    #[test]
    fn test_created_at_backfill() {
        let input = doc(json!({
            "timestamp": "2024-01-01T00:00:00Z",
            "entries": [{}, {"created_at": "2023-01-01T00:00:00Z"}]
        }));

        let outcome = pipeline().migrate_1_1_0_to_1_1_1(&input);
        let out = &outcome.document;

        assert_eq!(out["entries"][0]["created_at"], "2024-01-01T00:00:00Z");
        assert_eq!(out["entries"][1]["created_at"], "2023-01-01T00:00:00Z");
        assert!(!out.contains_key("timestamp"));
        assert_eq!(out["spec_version"], "nalt-protocol/1.1.1");
        assert_eq!(out["x_migrated_at"], "2024-05-01T08:30:00.000000Z");
        assert_eq!(outcome.report.backfilled_created_at, vec![0]);
        assert_eq!(outcome.report.removed.top_level, vec!["timestamp"]);
    }

    #[test]
    fn test_first_step_is_stable_on_its_own_output() {
        let input = doc(json!({
            "timestamp": "2024-01-01T00:00:00Z",
            "entries": [{}, {"created_at": "2023-01-01T00:00:00Z"}, {"date": "2024-01-02"}]
        }));

        let once = pipeline().migrate_1_1_0_to_1_1_1(&input).document;
        let twice = pipeline().migrate_1_1_0_to_1_1_1(&once);

        assert_eq!(once["entries"], twice.document["entries"]);
        assert!(twice.report.backfilled_created_at.is_empty());
        assert!(twice.report.removed.is_empty());
    }

    #[test]
    fn test_first_step_without_timestamp_or_entries() {
        let input = doc(json!({ "spec_version": "nalt-protocol/1.1.0" }));

        let outcome = pipeline().migrate_1_1_0_to_1_1_1(&input);

        assert_eq!(outcome.document["entries"], json!([]));
        assert_eq!(outcome.document["spec_version"], "nalt-protocol/1.1.1");
        assert!(outcome.report.removed.top_level.is_empty());
    }

    #[test]
    fn test_first_step_null_timestamp_does_not_backfill() {
        let input = doc(json!({ "timestamp": null, "entries": [{}] }));

        let outcome = pipeline().migrate_1_1_0_to_1_1_1(&input);

        assert_eq!(outcome.document["entries"], json!([{}]));
        assert!(!outcome.document.contains_key("timestamp"));
    }

    #[test]
    fn test_first_step_preserves_entry_order_and_count() {
        let input = doc(json!({
            "timestamp": "t",
            "entries": [{"date": "a"}, "not-an-object", {"date": "c"}]
        }));

        let out = pipeline().migrate_1_1_0_to_1_1_1(&input).document;
        let entries = out["entries"].as_array().unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["date"], "a");
        assert_eq!(entries[1], "not-an-object");
        assert_eq!(entries[2]["date"], "c");
    }

    #[test]
    fn test_slim_core_removal_example() {
        let input = doc(json!({
            "entries": [{"summary": "x", "created_at": "t"}],
            "signature": "s"
        }));

        let outcome = pipeline().migrate_1_1_1_to_1_2_0(&input);

        assert_eq!(outcome.document["entries"], json!([{}]));
        assert!(!outcome.document.contains_key("signature"));
        assert_eq!(outcome.report.removed.top_level, vec!["signature"]);
        assert!(outcome.report.removed.meta.is_empty());
        assert_eq!(outcome.report.removed.entries.len(), 1);
        assert_eq!(outcome.report.removed.entries[&0], vec!["summary", "created_at"]);
        assert_eq!(outcome.document["spec_version"], "nalt-protocol/1.2.0");
    }

    #[test]
    fn test_slim_core_removes_every_listed_field() {
        let input = doc(json!({
            "spec_version": "nalt-protocol/1.1.1",
            "signature": "s",
            "timestamp": "t",
            "meta": {
                "locale": "ja-JP",
                "x_utc_offset_minutes": 540,
                "x_processed_by": "tool",
                "x_ai_processing": {},
                "x_statistics": {},
                "x_migration": {},
                "x_encryption": {},
                "x_merged_from": [],
                "x_custom": true
            },
            "entries": [
                {
                    "date": "2024-01-01",
                    "summary": "s",
                    "moods": [],
                    "tags": [],
                    "entities": [],
                    "end_date": "2024-01-02",
                    "created_at": "t",
                    "x_relations": [],
                    "x_due_date": "2024-02-01"
                },
                { "date": "2024-01-03" }
            ]
        }));

        let outcome = pipeline().migrate_1_1_1_to_1_2_0(&input);
        let out = &outcome.document;

        assert_eq!(out["meta"], json!({ "locale": "ja-JP", "x_custom": true }));
        assert_eq!(out["entries"], json!([{ "date": "2024-01-01" }, { "date": "2024-01-03" }]));
        assert_eq!(outcome.report.removed.top_level, vec!["signature", "timestamp"]);
        assert_eq!(outcome.report.removed.meta.len(), 7);
        assert_eq!(outcome.report.removed.entries[&0].len(), 8);
        assert!(!outcome.report.removed.entries.contains_key(&1));
    }

    #[test]
    fn test_slim_core_tolerates_missing_meta_and_entries() {
        let input = doc(json!({ "spec_version": "nalt-protocol/1.1.1" }));

        let outcome = pipeline().migrate_1_1_1_to_1_2_0(&input);

        assert!(outcome.report.removed.is_empty());
        assert!(!outcome.document.contains_key("entries"));
        assert!(!outcome.document.contains_key("meta"));
    }

    #[test]
    fn test_migrations_do_not_alias_input() {
        let input = doc(json!({
            "timestamp": "t",
            "meta": { "x_statistics": {"count": 1}, "locale": "en" },
            "entries": [{ "summary": "keep me", "moods": [{"type": "happy", "intensity": 0.5}] }]
        }));
        let snapshot = input.clone();

        let mut first = pipeline().migrate_1_1_0_to_1_1_1(&input).document;
        first["entries"][0]["summary"] = json!("changed");
        first["meta"]["locale"] = json!("fr");

        let mut second = pipeline().migrate_1_1_1_to_1_2_0(&input).document;
        second["entries"][0]["date"] = json!("2024-01-01");
        second["meta"]["locale"] = json!("de");

        assert_eq!(input, snapshot);
    }

    fn keys(map: &Document) -> Vec<&str> {
        map.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_first_step_keeps_key_order() {
        let input = doc(json!({
            "spec_version": "nalt-protocol/1.1.0",
            "timestamp": "t",
            "meta": { "z": 1, "a": 2 },
            "entries": [{ "title": "x", "date": "d" }]
        }));

        let out = pipeline().migrate_1_1_0_to_1_1_1(&input).document;

        assert_eq!(keys(&out), vec!["spec_version", "meta", "entries", "x_migrated_at"]);
        assert_eq!(keys(out["meta"].as_object().unwrap()), vec!["z", "a"]);
        assert_eq!(keys(out["entries"][0].as_object().unwrap()), vec!["title", "date", "created_at"]);

        let text = serde_json::to_string(&out["meta"]).unwrap();
        assert_eq!(text, r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn test_slim_core_keeps_key_order() {
        let input = doc(json!({
            "spec_version": "nalt-protocol/1.1.1",
            "signature": "s",
            "meta": { "z": 1, "x_statistics": {}, "a": 2 },
            "entries": [{ "title": "x", "summary": "s", "date": "d" }]
        }));

        let out = pipeline().migrate_1_1_1_to_1_2_0(&input).document;

        assert_eq!(keys(&out), vec!["spec_version", "meta", "entries", "x_migrated_at"]);
        assert_eq!(keys(out["meta"].as_object().unwrap()), vec!["z", "a"]);
        assert_eq!(keys(out["entries"][0].as_object().unwrap()), vec!["title", "date"]);
    }

    #[test]
    fn test_chained_migration() {
        let input = doc(json!({
            "spec_version": "nalt-protocol/1.1.0",
            "timestamp": "2024-01-01T00:00:00Z",
            "entries": [{ "date": "2024-01-01", "summary": "s" }]
        }));
        let pipeline = pipeline();

        let first = pipeline.migrate(MigrationStep::V1_1_0ToV1_1_1, &input);
        let second = pipeline.migrate(MigrationStep::V1_1_1ToV1_2_0, &first.document);

        assert_eq!(second.document["entries"], json!([{ "date": "2024-01-01" }]));
        assert_eq!(second.report.removed.entries[&0], vec!["summary", "created_at"]);
        assert!(second.report.removed.top_level.is_empty());
        assert_eq!(second.document["spec_version"], "nalt-protocol/1.2.0");
    }

    #[test]
    fn test_source_version_advisory() {
        let v110 = doc(json!({ "spec_version": "nalt-protocol/1.1.0" }));
        let v111 = doc(json!({ "spec_version": "nalt-protocol/1.1.1" }));
        let missing = doc(json!({}));

        assert!(MigrationStep::V1_1_0ToV1_1_1.source_version_advisory(&v110).is_none());
        assert!(MigrationStep::V1_1_0ToV1_1_1.source_version_advisory(&v111).is_some());
        assert!(MigrationStep::V1_1_1ToV1_2_0.source_version_advisory(&v110).is_none());
        assert!(MigrationStep::V1_1_1ToV1_2_0.source_version_advisory(&v111).is_none());

        let warning = MigrationStep::V1_1_1ToV1_2_0.source_version_advisory(&missing).unwrap();
        assert!(warning.contains("'unknown'"));
        assert!(warning.contains("nalt-protocol/1.1.x"));
    }
}
