//! Advisory ("strongly recommended") checks that go beyond schema conformance.
//!
//! Rules never change whether a document passes; they only produce warnings.
//! Each schema version owns a rule table, looked up through [`rules_for`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use crate::{
    schema_version::SchemaVersion,
    validation::{AdvisoryWarning, AdvisoryWarningType},
};

/// Mood types defined by the v1.1.0 protocol
pub const STANDARD_MOOD_TYPES: [&str; 20] = [
    "happy", "excited", "peaceful", "content", "grateful",
    "calm", "hopeful", "proud", "motivated", "sad",
    "angry", "anxious", "frustrated", "tired", "confused",
    "lonely", "neutral", "curious", "nostalgic", "surprised",
];

/// A named check evaluated against a structurally valid document
#[derive(Clone, Copy)]
pub struct AdvisoryRule {
    pub rule_id: &'static str,
    pub check: fn(&Value) -> Vec<AdvisoryWarning>,
}

impl AdvisoryRule {
    pub fn evaluate(&self, document: &Value) -> Vec<AdvisoryWarning> {
        let warnings = (self.check)(document);
        tracing::debug!(rule = self.rule_id, findings = warnings.len(), "advisory rule evaluated");
        warnings
    }
}

pub const V1_1_0_RULES: &[AdvisoryRule] = &[
    AdvisoryRule { rule_id: "timestamp-present", check: check_timestamp_present },
    AdvisoryRule { rule_id: "intensity-precision", check: check_intensity_precision },
    AdvisoryRule { rule_id: "standard-mood-types", check: check_standard_mood_types },
];

/// Advisory rules registered for a schema version
pub fn rules_for(version: &SchemaVersion) -> &'static [AdvisoryRule] {
    if *version == SchemaVersion::V1_1_0 {
        V1_1_0_RULES
    } else {
        &[]
    }
}

/// Run every v1.1.0 strongly-recommended rule
pub fn check_strongly_recommended(document: &Value) -> Vec<AdvisoryWarning> {
    V1_1_0_RULES.iter().flat_map(|rule| rule.evaluate(document)).collect()
}

fn entries(document: &Value) -> impl Iterator<Item = (usize, &Map<String, Value>)> {
    document
        .get("entries")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .filter_map(|(index, entry)| entry.as_object().map(|entry| (index, entry)))
}

fn moods(entry: &Map<String, Value>) -> impl Iterator<Item = (usize, &Map<String, Value>)> {
    entry
        .get("moods")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .filter_map(|(index, mood)| mood.as_object().map(|mood| (index, mood)))
}

fn check_timestamp_present(document: &Value) -> Vec<AdvisoryWarning> {
    if document.get("timestamp").is_some() {
        return Vec::new();
    }

    vec![AdvisoryWarning::new(
        "timestamp".to_string(),
        AdvisoryWarningType::MissingRecommendedField,
        "Strongly recommended field 'timestamp' is missing from the document".to_string(),
    )]
}

/// True when `value` does not survive rounding to 2 decimal places
pub fn exceeds_two_decimals(value: f64) -> bool {
    (value * 100.0).round() / 100.0 != value
}

fn check_intensity_precision(document: &Value) -> Vec<AdvisoryWarning> {
    let mut warnings = Vec::new();

    for (entry_index, entry) in entries(document) {
        for (mood_index, mood) in moods(entry) {
            let Some(intensity) = mood.get("intensity").and_then(Value::as_f64) else {
                continue;
            };
            if exceeds_two_decimals(intensity) {
                let path = format!("entries[{}].moods[{}].intensity", entry_index, mood_index);
                let message = format!(
                    "{} is {} which has more than 2 decimal places; round it to {:.2}",
                    path, intensity, intensity
                );
                warnings.push(AdvisoryWarning::new(path, AdvisoryWarningType::ExcessPrecision, message));
            }
        }
    }

    warnings
}

// Reports at most one offending mood per entry. A mood without a `type`
// counts as non-standard.
fn check_standard_mood_types(document: &Value) -> Vec<AdvisoryWarning> {
    let mut warnings = Vec::new();

    for (entry_index, entry) in entries(document) {
        let offender = moods(entry).find_map(|(mood_index, mood)| match mood.get("type") {
            Some(Value::String(name)) if STANDARD_MOOD_TYPES.contains(&name.as_str()) => None,
            Some(mood_type) => Some((mood_index, mood_type.to_string())),
            None => Some((mood_index, "(missing)".to_string())),
        });

        if let Some((mood_index, mood_type)) = offender {
            let path = format!("entries[{}].moods[{}].type", entry_index, mood_index);
            let message = format!(
                "entries[{}]: mood type {} is not one of the {} standard types ({})",
                entry_index,
                mood_type,
                STANDARD_MOOD_TYPES.len(),
                STANDARD_MOOD_TYPES.join(", ")
            );
            warnings.push(AdvisoryWarning::new(path, AdvisoryWarningType::NonStandardMoodType, message));
        }
    }

    warnings
}

/// Accepts RFC 3339 date-times and plain `YYYY-MM-DD` dates
fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    let text = value.as_str()?;
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.naive_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Flag entries whose `end_date` falls before their `date`.
///
/// Entries where either value is missing or unparseable produce no finding.
pub fn check_dates_consistency(document: &Value) -> Vec<AdvisoryWarning> {
    let mut warnings = Vec::new();

    for (entry_index, entry) in entries(document) {
        let (Some(start), Some(end)) = (
            entry.get("date").and_then(parse_date),
            entry.get("end_date").and_then(parse_date),
        ) else {
            continue;
        };

        if end < start {
            let path = format!("entries[{}].end_date", entry_index);
            let message = format!(
                "{} ({}) is earlier than date ({})",
                path, entry["end_date"], entry["date"]
            );
            warnings.push(AdvisoryWarning::new(path, AdvisoryWarningType::DateOrder, message));
        }
    }

    warnings
}
