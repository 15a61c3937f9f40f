use jsonschema::{paths::PathChunk, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use crate::{
    advisory,
    schema_registry::{RegistryError, SchemaSource},
    schema_version::{ProtocolVersion, SchemaVersion},
};

/// Outcome of validating one document against one schema version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub schema_version: SchemaVersion,
    pub is_valid: bool,
    /// First structural violation, present only when `is_valid` is false
    pub violation: Option<SchemaViolation>,
    pub warnings: Vec<AdvisoryWarning>,
}

impl ValidationReport {
    pub fn new(schema_version: SchemaVersion) -> Self {
        Self {
            schema_version,
            is_valid: true,
            violation: None,
            warnings: Vec::new(),
        }
    }

    pub fn set_violation(&mut self, violation: SchemaViolation) {
        self.is_valid = false;
        self.violation = Some(violation);
    }

    pub fn add_warning(&mut self, warning: AdvisoryWarning) {
        self.warnings.push(warning);
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Turn a failed report into [`ValidatorError::SchemaViolation`]; on success
    /// hand back the advisory warnings.
    pub fn ensure_valid(self) -> Result<Vec<AdvisoryWarning>, ValidatorError> {
        match self.violation {
            Some(violation) => Err(ValidatorError::SchemaViolation(violation)),
            None => Ok(self.warnings),
        }
    }
}

/// One step in the path to a violating value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(index) => write!(f, "{}", index),
            PathSegment::Key(key) => write!(f, "{:?}", key),
        }
    }
}

/// The first place a document breaks its schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub message: String,
    pub path: Vec<PathSegment>,
}

impl SchemaViolation {
    pub fn new(message: String, path: Vec<PathSegment>) -> Self {
        Self { message, path }
    }

    fn from_error(error: &jsonschema::ValidationError<'_>) -> Self {
        let path = error
            .instance_path
            .iter()
            .map(|chunk| match chunk {
                PathChunk::Property(name) => PathSegment::Key(name.to_string()),
                PathChunk::Index(index) => PathSegment::Index(*index),
                PathChunk::Keyword(keyword) => PathSegment::Key(keyword.to_string()),
            })
            .collect();
        Self::new(error.to_string(), path)
    }

    /// Path rendered as a list, e.g. `["entries", 0, "moods"]`
    pub fn path_display(&self) -> String {
        let parts: Vec<String> = self.path.iter().map(ToString::to_string).collect();
        format!("[{}]", parts.join(", "))
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {})", self.message, self.path_display())
    }
}

/// Non-fatal finding beyond strict schema conformance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryWarning {
    pub field_path: String,
    pub warning_type: AdvisoryWarningType,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvisoryWarningType {
    MissingRecommendedField,
    ExcessPrecision,
    NonStandardMoodType,
    VersionMismatch,
    DateOrder,
}

impl AdvisoryWarning {
    pub fn new(field_path: String, warning_type: AdvisoryWarningType, message: String) -> Self {
        Self {
            field_path,
            warning_type,
            message,
        }
    }
}

impl fmt::Display for AdvisoryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("Invalid JSON input: {0}")]
    MalformedInput(#[from] serde_json::Error),

    #[error("Schema not found for version {}", .0.schema_id())]
    SchemaNotFound(SchemaVersion),

    #[error("Schema {} could not be compiled: {message}", .version.schema_id())]
    InvalidSchema { version: SchemaVersion, message: String },

    #[error("Schema violation: {0}")]
    SchemaViolation(SchemaViolation),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Knobs for [`Validator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorOptions {
    /// Run the advisory rules registered for the schema version
    pub strongly_recommended: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            strongly_recommended: true,
        }
    }
}

/// Checks documents against versioned JSON Schemas plus advisory rules
pub struct Validator<S: SchemaSource> {
    source: S,
    options: ValidatorOptions,
}

impl<S: SchemaSource> Validator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            options: ValidatorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ValidatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Parse `input` as JSON, then [`validate`](Self::validate) it
    pub fn validate_str(&self, input: &str, version: &SchemaVersion) -> Result<ValidationReport, ValidatorError> {
        let document: Value = serde_json::from_str(input)?;
        self.validate(&document, version)
    }

    /// Validate `document` against the schema registered for `version`.
    ///
    /// A document that breaks the schema is not an `Err`: the report comes back
    /// with `is_valid == false` and the first violation. Errors are reserved for
    /// schema lookup and compilation failures.
    pub fn validate(&self, document: &Value, version: &SchemaVersion) -> Result<ValidationReport, ValidatorError> {
        let schema = self
            .source
            .load_schema(version)?
            .ok_or_else(|| ValidatorError::SchemaNotFound(version.clone()))?;

        let compiled = JSONSchema::compile(&schema).map_err(|e| ValidatorError::InvalidSchema {
            version: version.clone(),
            message: e.to_string(),
        })?;

        let mut report = ValidationReport::new(version.clone());

        if let Err(mut errors) = compiled.validate(document) {
            if let Some(error) = errors.next() {
                let violation = SchemaViolation::from_error(&error);
                tracing::debug!(version = %version.schema_id(), violation = %violation, "schema violation");
                report.set_violation(violation);
                return Ok(report);
            }
        }

        if self.options.strongly_recommended {
            if let Some(warning) = version_agreement(document, version) {
                report.add_warning(warning);
            }
            for rule in advisory::rules_for(version) {
                for warning in rule.evaluate(document) {
                    report.add_warning(warning);
                }
            }
        }

        tracing::info!(
            version = %version.schema_id(),
            warnings = report.warnings.len(),
            "document conforms to schema"
        );
        Ok(report)
    }
}

/// Warn when the document's `spec_version` names a different version
fn version_agreement(document: &Value, version: &SchemaVersion) -> Option<AdvisoryWarning> {
    let declared = document.get("spec_version")?.as_str()?;
    match declared.parse::<ProtocolVersion>() {
        Ok(parsed) if parsed.version == *version => None,
        _ => Some(AdvisoryWarning::new(
            "spec_version".to_string(),
            AdvisoryWarningType::VersionMismatch,
            format!(
                "spec_version '{}' does not match the schema version {}",
                declared,
                version.schema_id()
            ),
        )),
    }
}
