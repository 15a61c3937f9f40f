// NALT protocol migration and validation
pub mod advisory;
pub mod clock;
pub mod migration;
pub mod removal_rule;
pub mod reporter;
pub mod schema_registry;
pub mod schema_version;
pub mod validation;

// Re-export core types for convenience
pub use advisory::{check_dates_consistency, check_strongly_recommended, AdvisoryRule};
pub use clock::{Clock, FixedClock, SystemClock};
pub use migration::{Document, MigrationError, MigrationOutcome, MigrationPipeline, MigrationStep};
pub use removal_rule::{Container, RemovalRule, SLIM_CORE_REMOVALS};
pub use reporter::{MigrationReport, MigrationReporter, RemovalReport, ReportFormat};
pub use schema_registry::{SchemaDirectory, SchemaRegistry, SchemaSource};
pub use schema_version::{ProtocolVersion, SchemaVersion};
pub use validation::{
    AdvisoryWarning, AdvisoryWarningType, SchemaViolation, ValidationReport, Validator, ValidatorError,
    ValidatorOptions,
};
