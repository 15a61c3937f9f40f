use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use nalt_protocol_tools::{
    advisory::check_dates_consistency,
    schema_registry::SCHEMA_FILE_NAME,
    schema_version::SchemaVersionError,
    Document, MigrationPipeline, MigrationReporter, MigrationStep, ReportFormat, SchemaDirectory,
    SchemaRegistry, SchemaSource, SchemaVersion, Validator, ValidatorError, ValidatorOptions,
};

const SCHEMA_DIR_ENV: &str = "NALT_SCHEMA_DIR";
const LOG_ENV: &str = "NALT_LOG";

#[derive(Parser, Debug)]
#[command(name = "nalt-protocol")]
#[command(about = "Migrate and validate NALT protocol documents")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Migrate a document one version forward (1.1.0 → 1.1.1 or 1.1.1 → 1.2.0)
    Migrate {
        /// Path to the JSON document to migrate
        input: PathBuf,

        /// Version the document is at (e.g., 1.1.0)
        #[arg(long, value_name = "VERSION")]
        from: SchemaVersion,

        /// Version to migrate to (e.g., 1.1.1)
        #[arg(long, value_name = "VERSION")]
        to: SchemaVersion,

        /// Where to write the migrated document - defaults to migrated_<name>.json
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Format of the migration summary: console, json or yaml
        #[arg(long, value_name = "FORMAT", default_value_t = ReportFormat::Console)]
        report_format: ReportFormat,
    },

    /// Validate a document against a published schema version
    Validate {
        /// Path to the JSON document to validate
        input: PathBuf,

        /// Schema version to validate against (e.g., v1.1.0)
        #[arg(long, value_name = "VERSION", value_parser = parse_schema_id)]
        schema_version: SchemaVersion,

        /// Directory holding <version>/schema.json files
        #[arg(long, value_name = "DIR", env = SCHEMA_DIR_ENV, default_value = "schema")]
        schema_dir: PathBuf,

        /// Fetch <URL>/<version>/schema.json instead of reading --schema-dir
        #[arg(long, value_name = "URL")]
        schema_url: Option<String>,

        /// Skip the strongly recommended checks
        #[arg(long)]
        no_strongly_recommended: bool,

        /// Also report entries whose end_date precedes their date
        #[arg(long)]
        check_dates: bool,
    },
}

fn parse_schema_id(id: &str) -> Result<SchemaVersion, SchemaVersionError> {
    SchemaVersion::from_schema_id(id)
}

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();

    let result = match args.command {
        Command::Migrate { input, from, to, output, report_format } => {
            run_migrate(&input, &from, &to, output, report_format)
        }
        Command::Validate {
            input,
            schema_version,
            schema_dir,
            schema_url,
            no_strongly_recommended,
            check_dates,
        } => {
            let options = ValidatorOptions {
                strongly_recommended: !no_strongly_recommended,
            };
            run_validate(&input, &schema_version, schema_dir, schema_url, options, check_dates).await
        }
    };

    if let Err(e) = result {
        eprintln!("\n❌ Error: {}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))
}

/// Parse a document, requiring a JSON object at the top level
fn parse_document(text: &str, path: &Path) -> Result<Document, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(format!("Invalid document in '{}': top-level value must be a JSON object", path.display())),
        Err(e) => Err(format!("Invalid JSON in '{}': {}", path.display(), e)),
    }
}

/// `data/old.json` → `migrated_old.json` in the working directory
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    PathBuf::from(format!("migrated_{}.json", stem))
}

fn run_migrate(
    input: &Path,
    from: &SchemaVersion,
    to: &SchemaVersion,
    output: Option<PathBuf>,
    report_format: ReportFormat,
) -> Result<(), String> {
    let step = MigrationStep::between(from, to).map_err(|e| e.to_string())?;
    let document = parse_document(&read_input(input)?, input)?;

    println!("\n=== Migration {} → {} ===", from, to);
    if let Some(warning) = step.source_version_advisory(&document) {
        println!("  ⚠ Warning: {}", warning);
    }

    let outcome = MigrationPipeline::new().migrate(step, &document);

    let output_path = output.unwrap_or_else(|| default_output_path(input));
    let serialized = serde_json::to_string_pretty(&outcome.document)
        .map_err(|e| format!("Failed to serialize the migrated document: {}", e))?;
    fs::write(&output_path, serialized)
        .map_err(|e| format!("Failed to write '{}': {}", output_path.display(), e))?;

    let old_version = document.get("spec_version").and_then(Value::as_str).unwrap_or("unknown");
    let new_version = outcome.document.get("spec_version").and_then(Value::as_str).unwrap_or("unknown");
    println!("  ✓ Migration complete: {} → {}", input.display(), output_path.display());
    println!("  ✓ Version: {} → {}", old_version, new_version);

    let formatted = MigrationReporter::new()
        .with_format(report_format)
        .format_report(&outcome.report)
        .map_err(|e| e.to_string())?;
    println!("\n{}", formatted);

    println!("  ✓ Output file: {}", output_path.display());
    Ok(())
}

/// Fetch `<base>/<version>/schema.json`; a 404 means the version has no schema
async fn fetch_schema(base_url: &str, version: &SchemaVersion) -> Result<Option<Value>, String> {
    let url = format!("{}/{}/{}", base_url.trim_end_matches('/'), version.schema_id(), SCHEMA_FILE_NAME);
    println!("  ℹ Fetching schema {}...", url);

    let response = reqwest::get(&url)
        .await
        .map_err(|e| format!("Failed to fetch schema: {}", e))?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }

    let schema = response
        .error_for_status()
        .map_err(|e| format!("Failed to fetch schema: {}", e))?
        .json::<Value>()
        .await
        .map_err(|e| format!("Failed to parse schema JSON: {}", e))?;
    Ok(Some(schema))
}

fn describe_versions(versions: &[SchemaVersion]) -> String {
    if versions.is_empty() {
        return "none found".to_string();
    }
    versions.iter().map(SchemaVersion::schema_id).collect::<Vec<_>>().join(", ")
}

async fn run_validate(
    input: &Path,
    version: &SchemaVersion,
    schema_dir: PathBuf,
    schema_url: Option<String>,
    options: ValidatorOptions,
    check_dates: bool,
) -> Result<(), String> {
    println!("\n=== Schema Validation ({}) ===", version.schema_id());

    let text = read_input(input)?;
    let document: Value = serde_json::from_str(&text)
        .map_err(|e| format!("{} ('{}')", ValidatorError::MalformedInput(e), input.display()))?;

    let source: Box<dyn SchemaSource> = match schema_url {
        Some(base_url) => {
            let mut registry = SchemaRegistry::new();
            if let Some(schema) = fetch_schema(&base_url, version).await? {
                registry.add_schema(version.clone(), schema);
            }
            Box::new(registry)
        }
        None => Box::new(SchemaDirectory::new(schema_dir)),
    };

    let report = match Validator::new(source.as_ref()).with_options(options).validate(&document, version) {
        Ok(report) => report,
        Err(e @ ValidatorError::SchemaNotFound(_)) => {
            println!("  ℹ Available schema versions: {}", describe_versions(&source.available_versions()));
            return Err(e.to_string());
        }
        Err(e) => return Err(e.to_string()),
    };

    if let Some(violation) = &report.violation {
        println!("  ❌ Validation failed: '{}' does not conform to the schema.", input.display());
        println!("  Error details:");
        println!("    Message: {}", violation.message);
        println!("    Path: {}", violation.path_display());
        return Err(format!("Schema validation failed for '{}'", input.display()));
    }

    println!(
        "  ✓ Validation successful: '{}' conforms to NALT protocol {}",
        input.display(),
        version.schema_id()
    );

    if report.has_warnings() {
        println!("\n=== Strongly Recommended ===");
        for warning in &report.warnings {
            println!("  ⚠ {}", warning);
        }
    }

    if check_dates {
        println!("\n=== Date Consistency ===");
        let findings = check_dates_consistency(&document);
        if findings.is_empty() {
            println!("  ✓ No date ordering issues found");
        }
        for finding in &findings {
            println!("  ⚠ {}", finding);
        }
    }

    Ok(())
}
