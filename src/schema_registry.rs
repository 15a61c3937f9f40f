use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use serde_json::Value;
use thiserror::Error;
use crate::schema_version::SchemaVersion;

/// File name of a schema inside its version directory
pub const SCHEMA_FILE_NAME: &str = "schema.json";

/// Lookup of JSON Schema documents by version.
///
/// `Ok(None)` means no schema exists for the version; `Err` means one may exist
/// but could not be read.
pub trait SchemaSource {
    fn load_schema(&self, version: &SchemaVersion) -> Result<Option<Value>, RegistryError>;

    /// Versions this source can serve, sorted ascending
    fn available_versions(&self) -> Vec<SchemaVersion>;
}

impl<S: SchemaSource + ?Sized> SchemaSource for &S {
    fn load_schema(&self, version: &SchemaVersion) -> Result<Option<Value>, RegistryError> {
        (**self).load_schema(version)
    }

    fn available_versions(&self) -> Vec<SchemaVersion> {
        (**self).available_versions()
    }
}

impl<S: SchemaSource + ?Sized> SchemaSource for Box<S> {
    fn load_schema(&self, version: &SchemaVersion) -> Result<Option<Value>, RegistryError> {
        (**self).load_schema(version)
    }

    fn available_versions(&self) -> Vec<SchemaVersion> {
        (**self).available_versions()
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read schema {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse schema {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// In-memory schemas keyed by version
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<SchemaVersion, Value>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    pub fn add_schema(&mut self, version: SchemaVersion, schema: Value) {
        self.schemas.insert(version, schema);
    }

}

impl SchemaSource for SchemaRegistry {
    fn load_schema(&self, version: &SchemaVersion) -> Result<Option<Value>, RegistryError> {
        Ok(self.schemas.get(version).cloned())
    }

    fn available_versions(&self) -> Vec<SchemaVersion> {
        let mut versions: Vec<_> = self.schemas.keys().cloned().collect();
        versions.sort();
        versions
    }
}

/// Schemas laid out on disk as `<root>/v<major>.<minor>.<patch>/schema.json`
#[derive(Debug, Clone)]
pub struct SchemaDirectory {
    root: PathBuf,
}

impl SchemaDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn schema_path(&self, version: &SchemaVersion) -> PathBuf {
        self.root.join(version.schema_id()).join(SCHEMA_FILE_NAME)
    }
}

impl SchemaSource for SchemaDirectory {
    /// Versions that have a schema file under the root
    fn available_versions(&self) -> Vec<SchemaVersion> {
        let Ok(dir) = fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut versions: Vec<SchemaVersion> = dir
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                SchemaVersion::from_schema_id(name.to_str()?).ok()
            })
            .filter(|version| self.schema_path(version).is_file())
            .collect();
        versions.sort();
        versions
    }

    fn load_schema(&self, version: &SchemaVersion) -> Result<Option<Value>, RegistryError> {
        let path = self.schema_path(version);
        tracing::debug!(path = %path.display(), "loading schema");

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(RegistryError::Io { path, source }),
        };

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| RegistryError::Parse { path, source })
    }
}
