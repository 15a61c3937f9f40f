use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Name carried in the `spec_version` field of every protocol document
pub const PROTOCOL_NAME: &str = "nalt-protocol";

/// Represents a schema version with semantic versioning
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SchemaVersion {
    pub const V1_0_0: SchemaVersion = SchemaVersion::new(1, 0, 0);
    pub const V1_1_0: SchemaVersion = SchemaVersion::new(1, 1, 0);
    pub const V1_1_1: SchemaVersion = SchemaVersion::new(1, 1, 1);
    pub const V1_2_0: SchemaVersion = SchemaVersion::new(1, 2, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parse a schema lookup identifier such as `v1.1.0`.
    ///
    /// The leading `v` is mandatory: bare semver belongs to document
    /// versions and is parsed through [`FromStr`] or [`ProtocolVersion`].
    pub fn from_schema_id(id: &str) -> Result<Self, SchemaVersionError> {
        let bare = id
            .strip_prefix('v')
            .ok_or_else(|| SchemaVersionError::InvalidSchemaId(id.to_string()))?;
        bare.parse()
            .map_err(|_| SchemaVersionError::InvalidSchemaId(id.to_string()))
    }

    /// Identifier used to look the schema up, e.g. `v1.2.0`
    pub fn schema_id(&self) -> String {
        format!("v{}", self)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = SchemaVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(SchemaVersionError::InvalidFormat(s.to_string()));
        }

        let major = parts[0].parse().map_err(|_| SchemaVersionError::InvalidFormat(s.to_string()))?;
        let minor = parts[1].parse().map_err(|_| SchemaVersionError::InvalidFormat(s.to_string()))?;
        let patch = parts[2].parse().map_err(|_| SchemaVersionError::InvalidFormat(s.to_string()))?;

        Ok(SchemaVersion::new(major, minor, patch))
    }
}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.major.cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
    }
}

/// Version string stored in a document's `spec_version`, e.g. `nalt-protocol/1.1.0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub protocol: String,
    pub version: SchemaVersion,
}

fn protocol_version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<protocol>[A-Za-z0-9][A-Za-z0-9._-]*)/(?P<version>\d+\.\d+\.\d+)$")
            .expect("protocol version pattern is valid")
    })
}

impl ProtocolVersion {
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            protocol: PROTOCOL_NAME.to_string(),
            version,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.protocol, self.version)
    }
}

impl FromStr for ProtocolVersion {
    type Err = SchemaVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = protocol_version_pattern()
            .captures(s)
            .ok_or_else(|| SchemaVersionError::InvalidProtocolVersion(s.to_string()))?;

        Ok(ProtocolVersion {
            protocol: caps["protocol"].to_string(),
            version: caps["version"].parse()?,
        })
    }
}

#[derive(Debug, Error)]
pub enum SchemaVersionError {
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),

    #[error("Invalid schema version '{0}'. Expected: vX.Y.Z (e.g., v1.1.0)")]
    InvalidSchemaId(String),

    #[error("Invalid spec_version '{0}'. Expected: <protocol>/X.Y.Z (e.g., nalt-protocol/1.2.0)")]
    InvalidProtocolVersion(String),
}
