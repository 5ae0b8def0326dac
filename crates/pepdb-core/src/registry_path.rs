//! Registry path parsing.
//!
//! Projects are addressed as `namespace/name:tag`; schemas as
//! `namespace/name:version`, where the version may be omitted to mean the
//! latest registered one.

use crate::config::PepConfig;
use crate::error::{PepDbError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The unique key of a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryPath {
    pub namespace: String,
    pub name: String,
    pub tag: String,
}

impl RegistryPath {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// Parse `namespace/name:tag`.
    pub fn parse(path: &str) -> Result<Self> {
        let fail = |reason: &str| PepDbError::RegistryPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let (namespace, item) = path
            .split_once('/')
            .ok_or_else(|| fail("Missing '/' between namespace and name"))?;
        if item.contains('/') {
            return Err(fail("More than one '/' in path"));
        }
        let (name, tag) = item
            .split_once(':')
            .ok_or_else(|| fail("Missing ':' between name and tag"))?;
        if tag.contains(':') {
            return Err(fail("More than one ':' in path"));
        }
        if namespace.is_empty() || name.is_empty() || tag.is_empty() {
            return Err(fail("Namespace, name and tag must not be empty"));
        }

        Ok(Self::new(namespace, name, tag))
    }
}

impl FromStr for RegistryPath {
    type Err = PepDbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RegistryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.name, self.tag)
    }
}

/// Reference to a registered schema version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaRef {
    pub namespace: String,
    pub name: String,
    /// `latest` resolves to the highest registered version.
    pub version: String,
}

impl SchemaRef {
    /// Parse `namespace/name[:version]`.
    pub fn parse(path: &str) -> Result<Self> {
        let fail = |reason: &str| PepDbError::SchemaPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let (namespace, item) = path
            .split_once('/')
            .ok_or_else(|| fail("Missing '/' between namespace and name"))?;
        if item.contains('/') {
            return Err(fail("More than one '/' in path"));
        }
        let (name, version) = match item.split_once(':') {
            Some((name, version)) => (name, version),
            None => (item, PepConfig::LATEST_SCHEMA_VERSION),
        };
        if namespace.is_empty() || name.is_empty() || version.is_empty() {
            return Err(fail("Namespace, name and version must not be empty"));
        }

        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    pub fn is_latest(&self) -> bool {
        self.version == PepConfig::LATEST_SCHEMA_VERSION
    }
}

impl fmt::Display for SchemaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.name, self.version)
    }
}

/// Characters that would make a stored key unreachable through
/// [`RegistryPath::parse`] or [`SchemaRef::parse`].
const RESERVED_CHARS: [char; 3] = ['/', ':', '?'];

/// Validate one component of a registry or schema path: non-empty and
/// free of `/`, `:` and `?`.
pub(crate) fn validate_identifier(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PepDbError::Validation {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    if let Some(c) = value.chars().find(|c| RESERVED_CHARS.contains(c)) {
        return Err(PepDbError::Validation {
            field: field.to_string(),
            message: format!("'{c}' is prohibited"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry_path() {
        let rp = RegistryPath::parse("databio/example:v1").unwrap();
        assert_eq!(rp, RegistryPath::new("databio", "example", "v1"));
        assert_eq!(rp.to_string(), "databio/example:v1");
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        for bad in [
            "databio-example:v1",
            "databio/example/extra:v1",
            "databio/example",
            "/example:v1",
            "databio/:v1",
            "databio/example:",
            "databio/example:v1:v2",
        ] {
            let err = RegistryPath::parse(bad).unwrap_err();
            assert!(
                matches!(err, PepDbError::RegistryPath { .. }),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_from_str() {
        let rp: RegistryPath = "a/b:c".parse().unwrap();
        assert_eq!(rp.tag, "c");
    }

    #[test]
    fn test_parse_schema_ref() {
        let schema = SchemaRef::parse("databio/pep-2.1.0:1.0.0").unwrap();
        assert_eq!(schema.version, "1.0.0");
        assert!(!schema.is_latest());

        let schema = SchemaRef::parse("databio/pep-2.1.0").unwrap();
        assert!(schema.is_latest());

        assert!(matches!(
            SchemaRef::parse("no-slash").unwrap_err(),
            PepDbError::SchemaPath { .. }
        ));
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("name", "ok").is_ok());
        assert!(validate_identifier("name", "").is_err());
        assert!(validate_identifier("tag", "what?").is_err());
        assert!(validate_identifier("namespace", "a/b").is_err());
        assert!(validate_identifier("name", "a/b").is_err());
        assert!(validate_identifier("tag", "v:1").is_err());
        assert!(validate_identifier("tag", "v1.0-rc_2").is_ok());
    }
}
