//! Session configuration loaded from TOML or JSON.
//!
//! ```toml
//! # fieldwatch.toml
//! storage_key = "fieldwatch.workspace"
//! section_columns = 3
//! dangling_virtual_pages = "keep"
//! ```
//!
//! Every field has a default, so an empty document is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fw_layout::DEFAULT_SECTION_COLUMNS;

/// Storage key used when none is configured.
pub const DEFAULT_STORAGE_KEY: &str = "fieldwatch.workspace";

/// What to do on restore with `virtual` bindings whose pages were not
/// persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DanglingPagePolicy {
    /// Clear the bindings so the panes come back empty.
    #[default]
    Purge,
    /// Leave them bound; they resolve to a placeholder title.
    Keep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub storage_key: String,
    /// Grid width for top-level sections of newly created trees.
    pub section_columns: u16,
    pub dangling_virtual_pages: DanglingPagePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_owned(),
            section_columns: DEFAULT_SECTION_COLUMNS,
            dangling_virtual_pages: DanglingPagePolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Load by file extension: `.json` as JSON, anything else as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_file(path)
        } else {
            Self::from_toml_file(path)
        }
    }

    /// Validate all fields.
    ///
    /// Returns a list of validation errors. An empty list means the config
    /// is valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.storage_key.trim().is_empty() {
            errors.push("storage_key must not be empty".into());
        }
        if self.storage_key.contains(['/', '\\']) {
            errors.push(format!(
                "storage_key must not contain path separators, got {:?}",
                self.storage_key
            ));
        }
        if self.section_columns == 0 {
            errors.push("section_columns must be > 0".into());
        }

        errors
    }

    /// `self` if [`validate`](Self::validate) is clean.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Errors that can occur when loading a session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.storage_key, "fieldwatch.workspace");
        assert_eq!(config.section_columns, 2);
        assert_eq!(config.dangling_virtual_pages, DanglingPagePolicy::Purge);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        assert_eq!(
            SessionConfig::from_toml_str("").unwrap(),
            SessionConfig::default()
        );
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let config = SessionConfig::from_toml_str(
            "section_columns = 3\ndangling_virtual_pages = \"keep\"\n",
        )
        .unwrap();
        assert_eq!(config.section_columns, 3);
        assert_eq!(config.dangling_virtual_pages, DanglingPagePolicy::Keep);
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
    }

    #[test]
    fn json_loads() {
        let config =
            SessionConfig::from_json_str(r#"{"storage_key": "site-4.workspace"}"#).unwrap();
        assert_eq!(config.storage_key, "site-4.workspace");
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let err = SessionConfig::from_toml_str("dangling_virtual_pages = \"archive\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn validate_catches_bad_fields() {
        let config = SessionConfig {
            storage_key: "a/b".into(),
            section_columns: 0,
            ..SessionConfig::default()
        };
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("path separators")));
        assert!(errors.iter().any(|e| e.contains("section_columns")));
        assert!(matches!(
            config.validated(),
            Err(ConfigError::Validation(errors)) if errors.len() == 2
        ));
    }

    #[test]
    fn from_file_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("fieldwatch.toml");
        std::fs::write(&toml_path, "section_columns = 4").unwrap();
        assert_eq!(SessionConfig::from_file(&toml_path).unwrap().section_columns, 4);

        let json_path = dir.path().join("fieldwatch.json");
        std::fs::write(&json_path, r#"{"section_columns": 5}"#).unwrap();
        assert_eq!(SessionConfig::from_file(&json_path).unwrap().section_columns, 5);

        assert!(matches!(
            SessionConfig::from_file(dir.path().join("absent.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
