//! Error types for event conversion configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating an event conversion configuration.
///
/// `location` is a dotted path into the document, e.g. `labs.lab.numeric_value`.
#[derive(Debug, Error)]
pub enum ConfigError {
    // === File System Errors ===
    /// Configuration file does not exist.
    #[error("event conversion config file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file exists but could not be read.
    #[error("failed to read event conversion config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Parse Errors ===
    /// Document is not valid YAML.
    #[error("failed to parse event conversion config {origin}: {source}")]
    Yaml {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    // === Shape Errors ===
    /// A mapping was expected at this location.
    #[error("expected a mapping at {location}, found {found}")]
    NotAMapping {
        location: String,
        found: &'static str,
    },

    /// A mapping key was not a string.
    #[error("non-string key {key} at {location}")]
    NonStringKey { location: String, key: String },

    /// A key is not allowed at this location.
    #[error("unknown key '{key}' at {location} (expected one of: {expected})")]
    UnknownKey {
        location: String,
        key: String,
        expected: String,
    },

    /// A required key is missing.
    #[error("missing required key '{key}' at {location}")]
    MissingKey { location: String, key: &'static str },

    /// A value has the wrong shape for its key.
    #[error("invalid value at {location}: expected {expected}, found {found}")]
    InvalidValue {
        location: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::NotFound {
            path: PathBuf::from("/cfg/event_cfgs.yaml"),
        };
        assert_eq!(
            err.to_string(),
            "event conversion config file not found: /cfg/event_cfgs.yaml"
        );
    }

    #[test]
    fn test_invalid_value_names_location() {
        let err = ConfigError::InvalidValue {
            location: "labs.lab.numeric_value".to_string(),
            expected: "a string, a list of strings, or null",
            found: "a number",
        };
        assert!(err.to_string().contains("labs.lab.numeric_value"));
    }
}
