//! YAML loading and validation of the event conversion configuration.
//!
//! The document is parsed into a generic [`serde_yaml::Value`] and then
//! walked level by level so that every shape error can name the offending
//! table, event and field.

use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::event::{
    Atom, EventConversionConfig, EventSpec, FieldKey, FieldValue, JOIN_KEY, JoinSpec,
    METADATA_KEY, SUBJECT_ID_COL_KEY, TIME_FORMAT_KEY, TableSpec,
};

const EMPTY_COL_MARKER: &str = "col()";

const JOIN_KEYS: [&str; 4] = ["input_prefix", "left_on", "right_on", "columns_from_right"];

/// Loads and validates an event conversion configuration file.
pub fn load_event_conversion_config(path: &Path) -> Result<EventConversionConfig> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
        origin: path.display().to_string(),
        source,
    })?;
    let config = EventConversionConfig::from_yaml_value(&value)?;
    debug!(
        path = %path.display(),
        table_count = config.tables.len(),
        "loaded event conversion config"
    );
    Ok(config)
}

/// Parses an event conversion configuration from YAML text.
pub fn parse_event_conversion_config(yaml: &str) -> Result<EventConversionConfig> {
    let value: Value = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Yaml {
        origin: "<string>".to_string(),
        source,
    })?;
    EventConversionConfig::from_yaml_value(&value)
}

impl EventConversionConfig {
    /// Validates a parsed YAML document into the typed configuration.
    pub fn from_yaml_value(value: &Value) -> Result<Self> {
        let root = as_mapping(value, "<root>")?;
        let mut config = EventConversionConfig::default();

        for (key, body) in root {
            let key = key_str(key, "<root>")?;
            if key == SUBJECT_ID_COL_KEY {
                config.subject_id_col = Some(expect_string(body, SUBJECT_ID_COL_KEY)?);
                continue;
            }
            let table = parse_table(key, body)?;
            config.tables.insert(key.to_string(), table);
        }

        Ok(config)
    }
}

fn parse_table(prefix: &str, value: &Value) -> Result<TableSpec> {
    let mapping = as_mapping(value, prefix)?;
    let mut table = TableSpec::default();

    for (key, body) in mapping {
        let key = key_str(key, prefix)?;
        match key {
            SUBJECT_ID_COL_KEY => {
                table.subject_id_col =
                    Some(expect_string(body, &format!("{prefix}.{SUBJECT_ID_COL_KEY}"))?);
            }
            JOIN_KEY => {
                table.join = Some(parse_join(&format!("{prefix}.{JOIN_KEY}"), body)?);
            }
            event_name => {
                let location = format!("{prefix}.{event_name}");
                let event = parse_event(&location, body)?;
                table.events.insert(event_name.to_string(), event);
            }
        }
    }

    Ok(table)
}

fn parse_join(location: &str, value: &Value) -> Result<JoinSpec> {
    let mapping = as_mapping(value, location)?;
    let mut fields: BTreeMap<&str, &Value> = BTreeMap::new();
    for (key, body) in mapping {
        let key = key_str(key, location)?;
        if !JOIN_KEYS.contains(&key) {
            return Err(ConfigError::UnknownKey {
                location: location.to_string(),
                key: key.to_string(),
                expected: JOIN_KEYS.join(", "),
            });
        }
        fields.insert(key, body);
    }

    let required = |name: &'static str| -> Result<String> {
        let body = fields.get(name).ok_or_else(|| ConfigError::MissingKey {
            location: location.to_string(),
            key: name,
        })?;
        expect_string(body, &format!("{location}.{name}"))
    };

    let columns_from_right = match fields.get("columns_from_right") {
        None | Some(Value::Null) => Vec::new(),
        Some(body) => expect_string_list(body, &format!("{location}.columns_from_right"))?,
    };

    Ok(JoinSpec {
        input_prefix: required("input_prefix")?,
        left_on: required("left_on")?,
        right_on: required("right_on")?,
        columns_from_right,
    })
}

fn parse_event(location: &str, value: &Value) -> Result<EventSpec> {
    let mapping = as_mapping(value, location)?;
    let mut event = EventSpec::default();

    for (key, body) in mapping {
        let key = key_str(key, location)?;
        let field_location = format!("{location}.{key}");
        match key {
            TIME_FORMAT_KEY => {
                event.time_format = match body {
                    Value::Null => None,
                    Value::String(format) => Some(vec![format.clone()]),
                    other => Some(expect_string_list(other, &field_location)?),
                };
            }
            METADATA_KEY => {
                event.metadata = Some(body.clone());
            }
            other => {
                let Some(field) = FieldKey::from_key(other) else {
                    return Err(ConfigError::UnknownKey {
                        location: location.to_string(),
                        key: other.to_string(),
                        expected: expected_event_keys(),
                    });
                };
                event
                    .fields
                    .insert(field, parse_field_value(&field_location, body)?);
            }
        }
    }

    if !event.fields.contains_key(&FieldKey::Code) {
        return Err(ConfigError::MissingKey {
            location: location.to_string(),
            key: "code",
        });
    }

    Ok(event)
}

fn parse_field_value(location: &str, value: &Value) -> Result<FieldValue> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::String(raw) => Ok(FieldValue::Atoms(vec![parse_atom(location, raw)?])),
        Value::Sequence(items) => {
            let mut atoms = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(raw) => atoms.push(parse_atom(location, raw)?),
                    other => {
                        return Err(ConfigError::InvalidValue {
                            location: location.to_string(),
                            expected: "a list of strings",
                            found: kind(other),
                        });
                    }
                }
            }
            Ok(FieldValue::Atoms(atoms))
        }
        other => Err(ConfigError::InvalidValue {
            location: location.to_string(),
            expected: "a string, a list of strings, or null",
            found: kind(other),
        }),
    }
}

fn parse_atom(location: &str, raw: &str) -> Result<Atom> {
    if raw == EMPTY_COL_MARKER {
        return Err(ConfigError::InvalidValue {
            location: location.to_string(),
            expected: "a non-empty column name inside col(...)",
            found: "an empty col() marker",
        });
    }
    Ok(Atom::parse(raw))
}

fn expected_event_keys() -> String {
    let mut keys: Vec<&str> = FieldKey::ALL.iter().map(|key| key.as_str()).collect();
    keys.push(TIME_FORMAT_KEY);
    keys.push(METADATA_KEY);
    keys.join(", ")
}

fn as_mapping<'a>(value: &'a Value, location: &str) -> Result<&'a Mapping> {
    value.as_mapping().ok_or_else(|| ConfigError::NotAMapping {
        location: location.to_string(),
        found: kind(value),
    })
}

fn key_str<'a>(key: &'a Value, location: &str) -> Result<&'a str> {
    key.as_str().ok_or_else(|| ConfigError::NonStringKey {
        location: location.to_string(),
        key: format!("{key:?}"),
    })
}

fn expect_string(value: &Value, location: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidValue {
            location: location.to_string(),
            expected: "a string",
            found: kind(value),
        })
}

fn expect_string_list(value: &Value, location: &str) -> Result<Vec<String>> {
    let items = value
        .as_sequence()
        .ok_or_else(|| ConfigError::InvalidValue {
            location: location.to_string(),
            expected: "a list of strings",
            found: kind(value),
        })?;
    items
        .iter()
        .map(|item| expect_string(item, location))
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar_and_list_fields() {
        let config = parse_event_conversion_config(
            r#"
labs:
  lab:
    code: [LAB, "col(itemid)"]
    time: col(charttime)
    time_format: "%m/%d/%Y"
    numeric_value: valuenum
"#,
        )
        .unwrap();

        let event = &config.tables["labs"].events["lab"];
        assert_eq!(
            event.field(FieldKey::Code).unwrap().atoms(),
            &[
                Atom::Literal("LAB".to_string()),
                Atom::Column("itemid".to_string())
            ]
        );
        assert_eq!(
            event.field(FieldKey::Time).unwrap().atoms(),
            &[Atom::Column("charttime".to_string())]
        );
        assert_eq!(event.time_format, Some(vec!["%m/%d/%Y".to_string()]));
    }

    #[test]
    fn test_null_time_is_kept_as_null() {
        let config = parse_event_conversion_config(
            "subjects:\n  eye_color:\n    code: EYE\n    time: null\n",
        )
        .unwrap();
        let event = &config.tables["subjects"].events["eye_color"];
        assert!(event.field(FieldKey::Time).unwrap().is_null());
    }

    #[test]
    fn test_global_and_table_subject_id() {
        let config = parse_event_conversion_config(
            "subject_id_col: MRN\nsubjects:\n  subject_id_col: patient\n",
        )
        .unwrap();
        assert_eq!(config.subject_id_col.as_deref(), Some("MRN"));
        assert_eq!(
            config.tables["subjects"].subject_id_col.as_deref(),
            Some("patient")
        );
        assert!(config.tables["subjects"].events.is_empty());
    }

    #[test]
    fn test_metadata_is_opaque() {
        let config = parse_event_conversion_config(
            r#"
vitals:
  HR:
    code: HR
    time: col(charttime)
    _metadata:
      input_metadata:
        description: {"title": {"lab_code": "HR"}}
"#,
        )
        .unwrap();
        assert!(config.tables["vitals"].events["HR"].metadata.is_some());
    }

    #[test]
    fn test_join_defaults_columns_from_right() {
        let config = parse_event_conversion_config(
            "vitals:\n  join:\n    input_prefix: stays\n    left_on: stay_id\n    right_on: stay_id\n",
        )
        .unwrap();
        let join = config.tables["vitals"].join.as_ref().unwrap();
        assert_eq!(join.input_prefix, "stays");
        assert!(join.columns_from_right.is_empty());
    }

    #[test]
    fn test_number_field_is_rejected_with_location() {
        let err = parse_event_conversion_config("labs:\n  lab:\n    code: LAB\n    numeric_value: 3\n")
            .unwrap_err();
        match err {
            ConfigError::InvalidValue {
                location, found, ..
            } => {
                assert_eq!(location, "labs.lab.numeric_value");
                assert_eq!(found, "a number");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_col_marker_is_rejected_with_location() {
        let err = parse_event_conversion_config("labs:\n  lab:\n    code: LAB\n    time: col()\n")
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { location, .. } => assert_eq!(location, "labs.lab.time"),
            other => panic!("unexpected error: {other}"),
        }

        let err = parse_event_conversion_config("labs:\n  lab:\n    code: [LAB, \"col()\"]\n")
            .unwrap_err();
        assert!(err.to_string().contains("labs.lab.code"));
    }

    #[test]
    fn test_nested_list_is_rejected() {
        let err =
            parse_event_conversion_config("labs:\n  lab:\n    code: [LAB, [nested]]\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_unknown_event_key_is_rejected() {
        let err = parse_event_conversion_config("labs:\n  lab:\n    code: LAB\n    colour: red\n")
            .unwrap_err();
        match err {
            ConfigError::UnknownKey { location, key, .. } => {
                assert_eq!(location, "labs.lab");
                assert_eq!(key, "colour");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_join_key_is_rejected() {
        let err = parse_event_conversion_config(
            "vitals:\n  join:\n    input_prefix: stays\n    left_on: a\n    right_on: b\n    how: inner\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { .. }));
    }

    #[test]
    fn test_missing_join_key_is_rejected() {
        let err = parse_event_conversion_config(
            "vitals:\n  join:\n    input_prefix: stays\n    left_on: a\n",
        )
        .unwrap_err();
        match err {
            ConfigError::MissingKey { location, key } => {
                assert_eq!(location, "vitals.join");
                assert_eq!(key, "right_on");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_event_without_code_is_rejected() {
        let err = parse_event_conversion_config("labs:\n  lab:\n    time: col(t)\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { key: "code", .. }));
    }

    #[test]
    fn test_table_must_be_mapping() {
        let err = parse_event_conversion_config("labs: [a, b]\n").unwrap_err();
        assert!(matches!(err, ConfigError::NotAMapping { .. }));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = parse_event_conversion_config("labs: {lab: [").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }
}
