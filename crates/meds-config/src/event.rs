//! Typed model of the event conversion configuration.
//!
//! The document maps each source table prefix to a [`TableSpec`]. A table
//! declares its events, and each event maps semantic field keys to
//! [`FieldValue`]s built from [`Atom`]s. Atoms written as `col(name)` refer to
//! a physical column in the source table; anything else is a literal.

use std::collections::BTreeMap;

/// Subject-id column assumed when neither the document nor the table sets one.
pub const DEFAULT_SUBJECT_ID_COL: &str = "subject_id";

/// Reserved key declaring the subject-id column, globally or per table.
pub const SUBJECT_ID_COL_KEY: &str = "subject_id_col";

/// Reserved table key declaring a join against another table.
pub const JOIN_KEY: &str = "join";

/// Event key holding one or more `strftime`-style time formats.
pub const TIME_FORMAT_KEY: &str = "time_format";

/// Event key holding free-form metadata. Never column-bearing.
pub const METADATA_KEY: &str = "_metadata";

const COL_PREFIX: &str = "col(";
const COL_SUFFIX: &str = ")";

/// Returns true if the field is written in the `col(name)` column syntax.
pub fn is_col_field(field: &str) -> bool {
    field.starts_with(COL_PREFIX)
        && field.ends_with(COL_SUFFIX)
        && field.len() > COL_PREFIX.len() + COL_SUFFIX.len()
}

/// Extracts the physical column name from a `col(name)` field.
pub fn parse_col_field(field: &str) -> Option<&str> {
    if !is_col_field(field) {
        return None;
    }
    Some(&field[COL_PREFIX.len()..field.len() - COL_SUFFIX.len()])
}

/// One element of a field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    /// Text used verbatim.
    Literal(String),
    /// A physical column to read from the source table.
    Column(String),
}

impl Atom {
    /// Parses a raw string, recognising the `col(name)` syntax.
    pub fn parse(raw: &str) -> Self {
        match parse_col_field(raw) {
            Some(name) => Self::Column(name.to_string()),
            None => Self::Literal(raw.to_string()),
        }
    }

    /// The raw text of the atom (column name for column references).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(text) | Self::Column(text) => text,
        }
    }

    pub fn is_column(&self) -> bool {
        matches!(self, Self::Column(_))
    }
}

/// Value of a column-bearing event field.
///
/// Scalars are stored as a single-element list; lists are concatenated in
/// order at extraction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Explicitly absent, e.g. `time: null` for static measurements.
    Null,
    Atoms(Vec<Atom>),
}

impl FieldValue {
    pub fn atoms(&self) -> &[Atom] {
        match self {
            Self::Null => &[],
            Self::Atoms(atoms) => atoms,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Semantic, column-bearing keys of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKey {
    Code,
    Time,
    NumericValue,
    CategoricalValue,
    TextValue,
    Mod,
}

impl FieldKey {
    pub const ALL: [FieldKey; 6] = [
        FieldKey::Code,
        FieldKey::Time,
        FieldKey::NumericValue,
        FieldKey::CategoricalValue,
        FieldKey::TextValue,
        FieldKey::Mod,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKey::Code => "code",
            FieldKey::Time => "time",
            FieldKey::NumericValue => "numeric_value",
            FieldKey::CategoricalValue => "categorical_value",
            FieldKey::TextValue => "text_value",
            FieldKey::Mod => "mod",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == key)
    }
}

impl std::fmt::Display for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event definition within a table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventSpec {
    /// Column-bearing fields keyed by their semantic role.
    pub fields: BTreeMap<FieldKey, FieldValue>,
    /// Time parse formats, tried in order.
    pub time_format: Option<Vec<String>>,
    /// Opaque metadata carried through to downstream stages.
    pub metadata: Option<serde_yaml::Value>,
}

impl EventSpec {
    pub fn field(&self, key: FieldKey) -> Option<&FieldValue> {
        self.fields.get(&key)
    }
}

/// Join from an owning table to another input table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    /// Prefix of the table joined against.
    pub input_prefix: String,
    /// Join key on the owning table.
    pub left_on: String,
    /// Join key on the joined table.
    pub right_on: String,
    /// Columns pulled from the joined table.
    pub columns_from_right: Vec<String>,
}

/// Configuration for one source table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableSpec {
    pub subject_id_col: Option<String>,
    pub join: Option<JoinSpec>,
    pub events: BTreeMap<String, EventSpec>,
}

/// Complete event conversion configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventConversionConfig {
    /// Global subject-id column, overridden per table.
    pub subject_id_col: Option<String>,
    /// Table specs keyed by input prefix.
    pub tables: BTreeMap<String, TableSpec>,
}

impl EventConversionConfig {
    /// Subject-id column used by tables that do not override it.
    pub fn default_subject_id_col(&self) -> &str {
        self.subject_id_col
            .as_deref()
            .unwrap_or(DEFAULT_SUBJECT_ID_COL)
    }

    /// Effective subject-id column for a table.
    pub fn subject_id_col_for<'a>(&'a self, table: &'a TableSpec) -> &'a str {
        table
            .subject_id_col
            .as_deref()
            .unwrap_or_else(|| self.default_subject_id_col())
    }
}
