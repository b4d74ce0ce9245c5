//! Per-table column projection derived from the event conversion configuration.
//!
//! Only the columns an extraction actually reads are kept when re-sharding
//! raw inputs. A table needs its subject-id column, its join key, and every
//! column its events reference. Columns a table pulls in through a join are
//! read from the joined table instead of the owning one.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::event::{Atom, EventConversionConfig, FieldKey};

/// Sorted, deduplicated column lists keyed by input prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnProjection {
    tables: BTreeMap<String, Vec<String>>,
}

impl ColumnProjection {
    /// Columns required from the table with the given prefix.
    pub fn columns_for(&self, prefix: &str) -> Option<&[String]> {
        self.tables.get(prefix).map(Vec::as_slice)
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.tables.contains_key(prefix)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.tables
            .iter()
            .map(|(prefix, columns)| (prefix.as_str(), columns.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl<P, C, S> FromIterator<(P, C)> for ColumnProjection
where
    P: Into<String>,
    C: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut sets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (prefix, columns) in iter {
            sets.entry(prefix.into())
                .or_default()
                .extend(columns.into_iter().map(Into::into));
        }
        Self::from_sets(sets)
    }
}

impl ColumnProjection {
    fn from_sets(sets: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self {
            tables: sets
                .into_iter()
                .map(|(prefix, columns)| (prefix, columns.into_iter().collect()))
                .collect(),
        }
    }
}

/// Resolves the minimal column projection for every configured table.
///
/// Literal atoms in `code` fields are code fragments and never columns. A
/// literal atom in any other field is taken as a bare column name, so
/// `numeric_value: valuenum` reads the `valuenum` column just as
/// `numeric_value: col(valuenum)` would.
pub fn resolve_columns(config: &EventConversionConfig) -> ColumnProjection {
    let mut direct: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut via_join: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for (prefix, table) in &config.tables {
        let columns = direct.entry(prefix.clone()).or_default();
        columns.insert(config.subject_id_col_for(table).to_string());

        if let Some(join) = &table.join {
            columns.insert(join.left_on.clone());
            let right = via_join.entry(join.input_prefix.clone()).or_default();
            right.insert(join.right_on.clone());
            right.extend(join.columns_from_right.iter().cloned());
        }

        for (event_name, event) in &table.events {
            for (key, value) in &event.fields {
                for atom in value.atoms() {
                    match atom {
                        Atom::Column(name) => {
                            columns.insert(name.clone());
                        }
                        Atom::Literal(_) if *key == FieldKey::Code => {}
                        Atom::Literal(name) => {
                            debug!(
                                prefix = %prefix,
                                event = %event_name,
                                field = %key,
                                column = %name,
                                "treating bare literal as a column name"
                            );
                            columns.insert(name.clone());
                        }
                    }
                }
            }
        }

        // The join key itself must stay even if it is also pulled from the right.
        if let Some(join) = &table.join {
            for column in &join.columns_from_right {
                if *column != join.left_on && columns.remove(column) {
                    debug!(
                        prefix = %prefix,
                        column = %column,
                        joined_from = %join.input_prefix,
                        "removing column from extraction plan as it is joined in"
                    );
                }
            }
        }
    }

    for (prefix, columns) in via_join {
        direct.entry(prefix).or_default().extend(columns);
    }

    ColumnProjection::from_sets(direct)
}
