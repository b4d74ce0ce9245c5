//! Event conversion configuration for MEDS extraction.
//!
//! This crate loads the declarative event conversion configuration that
//! drives extraction and derives, for every source table, the minimal set of
//! physical columns extraction will read.
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use meds_config::{load_event_conversion_config, resolve_columns};
//!
//! let config = load_event_conversion_config(Path::new("event_cfgs.yaml"))?;
//! let projection = resolve_columns(&config);
//! for (prefix, columns) in projection.iter() {
//!     println!("{prefix}: {}", columns.join(", "));
//! }
//! ```

mod error;
mod event;
mod loader;
mod projection;

// === Error Types ===
pub use error::{ConfigError, Result};

// === Configuration Model ===
pub use event::{
    Atom, DEFAULT_SUBJECT_ID_COL, EventConversionConfig, EventSpec, FieldKey, FieldValue,
    JoinSpec, TableSpec, is_col_field, parse_col_field,
};

// === Loading ===
pub use loader::{load_event_conversion_config, parse_event_conversion_config};

// === Column Projection ===
pub use projection::{ColumnProjection, resolve_columns};
