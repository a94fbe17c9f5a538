//! Descriptors returned by metadata listings.
//!
//! Catalogs are BigQuery projects and schemas are datasets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A dataset within a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub catalog: String,
    pub name: String,
}

impl SchemaDescriptor {
    pub fn new(catalog: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            name: name.into(),
        }
    }
}

/// Kind of a BigQuery table resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TableType {
    Table,
    View,
    MaterializedView,
    External,
    Snapshot,
    Other(String),
}

impl TableType {
    /// Maps the `type` reported by the BigQuery tables API.
    pub fn from_bigquery(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "TABLE" => TableType::Table,
            "VIEW" => TableType::View,
            "MATERIALIZED_VIEW" => TableType::MaterializedView,
            "EXTERNAL" => TableType::External,
            "SNAPSHOT" => TableType::Snapshot,
            other => TableType::Other(other.to_string()),
        }
    }

    /// Name used in table type filters, e.g. `TABLE` or `VIEW`.
    pub fn as_str(&self) -> &str {
        match self {
            TableType::Table => "TABLE",
            TableType::View => "VIEW",
            TableType::MaterializedView => "MATERIALIZED_VIEW",
            TableType::External => "EXTERNAL",
            TableType::Snapshot => "SNAPSHOT",
            TableType::Other(other) => other,
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table, view or other table-like resource within a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub catalog: String,
    pub schema: String,
    pub name: String,
    pub table_type: TableType,
    pub remarks: Option<String>,
}

/// Whether a column accepts nulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nullability {
    NoNulls,
    Nullable,
    Unknown,
}

impl Nullability {
    /// Maps a BigQuery field mode. Missing modes default to `NULLABLE`.
    pub fn from_mode(mode: Option<&str>) -> Self {
        match mode.map(str::to_ascii_uppercase).as_deref() {
            None | Some("NULLABLE") => Nullability::Nullable,
            // Repeated fields are never null, an absent array is an empty one.
            Some("REQUIRED") | Some("REPEATED") => Nullability::NoNulls,
            Some(_) => Nullability::Unknown,
        }
    }
}

/// A top-level column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub name: String,
    /// Position within the table, starting at 1.
    pub ordinal_position: u32,
    /// BigQuery standard SQL type name, e.g. `STRING` or `ARRAY<INT64>`.
    pub type_name: String,
    pub nullability: Nullability,
    pub remarks: Option<String>,
}
