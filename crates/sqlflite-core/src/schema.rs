//! Remote table schema types

use crate::{ColumnMeta, DataType};
use serde::{Deserialize, Serialize};

/// Schema of a remote table, as reported by the engine's catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Columns, in catalog order
    pub columns: Vec<ColumnMeta>,
}

impl TableSchema {
    /// Create a schema from a name and columns
    pub fn new(name: impl Into<String>, columns: Vec<ColumnMeta>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column's type by name
    pub fn column_type(&self, name: &str) -> Option<DataType> {
        self.column(name).map(|c| c.data_type)
    }

    /// Check whether a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Iterate column names in catalog order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}
