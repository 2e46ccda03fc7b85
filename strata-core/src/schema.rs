//! Live worksheet schema as seen by the compaction engine.
//!
//! The engine only needs to classify columns and enumerate the genuine ones
//! that are currently materialized, so the seam is the small
//! [`SchemaInspector`] trait. [`Schema`] is an in-memory hierarchical
//! implementation: nested columns hang below a parent column, the way nested
//! header tables do in a worksheet.

use crate::{ColumnId, ColumnKind, StrataResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Read-only view of the live schema.
pub trait SchemaInspector {
    /// Kind of a materialized column, `None` if the column is unknown.
    fn column_kind(&self, column: &ColumnId) -> Option<ColumnKind>;

    /// Every Regular column currently materialized.
    fn regular_columns(&self) -> BTreeSet<ColumnId>;

    /// Column names from the outermost table down to `column`.
    fn column_path(&self, _column: &ColumnId) -> Option<Vec<String>> {
        None
    }

    /// Whether `column` is known and Regular.
    fn is_regular(&self, column: &ColumnId) -> bool {
        self.column_kind(column)
            .map(|kind| kind.is_regular())
            .unwrap_or(false)
    }
}

/// One column of the hierarchical schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub column_id: ColumnId,
    pub name: String,
    pub kind: ColumnKind,
    /// Column whose nested table holds this column
    pub parent: Option<ColumnId>,
}

/// In-memory hierarchical schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: BTreeMap<ColumnId, SchemaColumn>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level column.
    pub fn add_column(
        &mut self,
        column_id: impl Into<ColumnId>,
        name: impl Into<String>,
        kind: ColumnKind,
    ) -> StrataResult<()> {
        self.insert(SchemaColumn {
            column_id: column_id.into(),
            name: name.into(),
            kind,
            parent: None,
        })
    }

    /// Add a column nested below `parent`.
    pub fn add_nested_column(
        &mut self,
        parent: &ColumnId,
        column_id: impl Into<ColumnId>,
        name: impl Into<String>,
        kind: ColumnKind,
    ) -> StrataResult<()> {
        if !self.columns.contains_key(parent) {
            return Err(ValidationError::InvalidValue {
                field: "parent".to_string(),
                reason: format!("unknown parent column {}", parent),
            }
            .into());
        }
        self.insert(SchemaColumn {
            column_id: column_id.into(),
            name: name.into(),
            kind,
            parent: Some(parent.clone()),
        })
    }

    fn insert(&mut self, column: SchemaColumn) -> StrataResult<()> {
        if self.columns.contains_key(&column.column_id) {
            return Err(ValidationError::InvalidValue {
                field: "column_id".to_string(),
                reason: format!("column {} already exists", column.column_id),
            }
            .into());
        }
        self.columns.insert(column.column_id.clone(), column);
        Ok(())
    }

    pub fn get(&self, column: &ColumnId) -> Option<&SchemaColumn> {
        self.columns.get(column)
    }

    /// Direct children of `parent`, in id order.
    pub fn children_of(&self, parent: &ColumnId) -> Vec<&SchemaColumn> {
        self.columns
            .values()
            .filter(|c| c.parent.as_ref() == Some(parent))
            .collect()
    }

    /// Top-level columns, in id order.
    pub fn roots(&self) -> Vec<&SchemaColumn> {
        self.columns.values().filter(|c| c.parent.is_none()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl SchemaInspector for Schema {
    fn column_kind(&self, column: &ColumnId) -> Option<ColumnKind> {
        self.columns.get(column).map(|c| c.kind)
    }

    fn regular_columns(&self) -> BTreeSet<ColumnId> {
        self.columns
            .values()
            .filter(|c| c.kind.is_regular())
            .map(|c| c.column_id.clone())
            .collect()
    }

    fn column_path(&self, column: &ColumnId) -> Option<Vec<String>> {
        let mut path = Vec::new();
        let mut current = self.columns.get(column)?;
        // Parents are checked on insert, so the walk ends at a root.
        loop {
            path.push(current.name.clone());
            match &current.parent {
                Some(parent) => current = self.columns.get(parent)?,
                None => break,
            }
        }
        path.reverse();
        Some(path)
    }
}
