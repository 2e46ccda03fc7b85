//! Recorded operations and their serialized parameters.
//!
//! An [`OperationRecord`] is passive data: it declares which columns it reads
//! and writes and carries the arguments it was submitted with. Re-executing its
//! effect is the job of a [`Replayer`](crate::Replayer) looked up by kind.

use crate::{
    ColumnId, OperationId, OperationKind, OperationTags, StrataResult, Timestamp,
    ValidationError, WorksheetId,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

// ============================================================================
// PARAMETERS
// ============================================================================

/// Named arguments an operation was submitted with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of an argument, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// These parameters with every key of `overrides` written on top.
    ///
    /// Keys only present here are kept; conflicting keys take the override.
    pub fn merged_with(&self, overrides: &Parameters) -> Parameters {
        let mut merged = self.0.clone();
        for (key, value) in &overrides.0 {
            merged.insert(key.clone(), value.clone());
        }
        Parameters(merged)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Parameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ============================================================================
// OPERATION RECORD
// ============================================================================

/// One recorded transformation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_id: OperationId,
    pub kind: OperationKind,
    pub tags: OperationTags,
    pub worksheet_id: WorksheetId,
    input_columns: BTreeSet<ColumnId>,
    output_columns: BTreeSet<ColumnId>,
    parameters: Parameters,
    pub recorded_at: Timestamp,
}

impl OperationRecord {
    /// Create a record with a fresh id and no columns or parameters.
    pub fn new(kind: OperationKind, tags: OperationTags, worksheet_id: WorksheetId) -> Self {
        Self {
            operation_id: OperationId::now_v7(),
            kind,
            tags,
            worksheet_id,
            input_columns: BTreeSet::new(),
            output_columns: BTreeSet::new(),
            parameters: Parameters::new(),
            recorded_at: Utc::now(),
        }
    }

    /// Set the operation id (e.g. when reloading a persisted history).
    pub fn with_id(mut self, operation_id: OperationId) -> Self {
        self.operation_id = operation_id;
        self
    }

    pub fn with_inputs<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnId>,
    {
        self.input_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<ColumnId>,
    {
        self.output_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Finish building: input and output columns must be disjoint.
    pub fn build(self) -> StrataResult<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Check the record's column declarations.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let overlap: BTreeSet<ColumnId> = self
            .input_columns
            .intersection(&self.output_columns)
            .cloned()
            .collect();
        if !overlap.is_empty() {
            return Err(ValidationError::OverlappingColumns {
                operation_id: self.operation_id,
                columns: overlap,
            });
        }
        Ok(())
    }

    pub fn input_columns(&self) -> &BTreeSet<ColumnId> {
        &self.input_columns
    }

    pub fn output_columns(&self) -> &BTreeSet<ColumnId> {
        &self.output_columns
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Take on an edit's parameters and input columns.
    ///
    /// Outputs stay as they are. The record is left unchanged when the new
    /// inputs would overlap them.
    pub fn apply_edit_merge(
        &mut self,
        parameters: Parameters,
        input_columns: BTreeSet<ColumnId>,
    ) -> Result<(), ValidationError> {
        let overlap: BTreeSet<ColumnId> = input_columns
            .intersection(&self.output_columns)
            .cloned()
            .collect();
        if !overlap.is_empty() {
            return Err(ValidationError::OverlappingColumns {
                operation_id: self.operation_id,
                columns: overlap,
            });
        }
        self.input_columns = input_columns;
        self.parameters = parameters;
        Ok(())
    }

    /// Two records are output-equivalent when they write the same column set.
    pub fn is_output_equivalent(&self, other: &OperationRecord) -> bool {
        self.output_columns == other.output_columns
    }

    pub fn has_any_tag(&self, tags: OperationTags) -> bool {
        self.tags.intersects(tags)
    }

    pub fn is_edit(&self) -> bool {
        self.kind.is_edit()
    }
}
