//! Forward dependency check over a candidate sequence.
//!
//! Replaying the candidate from the current schema must never reference a
//! column nobody has produced yet. Order matters: a consumer placed before
//! its producer is a gap even though the producer exists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strata_core::{ColumnId, OperationId, OperationRecord, SchemaInspector};
use thiserror::Error;

/// An operation whose inputs are not all available at its position.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Operation {operation_id} at position {position} reads unavailable columns {missing:?}")]
pub struct DependencyGap {
    pub operation_id: OperationId,
    pub position: usize,
    pub missing: BTreeSet<ColumnId>,
}

/// Verdict plus every gap found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub complete: bool,
    pub gaps: Vec<DependencyGap>,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

pub struct CompletenessChecker<'a, S: SchemaInspector + ?Sized> {
    schema: &'a S,
}

impl<'a, S: SchemaInspector + ?Sized> CompletenessChecker<'a, S> {
    pub fn new(schema: &'a S) -> Self {
        Self { schema }
    }

    /// Walk `operations` in order starting from the schema's Regular columns.
    ///
    /// Only satisfied operations make their outputs available. The scan does
    /// not stop at the first gap.
    pub fn check(&self, operations: &[OperationRecord]) -> CompletenessReport {
        let mut available = self.schema.regular_columns();
        let mut gaps = Vec::new();

        for (position, op) in operations.iter().enumerate() {
            let missing: BTreeSet<ColumnId> = op
                .input_columns()
                .iter()
                .filter(|c| !available.contains(*c))
                .cloned()
                .collect();

            if missing.is_empty() {
                available.extend(op.output_columns().iter().cloned());
            } else {
                tracing::warn!(
                    operation_id = %op.operation_id,
                    kind = %op.kind,
                    position,
                    missing = missing.len(),
                    "Dependency gap in candidate history"
                );
                gaps.push(DependencyGap {
                    operation_id: op.operation_id,
                    position,
                    missing,
                });
            }
        }

        CompletenessReport {
            complete: gaps.is_empty(),
            gaps,
        }
    }
}
