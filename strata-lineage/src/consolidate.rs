//! Edit-chain consolidation.
//!
//! A user who revises a transformation records an edit operation over the same
//! output columns as the original. Replaying both is redundant, so an edit is
//! folded into the base operation it amends:
//!
//! ```text
//!   Base(X, P1)  Edit(X, P2)  Edit(X, P3)      ──▶   Base(X, P1 ⊕ P3)
//! ```
//!
//! The last edit wins: each edit is merged onto the base's parameters as they
//! were before the chain started, so keys set only by an intermediate edit do
//! not leak into the result. The merged base reads the edit's input columns,
//! since those are the columns the edited code refers to.

use crate::graph::{LineageGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use strata_core::{
    OperationId, OperationRecord, Parameters, ReplayRegistry, StrataError, StrataResult,
};
use thiserror::Error;

/// An edit that could not be merged, either because the merged record is
/// invalid or because replaying it failed.
///
/// The base keeps its parameters and the edit stays in the sequence.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Merging edit {edit_id} into {base_id} failed: {reason}")]
pub struct MalformedMerge {
    pub edit_id: OperationId,
    pub base_id: OperationId,
    pub reason: String,
}

impl MalformedMerge {
    fn new(edit_id: OperationId, base_id: OperationId, source: &StrataError) -> Self {
        Self {
            edit_id,
            base_id,
            reason: source.to_string(),
        }
    }
}

/// An edit folded into its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsorbedEdit {
    pub edit_id: OperationId,
    pub base_id: OperationId,
}

/// What consolidation did to the sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Edits merged into a base and dropped
    pub absorbed: Vec<AbsorbedEdit>,
    /// Earlier edits dropped because a later edit on the same columns replaced them
    pub superseded: Vec<OperationId>,
    /// Merges abandoned because the base could not replay them
    pub failed_merges: Vec<MalformedMerge>,
}

impl ConsolidationReport {
    /// Ids of every operation removed from the sequence.
    pub fn dropped(&self) -> impl Iterator<Item = OperationId> + '_ {
        self.absorbed
            .iter()
            .map(|a| a.edit_id)
            .chain(self.superseded.iter().copied())
    }

    pub fn dropped_count(&self) -> usize {
        self.absorbed.len() + self.superseded.len()
    }
}

/// Consolidated sequence plus the report of what changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Consolidation {
    pub operations: Vec<OperationRecord>,
    pub report: ConsolidationReport,
}

/// Working copy of one input position.
struct Slot {
    record: OperationRecord,
    /// Base parameters as they were before the first successful merge
    pristine: Option<Parameters>,
    live: bool,
}

/// Folds edit operations into the operations they amend.
pub struct Consolidator<'a> {
    replayers: &'a ReplayRegistry,
}

impl<'a> Consolidator<'a> {
    pub fn new(replayers: &'a ReplayRegistry) -> Self {
        Self { replayers }
    }

    /// Consolidate `operations`, which is left untouched.
    pub fn consolidate(&self, operations: &[OperationRecord]) -> Consolidation {
        let graph = LineageGraph::build(operations);
        let mut slots: Vec<Slot> = Vec::with_capacity(operations.len());
        let mut report = ConsolidationReport::default();

        for (idx, op) in operations.iter().enumerate() {
            slots.push(Slot {
                record: op.clone(),
                pristine: None,
                live: true,
            });

            let Some(base_kind) = op.kind.edit_base() else {
                continue;
            };

            let chain = equivalent_predecessors(&graph, operations, &slots, idx);

            for &earlier in &chain {
                if slots[earlier].record.kind == op.kind {
                    slots[earlier].live = false;
                    report.superseded.push(slots[earlier].record.operation_id);
                    tracing::debug!(
                        superseded = %slots[earlier].record.operation_id,
                        by = %op.operation_id,
                        "Edit superseded by a later edit"
                    );
                }
            }

            // The most recent base is the one whose effect is current.
            let base = chain.iter().rev().copied().find(|&j| {
                let candidate = &slots[j].record;
                slots[j].live && !candidate.is_edit() && candidate.kind == base_kind
            });
            let Some(base) = base else {
                continue;
            };

            let slot = &mut slots[base];
            let pristine = slot
                .pristine
                .clone()
                .unwrap_or_else(|| slot.record.parameters().clone());
            let merged = pristine.merged_with(op.parameters());

            match self.merge(&slot.record, op, merged) {
                Ok(record) => {
                    slot.pristine = Some(pristine);
                    slot.record = record;
                    report.absorbed.push(AbsorbedEdit {
                        edit_id: op.operation_id,
                        base_id: slot.record.operation_id,
                    });
                    slots[idx].live = false;
                    tracing::debug!(
                        edit = %op.operation_id,
                        base = %slots[base].record.operation_id,
                        "Edit merged into base operation"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        edit = %op.operation_id,
                        base = %slot.record.operation_id,
                        error = %e,
                        "Edit could not be merged; keeping both operations"
                    );
                    report
                        .failed_merges
                        .push(MalformedMerge::new(op.operation_id, slot.record.operation_id, &e));
                }
            }
        }

        let operations = slots
            .into_iter()
            .filter(|slot| slot.live)
            .map(|slot| slot.record)
            .collect();

        Consolidation { operations, report }
    }

    /// The base as it reads after absorbing `edit`, replayed before it is accepted.
    fn merge(
        &self,
        base: &OperationRecord,
        edit: &OperationRecord,
        parameters: Parameters,
    ) -> StrataResult<OperationRecord> {
        let mut merged = base.clone();
        merged.apply_edit_merge(parameters, edit.input_columns().clone())?;
        self.replayers.replay(&merged, merged.parameters())?;
        Ok(merged)
    }
}

/// Live positions before `idx` that are output-equivalent to `operations[idx]`,
/// in sequence order.
fn equivalent_predecessors(
    graph: &LineageGraph,
    operations: &[OperationRecord],
    slots: &[Slot],
    idx: NodeIndex,
) -> Vec<NodeIndex> {
    let op = &operations[idx];
    let candidates: Vec<NodeIndex> = match op.output_columns().iter().next() {
        Some(first) => graph
            .producers_of_column(first)
            .iter()
            .copied()
            .filter(|&j| j < idx)
            .collect(),
        None => (0..idx).collect(),
    };
    candidates
        .into_iter()
        .filter(|&j| slots[j].live && slots[j].record.is_output_equivalent(op))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{OperationKind, OperationTags, ReplayError, WorksheetId};

    fn op(kind: OperationKind, inputs: &[&str], outputs: &[&str], params: Parameters) -> OperationRecord {
        OperationRecord::new(kind, OperationTags::TRANSFORMATION, WorksheetId::from("WS1"))
            .with_inputs(inputs.iter().copied())
            .with_outputs(outputs.iter().copied())
            .with_parameters(params)
    }

    fn code(source: &str) -> Parameters {
        Parameters::new().with("transformationCode", source)
    }

    fn accept_all() -> ReplayRegistry {
        ReplayRegistry::new().with_fallback(
            |_: &OperationRecord, _: &Parameters| -> Result<(), ReplayError> { Ok(()) },
        )
    }

    #[test]
    fn test_non_edits_pass_through() {
        let ops = vec![
            op(OperationKind::ImportColumn, &[], &["c1"], Parameters::new()),
            op(OperationKind::SubmitTransform, &["c1"], &["c2"], code("a")),
            op(OperationKind::SubmitTransform, &["c1"], &["c2"], code("b")),
        ];
        let registry = accept_all();
        let result = Consolidator::new(&registry).consolidate(&ops);
        assert_eq!(result.operations, ops);
        assert_eq!(result.report, ConsolidationReport::default());
    }

    #[test]
    fn test_edit_chain_collapses_onto_base() {
        let base = op(
            OperationKind::SubmitTransform,
            &["c1"],
            &["x"],
            code("p1").with("hNodeId", "c1"),
        );
        let edit1 = op(
            OperationKind::SubmitEditTransform,
            &["c1"],
            &["x"],
            code("p2").with("note", "intermediate"),
        );
        let edit2 = op(OperationKind::SubmitEditTransform, &["c1"], &["x"], code("p3"));
        let ops = vec![base.clone(), edit1.clone(), edit2.clone()];

        let registry = accept_all();
        let result = Consolidator::new(&registry).consolidate(&ops);

        assert_eq!(result.operations.len(), 1);
        let survivor = &result.operations[0];
        assert_eq!(survivor.operation_id, base.operation_id);
        assert_eq!(survivor.parameters(), &code("p3").with("hNodeId", "c1"));
        assert_eq!(
            result.report.absorbed,
            vec![
                AbsorbedEdit { edit_id: edit1.operation_id, base_id: base.operation_id },
                AbsorbedEdit { edit_id: edit2.operation_id, base_id: base.operation_id },
            ]
        );
        assert_eq!(result.report.dropped_count(), 2);
    }

    #[test]
    fn test_edits_without_base_keep_last() {
        let edit1 = op(OperationKind::SubmitEditTransform, &["c1"], &["x"], code("a"));
        let edit2 = op(OperationKind::SubmitEditTransform, &["c1"], &["x"], code("b"));
        let other = op(OperationKind::Fold, &["c1"], &["y"], Parameters::new());
        let ops = vec![edit1.clone(), other.clone(), edit2.clone()];

        let registry = ReplayRegistry::new();
        let result = Consolidator::new(&registry).consolidate(&ops);

        assert_eq!(result.operations, vec![other, edit2]);
        assert_eq!(result.report.superseded, vec![edit1.operation_id]);
        assert!(result.report.failed_merges.is_empty());
    }

    #[test]
    fn test_failed_replay_keeps_both() {
        let base = op(OperationKind::SubmitTransform, &["c1"], &["x"], code("ok"));
        let edit = op(OperationKind::SubmitEditTransform, &["c1"], &["x"], code("broken("));
        let ops = vec![base.clone(), edit.clone()];

        let registry = ReplayRegistry::new().with(
            OperationKind::SubmitTransform,
            |record: &OperationRecord, params: &Parameters| -> Result<(), ReplayError> {
                match params.get_str("transformationCode") {
                    Some(src) if src.ends_with('(') => Err(ReplayError::Rejected {
                        operation_id: record.operation_id,
                        kind: record.kind.clone(),
                        reason: "syntax error".to_string(),
                    }),
                    _ => Ok(()),
                }
            },
        );
        let result = Consolidator::new(&registry).consolidate(&ops);

        assert_eq!(result.operations, ops);
        assert_eq!(result.report.failed_merges.len(), 1);
        let failure = &result.report.failed_merges[0];
        assert_eq!(failure.edit_id, edit.operation_id);
        assert_eq!(failure.base_id, base.operation_id);
        assert!(failure.reason.contains("syntax error"));
    }

    #[test]
    fn test_missing_replayer_is_a_failed_merge() {
        let base = op(OperationKind::SubmitTransform, &["c1"], &["x"], code("a"));
        let edit = op(OperationKind::SubmitEditTransform, &["c1"], &["x"], code("b"));
        let registry = ReplayRegistry::new();
        let result = Consolidator::new(&registry).consolidate(&[base, edit]);
        assert_eq!(result.operations.len(), 2);
        assert_eq!(result.report.failed_merges.len(), 1);
    }

    #[test]
    fn test_edit_needs_identical_output_set() {
        let base = op(OperationKind::SubmitTransform, &["c1"], &["x", "y"], code("a"));
        let edit = op(OperationKind::SubmitEditTransform, &["c1"], &["x"], code("b"));
        let ops = vec![base, edit];
        let registry = accept_all();
        let result = Consolidator::new(&registry).consolidate(&ops);
        assert_eq!(result.operations, ops);
    }

    #[test]
    fn test_edit_ignores_base_of_other_kind() {
        let fold = op(OperationKind::Fold, &["c1"], &["x"], Parameters::new());
        let edit = op(OperationKind::SubmitEditTransform, &["c1"], &["x"], code("b"));
        let ops = vec![fold, edit];
        let registry = accept_all();
        let result = Consolidator::new(&registry).consolidate(&ops);
        assert_eq!(result.operations, ops);
        assert!(result.report.absorbed.is_empty());
    }

    #[test]
    fn test_merge_target_is_latest_base() {
        let first = op(OperationKind::SubmitTransform, &["c1"], &["x"], code("a"));
        let second = op(OperationKind::SubmitTransform, &["c1"], &["x"], code("b"));
        let edit = op(OperationKind::SubmitEditTransform, &["c1"], &["x"], code("c"));
        let registry = accept_all();
        let result =
            Consolidator::new(&registry).consolidate(&[first.clone(), second.clone(), edit]);

        assert_eq!(result.operations.len(), 2);
        assert_eq!(result.operations[0], first);
        assert_eq!(result.operations[1].operation_id, second.operation_id);
        assert_eq!(result.operations[1].parameters(), &code("c"));
    }

    #[test]
    fn test_merged_base_reads_edit_inputs() {
        let base = op(OperationKind::SubmitTransform, &["c1"], &["x"], code("getValue('c1')"));
        let edit = op(OperationKind::SubmitEditTransform, &["c2"], &["x"], code("getValue('c2')"));
        let registry = accept_all();
        let result = Consolidator::new(&registry).consolidate(&[base.clone(), edit]);

        assert_eq!(result.operations.len(), 1);
        let survivor = &result.operations[0];
        assert_eq!(survivor.operation_id, base.operation_id);
        let inputs: Vec<&str> = survivor.input_columns().iter().map(|c| c.as_str()).collect();
        assert_eq!(inputs, vec!["c2"]);
        assert_eq!(survivor.output_columns(), base.output_columns());
    }

    #[test]
    fn test_edit_reading_its_own_output_is_a_failed_merge() {
        let base = op(OperationKind::SubmitTransform, &["c1"], &["x"], code("a"));
        // Recorded without validation, as a legacy log might hold it.
        let edit = op(OperationKind::SubmitEditTransform, &["x"], &["x"], code("b"));
        let ops = vec![base.clone(), edit.clone()];
        let registry = accept_all();
        let result = Consolidator::new(&registry).consolidate(&ops);

        assert_eq!(result.operations, ops);
        assert_eq!(result.report.failed_merges.len(), 1);
        assert_eq!(result.report.failed_merges[0].edit_id, edit.operation_id);
    }

    #[test]
    fn test_input_sequence_is_not_modified() {
        let base = op(OperationKind::SubmitTransform, &["c1"], &["x"], code("a"));
        let edit = op(OperationKind::SubmitEditTransform, &["c1"], &["x"], code("b"));
        let ops = vec![base, edit];
        let before = ops.clone();
        let registry = accept_all();
        let _ = Consolidator::new(&registry).consolidate(&ops);
        assert_eq!(ops, before);
    }
}
