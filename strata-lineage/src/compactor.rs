//! Compaction committer.
//!
//! Builds a candidate history for one worksheet, checks it, and either swaps
//! it into the session or leaves the session alone. The session log is only
//! touched by [`Compactor::commit`], in a single replace.

use crate::completeness::{CompletenessChecker, DependencyGap};
use crate::consolidate::{ConsolidationReport, Consolidator};
use crate::graph::LineageGraph;
use crate::resolve::{BackwardResolver, TerminalSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::time::Instant;
use strata_core::{
    ColumnId, CompactionConfig, CompactionError, HistoryLog, HistorySnapshot, OperationId,
    OperationRecord, ReplayRegistry, SchemaInspector, Session, StrataResult, WorksheetId,
};

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Which part of the history a compaction pass looks at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateScope {
    pub worksheet_id: WorksheetId,
}

impl CandidateScope {
    pub fn worksheet(worksheet_id: impl Into<WorksheetId>) -> Self {
        Self {
            worksheet_id: worksheet_id.into(),
        }
    }
}

/// Why a candidate was not committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackReason {
    /// The candidate has dependency gaps
    Incomplete,
    /// The configured time budget ran out before the candidate was checked
    TimeBudgetExceeded,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Incomplete => write!(f, "candidate history is incomplete"),
            FallbackReason::TimeBudgetExceeded => write!(f, "time budget exceeded"),
        }
    }
}

/// Everything a compaction pass computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionResult {
    /// Consolidated candidate sequence
    pub compacted_operations: Vec<OperationRecord>,
    /// Union of the terminal sources
    pub used_source_columns: BTreeSet<ColumnId>,
    /// Whether the candidate may replace the live log
    pub complete: bool,
    /// Live log as it was when the pass started
    pub snapshot: HistorySnapshot,
    /// Ids of the in-scope operations before consolidation
    pub candidate_ids: BTreeSet<OperationId>,
    pub per_terminal_sources: BTreeMap<OperationId, BTreeSet<ColumnId>>,
    /// Schema path of each used source column, outermost table first
    pub source_paths: BTreeMap<ColumnId, Vec<String>>,
    pub consolidation: ConsolidationReport,
    pub gaps: Vec<DependencyGap>,
    pub fallback_reason: Option<FallbackReason>,
}

impl CompactionResult {
    fn abandoned(
        snapshot: HistorySnapshot,
        candidate_ids: BTreeSet<OperationId>,
        compacted_operations: Vec<OperationRecord>,
        consolidation: ConsolidationReport,
        reason: FallbackReason,
    ) -> Self {
        Self {
            compacted_operations,
            used_source_columns: BTreeSet::new(),
            complete: false,
            snapshot,
            candidate_ids,
            per_terminal_sources: BTreeMap::new(),
            source_paths: BTreeMap::new(),
            consolidation,
            gaps: Vec::new(),
            fallback_reason: Some(reason),
        }
    }

    /// Number of operations the candidate removes.
    pub fn removed_count(&self) -> usize {
        self.candidate_ids
            .len()
            .saturating_sub(self.compacted_operations.len())
    }
}

/// What [`Compactor::commit`] did to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOutcome {
    /// The live log was replaced
    Committed { removed: usize, history_len: usize },
    /// The live log was left as it was
    Retained { reason: FallbackReason },
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }
}

/// Result of [`Compactor::run`]: the history to continue with and a message
/// suitable for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionOutcome {
    pub history: HistoryLog,
    /// Whether the history was shortened
    pub optimized: bool,
    pub message: String,
    pub result: CompactionResult,
}

// ============================================================================
// COMPACTOR
// ============================================================================

/// History compaction engine.
#[derive(Debug, Clone)]
pub struct Compactor {
    config: CompactionConfig,
}

impl Compactor {
    /// Create a compactor; the configuration is validated first.
    pub fn new(config: CompactionConfig) -> StrataResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    /// Compute a candidate for `scope` without touching the session.
    pub fn compact<S: SchemaInspector + ?Sized>(
        &self,
        session: &Session,
        schema: &S,
        replayers: &ReplayRegistry,
        scope: &CandidateScope,
    ) -> StrataResult<CompactionResult> {
        let deadline = self.config.time_budget().map(|budget| Instant::now() + budget);
        self.compact_with_deadline(session, schema, replayers, scope, deadline)
    }

    /// [`Compactor::compact`] with an explicit deadline, checked between phases.
    pub fn compact_with_deadline<S: SchemaInspector + ?Sized>(
        &self,
        session: &Session,
        schema: &S,
        replayers: &ReplayRegistry,
        scope: &CandidateScope,
        deadline: Option<Instant>,
    ) -> StrataResult<CompactionResult> {
        let snapshot = session.history().snapshot()?;

        let candidate: Vec<OperationRecord> = snapshot
            .operations
            .iter()
            .filter(|op| self.in_scope(op, scope))
            .cloned()
            .collect();
        let candidate_ids: BTreeSet<OperationId> =
            candidate.iter().map(|op| op.operation_id).collect();

        tracing::debug!(
            session_id = %session.session_id,
            worksheet_id = %scope.worksheet_id,
            history_len = snapshot.len(),
            candidate_len = candidate.len(),
            "Selected compaction candidate"
        );

        if past(deadline) {
            return Ok(CompactionResult::abandoned(
                snapshot,
                candidate_ids,
                candidate,
                ConsolidationReport::default(),
                FallbackReason::TimeBudgetExceeded,
            ));
        }

        let consolidation = Consolidator::new(replayers).consolidate(&candidate);
        let compacted = consolidation.operations;
        tracing::debug!(
            candidate_len = candidate.len(),
            consolidated_len = compacted.len(),
            absorbed = consolidation.report.absorbed.len(),
            failed_merges = consolidation.report.failed_merges.len(),
            "Consolidated edit chains"
        );

        if past(deadline) {
            return Ok(CompactionResult::abandoned(
                snapshot,
                candidate_ids,
                compacted,
                consolidation.report,
                FallbackReason::TimeBudgetExceeded,
            ));
        }

        let graph = LineageGraph::build(&compacted);
        tracing::debug!(
            nodes = graph.len(),
            edges = graph.edge_count(),
            "Built lineage graph"
        );
        let terminals = TerminalSet::select(&compacted, &self.config);
        let resolved = BackwardResolver::new(&graph, &compacted, schema).resolve(&terminals);
        let source_paths = resolved
            .used_source_columns
            .iter()
            .filter_map(|c| schema.column_path(c).map(|path| (c.clone(), path)))
            .collect();

        if past(deadline) {
            return Ok(CompactionResult::abandoned(
                snapshot,
                candidate_ids,
                compacted,
                consolidation.report,
                FallbackReason::TimeBudgetExceeded,
            ));
        }

        let report = CompletenessChecker::new(schema).check(&compacted);
        let fallback_reason = (!report.complete).then_some(FallbackReason::Incomplete);

        Ok(CompactionResult {
            compacted_operations: compacted,
            used_source_columns: resolved.used_source_columns,
            complete: report.complete,
            snapshot,
            candidate_ids,
            per_terminal_sources: resolved.per_terminal,
            source_paths,
            consolidation: consolidation.report,
            gaps: report.gaps,
            fallback_reason,
        })
    }

    /// Swap a complete candidate into the session.
    ///
    /// An incomplete candidate leaves the session untouched. Fails with
    /// [`CompactionError::StaleSnapshot`] if the log changed since `result`
    /// was computed.
    pub fn commit(
        &self,
        session: &mut Session,
        result: &CompactionResult,
    ) -> StrataResult<CommitOutcome> {
        if !result.complete {
            let reason = result.fallback_reason.unwrap_or(FallbackReason::Incomplete);
            tracing::info!(
                session_id = %session.session_id,
                reason = %reason,
                gaps = result.gaps.len(),
                "Keeping original history"
            );
            return Ok(CommitOutcome::Retained { reason });
        }

        let live = session.history().fingerprint()?;
        if live != result.snapshot.fingerprint {
            return Err(CompactionError::StaleSnapshot {
                expected: result.snapshot.fingerprint_hex(),
                found: hex::encode(live),
            }
            .into());
        }

        let operations = self.commit_layout(session.history().operations(), result);
        let removed = session.history().len().saturating_sub(operations.len());
        session.history_mut().replace(operations)?;

        tracing::info!(
            session_id = %session.session_id,
            removed,
            history_len = session.history().len(),
            "Committed compacted history"
        );
        Ok(CommitOutcome::Committed {
            removed,
            history_len: session.history().len(),
        })
    }

    /// Compact `scope` and commit the candidate if it is complete.
    pub fn run<S: SchemaInspector + ?Sized>(
        &self,
        session: &mut Session,
        schema: &S,
        replayers: &ReplayRegistry,
        scope: &CandidateScope,
    ) -> StrataResult<CompactionOutcome> {
        let result = self.compact(session, schema, replayers, scope)?;
        let outcome = self.commit(session, &result)?;

        let (optimized, message) = match outcome {
            CommitOutcome::Committed { removed, history_len } => (
                removed > 0,
                format!(
                    "History optimized: {} operations removed, {} remaining",
                    removed, history_len
                ),
            ),
            CommitOutcome::Retained { reason } => (
                false,
                format!("History kept unchanged: {}", reason),
            ),
        };

        Ok(CompactionOutcome {
            history: session.history().clone(),
            optimized,
            message,
            result,
        })
    }

    fn in_scope(&self, op: &OperationRecord, scope: &CandidateScope) -> bool {
        op.has_any_tag(self.config.candidate_tags) && op.worksheet_id == scope.worksheet_id
    }

    /// Sequence the live log becomes on commit.
    fn commit_layout(
        &self,
        live: &[OperationRecord],
        result: &CompactionResult,
    ) -> Vec<OperationRecord> {
        if !self.config.retain_out_of_scope {
            return result.compacted_operations.clone();
        }

        let mut survivors: HashMap<OperationId, &OperationRecord> = result
            .compacted_operations
            .iter()
            .map(|op| (op.operation_id, op))
            .collect();

        live.iter()
            .filter_map(|op| {
                if result.candidate_ids.contains(&op.operation_id) {
                    survivors.remove(&op.operation_id).cloned()
                } else {
                    Some(op.clone())
                }
            })
            .collect()
    }
}

fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}
