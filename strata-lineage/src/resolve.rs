//! Backward source resolution.
//!
//! `Sources(t)` is the set of columns that must exist to reproduce the effect
//! of operation `t`:
//!
//! ```text
//!   Sources(t) = t.inputs                                  if t has no producers
//!              = ⋃ Sources(p)  ∪  { c ∈ t.inputs : c is Regular }   otherwise
//! ```
//!
//! Unfolding the recursion, `Sources(t)` is the union of one contribution per
//! operation reachable from `t` (including `t`). Each contribution is computed
//! once per resolver and each node is expanded at most once per terminal, so
//! diamond-shaped histories stay linear and cycles through reused column ids
//! terminate.

use crate::graph::{LineageGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strata_core::{ColumnId, CompactionConfig, OperationId, OperationRecord, SchemaInspector};

// ============================================================================
// TERMINAL SET
// ============================================================================

/// Positions of the operations whose effect must be reproduced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalSet {
    nodes: Vec<NodeIndex>,
}

impl TerminalSet {
    /// Select every operation whose kind the config marks as terminal.
    pub fn select(operations: &[OperationRecord], config: &CompactionConfig) -> Self {
        let nodes = operations
            .iter()
            .enumerate()
            .filter(|(_, op)| config.is_terminal(&op.kind))
            .map(|(idx, _)| idx)
            .collect();
        Self { nodes }
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeIndex>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
        }
    }

    pub fn nodes(&self) -> &[NodeIndex] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Sources resolved for a terminal set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSources {
    pub per_terminal: BTreeMap<OperationId, BTreeSet<ColumnId>>,
    /// Union over every terminal
    pub used_source_columns: BTreeSet<ColumnId>,
}

/// Memoizing backward resolver over one operation sequence.
pub struct BackwardResolver<'a, S: SchemaInspector + ?Sized> {
    graph: &'a LineageGraph,
    operations: &'a [OperationRecord],
    schema: &'a S,
    contributions: Vec<Option<BTreeSet<ColumnId>>>,
    resolved: Vec<Option<BTreeSet<ColumnId>>>,
}

impl<'a, S: SchemaInspector + ?Sized> BackwardResolver<'a, S> {
    /// `graph` must have been built from `operations`.
    pub fn new(graph: &'a LineageGraph, operations: &'a [OperationRecord], schema: &'a S) -> Self {
        debug_assert_eq!(graph.len(), operations.len());
        Self {
            graph,
            operations,
            schema,
            contributions: vec![None; operations.len()],
            resolved: vec![None; operations.len()],
        }
    }

    /// `Sources(node)`. Out-of-range nodes resolve to the empty set.
    pub fn sources(&mut self, node: NodeIndex) -> BTreeSet<ColumnId> {
        if node >= self.operations.len() {
            return BTreeSet::new();
        }
        if let Some(done) = &self.resolved[node] {
            return done.clone();
        }

        let mut visited = vec![false; self.operations.len()];
        let mut stack = vec![node];
        let mut sources = BTreeSet::new();
        visited[node] = true;

        while let Some(current) = stack.pop() {
            if current != node {
                if let Some(done) = &self.resolved[current] {
                    sources.extend(done.iter().cloned());
                    continue;
                }
            }
            sources.extend(self.contribution(current).iter().cloned());
            for &producer in self.graph.producers_of(current) {
                if !visited[producer] {
                    visited[producer] = true;
                    stack.push(producer);
                }
            }
        }

        self.resolved[node] = Some(sources.clone());
        sources
    }

    /// Resolve every terminal and their union.
    pub fn resolve(&mut self, terminals: &TerminalSet) -> ResolvedSources {
        let mut result = ResolvedSources::default();
        for &node in terminals.nodes() {
            let Some(operation_id) = self.graph.operation_id(node) else {
                continue;
            };
            let sources = self.sources(node);
            result.used_source_columns.extend(sources.iter().cloned());
            result
                .per_terminal
                .entry(operation_id)
                .or_default()
                .extend(sources);
        }
        tracing::debug!(
            terminals = terminals.len(),
            used_source_columns = result.used_source_columns.len(),
            "Resolved terminal sources"
        );
        result
    }

    /// Columns `node` contributes on its own.
    fn contribution(&mut self, node: NodeIndex) -> &BTreeSet<ColumnId> {
        if self.contributions[node].is_none() {
            let inputs = self.operations[node].input_columns();
            let own = if self.graph.has_producers(node) {
                inputs
                    .iter()
                    .filter(|c| self.schema.is_regular(c))
                    .cloned()
                    .collect()
            } else {
                inputs.clone()
            };
            self.contributions[node] = Some(own);
        }
        self.contributions[node].get_or_insert_with(BTreeSet::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{ColumnKind, OperationKind, OperationTags, Schema, WorksheetId};

    fn op(kind: OperationKind, inputs: &[&str], outputs: &[&str]) -> OperationRecord {
        OperationRecord::new(kind, OperationTags::MODELING, WorksheetId::from("WS1"))
            .with_inputs(inputs.iter().copied())
            .with_outputs(outputs.iter().copied())
    }

    fn schema(columns: &[(&str, ColumnKind)]) -> Schema {
        let mut schema = Schema::new();
        for (id, kind) in columns {
            schema.add_column(ColumnId::from(*id), *id, *kind).unwrap();
        }
        schema
    }

    fn cols(ids: &[&str]) -> BTreeSet<ColumnId> {
        ids.iter().map(|c| ColumnId::from(*c)).collect()
    }

    #[test]
    fn test_root_returns_all_inputs() {
        // No producers: every input counts, even unknown or derived ones.
        let ops = vec![op(OperationKind::SetSemanticType, &["d1", "ghost"], &[])];
        let schema = schema(&[("d1", ColumnKind::Derived)]);
        let graph = LineageGraph::build(&ops);
        let mut resolver = BackwardResolver::new(&graph, &ops, &schema);
        assert_eq!(resolver.sources(0), cols(&["d1", "ghost"]));
    }

    #[test]
    fn test_chain_keeps_only_regular_inputs() {
        let ops = vec![
            op(OperationKind::ImportColumn, &[], &["c1", "c2"]),
            op(OperationKind::Fold, &["c2"], &["c3", "c4"]),
            op(OperationKind::SetSemanticType, &["c3", "c4"], &[]),
        ];
        let schema = schema(&[
            ("c1", ColumnKind::Regular),
            ("c2", ColumnKind::Regular),
            ("c3", ColumnKind::Regular),
            ("c4", ColumnKind::Derived),
        ]);
        let graph = LineageGraph::build(&ops);
        let mut resolver = BackwardResolver::new(&graph, &ops, &schema);
        assert_eq!(resolver.sources(2), cols(&["c2", "c3"]));
        assert_eq!(resolver.sources(1), cols(&["c2"]));
        assert!(resolver.sources(0).is_empty());
    }

    #[test]
    fn test_unknown_columns_are_not_regular() {
        let ops = vec![
            op(OperationKind::ImportColumn, &[], &["c1"]),
            op(OperationKind::Glue, &["c1", "ghost"], &["c2"]),
        ];
        let schema = schema(&[("c1", ColumnKind::Regular)]);
        let graph = LineageGraph::build(&ops);
        let mut resolver = BackwardResolver::new(&graph, &ops, &schema);
        assert_eq!(resolver.sources(1), cols(&["c1"]));
    }

    #[test]
    fn test_diamond_unions_both_branches() {
        //        ┌── left(a ⇒ l) ──┐
        // import ┤                 ├── join(l, r) ── terminal(j)
        //        └── right(b ⇒ r) ─┘
        let ops = vec![
            op(OperationKind::ImportColumn, &["raw"], &["a", "b"]),
            op(OperationKind::SubmitTransform, &["a"], &["l"]),
            op(OperationKind::SubmitTransform, &["b"], &["r"]),
            op(OperationKind::Glue, &["l", "r"], &["j"]),
            op(OperationKind::SetSemanticType, &["j"], &[]),
        ];
        let schema = schema(&[
            ("raw", ColumnKind::Regular),
            ("a", ColumnKind::Regular),
            ("b", ColumnKind::Regular),
            ("l", ColumnKind::Derived),
            ("r", ColumnKind::Regular),
            ("j", ColumnKind::Regular),
        ]);
        let graph = LineageGraph::build(&ops);
        let mut resolver = BackwardResolver::new(&graph, &ops, &schema);
        assert_eq!(resolver.sources(4), cols(&["raw", "a", "b", "r", "j"]));
    }

    #[test]
    fn test_cycle_terminates() {
        let ops = vec![
            op(OperationKind::SubmitTransform, &["x"], &["y"]),
            op(OperationKind::SubmitTransform, &["y"], &["x"]),
            op(OperationKind::SetSemanticType, &["x"], &[]),
        ];
        let schema = schema(&[("x", ColumnKind::Regular), ("y", ColumnKind::Regular)]);
        let graph = LineageGraph::build(&ops);
        let mut resolver = BackwardResolver::new(&graph, &ops, &schema);
        assert_eq!(resolver.sources(2), cols(&["x", "y"]));
    }

    #[test]
    fn test_resolve_reports_per_terminal_and_union() {
        let ops = vec![
            op(OperationKind::ImportColumn, &[], &["c1", "c2"]),
            op(OperationKind::SetSemanticType, &["c1"], &[]),
            op(OperationKind::SetMetaProperty, &["c2"], &[]),
            op(OperationKind::Fold, &["c2"], &["c3"]),
        ];
        let schema = schema(&[("c1", ColumnKind::Regular), ("c2", ColumnKind::Regular)]);
        let graph = LineageGraph::build(&ops);
        let terminals = TerminalSet::select(&ops, &CompactionConfig::standard());
        assert_eq!(terminals.nodes(), &[1, 2]);

        let mut resolver = BackwardResolver::new(&graph, &ops, &schema);
        let resolved = resolver.resolve(&terminals);
        assert_eq!(resolved.per_terminal[&ops[1].operation_id], cols(&["c1"]));
        assert_eq!(resolved.per_terminal[&ops[2].operation_id], cols(&["c2"]));
        assert_eq!(resolved.used_source_columns, cols(&["c1", "c2"]));
    }

    #[test]
    fn test_memoized_results_are_stable() {
        let ops = vec![
            op(OperationKind::ImportColumn, &[], &["c1"]),
            op(OperationKind::Fold, &["c1"], &["c2"]),
            op(OperationKind::SetSemanticType, &["c2"], &[]),
        ];
        let schema = schema(&[("c1", ColumnKind::Regular), ("c2", ColumnKind::Regular)]);
        let graph = LineageGraph::build(&ops);
        let mut resolver = BackwardResolver::new(&graph, &ops, &schema);
        let middle = resolver.sources(1);
        let first = resolver.sources(2);
        let second = resolver.sources(2);
        assert_eq!(middle, cols(&["c1"]));
        assert_eq!(first, second);
        assert_eq!(first, cols(&["c1", "c2"]));
    }

    #[test]
    fn test_out_of_range_node_is_empty() {
        let ops: Vec<OperationRecord> = Vec::new();
        let schema = Schema::new();
        let graph = LineageGraph::build(&ops);
        let mut resolver = BackwardResolver::new(&graph, &ops, &schema);
        assert!(resolver.sources(3).is_empty());
        assert_eq!(resolver.resolve(&TerminalSet::from_nodes([3])), ResolvedSources::default());
    }
}
